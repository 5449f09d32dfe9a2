mod backend;
mod backends;
pub mod postprocess;
mod result;

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

pub use backend::DetectorBackend;
pub use backends::{StubBackend, StubProbe};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{Detection, DetectionSet, ObjectClass};

/// Which detector implementation to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// ONNX YOLO model run through tract (feature: backend-tract).
    Tract,
    /// Never detects anything. Useful to exercise camera and logging.
    Stub,
}

/// Open a detector for `class`.
pub fn open_backend(
    kind: BackendKind,
    model_path: &Path,
    class: ObjectClass,
    input_size: u32,
) -> Result<Box<dyn DetectorBackend>> {
    match kind {
        BackendKind::Stub => {
            log::warn!(
                "{} detector uses the stub backend; nothing will be detected",
                class.label()
            );
            Ok(Box::new(StubBackend::new(class)))
        }
        #[cfg(feature = "backend-tract")]
        BackendKind::Tract => {
            let mut backend = TractBackend::new(model_path, class, input_size)?;
            backend.warm_up()?;
            log::info!(
                "{} model loaded: {}",
                class.label(),
                model_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| model_path.display().to_string())
            );
            Ok(Box::new(backend))
        }
        #[cfg(not(feature = "backend-tract"))]
        BackendKind::Tract => {
            let _ = (model_path, input_size);
            anyhow::bail!("tract detector requires the backend-tract feature")
        }
    }
}
