use anyhow::Result;
use image::RgbImage;

use crate::detect::result::{DetectionSet, ObjectClass};

/// Detector backend trait.
///
/// The same trait serves both cascade stages: the bee detector is handed full
/// frames, the mite detector is handed bee crops. Implementations must accept
/// any image size and return an empty set, not an error, when nothing is
/// found.
///
/// Calls are blocking and have no timeout. A hung backend stalls the loop.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class reported by this detector instance.
    fn class(&self) -> ObjectClass;

    /// Run detection on an RGB image.
    fn detect(&mut self, image: &RgbImage) -> Result<DetectionSet>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
