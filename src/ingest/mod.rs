//! Frame sources.
//!
//! A `FrameSource` opens `CaptureSession`s for a `SourceSelector`:
//! - `Device(n)`: USB/V4L2 camera `/dev/videoN` (feature: ingest-v4l2)
//! - `File(path)`: demo media. Still images or a directory of them always
//!   work; video files need the ingest-file-ffmpeg feature. `stub://` paths
//!   produce synthetic frames for tests.
//! - `Unavailable`: nothing to open.
//!
//! `ScriptedSource` replays canned open/read outcomes for tests.
//!
//! Sessions hand back RGB images. Sequence numbers and reconnect policy belong
//! to the acquisition state machine, not to the sources.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod scripted;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use image::RgbImage;

pub use file::FileSession;
pub use scripted::{ScriptLog, ScriptedRead, ScriptedSource, SessionScript};
pub use synthetic::SyntheticSession;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Session;

/// What to open.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceSelector {
    Device(u32),
    File(PathBuf),
    Unavailable,
}

impl fmt::Display for SourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSelector::Device(index) => write!(f, "{}", device_path(*index)),
            SourceSelector::File(path) => write!(f, "{}", path.display()),
            SourceSelector::Unavailable => write!(f, "<no source>"),
        }
    }
}

/// An open capture handle. Owned by exactly one acquisition state machine.
pub trait CaptureSession {
    /// Read the next frame. `Ok(None)` means the source produced nothing
    /// (device gone, stream ended); errors mean the same to the caller.
    fn read(&mut self) -> Result<Option<RgbImage>>;

    /// Release the underlying handle. Must be idempotent.
    fn release(&mut self);

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Opens capture sessions.
pub trait FrameSource {
    fn open(&mut self, selector: &SourceSelector) -> Result<Box<dyn CaptureSession>>;
}

/// Device node for a camera index.
pub fn device_path(index: u32) -> String {
    format!("/dev/video{}", index)
}

/// Production frame source: V4L2 devices, local files, `stub://` synthetics.
#[derive(Clone, Debug)]
pub struct SystemFrameSource {
    /// Preferred capture width for cameras.
    pub width: u32,
    /// Preferred capture height for cameras.
    pub height: u32,
}

impl Default for SystemFrameSource {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

impl FrameSource for SystemFrameSource {
    fn open(&mut self, selector: &SourceSelector) -> Result<Box<dyn CaptureSession>> {
        match selector {
            SourceSelector::Unavailable => Err(anyhow!("no frame source available")),
            SourceSelector::File(path) => {
                let raw = path.to_string_lossy();
                if raw.starts_with("stub://") {
                    Ok(Box::new(SyntheticSession::new(
                        raw.into_owned(),
                        self.width,
                        self.height,
                    )))
                } else {
                    Ok(Box::new(FileSession::open(path)?))
                }
            }
            #[cfg(feature = "ingest-v4l2")]
            SourceSelector::Device(index) => Ok(Box::new(V4l2Session::open(
                &device_path(*index),
                self.width,
                self.height,
            )?)),
            #[cfg(not(feature = "ingest-v4l2"))]
            SourceSelector::Device(index) => Err(anyhow!(
                "cannot open {}: camera capture requires the ingest-v4l2 feature",
                device_path(*index)
            )),
        }
    }
}
