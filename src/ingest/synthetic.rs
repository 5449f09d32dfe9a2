//! Synthetic `stub://` source for tests and dry runs.

use anyhow::Result;
use image::{Rgb, RgbImage};

use super::CaptureSession;

/// Generates a drifting gradient. Always healthy until released.
pub struct SyntheticSession {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
    released: bool,
}

impl SyntheticSession {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        let name = name.into();
        log::info!("SyntheticSession: connected to {} ({}x{})", name, width, height);
        Self {
            name,
            width,
            height,
            frame_count: 0,
            released: false,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

impl CaptureSession for SyntheticSession {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        if self.released {
            return Ok(None);
        }
        self.frame_count += 1;
        let shift = self.frame_count;
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                ((u64::from(x) + shift) % 256) as u8,
                ((u64::from(y) + shift) % 256) as u8,
                128,
            ])
        });
        Ok(Some(image))
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn describe(&self) -> String {
        format!("synthetic {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_change_between_reads() -> Result<()> {
        let mut session = SyntheticSession::new("stub://test", 8, 8);
        let a = session.read()?.expect("frame");
        let b = session.read()?.expect("frame");
        assert_ne!(a, b);
        assert_eq!(session.frames_captured(), 2);
        Ok(())
    }

    #[test]
    fn released_session_reads_nothing() -> Result<()> {
        let mut session = SyntheticSession::new("stub://test", 8, 8);
        session.release();
        assert!(session.read()?.is_none());
        Ok(())
    }
}
