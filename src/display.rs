//! Display sinks for annotated frames.
//!
//! There is no GUI here. [`HeadlessDisplay`] drops frames and
//! [`SnapshotDisplay`] keeps the latest annotated frame on disk as a JPEG
//! for a viewer to poll. The operator quit key is handled by
//! [`crate::shutdown::spawn_quit_key_listener`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use image::ImageFormat;

use crate::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayControl {
    Continue,
    Quit,
}

pub trait DisplaySink {
    /// Present an annotated frame. `title` names the active source.
    fn present(&mut self, frame: &Frame, title: &str) -> Result<DisplayControl>;

    /// Release any display resources. Called once on every exit path.
    fn teardown(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessDisplay {
    presented: u64,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl DisplaySink for HeadlessDisplay {
    fn present(&mut self, _frame: &Frame, _title: &str) -> Result<DisplayControl> {
        self.presented += 1;
        Ok(DisplayControl::Continue)
    }
}

/// Writes each presented frame to `path`, replacing the previous one.
pub struct SnapshotDisplay {
    path: PathBuf,
    staging: PathBuf,
    written: u64,
}

impl SnapshotDisplay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        Self {
            path,
            staging: PathBuf::from(staging),
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl DisplaySink for SnapshotDisplay {
    fn present(&mut self, frame: &Frame, title: &str) -> Result<DisplayControl> {
        frame
            .image()
            .save_with_format(&self.staging, ImageFormat::Jpeg)
            .with_context(|| format!("write snapshot {}", self.staging.display()))?;
        std::fs::rename(&self.staging, &self.path)
            .with_context(|| format!("publish snapshot {}", self.path.display()))?;
        self.written += 1;
        log::trace!("[{}] snapshot {} updated", title, self.path.display());
        Ok(DisplayControl::Continue)
    }

    fn teardown(&mut self) -> Result<()> {
        if self.staging.exists() {
            std::fs::remove_file(&self.staging)
                .with_context(|| format!("remove {}", self.staging.display()))?;
        }
        log::info!(
            "Snapshot display closed after {} frames ({})",
            self.written,
            self.path.display()
        );
        Ok(())
    }
}
