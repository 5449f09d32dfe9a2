//! Local file frame source (demo playback).
//!
//! Accepts a single still image, a directory of stills (played in file-name
//! order) or, with the ingest-file-ffmpeg feature, a video file. Playback
//! loops: the end of the media rewinds to the start instead of failing, so a
//! demo runs until the operator quits.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::CaptureSession;
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSession;

const STILL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Local file session.
pub struct FileSession {
    path: PathBuf,
    backend: FileBackend,
    frames_read: u64,
}

enum FileBackend {
    Stills(StillSequence),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSession),
    Released,
}

impl FileSession {
    pub fn open(path: &Path) -> Result<Self> {
        let backend = if path.is_dir() {
            FileBackend::Stills(StillSequence::from_dir(path)?)
        } else if is_still(path) {
            FileBackend::Stills(StillSequence::single(path)?)
        } else {
            open_video(path)?
        };
        log::info!("FileSession: opened {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            backend,
            frames_read: 0,
        })
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl CaptureSession for FileSession {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        let frame = match &mut self.backend {
            FileBackend::Stills(stills) => stills.next_frame()?,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(video) => video.next_frame()?,
            FileBackend::Released => None,
        };
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    fn release(&mut self) {
        if !matches!(self.backend, FileBackend::Released) {
            log::debug!("FileSession: released {}", self.path.display());
        }
        self.backend = FileBackend::Released;
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video(path: &Path) -> Result<FileBackend> {
    Ok(FileBackend::Ffmpeg(FfmpegFileSession::open(path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video(path: &Path) -> Result<FileBackend> {
    if !path.exists() {
        return Err(anyhow!("demo media {} does not exist", path.display()));
    }
    Err(anyhow!(
        "cannot play {}: video files require the ingest-file-ffmpeg feature",
        path.display()
    ))
}

fn is_still(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| STILL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// ----------------------------------------------------------------------------
// Still images
// ----------------------------------------------------------------------------

struct StillSequence {
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl StillSequence {
    fn single(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("demo image {} does not exist", path.display()));
        }
        Ok(Self {
            paths: vec![path.to_path_buf()],
            cursor: 0,
        })
    }

    fn from_dir(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to list demo directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_still(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(anyhow!("no images found in {}", dir.display()));
        }
        paths.sort();
        Ok(Self { paths, cursor: 0 })
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let path = &self.paths[self.cursor];
        self.cursor = (self.cursor + 1) % self.paths.len();
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();
        Ok(Some(image))
    }
}
