//! Scripted frame source for exercising the acquisition state machine.
//!
//! Each `open` of a selector consumes the next queued script: either an open
//! failure or a session that plays back a fixed list of reads. Opens and
//! releases are recorded in a shared log that survives moving the source
//! into the acquisition layer.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::{CaptureSession, FrameSource, SourceSelector};

/// One scripted `read` result.
#[derive(Clone, Debug)]
pub enum ScriptedRead {
    /// A uniform gray frame of the given size.
    Frame { width: u32, height: u32 },
    /// `Ok(None)`: device produced nothing.
    Empty,
    /// `Err(..)`: device error.
    Fail(String),
}

impl ScriptedRead {
    pub fn frame(width: u32, height: u32) -> Self {
        ScriptedRead::Frame { width, height }
    }
}

/// Reads a session plays back, then either endless frames or nothing.
#[derive(Clone, Debug, Default)]
pub struct SessionScript {
    reads: VecDeque<ScriptedRead>,
    endless: Option<(u32, u32)>,
}

impl SessionScript {
    pub fn new(reads: impl IntoIterator<Item = ScriptedRead>) -> Self {
        Self {
            reads: reads.into_iter().collect(),
            endless: None,
        }
    }

    /// Opens fine but never yields a frame.
    pub fn dead() -> Self {
        Self::default()
    }

    /// After the scripted reads, keep yielding frames of this size.
    pub fn then_endless(mut self, width: u32, height: u32) -> Self {
        self.endless = Some((width, height));
        self
    }
}

/// What happened to the scripted source.
#[derive(Clone, Debug, Default)]
pub struct ScriptLog {
    pub opens: Vec<SourceSelector>,
    pub releases: usize,
}

#[derive(Default)]
pub struct ScriptedSource {
    scripts: HashMap<SourceSelector, VecDeque<Option<SessionScript>>>,
    log: Arc<Mutex<ScriptLog>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful open of camera `index`.
    pub fn device(self, index: u32, script: SessionScript) -> Self {
        self.queue(SourceSelector::Device(index), Some(script))
    }

    /// Queue a failed open of camera `index`.
    pub fn device_fails(self, index: u32) -> Self {
        self.queue(SourceSelector::Device(index), None)
    }

    /// Queue a successful open of a file.
    pub fn file(self, path: impl Into<PathBuf>, script: SessionScript) -> Self {
        self.queue(SourceSelector::File(path.into()), Some(script))
    }

    fn queue(mut self, selector: SourceSelector, script: Option<SessionScript>) -> Self {
        self.scripts.entry(selector).or_default().push_back(script);
        self
    }

    /// Shared handle on the open/release log.
    pub fn log(&self) -> Arc<Mutex<ScriptLog>> {
        self.log.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self, selector: &SourceSelector) -> Result<Box<dyn CaptureSession>> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .opens
            .push(selector.clone());
        let script = self
            .scripts
            .get_mut(selector)
            .and_then(|queue| queue.pop_front())
            .flatten()
            .ok_or_else(|| anyhow!("scripted open of {} failed", selector))?;
        Ok(Box::new(ScriptedSession {
            name: selector.to_string(),
            script,
            log: self.log.clone(),
            released: false,
        }))
    }
}

struct ScriptedSession {
    name: String,
    script: SessionScript,
    log: Arc<Mutex<ScriptLog>>,
    released: bool,
}

impl CaptureSession for ScriptedSession {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        if self.released {
            return Ok(None);
        }
        let next = self.script.reads.pop_front().or_else(|| {
            self.script
                .endless
                .map(|(width, height)| ScriptedRead::Frame { width, height })
        });
        match next {
            Some(ScriptedRead::Frame { width, height }) => {
                Ok(Some(RgbImage::from_pixel(width, height, Rgb([90, 90, 90]))))
            }
            Some(ScriptedRead::Fail(reason)) => Err(anyhow!(reason)),
            Some(ScriptedRead::Empty) | None => Ok(None),
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .releases += 1;
        }
    }

    fn describe(&self) -> String {
        format!("scripted {}", self.name)
    }
}
