use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{DetectionSet, ObjectClass};

/// Stub backend for dry runs and tests.
///
/// Returns the same canned detections for every image (empty by default), or
/// fails every call when built with [`StubBackend::failing`]. The sizes of
/// the images it was handed are recorded in a shared [`StubProbe`] so they
/// stay observable after the backend is boxed.
pub struct StubBackend {
    class: ObjectClass,
    canned: DetectionSet,
    failure: Option<String>,
    probe: StubProbe,
}

/// Shared view of the calls a [`StubBackend`] received.
#[derive(Clone, Debug, Default)]
pub struct StubProbe {
    seen: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl StubProbe {
    /// Number of `detect` calls so far.
    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Dimensions of every image passed to `detect`, in call order.
    pub fn image_sizes(&self) -> Vec<(u32, u32)> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, image: &RgbImage) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(image.dimensions());
    }
}

impl StubBackend {
    pub fn new(class: ObjectClass) -> Self {
        Self {
            class,
            canned: DetectionSet::empty(),
            failure: None,
            probe: StubProbe::default(),
        }
    }

    pub fn with_detections(mut self, canned: DetectionSet) -> Self {
        self.canned = canned;
        self
    }

    /// Every `detect` call fails with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn probe(&self) -> StubProbe {
        self.probe.clone()
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> usize {
        self.probe.calls()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class(&self) -> ObjectClass {
        self.class
    }

    fn detect(&mut self, image: &RgbImage) -> Result<DetectionSet> {
        self.probe.record(image);
        match &self.failure {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(self.canned.clone()),
        }
    }
}
