//! Camera acquisition and reconnect state machine.
//!
//! ```text
//! Searching -> Open -> Reading -> Reconnecting -> Searching ...
//!                         \-> Closed (retries disabled, or shutdown)
//! ```
//!
//! Probing walks camera indices upward and takes the first device that both
//! opens and yields a frame. A lost camera is released before any reconnect
//! attempt, and every attempt waits a fixed delay first. At most one session
//! is held at a time.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::frame::Frame;
use crate::ingest::{device_path, CaptureSession, FrameSource, SourceSelector};
use crate::shutdown::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraState {
    Searching,
    Open,
    Reading,
    Reconnecting,
    Closed,
}

/// Where frames should come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// USB cameras only.
    Camera,
    /// The demo file only.
    File,
    /// Cameras first, demo file when none is found.
    Auto,
}

/// The source currently feeding the monitor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Camera { index: u32 },
    Demo { path: PathBuf },
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Camera { index } => write!(f, "USB CAMERA {}", device_path(*index)),
            SourceKind::Demo { path } => write!(f, "DEMO {}", path.display()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AcquisitionSettings {
    pub source_mode: SourceMode,
    /// Indices `0..max_camera_index` are probed.
    pub max_camera_index: u32,
    pub retry_on_camera_loss: bool,
    pub reconnect_delay: Duration,
    pub demo_path: PathBuf,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            source_mode: SourceMode::Auto,
            max_camera_index: 10,
            retry_on_camera_loss: true,
            reconnect_delay: Duration::from_secs(3),
            demo_path: PathBuf::from("demo.mp4"),
        }
    }
}

/// Wait performed before each reconnect attempt.
pub trait Backoff {
    /// Returns `true` if the wait was cut short by cancellation.
    fn wait(&mut self, delay: Duration, cancel: &CancellationToken) -> bool;
}

/// Real-time backoff that sleeps until the delay passes or shutdown starts.
#[derive(Clone, Copy, Debug, Default)]
pub struct SleepBackoff;

impl Backoff for SleepBackoff {
    fn wait(&mut self, delay: Duration, cancel: &CancellationToken) -> bool {
        cancel.sleep(delay)
    }
}

/// Result of probing a single camera index.
pub enum ProbeOutcome {
    /// Opened and produced a first frame.
    Ready(Box<dyn CaptureSession>),
    /// Opened but the first read failed; the session was released.
    NoFrame(String),
    OpenFailed(String),
}

/// Open camera `index` and confirm it produces a frame. The probe frame is
/// discarded.
pub fn probe_device<S: FrameSource + ?Sized>(source: &mut S, index: u32) -> ProbeOutcome {
    let mut session = match source.open(&SourceSelector::Device(index)) {
        Ok(session) => session,
        Err(err) => return ProbeOutcome::OpenFailed(format!("{:#}", err)),
    };
    match session.read() {
        Ok(Some(_)) => ProbeOutcome::Ready(session),
        Ok(None) => {
            session.release();
            ProbeOutcome::NoFrame("no frame returned".to_string())
        }
        Err(err) => {
            session.release();
            ProbeOutcome::NoFrame(format!("{:#}", err))
        }
    }
}

pub struct CameraAcquisition<S: FrameSource> {
    source: S,
    settings: AcquisitionSettings,
    backoff: Box<dyn Backoff>,
    state: CameraState,
    session: Option<Box<dyn CaptureSession>>,
    kind: Option<SourceKind>,
    frames_captured: u64,
    reconnect_attempts: u64,
}

impl<S: FrameSource> CameraAcquisition<S> {
    pub fn new(source: S, settings: AcquisitionSettings) -> Self {
        Self {
            source,
            settings,
            backoff: Box::new(SleepBackoff),
            state: CameraState::Searching,
            session: None,
            kind: None,
            frames_captured: 0,
            reconnect_attempts: 0,
        }
    }

    pub fn with_backoff(mut self, backoff: Box<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn source_kind(&self) -> Option<&SourceKind> {
        self.kind.as_ref()
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts
    }

    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    /// Find the initial source.
    ///
    /// Without a camera, `Auto` falls back to the demo file, `Camera` waits
    /// in `Reconnecting` when retries are on, and fails otherwise.
    pub fn start(&mut self) -> Result<()> {
        self.state = CameraState::Searching;
        if self.settings.source_mode == SourceMode::File {
            return self.open_demo();
        }

        if let Some((index, session)) = self.search() {
            self.adopt(session, SourceKind::Camera { index });
            return Ok(());
        }

        match self.settings.source_mode {
            SourceMode::Auto => {
                log::warn!("No USB camera detected. Switching to DEMO mode.");
                self.open_demo()
            }
            _ if self.settings.retry_on_camera_loss => {
                log::warn!(
                    "No USB camera detected; retrying every {}s",
                    self.settings.reconnect_delay.as_secs()
                );
                self.state = CameraState::Reconnecting;
                Ok(())
            }
            _ => {
                self.state = CameraState::Closed;
                Err(anyhow!(
                    "no USB camera found on {}..{}",
                    device_path(0),
                    device_path(self.settings.max_camera_index.saturating_sub(1))
                ))
            }
        }
    }

    /// Next frame, or `Ok(None)` when nothing was captured this iteration
    /// (reconnecting, or closed after shutdown). With retries disabled a
    /// lost source is an error and the state becomes `Closed`.
    pub fn read(&mut self, cancel: &CancellationToken) -> Result<Option<Frame>> {
        match self.state {
            CameraState::Closed => Ok(None),
            CameraState::Searching | CameraState::Reconnecting => {
                self.reconnect(cancel);
                Ok(None)
            }
            CameraState::Open | CameraState::Reading => {
                let outcome = match self.session.as_mut() {
                    Some(session) => session.read(),
                    None => Ok(None),
                };
                match outcome {
                    Ok(Some(image)) => {
                        self.state = CameraState::Reading;
                        self.frames_captured += 1;
                        Ok(Some(Frame::new(image, self.frames_captured)))
                    }
                    Ok(None) => self.lost("no frame returned".to_string()),
                    Err(err) => self.lost(format!("{:#}", err)),
                }
            }
        }
    }

    /// Release the current session. Idempotent.
    pub fn shutdown(&mut self) {
        self.release_session();
        self.state = CameraState::Closed;
    }

    fn lost(&mut self, reason: String) -> Result<Option<Frame>> {
        let name = self
            .kind
            .as_ref()
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "frame source".to_string());
        log::warn!("Lost {}: {}", name, reason);
        self.release_session();

        if !self.settings.retry_on_camera_loss {
            self.state = CameraState::Closed;
            return Err(anyhow!("{} lost ({}) and retries are disabled", name, reason));
        }
        self.state = CameraState::Reconnecting;
        Ok(None)
    }

    fn reconnect(&mut self, cancel: &CancellationToken) {
        if self.backoff.wait(self.settings.reconnect_delay, cancel) {
            return;
        }
        self.reconnect_attempts += 1;
        log::info!("Reconnect attempt {}", self.reconnect_attempts);
        self.state = CameraState::Searching;

        if let Some(SourceKind::Demo { .. }) = self.kind {
            if let Err(err) = self.open_demo() {
                log::warn!("{:#}", err);
                self.state = CameraState::Reconnecting;
            }
            return;
        }

        match self.search() {
            Some((index, session)) => self.adopt(session, SourceKind::Camera { index }),
            None => {
                log::warn!(
                    "No USB camera found; retrying in {}s",
                    self.settings.reconnect_delay.as_secs()
                );
                self.state = CameraState::Reconnecting;
            }
        }
    }

    fn search(&mut self) -> Option<(u32, Box<dyn CaptureSession>)> {
        for index in 0..self.settings.max_camera_index {
            match probe_device(&mut self.source, index) {
                ProbeOutcome::Ready(session) => return Some((index, session)),
                ProbeOutcome::NoFrame(reason) => {
                    log::debug!("{} opened but unusable: {}", device_path(index), reason)
                }
                ProbeOutcome::OpenFailed(reason) => {
                    log::debug!("{} unavailable: {}", device_path(index), reason)
                }
            }
        }
        None
    }

    fn open_demo(&mut self) -> Result<()> {
        let path = self.settings.demo_path.clone();
        match self.source.open(&SourceSelector::File(path.clone())) {
            Ok(session) => {
                self.adopt(session, SourceKind::Demo { path });
                Ok(())
            }
            Err(err) => {
                self.state = CameraState::Closed;
                Err(err).with_context(|| format!("failed to open demo video {}", path.display()))
            }
        }
    }

    fn adopt(&mut self, session: Box<dyn CaptureSession>, kind: SourceKind) {
        self.release_session();
        log::info!("Using {} ({})", kind, session.describe());
        self.session = Some(session);
        self.kind = Some(kind);
        self.state = CameraState::Open;
    }

    fn release_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            log::info!("Releasing {}", session.describe());
            session.release();
        }
    }
}

impl<S: FrameSource> Drop for CameraAcquisition<S> {
    fn drop(&mut self) {
        self.release_session();
    }
}
