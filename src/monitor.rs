//! The monitor loop: capture, sample, cascade, log, display.
//!
//! [`Monitor`] owns every stage for the lifetime of a run. The loop is
//! single-threaded; the only outside input is the cancellation token, checked
//! at the top of each iteration. Teardown runs on every exit path.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::camera::CameraAcquisition;
use crate::display::{DisplayControl, DisplaySink, HeadlessDisplay};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::pipeline::CascadePipeline;
use crate::sampling::SamplingController;
use crate::sensor::{NoSensor, Sensor, SensorReading};
use crate::shutdown::CancellationToken;
use crate::telemetry::{FrameRecord, TelemetrySink};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Why the loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorExit {
    /// Interrupt signal or quit key.
    Cancelled,
    /// The display sink asked to stop.
    OperatorQuit,
    /// No usable source and retries are off. Callers should exit non-zero.
    CameraLost(String),
    /// The configured number of captured frames was reached.
    FrameLimit,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub frames_captured: u64,
    pub frames_processed: u64,
    pub records_written: u64,
    pub reconnect_attempts: u64,
    pub mites_seen: u64,
}

pub struct Monitor<S: FrameSource> {
    camera: CameraAcquisition<S>,
    sampler: SamplingController,
    pipeline: CascadePipeline,
    sensor: Box<dyn Sensor>,
    telemetry: Box<dyn TelemetrySink>,
    display: Box<dyn DisplaySink>,
    cancel: CancellationToken,
    frame_limit: Option<u64>,
    records_written: u64,
    mites_seen: u64,
    last_health_log: Instant,
}

impl<S: FrameSource> Monitor<S> {
    pub fn new(
        camera: CameraAcquisition<S>,
        sampler: SamplingController,
        pipeline: CascadePipeline,
        telemetry: Box<dyn TelemetrySink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            camera,
            sampler,
            pipeline,
            sensor: Box::new(NoSensor),
            telemetry,
            display: Box::new(HeadlessDisplay::new()),
            cancel,
            frame_limit: None,
            records_written: 0,
            mites_seen: 0,
            last_health_log: Instant::now(),
        }
    }

    pub fn with_sensor(mut self, sensor: Box<dyn Sensor>) -> Self {
        self.sensor = sensor;
        self
    }

    pub fn with_display(mut self, display: Box<dyn DisplaySink>) -> Self {
        self.display = display;
        self
    }

    /// Stop after this many captured frames.
    pub fn with_frame_limit(mut self, limit: Option<u64>) -> Self {
        self.frame_limit = limit;
        self
    }

    pub fn camera(&self) -> &CameraAcquisition<S> {
        &self.camera
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            frames_captured: self.camera.frames_captured(),
            frames_processed: self.sampler.frames_processed(),
            records_written: self.records_written,
            reconnect_attempts: self.camera.reconnect_attempts(),
            mites_seen: self.mites_seen,
        }
    }

    /// Run until cancelled, quit, out of frames, or the camera is lost for
    /// good. Errors are only returned for failures outside the camera, such
    /// as an unwritable telemetry log.
    pub fn run(&mut self) -> Result<MonitorExit> {
        let outcome = self.start_and_loop();
        let teardown = self.teardown();
        let exit = outcome?;
        teardown?;
        log::info!("Monitor stopped: {:?} ({:?})", exit, self.stats());
        Ok(exit)
    }

    fn start_and_loop(&mut self) -> Result<MonitorExit> {
        log::info!("Searching for USB camera...");
        if let Err(err) = self.camera.start() {
            log::error!("{:#}", err);
            return Ok(MonitorExit::CameraLost(format!("{:#}", err)));
        }
        log::info!(
            "Detection started from source [{}] (skip={}, confidence={}, padding={})",
            self.source_title(),
            self.sampler.skip_interval(),
            self.pipeline.settings().confidence_threshold,
            self.pipeline.settings().crop_padding
        );

        loop {
            if self.cancel.is_cancelled() {
                return Ok(MonitorExit::Cancelled);
            }
            if let Some(limit) = self.frame_limit {
                if self.sampler.frames_seen() >= limit {
                    return Ok(MonitorExit::FrameLimit);
                }
            }

            let frame = match self.camera.read(&self.cancel) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.log_health();
                    continue;
                }
                Err(err) => {
                    log::error!("{:#}", err);
                    return Ok(MonitorExit::CameraLost(format!("{:#}", err)));
                }
            };

            if self.sampler.admit() && self.process_frame(frame)? == DisplayControl::Quit {
                log::info!("Exiting.");
                return Ok(MonitorExit::OperatorQuit);
            }
            self.log_health();
        }
    }

    fn process_frame(&mut self, mut frame: Frame) -> Result<DisplayControl> {
        let outcome = match self.pipeline.process(&mut frame) {
            Ok(outcome) => outcome,
            Err(err) => {
                log::error!("frame {} skipped: {:#}", frame.seq, err);
                return Ok(DisplayControl::Continue);
            }
        };

        let reading = match self.sensor.read() {
            Ok(reading) => reading,
            Err(err) => {
                log::warn!("sensor unavailable: {:#}", err);
                SensorReading::unavailable()
            }
        };
        let record = FrameRecord::now(reading, outcome.bee_count(), outcome.mite_count());
        self.telemetry
            .append(&record)
            .with_context(|| format!("log frame {} to {}", frame.seq, self.telemetry.describe()))?;
        self.records_written += 1;
        self.mites_seen += outcome.mite_count() as u64;

        if outcome.bee_count() == 0 {
            log::info!("No bee detected in frame {}", frame.seq);
        } else {
            log::info!(
                "Frame {}: {} bees, {} mites",
                frame.seq,
                outcome.bee_count(),
                outcome.mite_count()
            );
        }

        log::debug!("frame {} logged {:.1} ms after capture", frame.seq, frame.age_ms());

        let title = self.source_title();
        match self.display.present(&frame, &title) {
            Ok(control) => Ok(control),
            Err(err) => {
                log::warn!("display failed for frame {}: {:#}", frame.seq, err);
                Ok(DisplayControl::Continue)
            }
        }
    }

    fn teardown(&mut self) -> Result<()> {
        self.camera.shutdown();
        let flushed = self.telemetry.flush();
        let closed = self.display.teardown();
        flushed.context("flush telemetry")?;
        closed.context("close display")
    }

    fn source_title(&self) -> String {
        self.camera
            .source_kind()
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "NO SOURCE".to_string())
    }

    fn log_health(&mut self) {
        if self.last_health_log.elapsed() < HEALTH_LOG_INTERVAL {
            return;
        }
        let stats = self.stats();
        log::info!(
            "health source={} state={:?} captured={} processed={} reconnects={} mites={}",
            self.source_title(),
            self.camera.state(),
            stats.frames_captured,
            stats.frames_processed,
            stats.reconnect_attempts,
            stats.mites_seen
        );
        self.last_health_log = Instant::now();
    }
}
