//! Varroa Watch
//!
//! Beehive entrance monitor: finds honeybees in camera frames, then searches
//! a padded crop around each bee for Varroa mites, annotates the frame and
//! logs one telemetry record per processed frame.
//!
//! # Architecture
//!
//! ```text
//! CameraAcquisition -> SamplingController -> CascadePipeline -> TelemetrySink -> DisplaySink
//!   (probe/reconnect)     (every k-th frame)   (bee -> crop -> mite -> remap)
//! ```
//!
//! The loop is single-threaded and blocking. [`monitor::Monitor`] owns every
//! stage; a [`shutdown::CancellationToken`] is the only cross-thread input.
//!
//! # Module Structure
//!
//! - `geometry`: boxes, padded crop regions, crop/frame coordinate remapping
//! - `frame`: captured frame buffers with sequence numbers
//! - `detect`: detector backend trait, YOLO post-processing, backends
//! - `ingest`: frame sources (V4L2 cameras, video files, stills, synthetic)
//! - `camera`: acquisition and reconnect state machine
//! - `pipeline` / `annotate`: the two-stage cascade and box drawing
//! - `sampling`: frame-skip decimation
//! - `sensor` / `telemetry`: environmental readings and per-frame records
//! - `display`: headless and snapshot sinks
//! - `monitor` / `shutdown`: the loop and cooperative cancellation
//! - `config`: file + environment configuration

pub mod annotate;
pub mod camera;
pub mod config;
pub mod detect;
pub mod display;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod monitor;
pub mod pipeline;
pub mod sampling;
pub mod sensor;
pub mod shutdown;
pub mod telemetry;

pub use annotate::{Annotation, Annotator, BoxAnnotator};
pub use camera::{
    probe_device, AcquisitionSettings, Backoff, CameraAcquisition, CameraState, ProbeOutcome,
    SleepBackoff, SourceKind, SourceMode,
};
pub use config::MonitorConfig;
pub use detect::{
    open_backend, BackendKind, Detection, DetectionSet, DetectorBackend, ObjectClass, StubBackend,
};
pub use display::{DisplayControl, DisplaySink, HeadlessDisplay, SnapshotDisplay};
pub use frame::Frame;
pub use geometry::{crop_region, BoundingBox, CropRegion, PixelBox};
pub use ingest::{CaptureSession, FrameSource, SourceSelector, SystemFrameSource};
pub use monitor::{Monitor, MonitorExit, MonitorStats};
pub use pipeline::{CascadeOutcome, CascadePipeline, CascadeSettings, RemappedMite};
pub use sampling::SamplingController;
pub use sensor::{FileSensor, NoSensor, Sensor, SensorReading};
pub use shutdown::CancellationToken;
pub use telemetry::{
    open_sink, CsvTelemetrySink, FrameRecord, InMemoryTelemetrySink, SqliteTelemetrySink,
    TelemetryFormat, TelemetrySink,
};
