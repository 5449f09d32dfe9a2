//! varroa_watch - Bee + Varroa mite detector
//!
//! This daemon:
//! 1. Finds a USB camera (or falls back to the demo video)
//! 2. Runs the bee detector on every k-th captured frame
//! 3. Runs the mite detector on a padded crop around each bee
//! 4. Appends one telemetry record per processed frame
//! 5. Reconnects when the camera drops, unless --no-retry is given

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use varroa_watch::{
    open_backend, open_sink, BackendKind, BoxAnnotator, CameraAcquisition, CancellationToken,
    CascadePipeline, DisplaySink, FileSensor, HeadlessDisplay, Monitor, MonitorConfig,
    MonitorExit, NoSensor, ObjectClass, SamplingController, Sensor, SnapshotDisplay, SourceMode,
    SystemFrameSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Bee + Varroa mite detector for a hive entrance camera")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "VARROA_CONFIG")]
    config: Option<PathBuf>,

    /// Play the demo video instead of searching for a camera.
    #[arg(long)]
    demo: bool,

    /// Exit with an error instead of reconnecting when the camera is lost.
    #[arg(long)]
    no_retry: bool,

    /// Frame source selection.
    #[arg(long, value_enum)]
    source: Option<SourceMode>,

    /// Process every N-th captured frame.
    #[arg(long)]
    skip: Option<u64>,

    /// Confidence threshold for both detectors, in (0, 1].
    #[arg(long)]
    confidence: Option<f32>,

    /// Pixels of padding around each bee before the mite search.
    #[arg(long)]
    padding: Option<u32>,

    /// Detector backend.
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Stop after this many captured frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = MonitorConfig::load_with(args.config.as_deref())?;
    apply_args(&mut config, &args);
    config.validate()?;

    let cancel = CancellationToken::new();
    varroa_watch::shutdown::install_signal_handler(&cancel)?;
    varroa_watch::shutdown::spawn_quit_key_listener(&cancel)?;

    log::info!("Loading detection models...");
    let detection = &config.detection;
    let bee = open_backend(
        detection.backend,
        &detection.bee_model,
        ObjectClass::Bee,
        detection.model_input_size,
    )?;
    let mite = open_backend(
        detection.backend,
        &detection.mite_model,
        ObjectClass::Varroa,
        detection.model_input_size,
    )?;
    let annotator = match &config.display.label_font_path {
        Some(path) => BoxAnnotator::with_font_file(path)?,
        None => BoxAnnotator::new(),
    };
    let pipeline = CascadePipeline::new(bee, mite, config.cascade_settings())
        .with_annotator(Box::new(annotator));

    let source = SystemFrameSource {
        width: config.camera.width,
        height: config.camera.height,
    };
    let camera = CameraAcquisition::new(source, config.acquisition_settings());
    let sampler = SamplingController::new(config.detection.frame_skip_interval)?;
    let telemetry = open_sink(config.telemetry.format, &config.telemetry.path)?;

    let sensor: Box<dyn Sensor> = match &config.telemetry.sensor_path {
        Some(path) => {
            log::info!("Sensor readings from {}", path.display());
            Box::new(FileSensor::new(path))
        }
        None => Box::new(NoSensor),
    };
    let display: Box<dyn DisplaySink> = match &config.display.snapshot_path {
        Some(path) => {
            log::info!("Annotated frames written to {}", path.display());
            Box::new(SnapshotDisplay::new(path))
        }
        None => Box::new(HeadlessDisplay::new()),
    };

    let mut monitor = Monitor::new(camera, sampler, pipeline, telemetry, cancel)
        .with_sensor(sensor)
        .with_display(display)
        .with_frame_limit(args.max_frames);

    log::info!("Press Ctrl-C or enter 'q' to quit");
    match monitor.run()? {
        MonitorExit::CameraLost(reason) => {
            log::error!("camera lost, exiting: {}", reason);
            std::process::exit(1);
        }
        exit => {
            log::info!("varroa_watch finished: {:?}", exit);
            Ok(())
        }
    }
}

fn apply_args(config: &mut MonitorConfig, args: &Args) {
    if let Some(source) = args.source {
        config.camera.source_mode = source;
    }
    if args.demo {
        config.camera.source_mode = SourceMode::File;
    }
    if args.no_retry {
        config.camera.retry_on_camera_loss = false;
    }
    if let Some(skip) = args.skip {
        config.detection.frame_skip_interval = skip;
    }
    if let Some(confidence) = args.confidence {
        config.detection.confidence_threshold = confidence;
    }
    if let Some(padding) = args.padding {
        config.detection.crop_padding = padding;
    }
    if let Some(backend) = args.backend {
        config.detection.backend = backend;
    }
}
