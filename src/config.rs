use anyhow::{anyhow, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::{AcquisitionSettings, SourceMode};
use crate::detect::BackendKind;
use crate::pipeline::CascadeSettings;
use crate::telemetry::TelemetryFormat;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_CROP_PADDING: u32 = 150;
const DEFAULT_FRAME_SKIP: u64 = 25;
const DEFAULT_MAX_CAMERA_INDEX: u32 = 10;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 3;
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_DEMO_PATH: &str = "Videos/demo.mp4";
const DEFAULT_BEE_MODEL: &str = "Models/bee.onnx";
const DEFAULT_MITE_MODEL: &str = "Models/varroa.onnx";
const DEFAULT_MODEL_INPUT_SIZE: u32 = 640;
const DEFAULT_TELEMETRY_PATH: &str = "varroa_log.csv";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MonitorConfigFile {
    detection: Option<DetectionConfigFile>,
    camera: Option<CameraConfigFile>,
    telemetry: Option<TelemetryConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    crop_padding: Option<u32>,
    frame_skip_interval: Option<u64>,
    backend: Option<BackendKind>,
    bee_model: Option<PathBuf>,
    mite_model: Option<PathBuf>,
    model_input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    source_mode: Option<SourceMode>,
    max_camera_index: Option<u32>,
    retry_on_camera_loss: Option<bool>,
    reconnect_delay_secs: Option<u64>,
    demo_path: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TelemetryConfigFile {
    path: Option<PathBuf>,
    format: Option<TelemetryFormat>,
    sensor_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DisplayConfigFile {
    snapshot_path: Option<PathBuf>,
    label_font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub detection: DetectionSettings,
    pub camera: CameraSettings,
    pub telemetry: TelemetrySettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub crop_padding: u32,
    pub frame_skip_interval: u64,
    pub backend: BackendKind,
    pub bee_model: PathBuf,
    pub mite_model: PathBuf,
    pub model_input_size: u32,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub source_mode: SourceMode,
    pub max_camera_index: u32,
    pub retry_on_camera_loss: bool,
    pub reconnect_delay: Duration,
    pub demo_path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub path: PathBuf,
    pub format: TelemetryFormat,
    pub sensor_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct DisplaySettings {
    pub snapshot_path: Option<PathBuf>,
    pub label_font_path: Option<PathBuf>,
}

impl MonitorConfig {
    /// Defaults, then the file named by `VARROA_CONFIG`, then `VARROA_*`
    /// environment overrides. The result is validated.
    pub fn load() -> Result<Self> {
        let cfg = Self::load_with(None)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`MonitorConfig::load`], but an explicit `config_path` wins over
    /// `VARROA_CONFIG` and ranges are not checked, so callers can layer
    /// further overrides before calling [`MonitorConfig::validate`].
    pub fn load_with(config_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("VARROA_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match config_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let detection = file.detection.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let telemetry = file.telemetry.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        Self {
            detection: DetectionSettings {
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                crop_padding: detection.crop_padding.unwrap_or(DEFAULT_CROP_PADDING),
                frame_skip_interval: detection.frame_skip_interval.unwrap_or(DEFAULT_FRAME_SKIP),
                backend: detection.backend.unwrap_or(BackendKind::Tract),
                bee_model: detection
                    .bee_model
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_BEE_MODEL)),
                mite_model: detection
                    .mite_model
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MITE_MODEL)),
                model_input_size: detection
                    .model_input_size
                    .unwrap_or(DEFAULT_MODEL_INPUT_SIZE),
            },
            camera: CameraSettings {
                source_mode: camera.source_mode.unwrap_or(SourceMode::Auto),
                max_camera_index: camera.max_camera_index.unwrap_or(DEFAULT_MAX_CAMERA_INDEX),
                retry_on_camera_loss: camera.retry_on_camera_loss.unwrap_or(true),
                reconnect_delay: Duration::from_secs(
                    camera
                        .reconnect_delay_secs
                        .unwrap_or(DEFAULT_RECONNECT_DELAY_SECS),
                ),
                demo_path: camera
                    .demo_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DEMO_PATH)),
                width: camera.width.unwrap_or(DEFAULT_CAPTURE_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAPTURE_HEIGHT),
            },
            telemetry: TelemetrySettings {
                path: telemetry
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_TELEMETRY_PATH)),
                format: telemetry.format.unwrap_or(TelemetryFormat::Csv),
                sensor_path: telemetry.sensor_path,
            },
            display: DisplaySettings {
                snapshot_path: display.snapshot_path,
                label_font_path: display.label_font_path,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_value("VARROA_CONFIDENCE_THRESHOLD") {
            self.detection.confidence_threshold = value
                .parse()
                .map_err(|_| anyhow!("VARROA_CONFIDENCE_THRESHOLD must be a number"))?;
        }
        if let Some(value) = env_value("VARROA_CROP_PADDING") {
            self.detection.crop_padding = value
                .parse()
                .map_err(|_| anyhow!("VARROA_CROP_PADDING must be a non-negative integer"))?;
        }
        if let Some(value) = env_value("VARROA_FRAME_SKIP") {
            self.detection.frame_skip_interval = value
                .parse()
                .map_err(|_| anyhow!("VARROA_FRAME_SKIP must be a positive integer"))?;
        }
        if let Some(value) = env_value("VARROA_DETECTOR_BACKEND") {
            self.detection.backend = parse_value_enum("VARROA_DETECTOR_BACKEND", &value)?;
        }
        if let Some(value) = env_value("VARROA_BEE_MODEL") {
            self.detection.bee_model = PathBuf::from(value);
        }
        if let Some(value) = env_value("VARROA_MITE_MODEL") {
            self.detection.mite_model = PathBuf::from(value);
        }
        if let Some(value) = env_value("VARROA_SOURCE_MODE") {
            self.camera.source_mode = parse_value_enum("VARROA_SOURCE_MODE", &value)?;
        }
        if let Some(value) = env_value("VARROA_RETRY_ON_CAMERA_LOSS") {
            self.camera.retry_on_camera_loss = parse_bool(&value)
                .ok_or_else(|| anyhow!("VARROA_RETRY_ON_CAMERA_LOSS must be true or false"))?;
        }
        if let Some(value) = env_value("VARROA_RECONNECT_DELAY_SECS") {
            let seconds: u64 = value.parse().map_err(|_| {
                anyhow!("VARROA_RECONNECT_DELAY_SECS must be an integer number of seconds")
            })?;
            self.camera.reconnect_delay = Duration::from_secs(seconds);
        }
        if let Some(value) = env_value("VARROA_DEMO_PATH") {
            self.camera.demo_path = PathBuf::from(value);
        }
        if let Some(value) = env_value("VARROA_TELEMETRY_PATH") {
            self.telemetry.path = PathBuf::from(value);
        }
        if let Some(value) = env_value("VARROA_TELEMETRY_FORMAT") {
            self.telemetry.format = parse_value_enum("VARROA_TELEMETRY_FORMAT", &value)?;
        }
        if let Some(value) = env_value("VARROA_SENSOR_PATH") {
            self.telemetry.sensor_path = Some(PathBuf::from(value));
        }
        if let Some(value) = env_value("VARROA_SNAPSHOT_PATH") {
            self.display.snapshot_path = Some(PathBuf::from(value));
        }
        if let Some(value) = env_value("VARROA_LABEL_FONT") {
            self.display.label_font_path = Some(PathBuf::from(value));
        }
        Ok(())
    }

    /// Check ranges. Also used after CLI overrides are applied.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.detection.confidence_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(anyhow!(
                "confidence_threshold must be in (0, 1], got {}",
                threshold
            ));
        }
        if self.detection.frame_skip_interval == 0 {
            return Err(anyhow!("frame_skip_interval must be at least 1"));
        }
        if self.detection.model_input_size == 0 {
            return Err(anyhow!("model_input_size must be greater than zero"));
        }
        if self.camera.max_camera_index == 0 {
            return Err(anyhow!("max_camera_index must be at least 1"));
        }
        if self.camera.reconnect_delay.is_zero() {
            return Err(anyhow!("reconnect delay must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("capture size must be non-zero"));
        }
        Ok(())
    }

    pub fn acquisition_settings(&self) -> AcquisitionSettings {
        AcquisitionSettings {
            source_mode: self.camera.source_mode,
            max_camera_index: self.camera.max_camera_index,
            retry_on_camera_loss: self.camera.retry_on_camera_loss,
            reconnect_delay: self.camera.reconnect_delay,
            demo_path: self.camera.demo_path.clone(),
        }
    }

    pub fn cascade_settings(&self) -> CascadeSettings {
        CascadeSettings {
            confidence_threshold: self.detection.confidence_threshold,
            crop_padding: self.detection.crop_padding,
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Accepts the same names as the matching command-line flag.
fn parse_value_enum<T: ValueEnum>(key: &str, value: &str) -> Result<T> {
    <T as ValueEnum>::from_str(value.trim(), true).map_err(|err| anyhow!("{}: {}", key, err))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
