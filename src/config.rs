use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::alerts::DEFAULT_ALERT_CAPACITY;
use crate::analytics::DEFAULT_HISTORY_CAPACITY;
use crate::frame::DEFAULT_JPEG_QUALITY;

const DEFAULT_API_BASE: &str = "http://localhost:8000";
const DEFAULT_CAPTURE_FPS: u32 = 5;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_MAX_PEOPLE: u32 = 10;
const MAX_PEOPLE_LIMIT: u32 = 1000;

/// Detection settings that are pushed to the service and attached to frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub confidence: f32,
    pub max_people: u32,
    pub alert_enabled: bool,
    pub show_boxes: bool,
    pub realtime_mode: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            max_people: DEFAULT_MAX_PEOPLE,
            alert_enabled: true,
            show_boxes: true,
            realtime_mode: true,
        }
    }
}

impl DetectionConfig {
    /// Clamp values into the ranges the input controls allow.
    pub fn clamped(mut self) -> Self {
        self.confidence = if self.confidence.is_nan() {
            DEFAULT_CONFIDENCE
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        self.max_people = self.max_people.clamp(1, MAX_PEOPLE_LIMIT);
        self
    }
}

#[derive(Debug, Deserialize, Default)]
struct DashboardConfigFile {
    api_base: Option<String>,
    dev_mode: Option<bool>,
    detection: Option<DetectionConfigFile>,
    capture: Option<CaptureConfigFile>,
    overlay: Option<OverlayConfigFile>,
    limits: Option<LimitsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence: Option<f32>,
    max_people: Option<u32>,
    alert_enabled: Option<bool>,
    show_boxes: Option<bool>,
    realtime_mode: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    fps: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct LimitsConfigFile {
    alert_capacity: Option<usize>,
    history_capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardConfig {
    pub api_base: String,
    pub dev_mode: bool,
    pub detection: DetectionConfig,
    pub capture: CaptureSettings,
    pub font_path: Option<PathBuf>,
    pub alert_capacity: usize,
    pub history_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureSettings {
    pub fps: u32,
    pub jpeg_quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            fps: DEFAULT_CAPTURE_FPS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            dev_mode: false,
            detection: DetectionConfig::default(),
            capture: CaptureSettings::default(),
            font_path: None,
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl DashboardConfig {
    /// Defaults, then the file named by `CROWDWATCH_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CROWDWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DashboardConfigFile) -> Self {
        let defaults = Self::default();
        let detection_file = file.detection.unwrap_or_default();
        let detection_defaults = DetectionConfig::default();
        let detection = DetectionConfig {
            confidence: detection_file
                .confidence
                .unwrap_or(detection_defaults.confidence),
            max_people: detection_file
                .max_people
                .unwrap_or(detection_defaults.max_people),
            alert_enabled: detection_file
                .alert_enabled
                .unwrap_or(detection_defaults.alert_enabled),
            show_boxes: detection_file
                .show_boxes
                .unwrap_or(detection_defaults.show_boxes),
            realtime_mode: detection_file
                .realtime_mode
                .unwrap_or(detection_defaults.realtime_mode),
        };
        let capture = CaptureSettings {
            fps: file
                .capture
                .as_ref()
                .and_then(|capture| capture.fps)
                .unwrap_or(defaults.capture.fps),
            jpeg_quality: file
                .capture
                .as_ref()
                .and_then(|capture| capture.jpeg_quality)
                .unwrap_or(defaults.capture.jpeg_quality),
        };
        Self {
            api_base: file.api_base.unwrap_or(defaults.api_base),
            dev_mode: file.dev_mode.unwrap_or(defaults.dev_mode),
            detection,
            capture,
            font_path: file.overlay.and_then(|overlay| overlay.font_path),
            alert_capacity: file
                .limits
                .as_ref()
                .and_then(|limits| limits.alert_capacity)
                .unwrap_or(defaults.alert_capacity),
            history_capacity: file
                .limits
                .as_ref()
                .and_then(|limits| limits.history_capacity)
                .unwrap_or(defaults.history_capacity),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(base) = std::env::var("CROWDWATCH_API_BASE") {
            if !base.trim().is_empty() {
                self.api_base = base.trim().to_string();
            }
        }
        if let Ok(value) = std::env::var("CROWDWATCH_CONFIDENCE") {
            self.detection.confidence = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("CROWDWATCH_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Ok(value) = std::env::var("CROWDWATCH_MAX_PEOPLE") {
            self.detection.max_people = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("CROWDWATCH_MAX_PEOPLE must be a positive integer"))?;
        }
        if let Ok(value) = std::env::var("CROWDWATCH_CAPTURE_FPS") {
            self.capture.fps = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("CROWDWATCH_CAPTURE_FPS must be a positive integer"))?;
        }
        if let Ok(path) = std::env::var("CROWDWATCH_FONT_PATH") {
            if !path.trim().is_empty() {
                self.font_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(value) = std::env::var("CROWDWATCH_DEV_MODE") {
            self.dev_mode = parse_flag(&value)
                .ok_or_else(|| anyhow!("CROWDWATCH_DEV_MODE must be true/false"))?;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        let url = Url::parse(&self.api_base)
            .map_err(|e| anyhow!("invalid api base '{}': {}", self.api_base, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "api base must use http or https, got '{}'",
                url.scheme()
            ));
        }
        self.api_base = self.api_base.trim_end_matches('/').to_string();
        if self.capture.fps == 0 {
            return Err(anyhow!("capture fps must be greater than zero"));
        }
        if self.alert_capacity == 0 || self.history_capacity == 0 {
            return Err(anyhow!("alert and history capacities must be greater than zero"));
        }
        self.detection = self.detection.clone().clamped();
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DashboardConfigFile> {
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

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_detection_ranges() {
        let cfg = DetectionConfig {
            confidence: 1.7,
            max_people: 0,
            ..DetectionConfig::default()
        }
        .clamped();
        assert_eq!(cfg.confidence, 1.0);
        assert_eq!(cfg.max_people, 1);

        let cfg = DetectionConfig {
            confidence: f32::NAN,
            max_people: 50_000,
            ..DetectionConfig::default()
        }
        .clamped();
        assert_eq!(cfg.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(cfg.max_people, MAX_PEOPLE_LIMIT);
    }

    #[test]
    fn validate_rejects_bad_base_and_trims_slash() {
        let mut cfg = DashboardConfig {
            api_base: "http://example.com:8000/".to_string(),
            ..DashboardConfig::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.api_base, "http://example.com:8000");

        let mut cfg = DashboardConfig {
            api_base: "ws://example.com".to_string(),
            ..DashboardConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn flags_parse() {
        assert_eq!(parse_flag("On"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
