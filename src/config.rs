use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{BackendKind, ViolationRule};
use crate::violation_log::DEFAULT_LOG_PATH;

const DEFAULT_SOURCE: &str = "stub://site_camera";
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_MAX_READ_FAILURES: u32 = 10;
const DEFAULT_FRAME_DELAY_MS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    log_path: Option<PathBuf>,
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    monitor: Option<MonitorConfigFile>,
    rule: Option<RuleConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    spec: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    max_read_failures: Option<u32>,
    frame_delay_ms: Option<u64>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RuleConfigFile {
    /// Substring marker, case-insensitive.
    marker: Option<String>,
    /// Exact violation labels; takes the place of the marker when set.
    labels: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub log_path: PathBuf,
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub monitor: MonitorSettings,
    pub violation_rule: ViolationRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    /// Source string, see `SourceSpec::parse`.
    pub spec: String,
    pub target_fps: u32,
    /// Requested capture size; synthetic sources render at exactly this size.
    pub width: u32,
    pub height: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            spec: DEFAULT_SOURCE.to_string(),
            target_fps: DEFAULT_TARGET_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub backend: BackendKind,
    pub model_path: Option<PathBuf>,
    /// Newline-separated class names; the bundled PPE table when unset.
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Stub,
            model_path: None,
            labels_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Consecutive read failures tolerated before the session ends.
    pub max_read_failures: u32,
    /// Pause after each processed frame.
    pub frame_delay: Duration,
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            max_read_failures: DEFAULT_MAX_READ_FAILURES,
            frame_delay: Duration::from_millis(DEFAULT_FRAME_DELAY_MS),
            max_frames: None,
        }
    }
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            source: SourceSettings::default(),
            detector: DetectorSettings::default(),
            monitor: MonitorSettings::default(),
            violation_rule: ViolationRule::default(),
        }
    }
}

impl SentinelConfig {
    /// Defaults, then `$SENTINEL_CONFIG` (JSON, or TOML by extension), then
    /// `SENTINEL_*` environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = non_empty_env("SENTINEL_CONFIG").map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with the config file path given explicitly.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => read_config_file(path)?,
            None => SentinelConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let monitor = file.monitor.unwrap_or_default();

        let backend = match detector.backend.as_deref() {
            Some(name) => name.parse()?,
            None => defaults.detector.backend,
        };
        let violation_rule = match file.rule {
            Some(rule) => rule_from_parts(rule.marker, rule.labels)?,
            None => defaults.violation_rule,
        };

        Ok(Self {
            log_path: file.log_path.unwrap_or(defaults.log_path),
            source: SourceSettings {
                spec: source.spec.unwrap_or(defaults.source.spec),
                target_fps: source.target_fps.unwrap_or(defaults.source.target_fps),
                width: source.width.unwrap_or(defaults.source.width),
                height: source.height.unwrap_or(defaults.source.height),
            },
            detector: DetectorSettings {
                backend,
                model_path: detector.model_path,
                labels_path: detector.labels_path,
                input_size: detector.input_size.unwrap_or(defaults.detector.input_size),
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(defaults.detector.confidence_threshold),
                iou_threshold: detector
                    .iou_threshold
                    .unwrap_or(defaults.detector.iou_threshold),
            },
            monitor: MonitorSettings {
                max_read_failures: monitor
                    .max_read_failures
                    .unwrap_or(defaults.monitor.max_read_failures),
                frame_delay: monitor
                    .frame_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.monitor.frame_delay),
                max_frames: monitor.max_frames,
            },
            violation_rule,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("SENTINEL_LOG_FILE") {
            self.log_path = PathBuf::from(path);
        }
        if let Some(spec) = non_empty_env("SENTINEL_SOURCE") {
            self.source.spec = spec;
        }
        if let Some(backend) = non_empty_env("SENTINEL_BACKEND") {
            self.detector.backend = backend.parse()?;
        }
        if let Some(path) = non_empty_env("SENTINEL_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env("SENTINEL_LABELS_PATH") {
            self.detector.labels_path = Some(PathBuf::from(path));
        }
        if let Some(failures) = non_empty_env("SENTINEL_MAX_READ_FAILURES") {
            self.monitor.max_read_failures = failures.trim().parse().map_err(|_| {
                anyhow!("SENTINEL_MAX_READ_FAILURES must be a non-negative integer")
            })?;
        }
        if let Some(delay) = non_empty_env("SENTINEL_FRAME_DELAY_MS") {
            let millis: u64 = delay.trim().parse().map_err(|_| {
                anyhow!("SENTINEL_FRAME_DELAY_MS must be an integer number of milliseconds")
            })?;
            self.monitor.frame_delay = Duration::from_millis(millis);
        }
        if let Some(labels) = non_empty_env("SENTINEL_VIOLATION_LABELS") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.violation_rule = ViolationRule::labels(parsed);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.log_path.as_os_str().is_empty() {
            return Err(anyhow!("log_path must not be empty"));
        }
        if self.source.spec.trim().is_empty() {
            return Err(anyhow!("source spec must not be empty"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        for (name, value) in [
            ("confidence_threshold", self.detector.confidence_threshold),
            ("iou_threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("detector {} must be within [0, 1], got {}", name, value));
            }
        }
        if self.monitor.max_frames == Some(0) {
            return Err(anyhow!("max_frames must be greater than zero when set"));
        }
        Ok(())
    }
}

fn rule_from_parts(marker: Option<String>, labels: Option<Vec<String>>) -> Result<ViolationRule> {
    match (marker, labels) {
        (Some(_), Some(_)) => Err(anyhow!(
            "rule.marker and rule.labels are mutually exclusive"
        )),
        (Some(marker), None) => {
            if marker.trim().is_empty() {
                return Err(anyhow!("rule.marker must not be empty"));
            }
            Ok(ViolationRule::substring(marker.trim()))
        }
        (None, Some(labels)) => {
            let labels: Vec<String> = labels
                .iter()
                .map(|label| label.trim())
                .filter(|label| !label.is_empty())
                .map(str::to_string)
                .collect();
            if labels.is_empty() {
                return Err(anyhow!("rule.labels must name at least one label"));
            }
            Ok(ViolationRule::labels(labels))
        }
        (None, None) => Ok(ViolationRule::default()),
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
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

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
