use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    pub replay: Option<ReplayConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Two requests in flight keep an inference accelerator busy without queueing.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Maximum number of detector invocations in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Emit the throughput report to the event sink on every reset.
    #[serde(default = "default_report_throughput")]
    pub report_throughput: bool,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotionConfig {
    /// Minimum IoU between consecutive document boxes for a frame to count as stable.
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    /// Consecutive stable frames required before motion blur is cleared.
    #[serde(default = "default_min_stable_frames")]
    pub min_stable_frames: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    pub frames_dir: PathBuf,
    pub detections_path: PathBuf,
    #[serde(default = "default_replay_fps")]
    pub fps: f64,
    /// Artificial classifier latency, to emulate model inference time.
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default = "default_document_type")]
    pub document_type: String,
    #[serde(default = "default_document_side")]
    pub document_side: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            report_throughput: default_report_throughput(),
            report_interval_secs: default_report_interval(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            iou_threshold: default_iou_threshold(),
            min_stable_frames: default_min_stable_frames(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.scanner.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "scanner.max_concurrent must be at least 1".into(),
            ));
        }
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}
fn default_report_throughput() -> bool {
    true
}
fn default_report_interval() -> u64 {
    10
}
fn default_iou_threshold() -> f32 {
    0.95
}
fn default_min_stable_frames() -> u32 {
    5
}
fn default_replay_fps() -> f64 {
    15.0
}
fn default_document_type() -> String {
    "id_card".into()
}
fn default_document_side() -> String {
    "front".into()
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.scanner.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert!(config.stats.report_throughput);
        assert_eq!(config.motion.min_stable_frames, 5);
        assert!(config.replay.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn replay_section_defaults() {
        let config = Config::parse(
            r#"
            [replay]
            frames_dir = "/data/session-01/frames"
            detections_path = "/data/session-01/detections.jsonl"
            "#,
        )
        .unwrap();
        let replay = config.replay.unwrap();
        assert_eq!(replay.fps, 15.0);
        assert_eq!(replay.latency_ms, 0);
        assert_eq!(replay.document_side, "front");
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = Config::parse("[scanner]\nmax_concurrent = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = Config::parse("[scanner\nmax_concurrent = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scanner]\nmax_concurrent = 4\n[logging]\nlevel = \"debug\"").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.scanner.max_concurrent, 4);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn example_config_parses() {
        let config = Config::parse(include_str!("../../config.example.toml")).unwrap();
        let replay = config.replay.unwrap();
        assert_eq!(replay.latency_ms, 40);
        assert_eq!(replay.document_type, "id_card");
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load(Path::new("/nonexistent/frame-scan.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile(..)));
    }
}
