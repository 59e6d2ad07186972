//! Startup configuration.
//!
//! Loaded once from a TOML file and treated as immutable afterwards.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//!
//! [media]
//! video = "/home/pi/video.mp4"
//! image = "/home/pi/image.jpg"
//!
//! [report]
//! endpoint = "https://example.com/api/brightness/update"
//! device_id = "AUTO_DEVICE_001"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "motion-display.toml";
pub const CONFIG_PATH_ENV: &str = "MOTION_DISPLAY_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    #[serde(default)]
    pub serial: SerialSettings,
    pub media: MediaSettings,
    #[serde(default)]
    pub motion: MotionSettings,
    #[serde(default)]
    pub report: ReportSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            reconnect_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaSettings {
    pub video: PathBuf,
    pub image: PathBuf,
    #[serde(default = "default_video_player")]
    pub video_player: Vec<String>,
    #[serde(default = "default_image_viewer")]
    pub image_viewer: Vec<String>,
    #[serde(default = "default_switch_grace_ms")]
    pub switch_grace_ms: u64,
    #[serde(default = "default_terminate_timeout_ms")]
    pub terminate_timeout_ms: u64,
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
}

fn default_video_player() -> Vec<String> {
    ["cvlc", "--loop", "--fullscreen", "--no-osd", "--no-video-title-show"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_image_viewer() -> Vec<String> {
    ["feh", "--fullscreen", "--hide-pointer"].iter().map(|s| s.to_string()).collect()
}

fn default_switch_grace_ms() -> u64 {
    500
}

fn default_terminate_timeout_ms() -> u64 {
    5000
}

fn default_watchdog_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotionSettings {
    pub debounce_ms: u64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self { debounce_ms: 3000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportSettings {
    pub endpoint: String,
    pub device_id: String,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://backendlv8-production.up.railway.app/api/brightness/update"
                .to_string(),
            device_id: "AUTO_DEVICE_001".to_string(),
            interval_secs: 10,
            request_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl ControllerConfig {
    /// Minimal configuration for the given media files, everything else
    /// defaulted.
    pub fn new(video: impl Into<PathBuf>, image: impl Into<PathBuf>) -> Self {
        Self {
            serial: SerialSettings::default(),
            media: MediaSettings {
                video: video.into(),
                image: image.into(),
                video_player: default_video_player(),
                image_viewer: default_image_viewer(),
                switch_grace_ms: default_switch_grace_ms(),
                terminate_timeout_ms: default_terminate_timeout_ms(),
                watchdog_interval_ms: default_watchdog_interval_ms(),
            },
            motion: MotionSettings::default(),
            report: ReportSettings::default(),
            logging: LoggingSettings::default(),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Resolve the configuration path: explicit argument, then the
    /// `MOTION_DISPLAY_CONFIG` variable, then `motion-display.toml`.
    pub fn resolve_path(arg: Option<String>) -> PathBuf {
        arg.or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Check everything that must hold before the controller may start.
    pub fn validate(&self) -> Result<()> {
        if !self.media.video.is_file() {
            return Err(ConfigError::MissingMedia(self.media.video.clone()));
        }
        if !self.media.image.is_file() {
            return Err(ConfigError::MissingMedia(self.media.image.clone()));
        }
        if self.media.video_player.is_empty() {
            return Err(ConfigError::Invalid("media.video_player must not be empty".into()));
        }
        if self.media.image_viewer.is_empty() {
            return Err(ConfigError::Invalid("media.image_viewer must not be empty".into()));
        }
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Invalid("serial.port must not be empty".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("serial.baud_rate must be positive".into()));
        }
        if self.report.interval_secs == 0 {
            return Err(ConfigError::Invalid("report.interval_secs must be positive".into()));
        }
        if self.report.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("report.request_timeout_secs must be positive".into()));
        }
        if self.media.watchdog_interval_ms == 0 {
            return Err(ConfigError::Invalid("media.watchdog_interval_ms must be positive".into()));
        }

        log::info!(
            "Media files validated - Video: {}, Image: {}",
            self.media.video.display(),
            self.media.image.display()
        );
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.motion.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.report.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.report.request_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.serial.reconnect_delay_ms)
    }

    pub fn switch_grace(&self) -> Duration {
        Duration::from_millis(self.media.switch_grace_ms)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.media.terminate_timeout_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.media.watchdog_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn media_files() -> (tempfile::NamedTempFile, tempfile::NamedTempFile) {
        let mut video = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        video.write_all(b"video").unwrap();
        let mut image = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        image.write_all(b"image").unwrap();
        (video, image)
    }

    #[test]
    fn test_minimal_file_gets_defaults() {
        let config = ControllerConfig::from_toml_str(
            r#"
            [media]
            video = "/srv/loop.mp4"
            image = "/srv/still.jpg"
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.debounce(), Duration::from_secs(3));
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.media.video_player[0], "cvlc");
        assert_eq!(config.media.image_viewer[0], "feh");
        assert_eq!(config.report.device_id, "AUTO_DEVICE_001");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_overrides_are_read() {
        let config = ControllerConfig::from_toml_str(
            r#"
            [serial]
            port = "/dev/ttyAMA0"
            baud_rate = 9600

            [media]
            video = "a.mp4"
            image = "b.jpg"
            video_player = ["mpv", "--loop"]

            [motion]
            debounce_ms = 1500

            [report]
            endpoint = "http://localhost:8080/update"
            device_id = "LAB_01"
            interval_secs = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port, "/dev/ttyAMA0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.media.video_player, vec!["mpv".to_string(), "--loop".to_string()]);
        assert_eq!(config.debounce(), Duration::from_millis(1500));
        assert_eq!(config.report.device_id, "LAB_01");
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_missing_media_section_is_an_error() {
        assert!(matches!(
            ControllerConfig::from_toml_str("[serial]\nport = \"/dev/ttyS0\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result = ControllerConfig::from_toml_str(
            "[media]\nvideo = \"a\"\nimage = \"b\"\n[motion]\ndebounce = 3\n",
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_requires_media_files() {
        let (video, image) = media_files();
        let config = ControllerConfig::new(video.path(), image.path());
        assert!(config.validate().is_ok());

        let missing = ControllerConfig::new(video.path(), "/nonexistent/still.jpg");
        assert!(matches!(missing.validate(), Err(ConfigError::MissingMedia(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let (video, image) = media_files();
        let mut config = ControllerConfig::new(video.path(), image.path());
        config.report.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_reports_unreadable_file() {
        let result = ControllerConfig::load(Path::new("/nonexistent/motion-display.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_resolve_path_prefers_argument() {
        let path = ControllerConfig::resolve_path(Some("custom.toml".to_string()));
        assert_eq!(path, PathBuf::from("custom.toml"));
    }
}
