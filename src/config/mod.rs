pub mod settings;

pub use settings::{
    ControllerConfig, LoggingSettings, MediaSettings, MotionSettings, ReportSettings,
    SerialSettings,
};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Media file not found: {}", .0.display())]
    MissingMedia(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
