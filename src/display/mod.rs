pub mod backend;
pub mod controller;

pub use backend::{CommandBackend, DisplayBackend, ProcessHandle};
pub use controller::DisplayController;

use serde::{Deserialize, Serialize};

/// What the output device is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    None = 0,
    Video = 1,
    Image = 2,
}

impl DisplayMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => DisplayMode::Video,
            2 => DisplayMode::Image,
            _ => DisplayMode::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::None => "none",
            DisplayMode::Video => "video",
            DisplayMode::Image => "image",
        }
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("No command configured for {0}")]
    EmptyCommand(DisplayMode),

    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal process group {pgid}: {reason}")]
    SignalFailed { pgid: u32, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DisplayError>;
