use serde::{Deserialize, Serialize};

/// Body of a brightness update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrightnessUpdate {
    pub brightness: bool,
}

/// Last value the remote endpoint accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrightnessReport {
    last_reported: Option<bool>,
}

impl BrightnessReport {
    pub fn last_reported(&self) -> Option<bool> {
        self.last_reported
    }

    /// Whether `current` still has to be sent.
    pub fn needs_report(&self, current: bool) -> bool {
        self.last_reported != Some(current)
    }

    pub fn record_success(&mut self, value: bool) {
        self.last_reported = Some(value);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Endpoint rejected update with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
}

pub type ReportResult<T> = Result<T, ReportError>;
