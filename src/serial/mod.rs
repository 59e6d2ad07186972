pub mod interface;
pub mod monitor;
pub mod protocol;

pub use interface::{LinkOpener, NativeLinkOpener, SerialInterface, SerialPortIO};
pub use monitor::{MotionCallback, SerialLinkMonitor};
pub use protocol::{parse_motion_line, MotionEdge};

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Communication timeout")]
    Timeout,

    #[error("Link closed")]
    Closed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

impl SerialError {
    /// Whether the error means the link is unusable and must be reopened.
    pub fn is_link_failure(&self) -> bool {
        !matches!(self, SerialError::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;
