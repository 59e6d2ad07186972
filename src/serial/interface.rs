use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use serialport::{ClearBuffer, SerialPort};
use tokio::time::timeout;

use super::{Result, SerialError};

pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Byte-level access to an open sensor link.
///
/// `read_data` returns `SerialError::Timeout` when nothing arrived within
/// `timeout_ms`; any other error means the link is broken.
#[async_trait]
pub trait SerialPortIO: Send {
    async fn read_data(&mut self, buffer: &mut [u8], timeout_ms: u64) -> Result<usize>;

    /// Discard bytes received before the caller started listening.
    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens fresh links. Every call must produce a new handle; a closed handle
/// is never reused.
pub trait LinkOpener: Send + Sync {
    fn open(&self, port_name: &str, baud_rate: u32) -> Result<Box<dyn SerialPortIO>>;
}

/// A serial port opened through the `serialport` crate.
pub struct SerialInterface {
    port: Box<dyn SerialPort>,
    port_name: String,
}

impl SerialInterface {
    /// Open `port_name` at `baud_rate`.
    pub fn connect(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(1000))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => SerialError::PortNotFound(port_name.to_string()),
                _ => SerialError::ConnectionFailed(e.to_string()),
            })?;

        log::info!("Opened serial port {} at {} baud", port_name, baud_rate);
        Ok(Self {
            port,
            port_name: port_name.to_string(),
        })
    }
}

#[async_trait]
impl SerialPortIO for SerialInterface {
    async fn read_data(&mut self, buffer: &mut [u8], timeout_ms: u64) -> Result<usize> {
        let port = &mut self.port;

        let read_operation = async {
            loop {
                match port.bytes_to_read() {
                    Ok(0) => {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Ok(_) => match port.read(buffer) {
                        Ok(0) => return Err(SerialError::Closed),
                        Ok(bytes_read) => return Ok(bytes_read),
                        Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                        Err(e) => return Err(SerialError::IoError(e)),
                    },
                    Err(e) => return Err(SerialError::SerialportError(e)),
                }
            }
        };

        timeout(Duration::from_millis(timeout_ms), read_operation)
            .await
            .map_err(|_| SerialError::Timeout)?
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl Drop for SerialInterface {
    fn drop(&mut self) {
        log::debug!("Closing serial port {}", self.port_name);
    }
}

/// Opens real hardware ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLinkOpener;

impl LinkOpener for NativeLinkOpener {
    fn open(&self, port_name: &str, baud_rate: u32) -> Result<Box<dyn SerialPortIO>> {
        Ok(Box::new(SerialInterface::connect(port_name, baud_rate)?))
    }
}
