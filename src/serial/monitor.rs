use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;

use super::interface::{LinkOpener, SerialPortIO};
use super::protocol::{parse_motion_line, LineBuffer, MotionEdge};
use super::SerialError;
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger};

/// Subscriber invoked once per motion edge.
pub type MotionCallback = Box<dyn FnMut(MotionEdge) + Send + 'static>;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);
const IDLE_DELAY: Duration = Duration::from_millis(10);
const READ_TIMEOUT_MS: u64 = 100;

/// Owns the sensor link and turns its lines into motion edges.
pub struct SerialLinkMonitor {
    port_name: String,
    baud_rate: u32,
    opener: Arc<dyn LinkOpener>,
    link: Option<Box<dyn SerialPortIO>>,
    callback: Arc<Mutex<Option<MotionCallback>>>,
    connected: Arc<AtomicBool>,
    reconnect_delay: Duration,
    session: Option<MonitoringSession>,
}

struct MonitoringSession {
    task_handle: tokio::task::JoinHandle<()>,
    stop: ShutdownTrigger,
}

impl SerialLinkMonitor {
    pub fn new(port_name: impl Into<String>, baud_rate: u32, opener: Arc<dyn LinkOpener>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            opener,
            link: None,
            callback: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            session: None,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_monitoring(&self) -> bool {
        self.session.is_some()
    }

    /// Open a fresh link to the sensor.
    pub fn connect(&mut self) -> bool {
        log::info!("Connecting to motion sensor on {}...", self.port_name);
        self.link = None;
        match self.opener.open(&self.port_name, self.baud_rate) {
            Ok(link) => {
                self.link = Some(link);
                self.connected.store(true, Ordering::SeqCst);
                log::info!("Motion sensor connected on {}", self.port_name);
                true
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                log::error!("Failed to connect to motion sensor on {}: {}", self.port_name, e);
                false
            }
        }
    }

    /// Replace the motion subscriber. Takes effect immediately, even while
    /// monitoring.
    pub fn register_motion_callback<F>(&mut self, callback: F)
    where
        F: FnMut(MotionEdge) + Send + 'static,
    {
        let mut guard = self.callback.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(Box::new(callback));
    }

    /// Start the background read loop. Returns `false` if no link could be
    /// established.
    pub fn start_monitoring(&mut self) -> bool {
        if self.session.is_some() {
            log::warn!("Motion sensor on {} is already being monitored", self.port_name);
            return true;
        }

        if self.link.is_none() && !self.connect() {
            log::error!("Cannot start monitoring - connection failed");
            return false;
        }

        let (stop, signal) = shutdown::channel();
        let link_loop = LinkLoop {
            port_name: self.port_name.clone(),
            baud_rate: self.baud_rate,
            opener: self.opener.clone(),
            link: self.link.take(),
            callback: self.callback.clone(),
            connected: self.connected.clone(),
            reconnect_delay: self.reconnect_delay,
            last_motion: false,
        };
        let task_handle = tokio::spawn(link_loop.run(signal));

        self.session = Some(MonitoringSession { task_handle, stop });
        log::info!("Motion sensor monitoring started on {}", self.port_name);
        true
    }

    /// Stop the read loop, waiting up to [`STOP_TIMEOUT`], and release the link.
    pub async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop.trigger();
            let mut task_handle = session.task_handle;
            if timeout(STOP_TIMEOUT, &mut task_handle).await.is_err() {
                log::warn!("Serial monitor on {} did not stop in time, aborting", self.port_name);
                task_handle.abort();
            }
        }

        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        self.link = None;
        if was_connected {
            log::info!("Disconnected from motion sensor on {}", self.port_name);
        }
    }
}

/// State moved into the background read task.
struct LinkLoop {
    port_name: String,
    baud_rate: u32,
    opener: Arc<dyn LinkOpener>,
    link: Option<Box<dyn SerialPortIO>>,
    callback: Arc<Mutex<Option<MotionCallback>>>,
    connected: Arc<AtomicBool>,
    reconnect_delay: Duration,
    last_motion: bool,
}

impl LinkLoop {
    async fn run(mut self, mut stop: ShutdownSignal) {
        let mut lines = LineBuffer::new();
        let mut buffer = [0u8; 512];
        self.clear_stale_input();

        loop {
            if stop.is_triggered() {
                break;
            }

            let Some(link) = self.link.as_mut() else {
                if stop.sleep(self.reconnect_delay).await {
                    break;
                }
                self.reconnect();
                lines.clear();
                continue;
            };

            let read_result = tokio::select! {
                _ = stop.triggered() => break,
                result = link.read_data(&mut buffer, READ_TIMEOUT_MS) => result,
            };

            match read_result {
                Ok(bytes_read) => {
                    for line in lines.push(&buffer[..bytes_read]) {
                        self.handle_line(&line);
                    }
                }
                Err(SerialError::Timeout) => {
                    if stop.sleep(IDLE_DELAY).await {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("Serial error on {}: {}", self.port_name, e);
                    self.link = None;
                    self.connected.store(false, Ordering::SeqCst);
                    log::info!("Reconnecting to {} in {:?}", self.port_name, self.reconnect_delay);
                }
            }
        }

        if lines.trims() > 0 {
            log::warn!(
                "Serial monitor on {} discarded unterminated data {} times",
                self.port_name,
                lines.trims()
            );
        }
        log::info!("Serial monitor loop for {} stopped", self.port_name);
    }

    fn reconnect(&mut self) {
        match self.opener.open(&self.port_name, self.baud_rate) {
            Ok(link) => {
                self.link = Some(link);
                self.connected.store(true, Ordering::SeqCst);
                self.clear_stale_input();
                log::info!("Reconnected to motion sensor on {}", self.port_name);
            }
            Err(e) => {
                log::warn!("Reconnect to {} failed: {}", self.port_name, e);
            }
        }
    }

    fn clear_stale_input(&mut self) {
        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.clear_input() {
                log::debug!("Could not clear input buffer on {}: {}", self.port_name, e);
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        log::debug!("Sensor data: {}", line);

        let Some(motion) = parse_motion_line(line) else {
            return;
        };
        if motion == self.last_motion {
            return;
        }
        self.last_motion = motion;
        log::info!("Motion {}", if motion { "detected" } else { "stopped" });

        let edge = MotionEdge::new(motion);
        let mut guard = self.callback.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(callback) = guard.as_mut() {
            callback(edge);
        }
    }
}
