#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use motion_display_lib::config::ControllerConfig;
use motion_display_lib::display::{
    DisplayBackend, DisplayController, DisplayError, DisplayMode, ProcessHandle,
};
use motion_display_lib::report::{BrightnessSink, ReportError, ReportResult};
use motion_display_lib::serial::{LinkOpener, SerialError, SerialPortIO};

// ---------------------------------------------------------------------------
// Serial links
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum LinkStep {
    /// A full line; the terminator is appended.
    Line(String),
    /// Raw bytes delivered as-is.
    Chunk(String),
    /// The read fails as if the device was unplugged.
    Fail,
}

pub fn line(text: &str) -> LinkStep {
    LinkStep::Line(text.to_string())
}

struct ScriptedLink {
    steps: VecDeque<LinkStep>,
}

#[async_trait]
impl SerialPortIO for ScriptedLink {
    async fn read_data(
        &mut self,
        buffer: &mut [u8],
        _timeout_ms: u64,
    ) -> Result<usize, SerialError> {
        let bytes = match self.steps.pop_front() {
            Some(LinkStep::Line(text)) => format!("{}\n", text).into_bytes(),
            Some(LinkStep::Chunk(text)) => text.into_bytes(),
            Some(LinkStep::Fail) => {
                return Err(SerialError::IoError(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "device unplugged",
                )))
            }
            None => return Err(SerialError::Timeout),
        };
        let n = bytes.len().min(buffer.len());
        buffer[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }
}

/// Hands out one scripted link per `open`; fails once the script runs out.
pub struct ScriptedOpener {
    sessions: Mutex<VecDeque<Vec<LinkStep>>>,
    opens: AtomicUsize,
}

impl ScriptedOpener {
    pub fn new(sessions: Vec<Vec<LinkStep>>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into()),
            opens: AtomicUsize::new(0),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl LinkOpener for ScriptedOpener {
    fn open(
        &self,
        port_name: &str,
        _baud_rate: u32,
    ) -> Result<Box<dyn SerialPortIO>, SerialError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.sessions.lock().unwrap().pop_front() {
            Some(steps) => Ok(Box::new(ScriptedLink { steps: steps.into() })),
            None => Err(SerialError::PortNotFound(port_name.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Display backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    Spawned { mode: DisplayMode, pid: u32 },
    Terminated { pid: u32 },
}

#[derive(Default)]
struct FakeState {
    next_pid: u32,
    live: HashMap<u32, DisplayMode>,
    exited: HashSet<u32>,
    events: Vec<BackendEvent>,
    overlaps: usize,
    failures_remaining: usize,
}

/// Records spawns and terminations instead of running real tools.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_spawns(&self, count: usize) {
        self.state.lock().unwrap().failures_remaining = count;
    }

    /// Pretend the process exited on its own.
    pub fn crash(&self, pid: u32) {
        self.state.lock().unwrap().exited.insert(pid);
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn spawn_count(&self, mode: DisplayMode) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, BackendEvent::Spawned { mode: m, .. } if *m == mode))
            .count()
    }

    pub fn terminate_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, BackendEvent::Terminated { .. }))
            .count()
    }

    pub fn live(&self) -> Vec<(u32, DisplayMode)> {
        let mut live: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .live
            .iter()
            .map(|(p, m)| (*p, *m))
            .collect();
        live.sort_by_key(|(pid, _)| *pid);
        live
    }

    /// Spawns that happened while another process was still alive.
    pub fn overlaps(&self) -> usize {
        self.state.lock().unwrap().overlaps
    }

    fn spawn(&self, mode: DisplayMode) -> Result<ProcessHandle, DisplayError> {
        let mut state = self.state.lock().unwrap();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(DisplayError::SpawnFailed {
                program: format!("fake-{}", mode),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            });
        }
        if !state.live.is_empty() {
            state.overlaps += 1;
        }
        state.next_pid += 1;
        let pid = 4000 + state.next_pid;
        state.live.insert(pid, mode);
        state.events.push(BackendEvent::Spawned { mode, pid });
        Ok(ProcessHandle::untracked(pid))
    }
}

#[async_trait]
impl DisplayBackend for FakeBackend {
    async fn play(&self, _path: &Path) -> Result<ProcessHandle, DisplayError> {
        self.spawn(DisplayMode::Video)
    }

    async fn show(&self, _path: &Path) -> Result<ProcessHandle, DisplayError> {
        self.spawn(DisplayMode::Image)
    }

    async fn terminate(&self, handle: ProcessHandle) -> Result<(), DisplayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(pid) = handle.pid() {
            state.live.remove(&pid);
            state.exited.remove(&pid);
            state.events.push(BackendEvent::Terminated { pid });
        }
        Ok(())
    }

    fn has_exited(&self, handle: &mut ProcessHandle) -> bool {
        match handle.pid() {
            Some(pid) => self.state.lock().unwrap().exited.contains(&pid),
            None => false,
        }
    }
}

pub fn fake_display() -> (Arc<DisplayController>, Arc<FakeBackend>) {
    let backend = FakeBackend::new();
    let display = Arc::new(DisplayController::new(backend.clone(), "loop.mp4", "still.jpg"));
    (display, backend)
}

// ---------------------------------------------------------------------------
// Brightness sink
// ---------------------------------------------------------------------------

/// Records every update; the first `failures` attempts are rejected.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<bool>>,
    failures_remaining: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(failures: usize) -> Arc<Self> {
        let sink = Self::default();
        sink.failures_remaining.store(failures, Ordering::SeqCst);
        Arc::new(sink)
    }

    pub fn calls(&self) -> Vec<bool> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrightnessSink for RecordingSink {
    async fn update_brightness(&self, is_on: bool) -> ReportResult<()> {
        self.calls.lock().unwrap().push(is_on);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ReportError::Rejected {
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

pub struct MediaFiles {
    pub video: tempfile::NamedTempFile,
    pub image: tempfile::NamedTempFile,
}

pub fn media_files() -> MediaFiles {
    let mut video = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    video.write_all(b"not really a video").unwrap();
    let mut image = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
    image.write_all(b"not really an image").unwrap();
    MediaFiles { video, image }
}

pub fn test_config(media: &MediaFiles) -> ControllerConfig {
    let mut config = ControllerConfig::new(media.video.path(), media.image.path());
    config.serial.port = "/dev/ttyTEST0".to_string();
    config.media.switch_grace_ms = 500;
    config.media.watchdog_interval_ms = 1000;
    config.motion.debounce_ms = 3000;
    config.report.interval_secs = 10;
    config
}

pub fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}
