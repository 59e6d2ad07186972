use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::display::DisplayController;
use crate::serial::MotionEdge;
use crate::shutdown::ShutdownSignal;

/// How long motion must persist before the image replaces the video.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebouncePhase {
    /// No motion; video is the expected output.
    Idle,
    /// Motion seen, waiting for the window to elapse.
    Pending,
    /// Motion sustained; image is the expected output.
    Confirmed,
}

/// Pending confirmation of a motion onset. Only the window whose generation
/// is still current when it elapses may act.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceWindow {
    pub generation: u64,
    pub started: Instant,
}

/// Applies the debounce policy to motion edges and drives the display:
/// onset must persist for the debounce window before the image is shown,
/// while a stop restores the video immediately.
pub struct MotionDebounceOrchestrator {
    display: Arc<DisplayController>,
    debounce: Duration,
    phase: DebouncePhase,
    motion: bool,
    generation: u64,
    window: Option<DebounceWindow>,
    pending_check: Option<JoinHandle<()>>,
    elapsed_tx: mpsc::UnboundedSender<DebounceWindow>,
    elapsed_rx: mpsc::UnboundedReceiver<DebounceWindow>,
}

impl MotionDebounceOrchestrator {
    pub fn new(display: Arc<DisplayController>, debounce: Duration) -> Self {
        let (elapsed_tx, elapsed_rx) = mpsc::unbounded_channel();
        Self {
            display,
            debounce,
            phase: DebouncePhase::Idle,
            motion: false,
            generation: 0,
            window: None,
            pending_check: None,
            elapsed_tx,
            elapsed_rx,
        }
    }

    pub fn phase(&self) -> DebouncePhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn window(&self) -> Option<DebounceWindow> {
        self.window
    }

    /// Process edges and elapsed windows in arrival order until the edge
    /// stream closes or shutdown is triggered.
    pub async fn run(
        mut self,
        mut edges: mpsc::Receiver<MotionEdge>,
        mut shutdown: ShutdownSignal,
    ) {
        log::info!("Motion orchestrator started (debounce {:?})", self.debounce);

        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                edge = edges.recv() => match edge {
                    Some(edge) => self.handle_edge(edge.motion).await,
                    None => break,
                },
                Some(window) = self.elapsed_rx.recv() => self.handle_window_elapsed(window).await,
            }
        }

        self.cancel_pending_check();
        log::info!("Motion orchestrator stopped");
    }

    /// React to a motion edge. Repeated values are ignored.
    pub async fn handle_edge(&mut self, motion: bool) {
        if motion == self.motion {
            log::debug!("Ignoring repeated motion value {}", motion);
            return;
        }
        self.motion = motion;

        // Any edge supersedes an in-flight window.
        self.generation += 1;
        self.cancel_pending_check();

        if motion {
            let window = DebounceWindow {
                generation: self.generation,
                started: Instant::now(),
            };
            self.window = Some(window);
            self.phase = DebouncePhase::Pending;
            self.schedule_check(window);
            log::info!("Motion onset, confirming for {:?}", self.debounce);
        } else {
            let previous = self.phase;
            self.window = None;
            self.phase = DebouncePhase::Idle;
            log::info!("Motion stopped ({:?} -> Idle), restoring video", previous);
            self.display.play_video().await;
        }
    }

    /// Commit a debounce window if it is still the current one.
    pub async fn handle_window_elapsed(&mut self, window: DebounceWindow) {
        if window.generation != self.generation
            || !self.motion
            || self.phase != DebouncePhase::Pending
        {
            log::debug!(
                "Discarding stale debounce window (generation {}, current {})",
                window.generation,
                self.generation
            );
            return;
        }

        self.window = None;
        self.pending_check = None;
        self.phase = DebouncePhase::Confirmed;
        log::info!(
            "Motion sustained for {:?} - displaying image",
            window.started.elapsed()
        );
        self.display.show_image().await;
    }

    fn schedule_check(&mut self, window: DebounceWindow) {
        let elapsed_tx = self.elapsed_tx.clone();
        let deadline = window.started + self.debounce;
        self.pending_check = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = elapsed_tx.send(window);
        }));
    }

    fn cancel_pending_check(&mut self) {
        if let Some(check) = self.pending_check.take() {
            check.abort();
        }
    }
}
