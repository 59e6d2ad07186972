use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::backend::{DisplayBackend, ProcessHandle};
use super::DisplayMode;

pub const DEFAULT_SWITCH_GRACE: Duration = Duration::from_millis(500);

/// Owns at most one display process and switches between video and image.
///
/// Every transition runs under a single lock, so mode changes never overlap
/// and the previous process is always gone before the next one is spawned.
pub struct DisplayController {
    backend: Arc<dyn DisplayBackend>,
    video_path: PathBuf,
    image_path: PathBuf,
    switch_grace: Duration,
    active: Mutex<ActiveDisplay>,
    // Lock-free mirror of `active.mode` for readers such as the reporter.
    mode: AtomicU8,
}

struct ActiveDisplay {
    /// What should be on screen; survives a failed spawn so it can be retried.
    desired: DisplayMode,
    /// What is actually running.
    mode: DisplayMode,
    process: Option<ProcessHandle>,
}

impl DisplayController {
    pub fn new(
        backend: Arc<dyn DisplayBackend>,
        video_path: impl Into<PathBuf>,
        image_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            video_path: video_path.into(),
            image_path: image_path.into(),
            switch_grace: DEFAULT_SWITCH_GRACE,
            active: Mutex::new(ActiveDisplay {
                desired: DisplayMode::None,
                mode: DisplayMode::None,
                process: None,
            }),
            mode: AtomicU8::new(DisplayMode::None as u8),
        }
    }

    pub fn with_switch_grace(mut self, switch_grace: Duration) -> Self {
        self.switch_grace = switch_grace;
        self
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn current_mode(&self) -> DisplayMode {
        DisplayMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    /// Brightness is on while the video is playing.
    pub fn is_video_playing(&self) -> bool {
        self.current_mode() == DisplayMode::Video
    }

    /// Switch to looping video. No-op if video is already playing.
    /// Returns whether video is playing afterwards.
    pub async fn play_video(&self) -> bool {
        self.transition(DisplayMode::Video).await
    }

    /// Switch to the static image. No-op if the image is already shown.
    /// Returns whether the image is shown afterwards.
    pub async fn show_image(&self) -> bool {
        self.transition(DisplayMode::Image).await
    }

    /// Respawn the desired mode if its process exited on its own or never
    /// started. Returns `true` when a restart was attempted.
    pub async fn restart_if_exited(&self) -> bool {
        let mut active = self.active.lock().await;
        let desired = active.desired;
        if desired == DisplayMode::None {
            return false;
        }

        let exited = match active.process.as_mut() {
            Some(process) => self.backend.has_exited(process),
            None => true,
        };
        if !exited {
            return false;
        }

        match active.process.take() {
            Some(process) => {
                log::warn!("{} process terminated unexpectedly, restarting", desired);
                // Reap the leader and anything left in its group.
                if let Err(e) = self.backend.terminate(process).await {
                    log::debug!("Cleanup of exited {} process failed: {}", desired, e);
                }
            }
            None => log::warn!("{} is not running, retrying", desired),
        }
        self.set_mode(&mut active, DisplayMode::None);
        self.spawn_locked(&mut active, desired).await;
        true
    }

    /// Terminate whichever process is active.
    pub async fn cleanup(&self) {
        let mut active = self.active.lock().await;
        active.desired = DisplayMode::None;
        self.close_locked(&mut active).await;
        log::info!("Display controller cleaned up");
    }

    async fn transition(&self, target: DisplayMode) -> bool {
        let mut active = self.active.lock().await;
        active.desired = target;

        if active.mode == target && active.process.is_some() {
            log::debug!("{} already active", target);
            return true;
        }

        if active.process.is_some() {
            self.close_locked(&mut active).await;
            // Let the output device release before the next tool grabs it.
            tokio::time::sleep(self.switch_grace).await;
        }

        self.spawn_locked(&mut active, target).await
    }

    async fn spawn_locked(&self, active: &mut ActiveDisplay, target: DisplayMode) -> bool {
        let spawned = match target {
            DisplayMode::Video => self.backend.play(&self.video_path).await,
            DisplayMode::Image => self.backend.show(&self.image_path).await,
            DisplayMode::None => return true,
        };

        match spawned {
            Ok(process) => {
                active.process = Some(process);
                self.set_mode(active, target);
                match target {
                    DisplayMode::Video => {
                        log::info!("Started video playback: {}", self.video_path.display())
                    }
                    _ => log::info!("Displayed image: {}", self.image_path.display()),
                }
                true
            }
            Err(e) => {
                log::error!("Failed to start {}: {}", target, e);
                false
            }
        }
    }

    async fn close_locked(&self, active: &mut ActiveDisplay) {
        let mode = active.mode;
        if let Some(process) = active.process.take() {
            match self.backend.terminate(process).await {
                Ok(()) => log::info!("Stopped {}", mode),
                Err(e) => log::error!("Error stopping {}: {}", mode, e),
            }
        }
        self.set_mode(active, DisplayMode::None);
    }

    fn set_mode(&self, active: &mut ActiveDisplay, mode: DisplayMode) {
        active.mode = mode;
        self.mode.store(mode as u8, Ordering::SeqCst);
    }
}
