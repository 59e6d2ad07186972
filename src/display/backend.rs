use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::time::{timeout, timeout_at, Instant};

use super::{DisplayError, DisplayMode, Result};

pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A spawned display process. Terminating it stops the whole process group
/// the process was started in.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    child: Option<Child>,
}

impl ProcessHandle {
    pub fn from_child(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
        }
    }

    /// A handle for a process this crate does not own a `Child` for.
    pub fn untracked(pid: u32) -> Self {
        Self {
            pid: Some(pid),
            child: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has exited by itself. Untracked handles are
    /// assumed alive.
    pub fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

/// Launches and stops the external tools that drive the output device.
#[async_trait]
pub trait DisplayBackend: Send + Sync {
    /// Start looping playback of the video at `path`.
    async fn play(&self, path: &Path) -> Result<ProcessHandle>;

    /// Start a fullscreen viewer for the image at `path`.
    async fn show(&self, path: &Path) -> Result<ProcessHandle>;

    /// Stop the process and every child it spawned.
    async fn terminate(&self, handle: ProcessHandle) -> Result<()>;

    fn has_exited(&self, handle: &mut ProcessHandle) -> bool {
        handle.has_exited()
    }
}

/// Shells out to a configured media player and image viewer.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    video_player: Vec<String>,
    image_viewer: Vec<String>,
    terminate_timeout: Duration,
}

impl CommandBackend {
    pub fn new(video_player: Vec<String>, image_viewer: Vec<String>) -> Self {
        Self {
            video_player,
            image_viewer,
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
        }
    }

    pub fn with_terminate_timeout(mut self, terminate_timeout: Duration) -> Self {
        self.terminate_timeout = terminate_timeout;
        self
    }

    fn spawn(&self, mode: DisplayMode, command: &[String], path: &Path) -> Result<ProcessHandle> {
        let (program, args) = command.split_first().ok_or(DisplayError::EmptyCommand(mode))?;

        let mut std_command = std::process::Command::new(program);
        std_command
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group so the whole tree can be signalled at once.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_command.process_group(0);
        }

        let mut command = Command::from(std_command);
        command.kill_on_drop(true);

        let child = command.spawn().map_err(|source| DisplayError::SpawnFailed {
            program: program.clone(),
            source,
        })?;

        let handle = ProcessHandle::from_child(child);
        log::debug!("Spawned {} ({} mode) as pid {:?}", program, mode, handle.pid());
        Ok(handle)
    }
}

#[async_trait]
impl DisplayBackend for CommandBackend {
    async fn play(&self, path: &Path) -> Result<ProcessHandle> {
        self.spawn(DisplayMode::Video, &self.video_player, path)
    }

    async fn show(&self, path: &Path) -> Result<ProcessHandle> {
        self.spawn(DisplayMode::Image, &self.image_viewer, path)
    }

    async fn terminate(&self, mut handle: ProcessHandle) -> Result<()> {
        let mut child = handle.child.take();
        let Some(pgid) = handle.pid else {
            if let Some(mut child) = child.take() {
                if let Err(e) = child.start_kill() {
                    log::debug!("Display process without pid could not be killed: {}", e);
                }
                let _ = timeout(self.terminate_timeout, child.wait()).await;
            }
            return Ok(());
        };

        // The leader may already be gone while its children still hold the group.
        signal_group(pgid, GroupSignal::Terminate)?;

        let deadline = Instant::now() + self.terminate_timeout;
        let mut leader_exited = true;
        if let Some(child) = child.as_mut() {
            match timeout_at(deadline, child.wait()).await {
                Ok(status) => log::debug!("Display process {} exited: {:?}", pgid, status),
                Err(_) => leader_exited = false,
            }
        }
        if leader_exited && wait_for_group_exit(pgid, deadline).await {
            log::debug!("Display process group {} terminated", pgid);
            return Ok(());
        }

        log::warn!(
            "Display process group {} ignored SIGTERM for {:?}, killing",
            pgid,
            self.terminate_timeout
        );
        signal_group(pgid, GroupSignal::Kill)?;
        if let Some(mut child) = child {
            if !leader_exited {
                child.kill().await?;
            }
        }
        Ok(())
    }
}

async fn wait_for_group_exit(pgid: u32, deadline: Instant) -> bool {
    loop {
        if !group_alive(pgid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(GROUP_POLL_INTERVAL).await;
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn group_pid(pgid: u32) -> Result<nix::unistd::Pid> {
    let raw = i32::try_from(pgid).map_err(|_| DisplayError::SignalFailed {
        pgid,
        reason: "pid out of range".to_string(),
    })?;
    if raw <= 1 {
        return Err(DisplayError::SignalFailed {
            pgid,
            reason: "refusing to signal a system process group".to_string(),
        });
    }
    Ok(nix::unistd::Pid::from_raw(raw))
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: GroupSignal) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};

    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };

    match killpg(group_pid(pgid)?, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(DisplayError::SignalFailed {
            pgid,
            reason: e.to_string(),
        }),
    }
}

/// Whether any member of the group still exists.
#[cfg(unix)]
fn group_alive(pgid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};

    match group_pid(pgid) {
        Ok(pid) => !matches!(killpg(pid, None::<Signal>), Err(Errno::ESRCH)),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: GroupSignal) -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn group_alive(_pgid: u32) -> bool {
    false
}
