use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::{ConfigError, ControllerConfig};
use crate::display::{CommandBackend, DisplayBackend, DisplayController};
use crate::motion::MotionDebounceOrchestrator;
use crate::report::{BrightnessClient, BrightnessSink, RemoteStateReporter, ReportError};
use crate::serial::{LinkOpener, NativeLinkOpener, SerialLinkMonitor};
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger};

const EDGE_CHANNEL_CAPACITY: usize = 64;
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Motion sensor unavailable on {0}")]
    LinkUnavailable(String),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Controller already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, ControllerError>;

/// The collaborators a controller talks to. Swapped out in tests.
pub struct ControllerParts {
    pub opener: Arc<dyn LinkOpener>,
    pub backend: Arc<dyn DisplayBackend>,
    pub sink: Arc<dyn BrightnessSink>,
}

impl ControllerParts {
    /// Real hardware port, configured player/viewer, HTTP endpoint.
    pub fn native(config: &ControllerConfig) -> Result<Self> {
        let backend = CommandBackend::new(
            config.media.video_player.clone(),
            config.media.image_viewer.clone(),
        )
        .with_terminate_timeout(config.terminate_timeout());
        let sink = BrightnessClient::new(
            &config.report.endpoint,
            &config.report.device_id,
            config.request_timeout(),
        )?;

        Ok(Self {
            opener: Arc::new(NativeLinkOpener),
            backend: Arc::new(backend),
            sink: Arc::new(sink),
        })
    }
}

/// Wires the sensor link, debounce orchestrator, display controller and
/// remote reporter together and owns their lifecycles.
pub struct Controller {
    config: ControllerConfig,
    display: Arc<DisplayController>,
    monitor: SerialLinkMonitor,
    reporter: RemoteStateReporter,
    tasks: Option<BackgroundTasks>,
}

struct BackgroundTasks {
    shutdown: ShutdownTrigger,
    orchestrator: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

impl Controller {
    /// Validate `config` and build a controller over the real collaborators.
    pub fn new(config: ControllerConfig) -> Result<Self> {
        let parts = ControllerParts::native(&config)?;
        Self::with_parts(config, parts)
    }

    /// Validate `config` and build a controller over the given collaborators.
    pub fn with_parts(config: ControllerConfig, parts: ControllerParts) -> Result<Self> {
        config.validate()?;

        let display = Arc::new(
            DisplayController::new(
                parts.backend,
                config.media.video.clone(),
                config.media.image.clone(),
            )
            .with_switch_grace(config.switch_grace()),
        );
        let monitor = SerialLinkMonitor::new(
            config.serial.port.clone(),
            config.serial.baud_rate,
            parts.opener,
        )
        .with_reconnect_delay(config.reconnect_delay());
        let reporter = RemoteStateReporter::new(parts.sink);

        Ok(Self {
            config,
            display,
            monitor,
            reporter,
            tasks: None,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn display(&self) -> &Arc<DisplayController> {
        &self.display
    }

    pub fn is_running(&self) -> bool {
        self.tasks.is_some()
    }

    pub fn is_sensor_connected(&self) -> bool {
        self.monitor.is_connected()
    }

    /// Brightness is on while the video is playing.
    pub fn brightness_state(&self) -> bool {
        self.display.is_video_playing()
    }

    /// Connect the sensor, start with the video, then launch the reporter,
    /// orchestrator and watchdog.
    pub async fn start(&mut self) -> Result<()> {
        if self.tasks.is_some() {
            return Err(ControllerError::AlreadyStarted);
        }
        log::info!("Starting motion display controller");

        let (edge_tx, edge_rx) = mpsc::channel(EDGE_CHANNEL_CAPACITY);
        self.monitor.register_motion_callback(move |edge| {
            if let Err(e) = edge_tx.try_send(edge) {
                log::warn!("Dropping motion edge {:?}: {}", edge.motion, e);
            }
        });

        if !self.monitor.start_monitoring() {
            log::error!("Failed to start motion sensor monitoring");
            return Err(ControllerError::LinkUnavailable(self.config.serial.port.clone()));
        }

        // No motion yet, so the video is the default output.
        self.display.play_video().await;

        let display = self.display.clone();
        self.reporter
            .start(move || display.is_video_playing(), self.config.poll_interval());

        let (shutdown, signal) = shutdown::channel();
        let orchestrator =
            MotionDebounceOrchestrator::new(self.display.clone(), self.config.debounce());
        let orchestrator = tokio::spawn(orchestrator.run(edge_rx, signal.clone()));
        let watchdog = tokio::spawn(watchdog_loop(
            self.display.clone(),
            self.config.watchdog_interval(),
            signal,
        ));

        self.tasks = Some(BackgroundTasks {
            shutdown,
            orchestrator,
            watchdog,
        });
        log::info!("Motion display controller started successfully");
        Ok(())
    }

    /// Stop the reporter, disconnect the sensor, stop the background tasks
    /// and terminate the active display process.
    pub async fn stop(&mut self) {
        log::info!("Stopping motion display controller");

        self.reporter.stop().await;
        self.monitor.disconnect().await;

        if let Some(tasks) = self.tasks.take() {
            tasks.shutdown.trigger();
            join_with_timeout("orchestrator", tasks.orchestrator).await;
            join_with_timeout("watchdog", tasks.watchdog).await;
        }

        self.display.cleanup().await;
        log::info!("Motion display controller stopped");
    }

    /// Block until SIGINT or SIGTERM, then stop.
    pub async fn run_until_shutdown(&mut self) {
        log::info!("Controller running - press Ctrl+C to stop");
        wait_for_shutdown_signal().await;
        self.stop().await;
    }
}

async fn watchdog_loop(
    display: Arc<DisplayController>,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) {
    while !shutdown.sleep(interval).await {
        display.restart_if_exited().await;
    }
}

async fn join_with_timeout(name: &str, mut handle: JoinHandle<()>) {
    if timeout(TASK_STOP_TIMEOUT, &mut handle).await.is_err() {
        log::warn!("{} task did not stop in time, aborting", name);
        handle.abort();
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT, shutting down..."),
                    _ = terminate.recv() => log::info!("Received SIGTERM, shutting down..."),
                }
                return;
            }
            Err(e) => log::warn!("Cannot listen for SIGTERM: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for Ctrl+C: {}", e);
        return;
    }
    log::info!("Received SIGINT, shutting down...");
}
