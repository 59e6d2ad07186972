pub mod serial;
pub mod display;
pub mod motion;
pub mod report;
pub mod config;
pub mod controller;
pub mod logging;
pub mod shutdown;

use anyhow::Context;

use config::{ControllerConfig, LoggingSettings};
use controller::Controller;

/// Load the configuration, start the controller and run until SIGINT/SIGTERM.
pub async fn run(config_arg: Option<String>) -> anyhow::Result<()> {
    let path = ControllerConfig::resolve_path(config_arg);
    let config = match ControllerConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            logging::init(&LoggingSettings::default())?;
            return Err(e)
                .with_context(|| format!("Cannot load configuration from {}", path.display()));
        }
    };
    logging::init(&config.logging)?;
    log::info!("Loaded configuration from {}", path.display());

    let mut controller = Controller::new(config).context("Invalid startup configuration")?;
    controller.start().await.context("Failed to start controller")?;
    controller.run_until_shutdown().await;
    Ok(())
}
