use std::fs::OpenOptions;

use anyhow::Context;

use crate::config::LoggingSettings;

/// Install the global logger. `RUST_LOG`, when set, takes precedence over
/// the configured level.
pub fn init(settings: &LoggingSettings) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&settings.level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.format_timestamp_millis();

    if let Some(path) = &settings.file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Logger already initialized")?;
    Ok(())
}

/// Whether a logger is installed and would emit anything.
pub fn is_active() -> bool {
    log::max_level() != log::LevelFilter::Off
}

/// Report an error that ends the process. Falls back to stderr when logging
/// never came up.
pub fn report_fatal(err: &anyhow::Error) {
    if is_active() {
        log::error!("{:#}", err);
    } else {
        eprintln!("motion-display: {:#}", err);
    }
}
