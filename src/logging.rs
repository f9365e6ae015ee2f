use anyhow::Result;
use std::fs::{self, OpenOptions};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::Settings;

pub const LOG_FILE: &str = "jobquest-admin.log";

/// `RUST_LOG` wins; otherwise the configured level with the HTTP stack
/// quietened.
fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = format!("{},reqwest=warn,hyper=warn,hyper_util=warn", level);
    EnvFilter::try_new(&directives)
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", level, e))
}

/// File logging always; `to_stderr` adds a console layer. The terminal UI
/// never enables the console layer since it owns the screen.
pub fn init_logging(settings: &Settings, to_stderr: bool) -> Result<()> {
    let dir = settings.data_dir();
    fs::create_dir_all(&dir)?;
    let path = dir.join(LOG_FILE);
    let log_file = OpenOptions::new().create(true).append(true).open(&path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(log_file)
        .with_target(true)
        .with_filter(build_env_filter(&settings.log_level)?);

    let console_layer = if to_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(build_env_filter(&settings.log_level)?),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;

    tracing::debug!(file = %path.display(), "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_configured_level() {
        assert!(build_env_filter("debug").is_ok());
    }
}
