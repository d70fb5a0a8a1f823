use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone, Args)]
pub struct LogConfig {
    /// Fallback filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    /// Also write JSON logs, rotated daily, into this directory.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout stays clean
/// for summaries. Calling it again is a no-op.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let registry = Registry::default().with(env_filter).with(stderr_layer);

    let result = match &config.log_dir {
        Some(dir) => {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("focustrack")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let file_layer = fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .json();
            registry.with(file_layer).try_init()
        }
        None => registry.try_init(),
    };

    if let Err(e) = result {
        let msg = e.to_string();
        if !msg.contains("already been set") {
            return Err(anyhow::anyhow!("failed to initialize tracing: {e}"));
        }
    }
    Ok(())
}
