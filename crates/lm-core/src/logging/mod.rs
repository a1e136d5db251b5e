//! Structured logging for lm-core.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for automation
//!
//! stdout is reserved for the operation result; logs go to stderr or to
//! the file given by `--log-file`.

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, Level, Stage};
pub use layer::JsonlLayer;

use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging subsystem.
///
/// Call once at startup. Respects LM_LOG, RUST_LOG, and LM_LOG_FORMAT via
/// [`LogConfig::from_env`]. Fails only when the log file cannot be opened.
pub fn init_logging(config: &LogConfig) -> std::io::Result<()> {
    // Env levels are already folded into `config.level`, after CLI flags.
    let filter = EnvFilter::new(config.level.to_string());

    let file = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Some(OpenOptions::new().create(true).append(true).open(path)?)
        }
        None => None,
    };

    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = match (config.format, file) {
        (LogFormat::Human, None) => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);
            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        (LogFormat::Human, Some(file)) => {
            let fmt_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_target(false)
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        (LogFormat::Jsonl, None) => tracing_subscriber::registry()
            .with(filter)
            .with(JsonlLayer::stderr())
            .try_init(),
        (LogFormat::Jsonl, Some(file)) => tracing_subscriber::registry()
            .with(filter)
            .with(JsonlLayer::new(file))
            .try_init(),
    };

    Ok(())
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &uuid[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_shape() {
        let id = generate_run_id();
        assert!(id.starts_with("run-"));
        assert_eq!(id.len(), 16);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_run_id());
    }
}
