//! Logging configuration.
//!
//! CLI flags win over `LM_LOG` / `LM_LOG_FORMAT`, which win over `RUST_LOG`.
//! `LM_LOG_TIMESTAMPS=0` drops timestamps from human output.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console format (default).
    #[default]
    Human,
    /// Machine-parseable JSON lines.
    Jsonl,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            other => Err(format!("unknown log format '{}' (expected human or jsonl)", other)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    /// Standard operational info (default).
    #[default]
    Info,
    Warn,
    Error,
    /// Completely silent.
    Off,
}

impl LogLevel {
    /// Every level, most verbose first.
    const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Off,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    /// Most verbose level named anywhere in a `RUST_LOG` directive string.
    fn from_directives(directives: &str) -> Option<LogLevel> {
        let directives = directives.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .filter(|l| *l != LogLevel::Off)
            .find(|l| directives.contains(l.as_str()))
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if wanted == "warning" {
            return Ok(LogLevel::Warn);
        }
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == wanted)
            .ok_or_else(|| format!("unknown log level '{}'", s.trim()))
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Whether to include timestamps in human output.
    pub timestamps: bool,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            timestamps: true,
            file: None,
        }
    }
}

impl LogConfig {
    /// Create config from environment and CLI overrides.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::from_lookup(cli_level, cli_format, |name| std::env::var(name).ok())
    }

    fn from_lookup<F>(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_level = match env("LM_LOG") {
            Some(val) => val.parse().ok(),
            None => env("RUST_LOG").and_then(|val| LogLevel::from_directives(&val)),
        };
        let env_format = env("LM_LOG_FORMAT").and_then(|val| val.parse().ok());
        let timestamps = env("LM_LOG_TIMESTAMPS")
            .map(|val| !matches!(val.trim(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);

        let defaults = LogConfig::default();
        LogConfig {
            level: cli_level.or(env_level).unwrap_or(defaults.level),
            format: cli_format.or(env_format).unwrap_or(defaults.format),
            timestamps,
            ..defaults
        }
    }

    pub fn with_file(mut self, file: Option<PathBuf>) -> Self {
        self.file = file;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lm_log_beats_rust_log() {
        let env = |name: &str| match name {
            "LM_LOG" => Some("warn".to_string()),
            "RUST_LOG" => Some("trace".to_string()),
            _ => None,
        };
        let cfg = LogConfig::from_lookup(None, None, env);
        assert_eq!(cfg.level, LogLevel::Warn);
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = |name: &str| match name {
            "LM_LOG" => Some("error".to_string()),
            "LM_LOG_FORMAT" => Some("jsonl".to_string()),
            _ => None,
        };
        let cfg = LogConfig::from_lookup(Some(LogLevel::Debug), Some(LogFormat::Human), env);
        assert_eq!(cfg.level, LogLevel::Debug);
        assert_eq!(cfg.format, LogFormat::Human);
        assert!(cfg.timestamps);
    }

    #[test]
    fn test_rust_log_fallback() {
        let cfg = LogConfig::from_lookup(None, None, |name| {
            (name == "RUST_LOG").then(|| "lm_core=debug".to_string())
        });
        assert_eq!(cfg.level, LogLevel::Debug);
    }

    #[test]
    fn test_timestamps_can_be_disabled() {
        let cfg = LogConfig::from_lookup(None, None, |name| {
            (name == "LM_LOG_TIMESTAMPS").then(|| "0".to_string())
        });
        assert!(!cfg.timestamps);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::from_directives("lm_core=info,hyper=warn"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_directives("lm_core"), None);
    }
}
