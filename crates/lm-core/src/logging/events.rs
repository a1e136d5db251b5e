//! Structured event vocabulary.
//!
//! Event names double as tracing targets, so the JSONL layer reports them in
//! its `event` field.

use serde::{Deserialize, Serialize};

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Stages of a lifecycle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup, config, platform detection.
    Init,
    /// Disk, privilege, architecture, and secret checks.
    Preflight,
    /// Installed-state and artifact discovery.
    Discover,
    /// Choosing between install, no-op, or failure.
    Decide,
    Deploy,
    Verify,
    Uninstall,
    Rollback,
    Finish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Preflight => "preflight",
            Stage::Discover => "discover",
            Stage::Decide => "decide",
            Stage::Deploy => "deploy",
            Stage::Verify => "verify",
            Stage::Uninstall => "uninstall",
            Stage::Rollback => "rollback",
            Stage::Finish => "finish",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Command runner
    pub const EXEC_OK: &str = "exec.ok";
    pub const EXEC_FAILED: &str = "exec.failed";
    pub const EXEC_DRY_RUN: &str = "exec.dry_run";

    // Host mutations skipped in dry-run
    pub const HOST_DRY_RUN: &str = "host.dry_run";

    // Discovery
    pub const ARTIFACT_RESOLVED: &str = "artifact.resolved";
    pub const ARTIFACT_FALLBACK: &str = "artifact.fallback";
    pub const DETECT_RESULT: &str = "detect.result";

    // Preflight
    pub const PREFLIGHT_FAILED: &str = "preflight.failed";

    // Deploy / verify
    pub const DEPLOY_STARTED: &str = "deploy.started";
    pub const DEPLOY_FAILED: &str = "deploy.failed";
    pub const VERIFY_RESULT: &str = "verify.result";

    // Uninstall
    pub const UNINSTALL_PACKAGE: &str = "uninstall.package";
    pub const SERVICE_CONTROL: &str = "service.control";

    // Backup
    pub const BACKUP_CREATED: &str = "backup.created";
    pub const BACKUP_DISCARDED: &str = "backup.discarded";

    // Rollback
    pub const ROLLBACK_STARTED: &str = "rollback.started";
    pub const ROLLBACK_STEP: &str = "rollback.step";
    pub const ROLLBACK_FINISHED: &str = "rollback.finished";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
}
