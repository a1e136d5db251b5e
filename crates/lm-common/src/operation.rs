//! Operation data model: what the caller asks for and what it gets back.

use crate::os_key::OsKey;
use crate::version::Version;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Lifecycle operation requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Install,
    Upgrade,
    Uninstall,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Install => write!(f, "install"),
            Mode::Upgrade => write!(f, "upgrade"),
            Mode::Uninstall => write!(f, "uninstall"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "install" => Ok(Mode::Install),
            "upgrade" => Ok(Mode::Upgrade),
            "uninstall" => Ok(Mode::Uninstall),
            other => Err(format!(
                "invalid mode '{other}', expected install, upgrade, or uninstall"
            )),
        }
    }
}

/// An opaque secret (installer password).
///
/// Never printed: `Debug`, `Display`, and serialization all render `***`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// Access the raw value. Call sites should be few and obvious.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

/// Caller input for one run. Built once and passed by reference everywhere.
#[derive(Debug, Clone, Serialize)]
pub struct OperationContext {
    pub run_id: String,
    pub mode: Mode,
    pub component_id: String,
    pub desired_version: Option<String>,
    pub artifacts_base_dir: PathBuf,
    pub install_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<Secret>,
    pub dry_run: bool,
}

impl OperationContext {
    pub fn new(mode: Mode, component_id: impl Into<String>) -> Self {
        OperationContext {
            run_id: String::new(),
            mode,
            component_id: component_id.into(),
            desired_version: None,
            artifacts_base_dir: PathBuf::new(),
            install_dir: PathBuf::new(),
            secret: None,
            dry_run: false,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_desired_version(mut self, version: impl Into<String>) -> Self {
        self.desired_version = Some(version.into());
        self
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_base_dir = dir.into();
        self
    }

    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = dir.into();
        self
    }

    pub fn with_secret(mut self, secret: Option<Secret>) -> Self {
        self.secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// A discovered installer file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub os_key: OsKey,
    /// Version token taken from the file name (text before the first hyphen).
    pub version_label: String,
    /// Parsed version; `None` when the token is not a dotted number.
    pub version: Option<Version>,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Snapshot of the component on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledComponent {
    pub component_id: String,
    /// `None` means not installed.
    pub version: Option<String>,
    pub install_path: PathBuf,
}

impl InstalledComponent {
    pub fn is_installed(&self) -> bool {
        self.version.is_some()
    }
}

/// Terminal state of the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    FailedRolledBack,
    FailedNoRollback,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::FailedRolledBack => write!(f, "failed_rolled_back"),
            Outcome::FailedNoRollback => write!(f, "failed_no_rollback"),
        }
    }
}

/// Observed status of a rollback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// Previous state confirmed.
    Restored,
    /// Rollback ran but the post-check found leftovers or could not confirm.
    Warning,
    /// Rollback could not do its job (e.g. backup missing).
    Failed,
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackStatus::Restored => write!(f, "restored"),
            RollbackStatus::Warning => write!(f, "warning"),
            RollbackStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one package-level action during rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageStep {
    pub package: String,
    pub action: String,
    pub rc: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl PackageStep {
    pub fn ok(&self) -> bool {
        self.rc == 0
    }
}

/// What a rollback attempted and what it observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub rollback_type: Mode,
    pub status: RollbackStatus,
    pub message: String,
    pub packages: Vec<PackageStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remaining: Vec<String>,
}

impl RollbackReport {
    pub fn new(rollback_type: Mode) -> Self {
        RollbackReport {
            rollback_type,
            status: RollbackStatus::Restored,
            message: String::new(),
            packages: Vec::new(),
            remaining: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: RollbackStatus, message: impl Into<String>) -> Self {
        self.status = status;
        self.message = message.into();
        self
    }
}

/// The single output contract of a run.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub run_id: String,
    pub mode: Mode,
    pub component_id: String,
    pub success: bool,
    pub outcome: Outcome,
    /// Whether the host was modified.
    pub changed: bool,
    pub message: String,
    pub previous_version: Option<String>,
    pub new_version: Option<String>,
    pub rollback_performed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_packages: Vec<String>,
    pub dry_run: bool,
}

impl OperationResult {
    fn base(ctx: &OperationContext, success: bool, outcome: Outcome, message: String) -> Self {
        OperationResult {
            run_id: ctx.run_id.clone(),
            mode: ctx.mode,
            component_id: ctx.component_id.clone(),
            success,
            outcome,
            changed: false,
            message,
            previous_version: None,
            new_version: None,
            rollback_performed: false,
            rollback: None,
            error_code: None,
            removed_packages: Vec::new(),
            failed_packages: Vec::new(),
            dry_run: ctx.dry_run,
        }
    }

    /// Success that modified the host.
    pub fn changed(ctx: &OperationContext, message: impl Into<String>) -> Self {
        let mut r = Self::base(ctx, true, Outcome::Success, message.into());
        r.changed = true;
        r
    }

    /// Success without touching the host (already installed, nothing to do).
    pub fn unchanged(ctx: &OperationContext, message: impl Into<String>) -> Self {
        Self::base(ctx, true, Outcome::Success, message.into())
    }

    /// Failure before or without a rollback.
    pub fn failed(ctx: &OperationContext, err: &crate::Error) -> Self {
        let mut r = Self::base(ctx, false, Outcome::FailedNoRollback, err.to_string());
        r.error_code = Some(err.code());
        r
    }

    /// Attach a rollback report. The original failure message is kept and the
    /// rollback status appended to it.
    pub fn with_rollback(mut self, report: RollbackReport) -> Self {
        self.rollback_performed = true;
        self.outcome = Outcome::FailedRolledBack;
        self.message = format!(
            "{}; rollback {}: {}",
            self.message, report.status, report.message
        );
        self.rollback = Some(report);
        self
    }

    pub fn with_versions(mut self, previous: Option<String>, new: Option<String>) -> Self {
        self.previous_version = previous;
        self.new_version = new;
        self
    }

    pub fn with_packages(mut self, removed: Vec<String>, failed: Vec<String>) -> Self {
        self.removed_packages = removed;
        self.failed_packages = failed;
        self
    }

    /// Mark that the host was modified even though the run failed.
    pub fn mark_changed(mut self) -> Self {
        self.changed = true;
        self
    }

    /// One-line human summary printed last by the CLI.
    pub fn status_line(&self) -> String {
        let tag = if self.success { "OK" } else { "FAILED" };
        let dry = if self.dry_run { " [dry-run]" } else { "" };
        format!(
            "{tag}{dry} {} {}: {}",
            self.mode, self.component_id, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> OperationContext {
        OperationContext::new(Mode::Install, "server")
            .with_run_id("run-abc")
            .with_desired_version("8.1.20")
    }

    #[test]
    fn test_secret_never_printed() {
        let s = Secret::new("hunter2");
        assert_eq!(format!("{s}"), "***");
        assert_eq!(format!("{s:?}"), "Secret(***)");
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"***\"");
        assert_eq!(s.expose(), "hunter2");

        let c = ctx().with_secret(Some(s));
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_empty_secret_dropped() {
        let c = ctx().with_secret(Some(Secret::new("")));
        assert!(c.secret.is_none());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Install".parse::<Mode>().unwrap(), Mode::Install);
        assert_eq!(" uninstall ".parse::<Mode>().unwrap(), Mode::Uninstall);
        assert!("remove".parse::<Mode>().is_err());
    }

    #[test]
    fn test_rollback_keeps_original_message() {
        let err = crate::Error::DeployFailed("installer rc=3".into());
        let report = RollbackReport::new(Mode::Install)
            .with_status(RollbackStatus::Warning, "1 package remains");
        let result = OperationResult::failed(&ctx(), &err).with_rollback(report);
        assert!(!result.success);
        assert!(result.rollback_performed);
        assert_eq!(result.outcome, Outcome::FailedRolledBack);
        assert!(result.message.contains("deploy failed: installer rc=3"));
        assert!(result.message.contains("rollback warning"));
    }

    #[test]
    fn test_status_line() {
        let r = OperationResult::unchanged(&ctx().with_dry_run(true), "already installed");
        assert_eq!(
            r.status_line(),
            "OK [dry-run] install server: already installed"
        );
    }
}
