//! Precondition checks run before anything destructive.

use crate::env::RunEnv;
use crate::host::volume_root;
use crate::logging::events::event_names;
use lm_common::{Error, Mode, Result};
use serde::Serialize;
use tracing::{debug, warn};

const MB: u64 = 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct PreflightCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
    #[serde(skip)]
    failure: Option<Error>,
}

impl PreflightCheck {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        PreflightCheck {
            name,
            passed: true,
            detail: detail.into(),
            failure: None,
        }
    }

    fn fail(name: &'static str, err: Error) -> Self {
        PreflightCheck {
            name,
            passed: false,
            detail: err.to_string(),
            failure: Some(err),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PreflightReport {
    pub mode: Mode,
    pub checks: Vec<PreflightCheck>,
}

impl PreflightReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// The first failing check as an error.
    pub fn into_result(self) -> Result<()> {
        match self.checks.into_iter().find_map(|c| c.failure) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Run every check that applies to the context's mode.
///
/// Disk space, architecture, and the installer secret only matter when
/// something is deployed, so uninstall checks privileges alone.
pub fn run(env: &RunEnv<'_>) -> PreflightReport {
    let mode = env.ctx.mode;
    let mut checks = Vec::new();

    if env.config.require_privileges {
        checks.push(privileges(env));
    }
    if mode != Mode::Uninstall {
        checks.push(disk_space(env));
        checks.push(architecture(env));
        if env.component.requires_secret {
            checks.push(secret(env));
        }
    }

    for check in checks.iter().filter(|c| !c.passed) {
        warn!(
            target: event_names::PREFLIGHT_FAILED,
            check = check.name,
            "{}",
            check.detail
        );
    }
    debug!(checks = checks.len(), "preflight done");
    PreflightReport { mode, checks }
}

fn disk_space(env: &RunEnv<'_>) -> PreflightCheck {
    let root = volume_root(&env.ctx.install_dir);
    let required = env.config.min_free_bytes();
    match env.probe_host.free_bytes(&root) {
        Ok(free) if free >= required => PreflightCheck::pass(
            "disk_space",
            format!("{} MB free at {}", free / MB, root.display()),
        ),
        Ok(free) => PreflightCheck::fail(
            "disk_space",
            Error::InsufficientDiskSpace {
                path: root,
                free_mb: free / MB,
                required_mb: required / MB,
            },
        ),
        Err(e) => PreflightCheck::fail("disk_space", Error::Io(e)),
    }
}

fn privileges(env: &RunEnv<'_>) -> PreflightCheck {
    if env.probe_host.is_privileged() {
        PreflightCheck::pass("privileges", "running with administrative privileges")
    } else {
        PreflightCheck::fail("privileges", Error::MissingPrivileges)
    }
}

fn architecture(env: &RunEnv<'_>) -> PreflightCheck {
    let arch = &env.facts.arch;
    if env.config.architecture_supported(arch) {
        PreflightCheck::pass("architecture", format!("{} is supported", arch))
    } else {
        PreflightCheck::fail("architecture", Error::UnsupportedArchitecture(arch.clone()))
    }
}

fn secret(env: &RunEnv<'_>) -> PreflightCheck {
    match &env.ctx.secret {
        Some(_) => PreflightCheck::pass("secret", "installer password supplied"),
        None => PreflightCheck::fail("secret", Error::MissingSecret(env.ctx.component_id.clone())),
    }
}
