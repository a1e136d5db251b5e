//! Package drivers: how a component is deployed, removed, and reinstalled.
//!
//! The orchestrator only sees [`PackageDriver`]. Which tool sits behind it
//! (the vendor installation manager or the native package database) follows
//! from the component's tracker.

pub mod installation_manager;
pub mod native;
pub mod response_file;

pub use installation_manager::InstallationManagerDriver;
pub use native::NativeDriver;

use crate::artifact::artifact_at;
use crate::detect::Detection;
use crate::env::RunEnv;
use crate::recovery::BackupSet;
use crate::runner::{CommandResult, CommandSpec};
use lm_common::{Artifact, Error, PackageStep, Result, Version};
use lm_config::{ComponentSpec, TrackerKind};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tool-specific half of the lifecycle flows.
pub trait PackageDriver {
    /// Install `artifact` into the context's install dir.
    fn deploy(&self, env: &RunEnv<'_>, artifact: &Artifact) -> Result<()>;

    /// Files worth archiving before a destructive step, so a rollback can
    /// reinstall what was there.
    fn archive_sources(&self, env: &RunEnv<'_>, installed_version: Option<&str>) -> Vec<PathBuf>;

    /// Packages to remove, leaf first. Install order is the reverse.
    fn removal_order(&self, env: &RunEnv<'_>) -> Vec<String> {
        if env.component.removal_order.is_empty() {
            vec![env.component.package_id.clone()]
        } else {
            env.component.removal_order.clone()
        }
    }

    fn is_present(&self, env: &RunEnv<'_>, package: &str, detection: &Detection) -> bool;

    fn remove(&self, env: &RunEnv<'_>, package: &str) -> CommandResult;

    /// Remove ignoring dependency and script failures.
    fn force_remove(&self, env: &RunEnv<'_>, package: &str) -> CommandResult;

    /// Reinstall `packages` (in install order) from a backup set, falling back
    /// to the newest artifact not above `previous_version`.
    fn restore(
        &self,
        env: &RunEnv<'_>,
        backup: Option<&BackupSet>,
        packages: &[String],
        previous_version: Option<&str>,
    ) -> Vec<PackageStep>;
}

pub fn driver_for(component: &ComponentSpec) -> Box<dyn PackageDriver> {
    match component.tracker {
        TrackerKind::InstallationManager => Box::new(InstallationManagerDriver),
        TrackerKind::NativePackages => Box::new(NativeDriver),
    }
}

/// `<package>-<digit>...` with an `.rpm` extension.
///
/// The digit keeps `TIVsm-BA` from claiming `TIVsm-BAcit-8.1.rpm`.
pub fn matches_package(file_name: &str, package: &str) -> bool {
    let Some(rest) = file_name.strip_prefix(package) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('-') else {
        return false;
    };
    rest.starts_with(|c: char| c.is_ascii_digit()) && file_name.to_ascii_lowercase().ends_with(".rpm")
}

/// Run a self-extracting installer into `staging`, which is emptied first.
pub(crate) fn extract(env: &RunEnv<'_>, artifact: &Path, staging: &Path) -> Result<()> {
    env.host.remove_tree(staging)?;
    env.host.create_dir_all(staging)?;

    let spec = if env.os_key.is_windows() {
        CommandSpec::line(format!(
            "\"{}\" -q -d \"{}\"",
            artifact.display(),
            staging.display()
        ))
    } else {
        env.host.set_executable(artifact)?;
        CommandSpec::argv([
            artifact.to_string_lossy().into_owned(),
            "-q".to_string(),
            "-d".to_string(),
            staging.to_string_lossy().into_owned(),
        ])
    };
    let result = env.runner.run(&spec);
    if !result.success() {
        return Err(Error::DeployFailed(format!(
            "extracting {} failed: {}",
            artifact.display(),
            result.error_text()
        )));
    }
    Ok(())
}

/// Installer to reinstall from: the one archived in the backup set, else the
/// newest one in the artifacts dir not above `previous_version`.
pub(crate) fn previous_installer(
    env: &RunEnv<'_>,
    backup: Option<&BackupSet>,
    previous_version: Option<&str>,
) -> Option<Artifact> {
    if let Some(path) = backup.and_then(|b| b.installer(&env.os_key)) {
        return Some(artifact_at(&env.os_key, path));
    }
    let ceiling = previous_version.and_then(Version::parse_lenient)?;
    match env
        .resolver()
        .find_at_most(&env.os_key, &env.ctx.artifacts_base_dir, &ceiling)
    {
        Ok(resolution) => Some(resolution.artifact),
        Err(e) => {
            debug!(error = %e, ceiling = %ceiling, "no earlier installer in artifacts dir");
            None
        }
    }
}

/// One step per package, all sharing the outcome of a single installer run.
pub(crate) fn steps_for(packages: &[String], action: &str, outcome: &Result<()>) -> Vec<PackageStep> {
    let (rc, stderr) = match outcome {
        Ok(()) => (0, String::new()),
        Err(e) => (1, e.to_string()),
    };
    packages
        .iter()
        .map(|package| PackageStep {
            package: package.clone(),
            action: action.to_string(),
            rc,
            stderr: stderr.clone(),
        })
        .collect()
}

pub(crate) fn step(package: &str, action: &str, result: &CommandResult) -> PackageStep {
    PackageStep {
        package: package.to_string(),
        action: action.to_string(),
        rc: result.rc,
        stderr: if result.success() {
            String::new()
        } else {
            result.error_text()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_package() {
        let cases = [
            ("TIVsm-BA-8.1.20-0.x86_64.rpm", "TIVsm-BA", true),
            ("TIVsm-BAcit-8.1.20-0.x86_64.rpm", "TIVsm-BA", false),
            ("TIVsm-BAcit-8.1.20-0.x86_64.rpm", "TIVsm-BAcit", true),
            ("gskcrypt64-8.0.55.31.linux.x86_64.rpm", "gskcrypt64", true),
            ("gskcrypt64-8.0.55.31.linux.x86_64.RPM", "gskcrypt64", true),
            ("TIVsm-BA-8.1.20-0.x86_64.tar", "TIVsm-BA", false),
            ("TIVsm-BA-docs.rpm", "TIVsm-BA", false),
            ("TIVsm-BA", "TIVsm-BA", false),
        ];
        for (name, pkg, want) in cases {
            assert_eq!(matches_package(name, pkg), want, "{name} vs {pkg}");
        }
    }
}
