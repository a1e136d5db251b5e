//! Driver for components shipped as native packages.
//!
//! On Linux the installer extracts a set of RPMs that are installed in one
//! `rpm` transaction. On Windows the setup executable is the whole product
//! and runs silently.

use super::{extract, matches_package, previous_installer, step, steps_for, PackageDriver};
use crate::detect::Detection;
use crate::env::RunEnv;
use crate::logging::events::event_names;
use crate::recovery::BackupSet;
use crate::runner::{CommandResult, CommandSpec, RC_NOT_STARTED};
use lm_common::{Artifact, Error, PackageStep, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct NativeDriver;

const RPM_INSTALL: [&str; 4] = ["rpm", "-ivh", "--force", "--nodeps"];

impl NativeDriver {
    fn deploy_rpm(&self, env: &RunEnv<'_>, artifact: &Artifact) -> Result<()> {
        let staging = env.staging_dir();
        extract(env, &artifact.path, &staging)?;

        let files = staged_packages(env, &staging);
        let mut args: Vec<String> = RPM_INSTALL.iter().map(|s| s.to_string()).collect();
        if files.is_empty() {
            if !env.is_dry_run() {
                return Err(Error::DeployFailed(format!(
                    "no installable .rpm packages found in {}",
                    staging.display()
                )));
            }
            args.push(staging.join("*.rpm").to_string_lossy().into_owned());
        }
        args.extend(files.iter().map(|f| f.to_string_lossy().into_owned()));

        let result = env.runner.run(&CommandSpec::argv(args));
        if !result.success() {
            return Err(Error::DeployFailed(format!(
                "rpm exited with rc {}: {}",
                result.rc,
                result.error_text()
            )));
        }
        Ok(())
    }

    fn deploy_setup(&self, env: &RunEnv<'_>, artifact: &Artifact) -> Result<()> {
        let line = format!(
            "\"{}\" /s /v\"/qn INSTALLDIR=\\\"{}\\\"\"",
            artifact.path.display(),
            env.ctx.install_dir.display()
        );
        let result = env.runner.run(&CommandSpec::line(line));
        if !result.success() {
            return Err(Error::DeployFailed(format!(
                "setup exited with rc {}: {}",
                result.rc,
                result.error_text()
            )));
        }
        Ok(())
    }

    fn product_uninstall(&self, env: &RunEnv<'_>) -> CommandSpec {
        let product = env
            .component
            .windows_product
            .as_deref()
            .unwrap_or(&env.component.package_id);
        CommandSpec::line(format!(
            "wmic product where \"Name like '%{}%'\" call uninstall /nointeractive",
            product
        ))
    }

    fn restore_rpms(
        &self,
        env: &RunEnv<'_>,
        backup: Option<&BackupSet>,
        packages: &[String],
        previous_version: Option<&str>,
    ) -> Vec<PackageStep> {
        let mut sources: Vec<PathBuf> = backup
            .map(|b| {
                b.manifest
                    .packages
                    .iter()
                    .map(|e| e.stored.clone())
                    .collect()
            })
            .unwrap_or_default();

        let missing = packages.iter().any(|p| find_package(&sources, p).is_none());
        if missing {
            if let Some(installer) = previous_installer(env, backup, previous_version) {
                let dir = backup
                    .map(|b| b.root.join("extracted"))
                    .unwrap_or_else(|| env.staging_dir());
                match extract(env, &installer.path, &dir) {
                    Ok(()) => sources.extend(rpm_files(env, &dir)),
                    Err(e) => warn!(installer = %installer.file_name(), error = %e, "could not extract earlier installer"),
                }
            }
        }

        packages
            .iter()
            .map(|package| match find_package(&sources, package) {
                Some(file) => {
                    let mut args: Vec<String> = RPM_INSTALL.iter().map(|s| s.to_string()).collect();
                    args.push(file.to_string_lossy().into_owned());
                    step(package, "reinstall", &env.runner.run(&CommandSpec::argv(args)))
                }
                None => PackageStep {
                    package: package.clone(),
                    action: "reinstall".to_string(),
                    rc: RC_NOT_STARTED,
                    stderr: "no archived package file".to_string(),
                },
            })
            .collect()
    }
}

impl PackageDriver for NativeDriver {
    fn deploy(&self, env: &RunEnv<'_>, artifact: &Artifact) -> Result<()> {
        if !env.host.exists(&artifact.path) {
            return Err(Error::DeployFailed(format!(
                "installer {} does not exist",
                artifact.path.display()
            )));
        }
        info!(
            target: event_names::DEPLOY_STARTED,
            artifact = %artifact.file_name(),
            install_dir = %env.ctx.install_dir.display(),
            "deploying native packages"
        );
        if env.os_key.is_windows() {
            self.deploy_setup(env, artifact)
        } else {
            self.deploy_rpm(env, artifact)
        }
    }

    fn archive_sources(&self, env: &RunEnv<'_>, installed_version: Option<&str>) -> Vec<PathBuf> {
        if let Some(installer) = previous_installer(env, None, installed_version) {
            return vec![installer.path];
        }
        if env.os_key.is_windows() {
            return Vec::new();
        }
        // No installer for the running version; the last extraction is the
        // best record of what was installed.
        staged_packages(env, &env.staging_dir())
    }

    fn removal_order(&self, env: &RunEnv<'_>) -> Vec<String> {
        if env.os_key.is_windows() || env.component.removal_order.is_empty() {
            vec![env.component.package_id.clone()]
        } else {
            env.component.removal_order.clone()
        }
    }

    fn is_present(&self, env: &RunEnv<'_>, package: &str, detection: &Detection) -> bool {
        if env.os_key.is_windows() {
            return detection.has_package(package);
        }
        env.probe
            .run(&CommandSpec::argv(["rpm", "-q", package]))
            .success()
    }

    fn remove(&self, env: &RunEnv<'_>, package: &str) -> CommandResult {
        if env.os_key.is_windows() {
            return env.runner.run(&self.product_uninstall(env));
        }
        env.runner.run(&CommandSpec::argv(["rpm", "-e", package]))
    }

    fn force_remove(&self, env: &RunEnv<'_>, package: &str) -> CommandResult {
        if env.os_key.is_windows() {
            return env.runner.run(&self.product_uninstall(env));
        }
        env.runner
            .run(&CommandSpec::argv(["rpm", "-e", "--nodeps", "--noscripts", package]))
    }

    fn restore(
        &self,
        env: &RunEnv<'_>,
        backup: Option<&BackupSet>,
        packages: &[String],
        previous_version: Option<&str>,
    ) -> Vec<PackageStep> {
        if !env.os_key.is_windows() {
            return self.restore_rpms(env, backup, packages, previous_version);
        }
        match previous_installer(env, backup, previous_version) {
            Some(installer) => steps_for(packages, "reinstall", &self.deploy_setup(env, &installer)),
            None => steps_for(
                packages,
                "reinstall",
                &Err(Error::ArtifactVersionNotFound(
                    previous_version.unwrap_or("previous").to_string(),
                )),
            ),
        }
    }
}

fn rpm_files(env: &RunEnv<'_>, dir: &Path) -> Vec<PathBuf> {
    match env.host.list_dir(dir) {
        Ok(entries) => entries
            .into_iter()
            .filter(|e| e.is_file && e.name.to_ascii_lowercase().ends_with(".rpm"))
            .map(|e| e.path)
            .collect(),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "no package files");
            Vec::new()
        }
    }
}

/// Tracked `.rpm` files in `dir`, in install order.
fn staged_packages(env: &RunEnv<'_>, dir: &Path) -> Vec<PathBuf> {
    let files = rpm_files(env, dir);
    let ordered: Vec<PathBuf> = env
        .component
        .install_order()
        .iter()
        .filter_map(|package| find_package(&files, package).map(Path::to_path_buf))
        .collect();
    if ordered.len() < files.len() {
        debug!(
            dir = %dir.display(),
            skipped = files.len() - ordered.len(),
            "ignoring untracked package files"
        );
    }
    ordered
}

fn find_package<'a>(files: &'a [PathBuf], package: &str) -> Option<&'a Path> {
    files
        .iter()
        .find(|f| {
            f.file_name()
                .map(|n| matches_package(&n.to_string_lossy(), package))
                .unwrap_or(false)
        })
        .map(PathBuf::as_path)
}
