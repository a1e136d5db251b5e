//! Rollback after a failed deploy, verify, or uninstall.
//!
//! Rollback runs in an already-failed context, so nothing here returns an
//! error or panics. Every branch reports what it attempted and what it saw
//! afterwards in a [`RollbackReport`].

use super::backup::{BackupManager, BackupSet};
use crate::detect::Detection;
use crate::driver::{step, PackageDriver};
use crate::env::RunEnv;
use crate::logging::events::event_names;
use lm_common::{Mode, PackageStep, RollbackReport, RollbackStatus};
use tracing::{debug, error, info, info_span, warn};

/// What the failed flow hands to the rollback.
#[derive(Debug, Clone)]
pub struct RollbackRequest<'r> {
    pub mode: Mode,
    pub backup: Option<&'r BackupSet>,
    pub previous_version: Option<String>,
    /// Packages present before the run, in removal order.
    pub previous_packages: Vec<String>,
    /// Packages the run removed before failing, in removal order.
    pub removed: Vec<String>,
}

impl<'r> RollbackRequest<'r> {
    pub fn new(mode: Mode) -> Self {
        RollbackRequest {
            mode,
            backup: None,
            previous_version: None,
            previous_packages: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Restores the prior state after a failure.
pub trait RollbackHandler {
    fn rollback(
        &self,
        env: &RunEnv<'_>,
        driver: &dyn PackageDriver,
        request: &RollbackRequest<'_>,
    ) -> RollbackReport;
}

/// The standard rollback: force-remove after a failed install, reinstall from
/// the backup set after a failed uninstall or upgrade.
#[derive(Debug, Default)]
pub struct RollbackManager;

impl RollbackHandler for RollbackManager {
    fn rollback(
        &self,
        env: &RunEnv<'_>,
        driver: &dyn PackageDriver,
        request: &RollbackRequest<'_>,
    ) -> RollbackReport {
        let span = info_span!("rollback", stage = "rollback");
        let _guard = span.enter();
        info!(
            target: event_names::ROLLBACK_STARTED,
            rollback_type = %request.mode,
            backup = request.backup.map(|b| b.root.display().to_string()).unwrap_or_default(),
            previous_version = request.previous_version.as_deref().unwrap_or("-"),
            "starting {} rollback",
            request.mode
        );

        let report = match request.mode {
            Mode::Install => self.rollback_install(env, driver),
            Mode::Uninstall => self.rollback_uninstall(env, driver, request),
            Mode::Upgrade => self.rollback_upgrade(env, driver, request),
        };

        for step in &report.packages {
            if step.ok() {
                debug!(target: event_names::ROLLBACK_STEP, package = %step.package, action = %step.action, rc = step.rc, "rollback step ok");
            } else {
                warn!(
                    target: event_names::ROLLBACK_STEP,
                    package = %step.package,
                    action = %step.action,
                    rc = step.rc,
                    stderr = %step.stderr,
                    "rollback step failed"
                );
            }
        }
        match report.status {
            RollbackStatus::Restored => info!(
                target: event_names::ROLLBACK_FINISHED,
                status = %report.status,
                "{}",
                report.message
            ),
            RollbackStatus::Warning => warn!(
                target: event_names::ROLLBACK_FINISHED,
                status = %report.status,
                remaining = ?report.remaining,
                "{}",
                report.message
            ),
            RollbackStatus::Failed => error!(
                target: event_names::ROLLBACK_FINISHED,
                status = %report.status,
                "{}",
                report.message
            ),
        }
        report
    }
}

impl RollbackManager {
    /// Force-remove, leaf first, whatever the failed install left behind.
    fn rollback_install(&self, env: &RunEnv<'_>, driver: &dyn PackageDriver) -> RollbackReport {
        let mut report = RollbackReport::new(Mode::Install);
        let order = driver.removal_order(env);

        let before = env.detect();
        report.packages = force_remove_present(env, driver, &order, &before);

        let after = env.detect();
        let remaining = present(env, driver, &order, &after);
        if remaining.is_empty() {
            report.with_status(RollbackStatus::Restored, "no target packages remain")
        } else {
            let message = format!(
                "{} package(s) remain after forced removal: {}",
                remaining.len(),
                remaining.join(", ")
            );
            report.remaining = remaining;
            report.with_status(RollbackStatus::Warning, message)
        }
    }

    /// Reinstall what the partial uninstall removed, in install order.
    fn rollback_uninstall(
        &self,
        env: &RunEnv<'_>,
        driver: &dyn PackageDriver,
        request: &RollbackRequest<'_>,
    ) -> RollbackReport {
        let report = RollbackReport::new(Mode::Uninstall);
        let Some(backup) = request.backup else {
            return report.with_status(
                RollbackStatus::Failed,
                "no backup set available to reinstall from",
            );
        };
        let backups = env.backups();
        let backup = usable(&backups, backup);

        let config_failed = backups.restore_config(&backup);
        if request.removed.is_empty() {
            return report.with_status(RollbackStatus::Restored, "no packages were removed");
        }

        let install_order: Vec<String> = request.removed.iter().rev().cloned().collect();
        let steps = driver.restore(
            env,
            Some(&backup),
            &install_order,
            request.previous_version.as_deref(),
        );
        summarize(report, steps, config_failed.len())
    }

    /// Put the previous version back: configs, forced removal of what is
    /// there now, reinstall from the backup, then look for the old version.
    fn rollback_upgrade(
        &self,
        env: &RunEnv<'_>,
        driver: &dyn PackageDriver,
        request: &RollbackRequest<'_>,
    ) -> RollbackReport {
        let mut report = RollbackReport::new(Mode::Upgrade);
        let backups = env.backups();
        let backup = request.backup.map(|b| usable(&backups, b));

        let config_failed = backup
            .as_ref()
            .map(|b| backups.restore_config(b))
            .unwrap_or_default();

        let order = driver.removal_order(env);
        let current = env.detect();
        report.packages = force_remove_present(env, driver, &order, &current);

        let previous: &[String] = if request.previous_packages.is_empty() {
            &order
        } else {
            &request.previous_packages
        };
        let install_order: Vec<String> = previous.iter().rev().cloned().collect();
        report.packages.extend(driver.restore(
            env,
            backup.as_ref(),
            &install_order,
            request.previous_version.as_deref(),
        ));

        let Some(previous_version) = request.previous_version.as_deref() else {
            return report.with_status(
                RollbackStatus::Warning,
                "previous version unknown, reinstall could not be confirmed",
            );
        };
        let after = env.detect();
        if !after.lists_version(previous_version) {
            let kept = request
                .backup
                .map(|b| format!("; backup set kept at {}", b.root.display()))
                .unwrap_or_default();
            return report.with_status(
                RollbackStatus::Warning,
                format!(
                    "version {} not found in installed packages after reinstall{}",
                    previous_version, kept
                ),
            );
        }

        if let Some(original) = request.backup {
            if let Err(e) = backups.discard(original) {
                warn!(path = %original.root.display(), error = %e, "could not discard backup set");
            }
        }
        let mut message = format!("version {} is installed again", previous_version);
        if !config_failed.is_empty() {
            message.push_str(&format!(
                "; {} config file(s) not restored",
                config_failed.len()
            ));
            return report.with_status(RollbackStatus::Warning, message);
        }
        report.with_status(RollbackStatus::Restored, message)
    }
}

fn present(
    env: &RunEnv<'_>,
    driver: &dyn PackageDriver,
    order: &[String],
    detection: &Detection,
) -> Vec<String> {
    order
        .iter()
        .filter(|p| driver.is_present(env, p, detection))
        .cloned()
        .collect()
}

fn force_remove_present(
    env: &RunEnv<'_>,
    driver: &dyn PackageDriver,
    order: &[String],
    detection: &Detection,
) -> Vec<PackageStep> {
    present(env, driver, order, detection)
        .iter()
        .map(|package| step(package, "force_remove", &driver.force_remove(env, package)))
        .collect()
}

/// The set without package archives that fail their checksum, so a damaged
/// archive is never reinstalled. Config entries stay: `restore_config` checks
/// each copy itself and can fall back to `<file>.bk`.
fn usable(backups: &BackupManager<'_>, set: &BackupSet) -> BackupSet {
    let corrupted = backups.corrupted(set);
    if corrupted.is_empty() {
        return set.clone();
    }
    warn!(
        path = %set.root.display(),
        corrupted = ?corrupted,
        "ignoring backup entries with checksum mismatches"
    );
    let mut clean = set.clone();
    clean.manifest.packages.retain(|e| !corrupted.contains(&e.stored));
    clean
}

fn summarize(mut report: RollbackReport, steps: Vec<PackageStep>, config_failed: usize) -> RollbackReport {
    let failed: Vec<String> = steps
        .iter()
        .filter(|s| !s.ok())
        .map(|s| s.package.clone())
        .collect();
    let total = steps.len();
    report.packages = steps;

    if failed.is_empty() && config_failed == 0 {
        let message = format!("reinstalled {} package(s)", total);
        return report.with_status(RollbackStatus::Restored, message);
    }
    if failed.len() == total {
        let message = format!("no package could be reinstalled: {}", failed.join(", "));
        report.remaining = failed;
        return report.with_status(RollbackStatus::Failed, message);
    }
    let mut message = format!(
        "reinstalled {} of {} package(s)",
        total - failed.len(),
        total
    );
    if !failed.is_empty() {
        message.push_str(&format!("; failed: {}", failed.join(", ")));
    }
    if config_failed > 0 {
        message.push_str(&format!("; {} config file(s) not restored", config_failed));
    }
    report.remaining = failed;
    report.with_status(RollbackStatus::Warning, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::NativeDriver;
    use crate::env::TestBed;
    use crate::host::{ExecOutput, FakeHost, HostOps};
    use crate::recovery::BackupRequest;
    use std::path::PathBuf;

    const LISTING: &str = "TIVsm-BA-8.1.19-0.x86_64\nTIVsm-API64-8.1.19-0.x86_64\n";

    #[test]
    fn test_install_rollback_removes_present_packages_leaf_first() {
        let host = FakeHost::rhel();
        host.respond("rpm -q ", ExecOutput::failed(1, "not installed"));
        // present on the first pass only
        host.respond_once("rpm -q TIVsm-API64", ExecOutput::ok("TIVsm-API64-8.1.20-0.x86_64"));
        host.respond_once("rpm -q gskssl64", ExecOutput::ok("gskssl64-8.0.55.31-0.x86_64"));

        let bed = TestBed::new("client", Mode::Install);
        let env = bed.env(&host);
        let report = RollbackManager.rollback(&env, &NativeDriver, &RollbackRequest::new(Mode::Install));

        assert_eq!(report.status, RollbackStatus::Restored, "{}", report.message);
        assert_eq!(
            host.commands_matching("rpm -e"),
            vec![
                "rpm -e --nodeps --noscripts TIVsm-API64".to_string(),
                "rpm -e --nodeps --noscripts gskssl64".to_string(),
            ]
        );
        assert!(report.packages.iter().all(|s| s.action == "force_remove"));
    }

    #[test]
    fn test_install_rollback_warns_with_remaining() {
        let host = FakeHost::rhel();
        // every package stays present
        let bed = TestBed::new("client", Mode::Install);
        let env = bed.env(&host);
        let report = RollbackManager.rollback(&env, &NativeDriver, &RollbackRequest::new(Mode::Install));
        assert_eq!(report.status, RollbackStatus::Warning);
        assert_eq!(report.remaining.len(), bed.component.removal_order.len());
        assert!(report.message.contains("remain"));
    }

    #[test]
    fn test_uninstall_rollback_needs_backup() {
        let host = FakeHost::rhel();
        let bed = TestBed::new("client", Mode::Uninstall);
        let env = bed.env(&host);
        let mut request = RollbackRequest::new(Mode::Uninstall);
        request.removed = vec!["TIVsm-BAcit".into()];
        let report = RollbackManager.rollback(&env, &NativeDriver, &request);
        assert_eq!(report.status, RollbackStatus::Failed);
        assert!(host.commands().is_empty());
    }

    #[test]
    fn test_uninstall_rollback_reinstalls_removed_in_install_order() {
        let host = FakeHost::rhel();
        host.add_file("/src/TIVsm-BAcit-8.1.19-0.x86_64.rpm", b"cit");
        host.add_file("/src/TIVsm-BAhdw-8.1.19-0.x86_64.rpm", b"hdw");
        let bed = TestBed::new("client", Mode::Uninstall);
        let env = bed.env(&host);
        let set = env
            .backups()
            .create(&BackupRequest {
                component_id: "client",
                run_id: "run-1",
                previous_version: Some("8.1.19.0"),
                config_files: &[],
                packages: &[
                    PathBuf::from("/src/TIVsm-BAcit-8.1.19-0.x86_64.rpm"),
                    PathBuf::from("/src/TIVsm-BAhdw-8.1.19-0.x86_64.rpm"),
                ],
            })
            .unwrap();
        host.clear_log();

        let mut request = RollbackRequest::new(Mode::Uninstall);
        request.backup = Some(&set);
        request.removed = vec!["TIVsm-BAcit".into(), "TIVsm-BAhdw".into()];
        let report = RollbackManager.rollback(&env, &NativeDriver, &request);

        assert_eq!(report.status, RollbackStatus::Restored, "{}", report.message);
        let installs = host.commands_matching("rpm -ivh");
        assert_eq!(installs.len(), 2);
        assert!(installs[0].contains("TIVsm-BAhdw"));
        assert!(installs[1].contains("TIVsm-BAcit"));
    }

    #[test]
    fn test_upgrade_rollback_confirms_version_and_discards_backup() {
        let host = FakeHost::rhel();
        host.add_file("/src/TIVsm-BA-8.1.19-0.x86_64.rpm", b"ba");
        host.add_file("/opt/tivoli/tsm/client/ba/bin/dsm.opt", b"good");
        host.respond("rpm -qa", ExecOutput::ok(LISTING));
        let bed = TestBed::new("client", Mode::Upgrade);
        let env = bed.env(&host);
        let set = env
            .backups()
            .create(&BackupRequest {
                component_id: "client",
                run_id: "run-1",
                previous_version: Some("8.1.19.0"),
                config_files: &bed.component.config_files,
                packages: &[PathBuf::from("/src/TIVsm-BA-8.1.19-0.x86_64.rpm")],
            })
            .unwrap();
        host.add_file("/opt/tivoli/tsm/client/ba/bin/dsm.opt", b"broken");

        let mut request = RollbackRequest::new(Mode::Upgrade);
        request.backup = Some(&set);
        request.previous_version = Some("8.1.19.0".into());
        request.previous_packages = vec!["TIVsm-BA".into()];
        let report = RollbackManager.rollback(&env, &NativeDriver, &request);

        assert_eq!(report.status, RollbackStatus::Restored, "{}", report.message);
        assert_eq!(host.file("/opt/tivoli/tsm/client/ba/bin/dsm.opt").unwrap(), b"good");
        assert!(!host.exists(&set.root));
        assert_eq!(host.commands_matching("rpm -ivh").len(), 1);
    }

    #[test]
    fn test_damaged_config_copy_falls_back_to_bk() {
        let host = FakeHost::rhel();
        host.add_file("/src/TIVsm-BA-8.1.19-0.x86_64.rpm", b"ba");
        host.add_file("/opt/tivoli/tsm/client/ba/bin/dsm.opt", b"good");
        host.respond("rpm -qa", ExecOutput::ok(LISTING));
        let bed = TestBed::new("client", Mode::Upgrade);
        let env = bed.env(&host);
        let set = env
            .backups()
            .create(&BackupRequest {
                component_id: "client",
                run_id: "run-1",
                previous_version: Some("8.1.19.0"),
                config_files: &bed.component.config_files,
                packages: &[PathBuf::from("/src/TIVsm-BA-8.1.19-0.x86_64.rpm")],
            })
            .unwrap();
        host.add_file(&set.manifest.config_files[0].stored, b"truncated");
        host.add_file("/opt/tivoli/tsm/client/ba/bin/dsm.opt", b"broken");

        let mut request = RollbackRequest::new(Mode::Upgrade);
        request.backup = Some(&set);
        request.previous_version = Some("8.1.19.0".into());
        request.previous_packages = vec!["TIVsm-BA".into()];
        let report = RollbackManager.rollback(&env, &NativeDriver, &request);

        assert_eq!(report.status, RollbackStatus::Restored, "{}", report.message);
        assert_eq!(host.file("/opt/tivoli/tsm/client/ba/bin/dsm.opt").unwrap(), b"good");
        assert_eq!(host.commands_matching("rpm -ivh").len(), 1);
    }

    #[test]
    fn test_upgrade_rollback_unconfirmed_keeps_backup() {
        let host = FakeHost::rhel();
        host.add_file("/src/TIVsm-BA-8.1.19-0.x86_64.rpm", b"ba");
        host.respond("rpm -qa", ExecOutput::ok("TIVsm-BA-8.1.20-0.x86_64\n"));
        let bed = TestBed::new("client", Mode::Upgrade);
        let env = bed.env(&host);
        let set = env
            .backups()
            .create(&BackupRequest {
                component_id: "client",
                run_id: "run-1",
                previous_version: Some("8.1.19.0"),
                config_files: &[],
                packages: &[PathBuf::from("/src/TIVsm-BA-8.1.19-0.x86_64.rpm")],
            })
            .unwrap();

        let mut request = RollbackRequest::new(Mode::Upgrade);
        request.backup = Some(&set);
        request.previous_version = Some("8.1.19.0".into());
        let report = RollbackManager.rollback(&env, &NativeDriver, &request);

        assert_eq!(report.status, RollbackStatus::Warning);
        assert!(report.message.contains("backup set kept"));
        assert!(host.exists(&set.root));
    }

    #[test]
    fn test_corrupted_archive_is_not_reinstalled() {
        let host = FakeHost::rhel();
        host.add_file("/src/TIVsm-BAcit-8.1.19-0.x86_64.rpm", b"cit");
        let bed = TestBed::new("client", Mode::Uninstall);
        let env = bed.env(&host);
        let set = env
            .backups()
            .create(&BackupRequest {
                component_id: "client",
                run_id: "run-1",
                previous_version: None,
                config_files: &[],
                packages: &[PathBuf::from("/src/TIVsm-BAcit-8.1.19-0.x86_64.rpm")],
            })
            .unwrap();
        host.add_file(&set.manifest.packages[0].stored, b"garbage");
        host.clear_log();

        let mut request = RollbackRequest::new(Mode::Uninstall);
        request.backup = Some(&set);
        request.removed = vec!["TIVsm-BAcit".into()];
        let report = RollbackManager.rollback(&env, &NativeDriver, &request);

        assert_eq!(report.status, RollbackStatus::Failed);
        assert!(host.commands_matching("rpm -ivh").is_empty());
    }
}
