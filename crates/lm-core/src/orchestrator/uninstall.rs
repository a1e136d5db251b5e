use super::{preflight, stage, Flow};
use crate::detect::Detection;
use crate::logging::events::{event_names, Stage};
use crate::marker::remove_marker;
use crate::recovery::{BackupRequest, BackupSet, RollbackRequest};
use crate::services::stop_all;
use lm_common::{Error, Mode, OperationResult, Result};
use lm_config::PartialUninstallPolicy;
use tracing::{debug, info, warn};

/// Outcome of walking the removal order.
#[derive(Debug, Default)]
pub(super) struct Removal {
    /// Present before the walk, in removal order.
    pub present: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

impl<'f, 'a> Flow<'f, 'a> {
    pub(super) fn uninstall(&self) -> OperationResult {
        let ctx = self.ctx();
        {
            let _stage = stage(Stage::Preflight);
            if let Err(e) = preflight::run(self.env).into_result() {
                return OperationResult::failed(ctx, &e);
            }
        }

        let detection = {
            let _stage = stage(Stage::Discover);
            self.env.detect()
        };
        if !detection.status {
            return OperationResult::unchanged(
                ctx,
                format!("{} is not installed, nothing to do", ctx.component_id),
            );
        }
        let previous = self.installed_version(&detection);

        let _stage = stage(Stage::Uninstall);
        self.stop_services();
        let backup = match self.back_up(previous.as_deref()) {
            Ok(set) => set,
            Err(e) => return OperationResult::failed(ctx, &e),
        };

        let removal = self.remove_packages(&detection);
        if !removal.failed.is_empty() {
            let err = Error::PartialUninstall {
                removed: removal.removed.clone(),
                failed: removal.failed.clone(),
            };
            return match self.env.config.policy.partial_uninstall {
                PartialUninstallPolicy::Preserve => {
                    let mut result = OperationResult::failed(ctx, &err)
                        .with_versions(previous, None)
                        .with_packages(removal.removed, removal.failed)
                        .mark_changed();
                    result.message = format!(
                        "{}; backup set kept at {}",
                        result.message,
                        backup.root.display()
                    );
                    result
                }
                PartialUninstallPolicy::Rollback => {
                    let mut request = RollbackRequest::new(Mode::Uninstall);
                    request.backup = Some(&backup);
                    request.previous_version = previous.clone();
                    request.previous_packages = removal.present.clone();
                    request.removed = removal.removed.clone();
                    self.roll_back(&err, request)
                        .with_versions(previous, None)
                        .with_packages(removal.removed, removal.failed)
                }
            };
        }

        if let Err(e) = self.env.backups().discard(&backup) {
            warn!(path = %backup.root.display(), error = %e, "could not discard backup set");
        }
        if let Err(e) = remove_marker(self.env.host, &ctx.install_dir) {
            warn!(error = %e, "could not remove version marker");
        }
        OperationResult::changed(
            ctx,
            format!(
                "removed {} package(s) of {}",
                removal.removed.len(),
                ctx.component_id
            ),
        )
        .with_versions(previous, None)
        .with_packages(removal.removed, Vec::new())
    }

    /// Best-effort: a service that will not stop is only a warning.
    pub(super) fn stop_services(&self) {
        for warning in stop_all(&self.env.runner, self.env.component) {
            warn!("{}", warning);
        }
    }

    /// Archive config files and whatever can reinstall the current version.
    pub(super) fn back_up(&self, previous: Option<&str>) -> Result<BackupSet> {
        let packages = self.driver.archive_sources(self.env, previous);
        self.env.backups().create(&BackupRequest {
            component_id: &self.ctx().component_id,
            run_id: &self.ctx().run_id,
            previous_version: previous,
            config_files: &self.env.component.config_files,
            packages: &packages,
        })
    }

    /// Remove every present package in removal order. A failure does not
    /// stop the walk; later packages are still attempted.
    pub(super) fn remove_packages(&self, detection: &Detection) -> Removal {
        let mut removal = Removal::default();
        for package in self.driver.removal_order(self.env) {
            if !self.driver.is_present(self.env, &package, detection) {
                debug!(package = %package, "not installed, skipping");
                continue;
            }
            removal.present.push(package.clone());
            let result = self.driver.remove(self.env, &package);
            if result.success() {
                info!(
                    target: event_names::UNINSTALL_PACKAGE,
                    package = %package,
                    "removed {}",
                    package
                );
                removal.removed.push(package);
            } else {
                warn!(
                    target: event_names::UNINSTALL_PACKAGE,
                    package = %package,
                    rc = result.rc,
                    stderr = %result.error_text(),
                    "could not remove {}",
                    package
                );
                removal.failed.push(package);
            }
        }
        removal
    }
}
