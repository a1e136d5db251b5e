use super::{preflight, stage, verify::verify, Flow};
use crate::logging::events::Stage;
use crate::recovery::RollbackRequest;
use lm_common::{Error, Mode, OperationResult, Version};
use tracing::{info, warn};

impl<'f, 'a> Flow<'f, 'a> {
    pub(super) fn upgrade(&self) -> OperationResult {
        let ctx = self.ctx();
        {
            let _stage = stage(Stage::Preflight);
            if let Err(e) = preflight::run(self.env).into_result() {
                return OperationResult::failed(ctx, &e);
            }
        }

        let discover = stage(Stage::Discover);
        let detection = self.env.detect();
        if !detection.status {
            return OperationResult::failed(ctx, &Error::NotInstalled("upgrade".to_string()));
        }
        let previous = self.installed_version(&detection);
        let current = previous.as_deref().and_then(Version::parse_lenient);

        let artifact = match self.env.resolver().find_best(
            &self.env.os_key,
            &ctx.artifacts_base_dir,
            ctx.desired_version.as_deref(),
        ) {
            Ok(resolution) => resolution.artifact,
            Err(e) if e.is_no_candidate() => {
                info!(error = %e, "no upgrade candidate");
                return OperationResult::unchanged(ctx, format!("nothing to upgrade to: {}", e))
                    .with_versions(previous.clone(), previous);
            }
            Err(e) => return OperationResult::failed(ctx, &e.into()),
        };
        let Some(candidate) = artifact.version.clone() else {
            return OperationResult::unchanged(
                ctx,
                format!(
                    "candidate {} has no comparable version, nothing to upgrade to",
                    artifact.file_name()
                ),
            )
            .with_versions(previous.clone(), previous);
        };
        if !Version::is_newer(current.as_ref(), &candidate) {
            return OperationResult::unchanged(
                ctx,
                format!(
                    "already up to date at {}",
                    previous.as_deref().unwrap_or("unknown version")
                ),
            )
            .with_versions(previous.clone(), previous);
        }
        drop(discover);

        let uninstall = stage(Stage::Uninstall);
        self.stop_services();
        let backup = match self.back_up(previous.as_deref()) {
            Ok(set) => set,
            Err(e) => return OperationResult::failed(ctx, &e),
        };
        let removal = self.remove_packages(&detection);

        let mut request = RollbackRequest::new(Mode::Upgrade);
        request.backup = Some(&backup);
        request.previous_version = previous.clone();
        request.previous_packages = removal.present.clone();
        request.removed = removal.removed.clone();

        if !removal.failed.is_empty() {
            let err = Error::PartialUninstall {
                removed: removal.removed,
                failed: removal.failed,
            };
            drop(uninstall);
            return self
                .roll_back(&err, request)
                .with_versions(previous, Some(candidate.to_string()));
        }
        if let Err(e) = self.recreate_install_dir() {
            drop(uninstall);
            return self
                .roll_back(&e, request)
                .with_versions(previous, Some(candidate.to_string()));
        }
        drop(uninstall);

        let deployed = {
            let _stage = stage(Stage::Deploy);
            self.driver.deploy(self.env, &artifact)
        };
        if let Err(e) = deployed {
            return self
                .roll_back(&e, request)
                .with_versions(previous, Some(candidate.to_string()));
        }

        let verification = {
            let _stage = stage(Stage::Verify);
            verify(self.env, Some(&artifact.version_label))
        };
        if !verification.passed {
            let err = Error::VerifyFailed(verification.error.unwrap_or_default());
            return self
                .roll_back(&err, request)
                .with_versions(previous, Some(candidate.to_string()));
        }

        let _stage = stage(Stage::Finish);
        if let Err(e) = self.env.backups().discard(&backup) {
            warn!(path = %backup.root.display(), error = %e, "could not discard backup set");
        }
        let version = verification
            .version
            .unwrap_or_else(|| artifact.version_label.clone());
        self.finish_marker(&version);
        self.start_services();
        OperationResult::changed(
            ctx,
            format!(
                "upgraded {} from {} to {}",
                ctx.component_id,
                previous.as_deref().unwrap_or("unknown version"),
                version
            ),
        )
        .with_versions(previous, Some(version))
        .with_packages(removal.removed, Vec::new())
    }
}
