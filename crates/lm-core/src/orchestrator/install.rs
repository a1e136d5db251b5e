use super::{preflight, stage, verify::verify, versions_match, Flow};
use crate::logging::events::{event_names, Stage};
use crate::recovery::RollbackRequest;
use lm_common::{Artifact, Error, Mode, OperationResult};
use lm_config::InstallConflictPolicy;
use tracing::{debug, info};

/// What discovery decided Install should do.
enum Decision {
    Deploy(Artifact),
    AlreadyInstalled(String),
    HandOffToUpgrade,
}

impl<'f, 'a> Flow<'f, 'a> {
    pub(super) fn install(&self) -> OperationResult {
        let ctx = self.ctx();
        {
            let _stage = stage(Stage::Preflight);
            if let Err(e) = preflight::run(self.env).into_result() {
                return OperationResult::failed(ctx, &e);
            }
        }

        let decision = {
            let _stage = stage(Stage::Discover);
            self.decide_install()
        };
        let artifact = match decision {
            Ok(Decision::Deploy(artifact)) => artifact,
            Ok(Decision::AlreadyInstalled(version)) => {
                return OperationResult::unchanged(
                    ctx,
                    format!("{} is already installed at {}", ctx.component_id, version),
                )
                .with_versions(Some(version.clone()), Some(version));
            }
            Ok(Decision::HandOffToUpgrade) => {
                info!("installed at another version, handing off to upgrade");
                let mut result = self.upgrade();
                result.mode = Mode::Install;
                return result;
            }
            Err(e) => return OperationResult::failed(ctx, &e),
        };
        let target = artifact.version_label.clone();

        if let Err(e) = self.recreate_install_dir() {
            return OperationResult::failed(ctx, &e);
        }

        let deployed = {
            let _stage = stage(Stage::Deploy);
            self.driver.deploy(self.env, &artifact)
        };
        if let Err(e) = deployed {
            return self.roll_back(&e, RollbackRequest::new(Mode::Install));
        }

        let verification = {
            let _stage = stage(Stage::Verify);
            verify(self.env, Some(&target))
        };
        if !verification.passed {
            let err = Error::VerifyFailed(verification.error.unwrap_or_default());
            return self.roll_back(&err, RollbackRequest::new(Mode::Install));
        }

        let _stage = stage(Stage::Finish);
        let version = verification.version.unwrap_or(target);
        self.finish_marker(&version);
        self.start_services();
        OperationResult::changed(
            ctx,
            format!("installed {} {}", ctx.component_id, version),
        )
        .with_versions(None, Some(version))
    }

    /// Compare the installed state with the request and pick the artifact.
    ///
    /// An explicit version that is already installed short-circuits before
    /// the artifact dir is read, so a repeated install needs no artifacts.
    fn decide_install(&self) -> lm_common::Result<Decision> {
        let ctx = self.ctx();
        let detection = self.env.detect();
        let installed = detection
            .status
            .then(|| self.installed_version(&detection).unwrap_or_else(|| "unknown".to_string()));

        if let (Some(installed), Some(wanted)) = (&installed, ctx.desired_version.as_deref()) {
            if versions_match(installed, wanted) {
                return Ok(Decision::AlreadyInstalled(installed.clone()));
            }
        }

        let resolution = self.env.resolver().find_best(
            &self.env.os_key,
            &ctx.artifacts_base_dir,
            ctx.desired_version.as_deref(),
        )?;
        let artifact = resolution.artifact;

        let Some(installed) = installed else {
            debug!(artifact = %artifact.file_name(), "not installed, deploying");
            return Ok(Decision::Deploy(artifact));
        };
        if versions_match(&installed, &artifact.version_label) {
            return Ok(Decision::AlreadyInstalled(installed));
        }

        info!(
            target: event_names::DETECT_RESULT,
            installed = %installed,
            requested = %artifact.version_label,
            policy = ?self.env.config.policy.install_on_different_version,
            "installed at a different version"
        );
        match self.env.config.policy.install_on_different_version {
            InstallConflictPolicy::Fail => Err(Error::VersionConflict {
                installed,
                requested: artifact.version_label,
            }),
            InstallConflictPolicy::Upgrade => Ok(Decision::HandOffToUpgrade),
        }
    }
}
