//! Lifecycle orchestration: the install, upgrade, and uninstall flows.
//!
//! A run is strictly sequential. Discovery informs the decision, the decision
//! informs the deploy, and the deploy outcome informs verify-or-rollback.
//! Every flow ends in a single [`OperationResult`]; nothing below this module
//! panics on host faults.

mod install;
pub mod preflight;
mod uninstall;
mod upgrade;
pub mod verify;


pub use preflight::{PreflightCheck, PreflightReport};
pub use verify::VerificationResult;

use crate::detect::Detection;
use crate::driver::{driver_for, PackageDriver};
use crate::env::RunEnv;
use crate::host::{DryRunHost, HostOps};
use crate::logging::events::{event_names, Stage};
use crate::marker::read_marker;
use crate::platform::resolve_os_key;
use crate::recovery::{RollbackHandler, RollbackManager, RollbackRequest};
use crate::runner::CommandRunner;
use lm_common::{Error, Mode, OperationContext, OperationResult, Result, Version};
use lm_config::LifecycleConfig;
use tracing::span::EnteredSpan;
use tracing::{error, info, info_span, warn};

/// Runs lifecycle operations against one host.
pub struct Orchestrator<'h> {
    host: &'h dyn HostOps,
    config: &'h LifecycleConfig,
    rollback: Box<dyn RollbackHandler + 'h>,
}

impl<'h> Orchestrator<'h> {
    pub fn new(host: &'h dyn HostOps, config: &'h LifecycleConfig) -> Self {
        Orchestrator {
            host,
            config,
            rollback: Box::new(RollbackManager),
        }
    }

    /// Replace the rollback implementation.
    pub fn with_rollback_handler(mut self, handler: impl RollbackHandler + 'h) -> Self {
        self.rollback = Box::new(handler);
        self
    }

    /// Execute one operation end to end.
    pub fn run(&self, ctx: &OperationContext) -> OperationResult {
        let span = info_span!(
            "run",
            run_id = %ctx.run_id,
            mode = %ctx.mode,
            component = %ctx.component_id
        );
        let _guard = span.enter();
        info!(
            target: event_names::RUN_STARTED,
            dry_run = ctx.dry_run,
            desired_version = ctx.desired_version.as_deref().unwrap_or("latest"),
            "starting {} of {}",
            ctx.mode,
            ctx.component_id
        );

        let result = self
            .with_env(ctx, |env| {
                let driver = driver_for(env.component);
                let flow = Flow {
                    env,
                    driver: driver.as_ref(),
                    rollback: self.rollback.as_ref(),
                };
                match env.ctx.mode {
                    Mode::Install => flow.install(),
                    Mode::Upgrade => flow.upgrade(),
                    Mode::Uninstall => flow.uninstall(),
                }
            })
            .unwrap_or_else(|e| {
                error!(error = %e, "run could not start");
                OperationResult::failed(ctx, &e)
            });

        if result.success {
            info!(
                target: event_names::RUN_FINISHED,
                outcome = %result.outcome,
                changed = result.changed,
                "{}",
                result.message
            );
        } else {
            error!(
                target: event_names::RUN_FINISHED,
                outcome = %result.outcome,
                rollback_performed = result.rollback_performed,
                error_code = result.error_code.unwrap_or_default(),
                "{}",
                result.message
            );
        }
        result
    }

    /// Precondition report without acting on it.
    pub fn preflight(&self, ctx: &OperationContext) -> Result<PreflightReport> {
        self.with_env(ctx, preflight::run)
    }

    /// Installed state plus the version marker.
    pub fn status(&self, ctx: &OperationContext) -> Result<(Detection, Option<String>)> {
        self.with_env(ctx, |env| {
            let detection = env.detect();
            let marker = read_marker(env.probe_host, &env.ctx.install_dir);
            (detection, marker)
        })
    }

    /// Resolve platform, component, and install dir, then hand `f` a
    /// [`RunEnv`]. Dry runs get a mutating pair that never touches the host.
    fn with_env<T>(&self, ctx: &OperationContext, f: impl FnOnce(&RunEnv<'_>) -> T) -> Result<T> {
        let init = stage(Stage::Init);
        let (facts, os_key) = resolve_os_key(self.host);
        let component = self
            .config
            .component(&ctx.component_id)
            .ok_or_else(|| Error::UnknownComponent(ctx.component_id.clone()))?;

        let mut ctx = ctx.clone();
        if ctx.install_dir.as_os_str().is_empty() {
            ctx.install_dir = self
                .config
                .install_dir_for(&os_key)
                .ok_or_else(|| Error::UnsupportedPlatform(os_key.to_string()))?;
        }

        let dry_host = DryRunHost::new(self.host);
        let host: &dyn HostOps = if ctx.dry_run { &dry_host } else { self.host };
        let timeout = self.config.command_timeout();
        let env = RunEnv {
            ctx: &ctx,
            config: self.config,
            component,
            facts,
            os_key: os_key.clone(),
            host,
            runner: CommandRunner::new(host, os_key.clone())
                .dry_run(ctx.dry_run)
                .timeout(timeout),
            probe_host: self.host,
            probe: CommandRunner::new(self.host, os_key).timeout(timeout),
        };
        drop(init);
        Ok(f(&env))
    }
}

/// One run's flow state: the environment plus the collaborators it drives.
pub(crate) struct Flow<'f, 'a> {
    env: &'f RunEnv<'a>,
    driver: &'f dyn PackageDriver,
    rollback: &'f dyn RollbackHandler,
}

impl<'f, 'a> Flow<'f, 'a> {
    fn ctx(&self) -> &OperationContext {
        self.env.ctx
    }

    /// Run the rollback and attach its report to the original failure.
    fn roll_back(&self, err: &Error, request: RollbackRequest<'_>) -> OperationResult {
        error!(
            target: event_names::DEPLOY_FAILED,
            error = %err,
            code = err.code(),
            "{} failed, rolling back",
            self.ctx().mode
        );
        let report = {
            let _stage = stage(Stage::Rollback);
            self.rollback.rollback(self.env, self.driver, &request)
        };
        OperationResult::failed(self.ctx(), err)
            .with_rollback(report)
            .mark_changed()
    }

    /// Empty the install dir and recreate it.
    fn recreate_install_dir(&self) -> Result<()> {
        let dir = &self.ctx().install_dir;
        self.env.host.remove_tree(dir)?;
        self.env.host.create_dir_all(dir)?;
        Ok(())
    }

    /// Tracker version, else the marker left by the last verified deploy.
    fn installed_version(&self, detection: &Detection) -> Option<String> {
        detection
            .version
            .clone()
            .or_else(|| read_marker(self.env.probe_host, &self.ctx().install_dir))
    }

    fn finish_marker(&self, version: &str) {
        if let Err(e) = crate::marker::write_marker(self.env.host, &self.ctx().install_dir, version) {
            warn!(error = %e, "could not write version marker");
        }
    }

    fn start_services(&self) {
        for warning in crate::services::start_all(&self.env.runner, self.env.component) {
            warn!("{}", warning);
        }
    }
}

/// Enter a stage span. The JSONL layer reports its `stage` on every event.
pub(crate) fn stage(stage: Stage) -> EnteredSpan {
    info_span!("stage", stage = %stage).entered()
}

/// Whether an installed version string is the wanted one. Build suffixes on
/// the installed side are ignored.
pub(crate) fn versions_match(installed: &str, wanted: &str) -> bool {
    if installed == wanted {
        return true;
    }
    match (Version::parse_lenient(installed), Version::parse_lenient(wanted)) {
        (Some(i), Some(w)) => i.satisfies(&w),
        _ => false,
    }
}
