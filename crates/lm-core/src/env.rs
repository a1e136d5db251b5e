//! Per-run environment shared by the lifecycle flows.

use crate::artifact::ArtifactResolver;
use crate::detect::{Detection, Detector};
use crate::host::HostOps;
use crate::recovery::BackupManager;
use crate::runner::CommandRunner;
use lm_common::{OperationContext, OsFacts, OsKey};
use lm_config::{ComponentSpec, LifecycleConfig};
use std::path::PathBuf;

/// Everything a flow step needs, resolved once per run.
///
/// `host` and `runner` are the mutating pair and honor dry-run. `probe` runs
/// read-only queries (tracker listings, `rpm -q`) against the real host so a
/// dry run still previews against actual state.
pub struct RunEnv<'a> {
    pub ctx: &'a OperationContext,
    pub config: &'a LifecycleConfig,
    pub component: &'a ComponentSpec,
    pub facts: OsFacts,
    pub os_key: OsKey,
    pub host: &'a dyn HostOps,
    pub runner: CommandRunner<'a>,
    pub probe_host: &'a dyn HostOps,
    pub probe: CommandRunner<'a>,
}

impl<'a> RunEnv<'a> {
    pub fn detect(&self) -> Detection {
        Detector::new(self.probe_host, &self.probe, self.config).detect(self.component)
    }

    pub fn resolver(&self) -> ArtifactResolver<'_> {
        ArtifactResolver::new(self.host).case_insensitive(self.config.artifacts.case_insensitive)
    }

    /// Where installers extract to.
    pub fn staging_dir(&self) -> PathBuf {
        self.ctx
            .artifacts_base_dir
            .join(&self.config.artifacts.staging_dir)
    }

    pub fn backups(&self) -> BackupManager<'_> {
        BackupManager::new(self.host, self.config.backup_root())
    }

    pub fn is_dry_run(&self) -> bool {
        self.ctx.dry_run
    }
}

/// Owns what a [`RunEnv`] borrows, for unit tests of single steps.
#[cfg(test)]
pub(crate) struct TestBed {
    pub ctx: OperationContext,
    pub config: LifecycleConfig,
    pub component: ComponentSpec,
}

#[cfg(test)]
impl TestBed {
    pub fn new(component_id: &str, mode: lm_common::Mode) -> Self {
        let config = LifecycleConfig::default();
        let component = config
            .component(component_id)
            .cloned()
            .unwrap_or_else(ComponentSpec::builtin_client);
        TestBed {
            ctx: OperationContext::new(mode, component_id)
                .with_run_id("run-000000000001")
                .with_artifacts_dir("/art")
                .with_install_dir("/opt/ba-server"),
            config,
            component,
        }
    }

    pub fn env<'a>(&'a self, host: &'a dyn HostOps) -> RunEnv<'a> {
        let facts = host.os_facts();
        let os_key = facts.os_key();
        RunEnv {
            ctx: &self.ctx,
            config: &self.config,
            component: &self.component,
            facts,
            os_key: os_key.clone(),
            host,
            runner: CommandRunner::new(host, os_key.clone()),
            probe_host: host,
            probe: CommandRunner::new(host, os_key),
        }
    }
}
