//! Host wrapper that refuses to change anything.

use super::{DirEntry, ExecOutput, HostOps, Invocation};
use crate::logging::events::event_names;
use lm_common::OsFacts;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Forwards reads to the inner host, logs and skips every mutation.
///
/// Processes are never started: a dry run cannot tell a read-only command
/// from a destructive one, so all of them report success with empty output.
pub struct DryRunHost<H> {
    inner: H,
}

impl<H: HostOps> DryRunHost<H> {
    pub fn new(inner: H) -> Self {
        DryRunHost { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    fn skip(&self, action: &str, path: &Path) {
        info!(
            target: event_names::HOST_DRY_RUN,
            action,
            path = %path.display(),
            "[DRY-RUN] Would {} {}",
            action,
            path.display()
        );
    }
}

impl<H: HostOps> HostOps for DryRunHost<H> {
    fn os_facts(&self) -> OsFacts {
        self.inner.os_facts()
    }

    fn execute(&self, invocation: &Invocation, _timeout: Option<Duration>) -> io::Result<ExecOutput> {
        info!(
            target: event_names::HOST_DRY_RUN,
            action = "execute",
            command = %invocation.render(),
            "[DRY-RUN] Would run: {}",
            invocation.render()
        );
        Ok(ExecOutput::ok(""))
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.inner.list_dir(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.skip("create directory", path);
        Ok(())
    }

    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        self.skip("remove directory", path);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.skip("remove file", path);
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        info!(
            target: event_names::HOST_DRY_RUN,
            action = "copy",
            from = %from.display(),
            to = %to.display(),
            "[DRY-RUN] Would copy {} to {}",
            from.display(),
            to.display()
        );
        Ok(0)
    }

    fn write_file(&self, path: &Path, _contents: &[u8]) -> io::Result<()> {
        self.skip("write", path);
        Ok(())
    }

    fn set_executable(&self, path: &Path) -> io::Result<()> {
        self.skip("mark executable", path);
        Ok(())
    }

    fn free_bytes(&self, path: &Path) -> io::Result<u64> {
        self.inner.free_bytes(path)
    }

    fn is_privileged(&self) -> bool {
        self.inner.is_privileged()
    }

    fn registry_value(&self, key: &str, value: &str) -> Option<String> {
        self.inner.registry_value(key, value)
    }
}
