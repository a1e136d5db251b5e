//! The real host.

use super::{process, volume_root, DirEntry, ExecOutput, HostOps, Invocation};
use crate::detect::parse::parse_reg_query;
use crate::platform;
use lm_common::OsFacts;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// [`HostOps`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        SystemHost
    }
}

impl HostOps for SystemHost {
    fn os_facts(&self) -> OsFacts {
        platform::detect_facts()
    }

    fn execute(&self, invocation: &Invocation, timeout: Option<Duration>) -> io::Result<ExecOutput> {
        process::run(invocation, timeout)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                is_file,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        match fs::remove_dir_all(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }

    #[cfg(unix)]
    fn set_executable(&self, path: &Path) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
    }

    #[cfg(not(unix))]
    fn set_executable(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn free_bytes(&self, path: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        // The install dir itself may not exist yet; measure the volume root.
        let probe = if path.exists() { path.to_path_buf() } else { volume_root(path) };
        let c_path = CString::new(probe.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: statvfs writes into a zeroed struct we own; c_path is NUL-terminated.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
            return Err(io::Error::last_os_error());
        }
        #[allow(clippy::unnecessary_cast)]
        Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
    }

    #[cfg(not(unix))]
    fn free_bytes(&self, path: &Path) -> io::Result<u64> {
        let root = volume_root(path);
        let drive = root
            .to_string_lossy()
            .chars()
            .next()
            .filter(|c| c.is_ascii_alphabetic())
            .unwrap_or('C');
        let script = format!("(Get-PSDrive -Name {}).Free", drive);
        let out = process::run(
            &Invocation::argv("powershell", ["-NoProfile", "-Command", script.as_str()]),
            Some(Duration::from_secs(30)),
        )?;
        out.stdout
            .trim()
            .parse::<u64>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    #[cfg(unix)]
    fn is_privileged(&self) -> bool {
        // SAFETY: geteuid has no preconditions.
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    fn is_privileged(&self) -> bool {
        // `net session` only succeeds from an elevated prompt.
        process::run(
            &Invocation::argv("net", ["session"]),
            Some(Duration::from_secs(30)),
        )
        .map(|out| out.rc == Some(0))
        .unwrap_or(false)
    }

    fn registry_value(&self, key: &str, value: &str) -> Option<String> {
        if !cfg!(windows) {
            return None;
        }
        let out = process::run(
            &Invocation::argv("reg", ["query", key, "/v", value]),
            Some(Duration::from_secs(30)),
        )
        .ok()?;
        if out.rc != Some(0) {
            return None;
        }
        parse_reg_query(&out.stdout, value)
    }
}
