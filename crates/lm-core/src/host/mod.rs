//! Host boundary.
//!
//! [`HostOps`] is the only way business logic touches the machine: process
//! execution, filesystem reads and mutations, free space, privilege, registry,
//! and raw OS facts. [`SystemHost`] implements it for the real platform,
//! [`DryRunHost`] wraps another host and turns every mutation into a logged
//! no-op, and `FakeHost` (tests) keeps everything in memory.

pub mod dry_run;
mod process;
pub mod system;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use dry_run::DryRunHost;
pub use system::SystemHost;

#[cfg(any(test, feature = "test-utils"))]
pub use fake::{FakeHost, Mutation};

use lm_common::OsFacts;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A process to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Program plus arguments, no shell involved.
    Argv { program: String, args: Vec<String> },
    /// A whole command line handed to the platform shell.
    Shell(String),
}

impl Invocation {
    pub fn argv<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::Argv {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Command line as it would be typed.
    pub fn render(&self) -> String {
        match self {
            Invocation::Argv { program, args } => std::iter::once(program.as_str())
                .chain(args.iter().map(String::as_str))
                .map(quote_if_needed)
                .collect::<Vec<_>>()
                .join(" "),
            Invocation::Shell(line) => line.clone(),
        }
    }
}

fn quote_if_needed(s: &str) -> String {
    if s.is_empty() || s.contains(char::is_whitespace) {
        format!("\"{}\"", s)
    } else {
        s.to_string()
    }
}

/// Captured process result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code; `None` when killed by a signal.
    pub rc: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        ExecOutput {
            rc: Some(0),
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failed(rc: i32, stderr: impl Into<String>) -> Self {
        ExecOutput {
            rc: Some(rc),
            stderr: stderr.into(),
            ..Default::default()
        }
    }
}

/// One entry from [`HostOps::list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_file: bool,
}

/// Everything the lifecycle manager needs from the machine it runs on.
pub trait HostOps {
    /// Raw facts used to derive the platform key.
    fn os_facts(&self) -> OsFacts;

    /// Run a process to completion (or until `timeout`).
    ///
    /// `Err` means the process could not be started at all.
    fn execute(&self, invocation: &Invocation, timeout: Option<Duration>) -> io::Result<ExecOutput>;

    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Immediate children of `path`, sorted by name.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.read(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory tree. Missing paths are not an error.
    fn remove_tree(&self, path: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn set_executable(&self, path: &Path) -> io::Result<()>;

    /// Bytes available to unprivileged users on the volume holding `path`.
    fn free_bytes(&self, path: &Path) -> io::Result<u64>;

    /// Root on Unix, elevated Administrator on Windows.
    fn is_privileged(&self) -> bool;

    /// Read a registry value (`HKLM\...`). `None` off Windows or when absent.
    fn registry_value(&self, key: &str, value: &str) -> Option<String>;
}

impl<T: HostOps + ?Sized> HostOps for &T {
    fn os_facts(&self) -> OsFacts {
        (**self).os_facts()
    }
    fn execute(&self, invocation: &Invocation, timeout: Option<Duration>) -> io::Result<ExecOutput> {
        (**self).execute(invocation, timeout)
    }
    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
    fn is_dir(&self, path: &Path) -> bool {
        (**self).is_dir(path)
    }
    fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        (**self).list_dir(path)
    }
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        (**self).read(path)
    }
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        (**self).create_dir_all(path)
    }
    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        (**self).remove_tree(path)
    }
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        (**self).remove_file(path)
    }
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        (**self).copy_file(from, to)
    }
    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        (**self).write_file(path, contents)
    }
    fn set_executable(&self, path: &Path) -> io::Result<()> {
        (**self).set_executable(path)
    }
    fn free_bytes(&self, path: &Path) -> io::Result<u64> {
        (**self).free_bytes(path)
    }
    fn is_privileged(&self) -> bool {
        (**self).is_privileged()
    }
    fn registry_value(&self, key: &str, value: &str) -> Option<String> {
        (**self).registry_value(key, value)
    }
}

/// The root (anchor) of the volume that holds `path`.
///
/// `/opt/ba-server` gives `/`, `C:\Program Files\X` gives `C:\`. Relative
/// paths resolve to `.`.
pub fn volume_root(path: &Path) -> PathBuf {
    match path.ancestors().last() {
        Some(root) if !root.as_os_str().is_empty() => root.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
