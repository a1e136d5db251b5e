//! `VERSION` marker inside the install directory.
//!
//! A local cache next to the authoritative tracker query. Written after a
//! verified deploy, removed after a full uninstall.

use crate::host::HostOps;
use std::io;
use std::path::{Path, PathBuf};

pub const MARKER_FILE: &str = "VERSION";

pub fn marker_path(install_dir: &Path) -> PathBuf {
    install_dir.join(MARKER_FILE)
}

/// Recorded version, if the marker exists and is non-empty.
pub fn read_marker(host: &dyn HostOps, install_dir: &Path) -> Option<String> {
    host.read_to_string(&marker_path(install_dir))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn write_marker(host: &dyn HostOps, install_dir: &Path, version: &str) -> io::Result<()> {
    host.write_file(&marker_path(install_dir), format!("{}\n", version).as_bytes())
}

pub fn remove_marker(host: &dyn HostOps, install_dir: &Path) -> io::Result<()> {
    let path = marker_path(install_dir);
    if !host.exists(&path) {
        return Ok(());
    }
    host.remove_file(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakeHost;

    #[test]
    fn test_marker_round_trip() {
        let host = FakeHost::linux();
        let dir = Path::new("/opt/ba-server");
        assert_eq!(read_marker(&host, dir), None);

        write_marker(&host, dir, "8.1.20").unwrap();
        assert_eq!(read_marker(&host, dir).as_deref(), Some("8.1.20"));

        remove_marker(&host, dir).unwrap();
        assert_eq!(read_marker(&host, dir), None);
        // second remove is a no-op
        remove_marker(&host, dir).unwrap();
    }

    #[test]
    fn test_blank_marker_is_none() {
        let host = FakeHost::linux();
        host.add_file("/opt/x/VERSION", b"  \n");
        assert_eq!(read_marker(&host, Path::new("/opt/x")), None);
    }
}
