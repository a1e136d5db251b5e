//! Platform fact detection and key resolution.

use crate::host::HostOps;
use lm_common::{OsFacts, OsKey};
use std::collections::BTreeMap;
use std::fs;
use tracing::debug;

const OS_RELEASE: &str = "/etc/os-release";

/// Detect raw facts for the running host.
pub fn detect_facts() -> OsFacts {
    let family = detect_family();
    let distro_id = if family == "Linux" {
        fs::read_to_string(OS_RELEASE)
            .ok()
            .and_then(|text| parse_os_release(&text).remove("ID"))
    } else {
        None
    };
    OsFacts {
        family,
        distro_id,
        arch: detect_arch(),
    }
}

fn detect_family() -> String {
    match std::env::consts::OS {
        "linux" => "Linux".to_string(),
        "windows" => "Windows".to_string(),
        "aix" => "AIX".to_string(),
        other => other.to_string(),
    }
}

fn detect_arch() -> String {
    match std::env::consts::ARCH {
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le".to_string(),
        other => other.to_string(),
    }
}

/// Parse `KEY=value` lines from an os-release file. Quotes are stripped.
pub fn parse_os_release(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| {
            (
                k.trim().to_string(),
                v.trim().trim_matches(|c| c == '"' || c == '\'').to_string(),
            )
        })
        .collect()
}

/// Resolve the platform key for a host, once per run.
pub fn resolve_os_key(host: &dyn HostOps) -> (OsFacts, OsKey) {
    let facts = host.os_facts();
    let key = facts.os_key();
    debug!(
        family = %facts.family,
        distro = facts.distro_id.as_deref().unwrap_or("-"),
        arch = %facts.arch,
        os_key = %key,
        "resolved platform key"
    );
    (facts, key)
}
