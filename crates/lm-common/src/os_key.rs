//! Platform key resolution.
//!
//! Raw OS facts collapse into an [`OsKey`] exactly once per run. Every other
//! component takes the key as an opaque parameter for path, extension, and
//! command-dialect selection instead of re-deriving it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distro ids that share the RHEL package conventions.
pub const RHEL_FAMILY: &[&str] = &["rhel", "centos", "rocky", "almalinux", "oraclelinux"];

/// Raw facts about the host operating system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsFacts {
    /// OS family as reported by the platform (e.g. "Linux", "Windows", "AIX").
    pub family: String,
    /// Distro id from `/etc/os-release` (Linux only).
    pub distro_id: Option<String>,
    /// CPU architecture (e.g. "x86_64").
    pub arch: String,
}

impl OsFacts {
    /// Resolve these facts to a platform key.
    pub fn os_key(&self) -> OsKey {
        OsKey::resolve(&self.family, self.distro_id.as_deref())
    }
}

/// Normalized platform identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OsKey {
    Windows,
    Linux,
    Rhel,
    Aix,
    Unknown,
    /// A family with no dedicated mapping, kept lowercased for diagnostics.
    /// Downstream lookups treat it like [`OsKey::Unknown`].
    Other(String),
}

impl OsKey {
    /// Map an OS family and optional distro id to a key.
    ///
    /// Never fails: anything unrecognized yields [`OsKey::Other`] carrying the
    /// lowercased family, or [`OsKey::Unknown`] when the family is empty.
    pub fn resolve(family: &str, distro_id: Option<&str>) -> OsKey {
        let family = family.trim().to_ascii_lowercase();
        match family.as_str() {
            "" => OsKey::Unknown,
            "windows" => OsKey::Windows,
            "linux" => {
                let distro = distro_id
                    .map(|d| d.trim().trim_matches('"').to_ascii_lowercase())
                    .unwrap_or_default();
                if RHEL_FAMILY.contains(&distro.as_str()) {
                    OsKey::Rhel
                } else {
                    OsKey::Linux
                }
            }
            "aix" | "unix" => OsKey::Aix,
            _ => OsKey::from(family),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OsKey::Windows => "windows",
            OsKey::Linux => "linux",
            OsKey::Rhel => "rhel",
            OsKey::Aix => "aix",
            OsKey::Unknown => "unknown",
            OsKey::Other(s) => s,
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, OsKey::Windows)
    }

    /// Linux, RHEL-family, and AIX hosts.
    pub fn is_unix_family(&self) -> bool {
        matches!(self, OsKey::Linux | OsKey::Rhel | OsKey::Aix)
    }

    /// Linux hosts (any distro).
    pub fn is_linux(&self) -> bool {
        matches!(self, OsKey::Linux | OsKey::Rhel)
    }

    /// Installer file extension for this platform, including the dot.
    ///
    /// `None` for keys without an installer mapping.
    pub fn installer_extension(&self) -> Option<&'static str> {
        match self {
            OsKey::Windows => Some(".exe"),
            OsKey::Linux | OsKey::Rhel | OsKey::Aix => Some(".bin"),
            OsKey::Unknown | OsKey::Other(_) => None,
        }
    }
}

impl fmt::Display for OsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for OsKey {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" => OsKey::Windows,
            "linux" => OsKey::Linux,
            "rhel" => OsKey::Rhel,
            "aix" => OsKey::Aix,
            "" | "unknown" => OsKey::Unknown,
            other => OsKey::Other(other.to_string()),
        }
    }
}

impl From<OsKey> for String {
    fn from(key: OsKey) -> Self {
        key.as_str().to_string()
    }
}

impl FromStr for OsKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(OsKey::from(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_table() {
        let cases: &[(&str, Option<&str>, OsKey)] = &[
            ("Windows", None, OsKey::Windows),
            ("WINDOWS", Some("ignored"), OsKey::Windows),
            ("Linux", Some("rhel"), OsKey::Rhel),
            ("linux", Some("CentOS"), OsKey::Rhel),
            ("Linux", Some("rocky"), OsKey::Rhel),
            ("Linux", Some("almalinux"), OsKey::Rhel),
            ("Linux", Some("\"oraclelinux\""), OsKey::Rhel),
            ("Linux", Some("ubuntu"), OsKey::Linux),
            ("Linux", Some("sles"), OsKey::Linux),
            ("Linux", None, OsKey::Linux),
            ("AIX", None, OsKey::Aix),
            ("Unix", None, OsKey::Aix),
            ("Darwin", None, OsKey::Other("darwin".into())),
            ("", None, OsKey::Unknown),
            ("   ", Some("rhel"), OsKey::Unknown),
        ];
        for (family, distro, expected) in cases {
            assert_eq!(
                &OsKey::resolve(family, *distro),
                expected,
                "family={family:?} distro={distro:?}"
            );
        }
    }

    #[test]
    fn test_extensions() {
        assert_eq!(OsKey::Windows.installer_extension(), Some(".exe"));
        assert_eq!(OsKey::Rhel.installer_extension(), Some(".bin"));
        assert_eq!(OsKey::Aix.installer_extension(), Some(".bin"));
        assert_eq!(OsKey::Unknown.installer_extension(), None);
        assert_eq!(OsKey::Other("darwin".into()).installer_extension(), None);
    }

    #[test]
    fn test_serde_as_plain_string() {
        let json = serde_json::to_string(&OsKey::Rhel).unwrap();
        assert_eq!(json, "\"rhel\"");
        let back: OsKey = serde_json::from_str("\"freebsd\"").unwrap();
        assert_eq!(back, OsKey::Other("freebsd".into()));
    }

    #[test]
    fn test_facts_to_key() {
        let facts = OsFacts {
            family: "linux".into(),
            distro_id: Some("rocky".into()),
            arch: "x86_64".into(),
        };
        assert_eq!(facts.os_key(), OsKey::Rhel);
    }
}
