//! Artifact discovery and version selection.
//!
//! Installers follow `<version>-<productTag>-<platformTag>.<ext>`. The text
//! before the first hyphen is the version token. Resolution is read-only: it
//! lists a directory and never moves or deletes anything.

use crate::host::{DirEntry, HostOps};
use crate::logging::events::event_names;
use lm_common::{Artifact, Error, OsKey, Version};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

/// Why no artifact was chosen.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ArtifactError {
    #[error("artifact directory does not exist: {}", .0.display())]
    DirectoryMissing(PathBuf),

    #[error("no files with extension '{extension}' found in {}", .dir.display())]
    NoCandidates { dir: PathBuf, extension: String },

    #[error("no installer found for version '{0}'")]
    VersionNotFound(String),

    #[error("no installer format is known for platform '{0}'")]
    UnsupportedPlatform(String),
}

impl ArtifactError {
    /// The directory exists but holds nothing usable. Upgrade treats this as
    /// "nothing to upgrade to".
    pub fn is_no_candidate(&self) -> bool {
        matches!(
            self,
            ArtifactError::NoCandidates { .. } | ArtifactError::VersionNotFound(_)
        )
    }
}

impl From<ArtifactError> for Error {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::DirectoryMissing(dir) => Error::ArtifactDirectoryMissing(dir),
            ArtifactError::NoCandidates { dir, extension } => {
                Error::NoArtifactCandidates { dir, extension }
            }
            ArtifactError::VersionNotFound(v) => Error::ArtifactVersionNotFound(v),
            ArtifactError::UnsupportedPlatform(p) => Error::UnsupportedPlatform(p),
        }
    }
}

/// Which branch picked the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Filename starts with the requested `<version>-`.
    ExactVersion,
    /// Highest parseable version token.
    NewestVersion,
    /// No token parsed; lexicographically last filename.
    LexicalFallback,
    /// Highest version not above a ceiling.
    AtMost,
}

/// The chosen artifact plus what else matched.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub artifact: Artifact,
    /// Other files that matched an exact version request.
    pub alternates: Vec<PathBuf>,
    pub selection: Selection,
}

/// Version token of an artifact file name.
///
/// `8.1.20-server-linux.bin` gives `8.1.20`; a name without a hyphen gives
/// its stem.
pub fn version_token(file_name: &str) -> &str {
    match file_name.split_once('-') {
        Some((token, _)) => token,
        None => file_name
            .rsplit_once('.')
            .map_or(file_name, |(stem, _)| stem),
    }
}

pub struct ArtifactResolver<'h> {
    host: &'h dyn HostOps,
    case_insensitive: bool,
}

impl<'h> ArtifactResolver<'h> {
    pub fn new(host: &'h dyn HostOps) -> Self {
        ArtifactResolver {
            host,
            case_insensitive: true,
        }
    }

    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.case_insensitive = yes;
        self
    }

    /// Installer files for `os_key` in `base_dir`, sorted by name.
    pub fn candidates(&self, os_key: &OsKey, base_dir: &Path) -> Result<Vec<DirEntry>, ArtifactError> {
        if !self.host.is_dir(base_dir) {
            return Err(ArtifactError::DirectoryMissing(base_dir.to_path_buf()));
        }
        let extension = os_key
            .installer_extension()
            .ok_or_else(|| ArtifactError::UnsupportedPlatform(os_key.to_string()))?;

        let entries = self
            .host
            .list_dir(base_dir)
            .map_err(|_| ArtifactError::DirectoryMissing(base_dir.to_path_buf()))?;

        let mut matched: Vec<DirEntry> = entries
            .into_iter()
            .filter(|e| e.is_file && self.has_extension(&e.name, extension))
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(
            dir = %base_dir.display(),
            extension,
            count = matched.len(),
            "listed artifact candidates"
        );
        if matched.is_empty() {
            return Err(ArtifactError::NoCandidates {
                dir: base_dir.to_path_buf(),
                extension: extension.to_string(),
            });
        }
        Ok(matched)
    }

    fn has_extension(&self, name: &str, extension: &str) -> bool {
        if self.case_insensitive {
            name.to_ascii_lowercase()
                .ends_with(&extension.to_ascii_lowercase())
        } else {
            name.ends_with(extension)
        }
    }

    /// Pick the installer for `version`, or the newest one when `None`.
    pub fn find_best(
        &self,
        os_key: &OsKey,
        base_dir: &Path,
        version: Option<&str>,
    ) -> Result<Resolution, ArtifactError> {
        let candidates = self.candidates(os_key, base_dir)?;
        let resolution = match version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(wanted) => select_exact(os_key, candidates, wanted)?,
            None => select_newest(os_key, candidates, base_dir),
        };
        info!(
            target: event_names::ARTIFACT_RESOLVED,
            artifact = %resolution.artifact.path.display(),
            version = %resolution.artifact.version_label,
            selection = ?resolution.selection,
            alternates = resolution.alternates.len(),
            "resolved artifact {}",
            resolution.artifact.file_name()
        );
        Ok(resolution)
    }

    /// Newest installer whose version is at or below `ceiling`.
    pub fn find_at_most(
        &self,
        os_key: &OsKey,
        base_dir: &Path,
        ceiling: &Version,
    ) -> Result<Resolution, ArtifactError> {
        let candidates = self.candidates(os_key, base_dir)?;
        let best = parsed(&candidates)
            .filter(|(_, v)| v <= ceiling)
            .fold(None, keep_highest);
        match best {
            Some((entry, _)) => Ok(Resolution {
                artifact: to_artifact(os_key, entry),
                alternates: Vec::new(),
                selection: Selection::AtMost,
            }),
            None => Err(ArtifactError::VersionNotFound(ceiling.to_string())),
        }
    }
}

fn to_artifact(os_key: &OsKey, entry: &DirEntry) -> Artifact {
    artifact_at(os_key, &entry.path)
}

/// Describe an installer file that was found some other way (for example in
/// a backup set).
pub fn artifact_at(os_key: &OsKey, path: &Path) -> Artifact {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let label = version_token(&name).to_string();
    Artifact {
        path: path.to_path_buf(),
        os_key: os_key.clone(),
        version: Version::parse(&label).ok(),
        version_label: label,
    }
}

fn parsed<'a>(candidates: &'a [DirEntry]) -> impl Iterator<Item = (&'a DirEntry, Version)> + 'a {
    candidates
        .iter()
        .filter_map(|e| Version::parse(version_token(&e.name)).ok().map(|v| (e, v)))
}

/// Fold step keeping the highest version. Candidates arrive sorted by name,
/// so on a tie the lexicographically first one stays.
fn keep_highest<'a>(
    best: Option<(&'a DirEntry, Version)>,
    next: (&'a DirEntry, Version),
) -> Option<(&'a DirEntry, Version)> {
    match best {
        Some(b) if b.1 >= next.1 => Some(b),
        _ => Some(next),
    }
}

fn select_exact(
    os_key: &OsKey,
    candidates: Vec<DirEntry>,
    wanted: &str,
) -> Result<Resolution, ArtifactError> {
    let prefix = format!("{}-", wanted);
    let mut matching = candidates
        .into_iter()
        .filter(|e| e.name.starts_with(&prefix));
    let first = matching
        .next()
        .ok_or_else(|| ArtifactError::VersionNotFound(wanted.to_string()))?;
    let alternates: Vec<PathBuf> = matching.map(|e| e.path).collect();
    if !alternates.is_empty() {
        debug!(
            chosen = %first.name,
            alternates = alternates.len(),
            "several installers match the requested version"
        );
    }
    Ok(Resolution {
        artifact: to_artifact(os_key, &first),
        alternates,
        selection: Selection::ExactVersion,
    })
}

fn select_newest(os_key: &OsKey, candidates: Vec<DirEntry>, base_dir: &Path) -> Resolution {
    if let Some((entry, _)) = parsed(&candidates).fold(None, keep_highest) {
        return Resolution {
            artifact: to_artifact(os_key, entry),
            alternates: Vec::new(),
            selection: Selection::NewestVersion,
        };
    }

    // `candidates` is non-empty and sorted.
    let last = &candidates[candidates.len() - 1];
    warn!(
        target: event_names::ARTIFACT_FALLBACK,
        dir = %base_dir.display(),
        chosen = %last.name,
        "no parseable version in any installer name, using lexicographically last"
    );
    Resolution {
        artifact: to_artifact(os_key, last),
        alternates: Vec::new(),
        selection: Selection::LexicalFallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakeHost;

    fn host_with(files: &[&str]) -> FakeHost {
        let host = FakeHost::linux();
        host.add_dir("/art");
        for f in files {
            host.add_file(format!("/art/{}", f), b"");
        }
        host
    }

    #[test]
    fn test_version_token() {
        assert_eq!(version_token("8.1.20-server-linux.bin"), "8.1.20");
        assert_eq!(version_token("8.1.20.bin"), "8.1.20");
        assert_eq!(version_token("latest-linux.bin"), "latest");
        assert_eq!(version_token("noext"), "noext");
    }

    #[test]
    fn test_newest_wins_regardless_of_listing_order() {
        let host = host_with(&["1.0.0-X-linux.bin", "1.2.0-X-linux.bin", "1.1.5-X-linux.bin"]);
        let r = ArtifactResolver::new(&host)
            .find_best(&OsKey::Linux, Path::new("/art"), None)
            .unwrap();
        assert_eq!(r.artifact.file_name(), "1.2.0-X-linux.bin");
        assert_eq!(r.selection, Selection::NewestVersion);
        assert_eq!(r.artifact.version_label, "1.2.0");
    }

    #[test]
    fn test_exact_version() {
        let host = host_with(&["1.0.0-X-linux.bin", "1.2.0-X-linux.bin", "1.1.5-X-linux.bin"]);
        let r = ArtifactResolver::new(&host)
            .find_best(&OsKey::Linux, Path::new("/art"), Some("1.1.5"))
            .unwrap();
        assert_eq!(r.artifact.file_name(), "1.1.5-X-linux.bin");
        assert_eq!(r.selection, Selection::ExactVersion);
    }

    #[test]
    fn test_exact_version_prefix_needs_hyphen() {
        let host = host_with(&["1.1.50-X-linux.bin"]);
        let err = ArtifactResolver::new(&host)
            .find_best(&OsKey::Linux, Path::new("/art"), Some("1.1.5"))
            .unwrap_err();
        assert_eq!(err, ArtifactError::VersionNotFound("1.1.5".into()));
        assert!(err.is_no_candidate());
    }

    #[test]
    fn test_exact_multiple_records_alternates() {
        let host = host_with(&["2.0-b-linux.bin", "2.0-a-linux.bin"]);
        let r = ArtifactResolver::new(&host)
            .find_best(&OsKey::Linux, Path::new("/art"), Some("2.0"))
            .unwrap();
        assert_eq!(r.artifact.file_name(), "2.0-a-linux.bin");
        assert_eq!(r.alternates, vec![PathBuf::from("/art/2.0-b-linux.bin")]);
    }

    #[test]
    fn test_numeric_not_lexical_ordering() {
        let host = host_with(&["1.9.0-X-linux.bin", "1.10.0-X-linux.bin"]);
        let r = ArtifactResolver::new(&host)
            .find_best(&OsKey::Linux, Path::new("/art"), None)
            .unwrap();
        assert_eq!(r.artifact.version_label, "1.10.0");
    }

    #[test]
    fn test_unparseable_falls_back_to_lexical_last() {
        let host = host_with(&["alpha-X-linux.bin", "beta-X-linux.bin"]);
        let r = ArtifactResolver::new(&host)
            .find_best(&OsKey::Linux, Path::new("/art"), None)
            .unwrap();
        assert_eq!(r.artifact.file_name(), "beta-X-linux.bin");
        assert_eq!(r.selection, Selection::LexicalFallback);
        assert_eq!(r.artifact.version, None);
    }

    #[test]
    fn test_parseable_beats_unparseable() {
        let host = host_with(&["1.0-X-linux.bin", "zeta-X-linux.bin"]);
        let r = ArtifactResolver::new(&host)
            .find_best(&OsKey::Linux, Path::new("/art"), None)
            .unwrap();
        assert_eq!(r.artifact.file_name(), "1.0-X-linux.bin");
    }

    #[test]
    fn test_extension_filtering_and_case() {
        let host = host_with(&["1.0-X-linux.BIN", "2.0-X-win.exe", "3.0-notes.txt"]);
        host.add_dir("/art/4.0-dir.bin");
        let resolver = ArtifactResolver::new(&host);
        let r = resolver
            .find_best(&OsKey::Linux, Path::new("/art"), None)
            .unwrap();
        assert_eq!(r.artifact.file_name(), "1.0-X-linux.BIN");

        let strict = ArtifactResolver::new(&host).case_insensitive(false);
        let err = strict
            .find_best(&OsKey::Linux, Path::new("/art"), None)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::NoCandidates { .. }));

        let win = resolver
            .find_best(&OsKey::Windows, Path::new("/art"), None)
            .unwrap();
        assert_eq!(win.artifact.file_name(), "2.0-X-win.exe");
    }

    #[test]
    fn test_missing_dir_distinct_from_empty() {
        let host = host_with(&[]);
        let resolver = ArtifactResolver::new(&host);
        let missing = resolver
            .find_best(&OsKey::Linux, Path::new("/nope"), None)
            .unwrap_err();
        assert!(matches!(missing, ArtifactError::DirectoryMissing(_)));
        assert!(!missing.is_no_candidate());

        let empty = resolver
            .find_best(&OsKey::Linux, Path::new("/art"), None)
            .unwrap_err();
        assert!(empty.is_no_candidate());
    }

    #[test]
    fn test_unknown_platform() {
        let host = host_with(&["1.0-X-linux.bin"]);
        let err = ArtifactResolver::new(&host)
            .find_best(&OsKey::Unknown, Path::new("/art"), None)
            .unwrap_err();
        assert_eq!(err, ArtifactError::UnsupportedPlatform("unknown".into()));
        assert_eq!(Error::from(err).code(), 70);
    }

    #[test]
    fn test_find_at_most() {
        let host = host_with(&["8.1.18-X-linux.bin", "8.1.20-X-linux.bin", "8.1.22-X-linux.bin"]);
        let resolver = ArtifactResolver::new(&host);
        let ceiling = Version::parse("8.1.21").unwrap();
        let r = resolver
            .find_at_most(&OsKey::Linux, Path::new("/art"), &ceiling)
            .unwrap();
        assert_eq!(r.artifact.version_label, "8.1.20");
        assert_eq!(r.selection, Selection::AtMost);

        let too_low = Version::parse("7").unwrap();
        assert!(resolver
            .find_at_most(&OsKey::Linux, Path::new("/art"), &too_low)
            .is_err());
    }

    #[test]
    fn test_resolution_never_mutates() {
        let host = host_with(&["1.0-X-linux.bin"]);
        ArtifactResolver::new(&host)
            .find_best(&OsKey::Linux, Path::new("/art"), None)
            .unwrap();
        assert!(host.mutations().is_empty());
        assert!(host.commands().is_empty());
    }
}
