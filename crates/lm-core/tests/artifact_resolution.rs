//! Artifact selection against a real directory.
//!
//! These run the resolver over `SystemHost` so directory listing, extension
//! matching, and ordering are exercised on an actual filesystem.

use lm_common::{OsKey, Version};
use lm_core::artifact::{ArtifactError, ArtifactResolver, Selection};
use lm_core::host::SystemHost;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn populate(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), b"installer").unwrap();
    }
}

#[test]
fn newest_version_wins_regardless_of_listing_order() {
    let dir = TempDir::new().unwrap();
    populate(
        dir.path(),
        &[
            "1.0.0-X-linux.bin",
            "1.2.0-X-linux.bin",
            "1.1.5-X-linux.bin",
            "9.9.9-X-windows.exe",
            "notes.txt",
        ],
    );

    let host = SystemHost::new();
    let resolution = ArtifactResolver::new(&host)
        .find_best(&OsKey::Linux, dir.path(), None)
        .unwrap();

    assert_eq!(resolution.artifact.file_name(), "1.2.0-X-linux.bin");
    assert_eq!(resolution.artifact.version_label, "1.2.0");
    assert_eq!(resolution.selection, Selection::NewestVersion);
}

#[test]
fn numeric_ordering_beats_lexical() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), &["8.1.9-client-linux.bin", "8.1.20-client-linux.bin"]);

    let host = SystemHost::new();
    let resolution = ArtifactResolver::new(&host)
        .find_best(&OsKey::Rhel, dir.path(), None)
        .unwrap();
    assert_eq!(resolution.artifact.version_label, "8.1.20");
}

#[test]
fn exact_version_reports_alternates() {
    let dir = TempDir::new().unwrap();
    populate(
        dir.path(),
        &["8.1.20-client-linux.bin", "8.1.20-server-linux.bin", "8.1.19-client-linux.bin"],
    );

    let host = SystemHost::new();
    let resolution = ArtifactResolver::new(&host)
        .find_best(&OsKey::Linux, dir.path(), Some("8.1.20"))
        .unwrap();

    assert_eq!(resolution.selection, Selection::ExactVersion);
    assert_eq!(resolution.artifact.file_name(), "8.1.20-client-linux.bin");
    assert_eq!(resolution.alternates.len(), 1);
    assert!(resolution.alternates[0].ends_with("8.1.20-server-linux.bin"));
}

#[test]
fn exact_version_missing() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), &["8.1.19-client-linux.bin"]);

    let host = SystemHost::new();
    let err = ArtifactResolver::new(&host)
        .find_best(&OsKey::Linux, dir.path(), Some("8.1.20"))
        .unwrap_err();
    assert_eq!(err, ArtifactError::VersionNotFound("8.1.20".to_string()));
    assert!(err.is_no_candidate());
}

#[test]
fn unparseable_names_fall_back_to_lexical_order() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), &["alpha-client.exe", "beta-client.exe"]);

    let host = SystemHost::new();
    let resolution = ArtifactResolver::new(&host)
        .find_best(&OsKey::Windows, dir.path(), None)
        .unwrap();
    assert_eq!(resolution.selection, Selection::LexicalFallback);
    assert_eq!(resolution.artifact.file_name(), "beta-client.exe");
    assert!(resolution.artifact.version.is_none());
}

#[test]
fn extension_match_follows_case_setting() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), &["8.1.20-client-linux.BIN"]);

    let host = SystemHost::new();
    assert!(ArtifactResolver::new(&host)
        .find_best(&OsKey::Linux, dir.path(), None)
        .is_ok());

    let err = ArtifactResolver::new(&host)
        .case_insensitive(false)
        .find_best(&OsKey::Linux, dir.path(), None)
        .unwrap_err();
    assert!(matches!(err, ArtifactError::NoCandidates { .. }));
}

#[test]
fn missing_directory_and_unknown_platform() {
    let dir = TempDir::new().unwrap();
    let host = SystemHost::new();
    let resolver = ArtifactResolver::new(&host);

    let gone = dir.path().join("nope");
    assert_eq!(
        resolver.find_best(&OsKey::Linux, &gone, None).unwrap_err(),
        ArtifactError::DirectoryMissing(gone.clone())
    );

    let err = resolver
        .find_best(&OsKey::Other("plan9".to_string()), dir.path(), None)
        .unwrap_err();
    assert!(matches!(err, ArtifactError::UnsupportedPlatform(_)));
}

#[test]
fn at_most_skips_newer_installers() {
    let dir = TempDir::new().unwrap();
    populate(
        dir.path(),
        &["8.1.18-client-linux.bin", "8.1.19-client-linux.bin", "8.1.20-client-linux.bin"],
    );

    let host = SystemHost::new();
    let ceiling = Version::parse("8.1.19").unwrap();
    let resolution = ArtifactResolver::new(&host)
        .find_at_most(&OsKey::Linux, dir.path(), &ceiling)
        .unwrap();
    assert_eq!(resolution.selection, Selection::AtMost);
    assert_eq!(resolution.artifact.version_label, "8.1.19");
}

#[test]
fn resolution_never_touches_the_directory() {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), &["1.0.0-X-linux.bin", "1.2.0-X-linux.bin"]);

    let host = SystemHost::new();
    let _ = ArtifactResolver::new(&host).find_best(&OsKey::Linux, dir.path(), None);

    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["1.0.0-X-linux.bin", "1.2.0-X-linux.bin"]);
}
