//! Post-deploy verification against the package tracker.

use crate::env::RunEnv;
use crate::logging::events::event_names;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Result of a verification check.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub passed: bool,
    /// Version the tracker reports for the main package.
    pub version: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl VerificationResult {
    pub fn success(version: Option<String>, duration_ms: u64) -> Self {
        Self {
            passed: true,
            version,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(error: String, duration_ms: u64) -> Self {
        Self {
            passed: false,
            version: None,
            error: Some(error),
            duration_ms,
        }
    }
}

/// Re-query the tracker and confirm presence, and the expected version when
/// the component asks for it.
///
/// A dry run changed nothing, so the tracker would still show the old state;
/// the result is synthesized from `expected` instead.
pub fn verify(env: &RunEnv<'_>, expected: Option<&str>) -> VerificationResult {
    let start = Instant::now();
    let elapsed = || start.elapsed().as_millis() as u64;

    let result = if env.is_dry_run() {
        VerificationResult::success(expected.map(str::to_string), 0)
    } else {
        let detection = env.detect();
        if !detection.status {
            VerificationResult::failure(
                format!(
                    "{} not found after deploy: {}",
                    env.component.package_id, detection.message
                ),
                elapsed(),
            )
        } else {
            match expected {
                Some(wanted) if env.component.verify_version && !detection.lists_version(wanted) => {
                    VerificationResult::failure(
                        format!(
                            "expected version {}, tracker reports {}",
                            wanted,
                            detection.version.as_deref().unwrap_or("no version")
                        ),
                        elapsed(),
                    )
                }
                _ => VerificationResult::success(
                    detection.version.or_else(|| expected.map(str::to_string)),
                    elapsed(),
                ),
            }
        }
    };

    if result.passed {
        info!(
            target: event_names::VERIFY_RESULT,
            passed = true,
            version = result.version.as_deref().unwrap_or("-"),
            duration_ms = result.duration_ms,
            dry_run = env.is_dry_run(),
            "verification passed"
        );
    } else {
        warn!(
            target: event_names::VERIFY_RESULT,
            passed = false,
            duration_ms = result.duration_ms,
            "verification failed: {}",
            result.error.as_deref().unwrap_or_default()
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::TestBed;
    use crate::host::{ExecOutput, FakeHost};
    use lm_common::Mode;

    #[test]
    fn test_version_match() {
        let host = FakeHost::rhel();
        host.respond("rpm -qa", ExecOutput::ok("TIVsm-BA-8.1.20-0.x86_64\n"));
        let bed = TestBed::new("client", Mode::Install);
        let result = verify(&bed.env(&host), Some("8.1.20"));
        assert!(result.passed);
        assert_eq!(result.version.as_deref(), Some("8.1.20.0"));
    }

    #[test]
    fn test_version_mismatch() {
        let host = FakeHost::rhel();
        host.respond("rpm -qa", ExecOutput::ok("TIVsm-BA-8.1.19-0.x86_64\n"));
        let bed = TestBed::new("client", Mode::Install);
        let result = verify(&bed.env(&host), Some("8.1.20"));
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("expected version 8.1.20"));
    }

    #[test]
    fn test_presence_only_when_version_check_disabled() {
        let host = FakeHost::rhel();
        host.respond("rpm -qa", ExecOutput::ok("TIVsm-BA-8.1.19-0.x86_64\n"));
        let mut bed = TestBed::new("client", Mode::Install);
        bed.component.verify_version = false;
        assert!(verify(&bed.env(&host), Some("8.1.20")).passed);
    }

    #[test]
    fn test_absent_fails() {
        let host = FakeHost::rhel();
        let bed = TestBed::new("client", Mode::Install);
        let result = verify(&bed.env(&host), None);
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("not found after deploy"));
    }

    #[test]
    fn test_dry_run_is_synthesized() {
        let host = FakeHost::rhel();
        let mut bed = TestBed::new("client", Mode::Install);
        bed.ctx.dry_run = true;
        let result = verify(&bed.env(&host), Some("8.1.20"));
        assert!(result.passed);
        assert!(host.commands().is_empty());
    }
}
