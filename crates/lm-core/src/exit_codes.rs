//! Exit codes for the lm-core CLI.
//!
//! Exit codes communicate the outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0-3: Operational outcomes
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

use lm_common::{Error, ErrorCategory, OperationResult};

/// Exit codes for lm-core operations.
///
/// These codes are a stable contract for automation. Changes require
/// a major version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-3)
    // ========================================================================
    /// Success, including no-op outcomes
    Success = 0,

    /// Operation failed, no rollback was needed or possible
    OperationFailed = 1,

    /// Operation failed and a rollback was performed
    RolledBack = 2,

    /// Uninstall removed some packages but not all
    PartialUninstall = 3,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Disk, privilege, architecture, or secret check failed
    PreconditionFailed = 11,

    /// No matching installer artifact
    ArtifactNotFound = 12,

    /// Configuration could not be loaded or is invalid
    ConfigError = 13,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Success
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Success => "OK",
            ExitCode::OperationFailed => "ERR_FAILED",
            ExitCode::RolledBack => "ERR_ROLLED_BACK",
            ExitCode::PartialUninstall => "ERR_PARTIAL",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::PreconditionFailed => "ERR_PRECONDITION",
            ExitCode::ArtifactNotFound => "ERR_ARTIFACT",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Exit code for a finished run.
    ///
    /// A performed rollback outranks the error category.
    pub fn for_result(result: &OperationResult) -> Self {
        if result.success {
            return ExitCode::Success;
        }
        if result.rollback_performed {
            return ExitCode::RolledBack;
        }
        match result.error_code {
            Some(50) => ExitCode::PartialUninstall,
            Some(code) if (20..30).contains(&code) => ExitCode::PreconditionFailed,
            Some(code) if (30..40).contains(&code) => ExitCode::ArtifactNotFound,
            Some(code) if (10..20).contains(&code) => ExitCode::ConfigError,
            Some(code) if (60..70).contains(&code) => ExitCode::IoError,
            _ => ExitCode::OperationFailed,
        }
    }

    /// Exit code for an error raised outside a run.
    pub fn for_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Precondition | ErrorCategory::Platform => ExitCode::PreconditionFailed,
            ErrorCategory::Artifact => ExitCode::ArtifactNotFound,
            ErrorCategory::Io => ExitCode::IoError,
            ErrorCategory::Uninstall => ExitCode::PartialUninstall,
            _ => ExitCode::OperationFailed,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_common::{Mode, OperationContext, RollbackReport};

    fn ctx() -> OperationContext {
        OperationContext::new(Mode::Uninstall, "client")
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::RolledBack.as_i32(), 2);
        assert_eq!(ExitCode::PartialUninstall.as_i32(), 3);
        assert_eq!(ExitCode::ArgsError.as_i32(), 10);
        assert_eq!(ExitCode::ConfigError.as_i32(), 13);
        assert_eq!(ExitCode::IoError.as_i32(), 21);
        assert!(ExitCode::ArtifactNotFound.is_user_error());
        assert!(!ExitCode::InternalError.is_user_error());
    }

    #[test]
    fn test_for_result() {
        assert_eq!(
            ExitCode::for_result(&OperationResult::unchanged(&ctx(), "nothing to do")),
            ExitCode::Success
        );

        let partial = Error::PartialUninstall {
            removed: vec!["a".into()],
            failed: vec!["b".into()],
        };
        assert_eq!(
            ExitCode::for_result(&OperationResult::failed(&ctx(), &partial)),
            ExitCode::PartialUninstall
        );
        assert_eq!(
            ExitCode::for_result(
                &OperationResult::failed(&ctx(), &partial)
                    .with_rollback(RollbackReport::new(Mode::Uninstall))
            ),
            ExitCode::RolledBack
        );
        assert_eq!(
            ExitCode::for_result(&OperationResult::failed(&ctx(), &Error::MissingPrivileges)),
            ExitCode::PreconditionFailed
        );
        assert_eq!(
            ExitCode::for_result(&OperationResult::failed(
                &ctx(),
                &Error::ArtifactVersionNotFound("9.9".into())
            )),
            ExitCode::ArtifactNotFound
        );
        assert_eq!(
            ExitCode::for_result(&OperationResult::failed(
                &ctx(),
                &Error::DeployFailed("rc 1".into())
            )),
            ExitCode::OperationFailed
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::RolledBack.to_string(), "ERR_ROLLED_BACK (2)");
    }
}
