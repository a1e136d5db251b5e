//! Shared types for the component lifecycle manager.
//!
//! This crate holds the pure value types every other crate passes around:
//! - Platform keys ([`OsKey`]) resolved once per run
//! - Dotted versions ([`Version`]) with numeric, total ordering
//! - The operation data model ([`OperationContext`], [`OperationResult`], ...)
//! - The error taxonomy ([`Error`], [`ErrorCategory`])

pub mod error;
pub mod operation;
pub mod os_key;
pub mod output;
pub mod version;

pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError};
pub use operation::{
    Artifact, InstalledComponent, Mode, OperationContext, OperationResult, Outcome, PackageStep,
    RollbackReport, RollbackStatus, Secret,
};
pub use os_key::{OsFacts, OsKey, RHEL_FAMILY};
pub use output::OutputFormat;
pub use version::{Version, VersionError};
