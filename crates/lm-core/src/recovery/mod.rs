//! Backup sets and rollback.

pub mod backup;
pub mod rollback;

pub use backup::{BackupEntry, BackupManager, BackupManifest, BackupRequest, BackupSet};
pub use rollback::{RollbackHandler, RollbackManager, RollbackRequest};
