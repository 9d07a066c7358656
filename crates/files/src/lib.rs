//! Blob Store File Storage
//!
//! This crate is the storage core of the blob store: it turns a submitted file plus its
//! classification attributes into physical files on durable storage, and opens them again
//! for reading.
//!
//! ## Design Principles
//!
//! - A file's identity is a pure function of its classification attributes, never of a
//!   counter or clock ([`keys`])
//! - Physical files are created with create-only semantics; a clash is a conflict, never an
//!   overwrite ([`StorageWriter`])
//! - Every byte that enters or leaves storage passes the antivirus gate ([`AntivirusGate`])
//! - Files are never moved between storage tiers; the tier is recomputed from the storage
//!   date on every access ([`TieredPathResolver`])
//! - A redundant, human-readable header file shadows each metadata record ([`header`])
//!
//! ## Storage Layout
//!
//! ```text
//! <active root>/YYYY/MM/DD/<STORAGE NAME>          content, first months of life
//! <archived root>/YYYY/MM/DD/<STORAGE NAME>        content, after the archive threshold
//! <header root>/YYYY/MM/DD/<STORAGE NAME>.bsfh     header, never archived
//! <special root>/<logical folder>/<STORAGE NAME>.go   semaphore, special deposits only
//! ```
//!
//! The date is always the record's storage date, not the date of access.
//!
//! ## Example Usage
//!
//! ```no_run
//! use bsfm_files::{StorageRoots, TieredPathResolver};
//!
//! let roots = StorageRoots::new("/nas/active", "/nas/archived", "/nas/headers", "/nas/specials");
//! let resolver = TieredPathResolver::new(roots, 365);
//! # let _ = resolver;
//! ```

mod antivirus;
mod clock;
mod constants;
mod digest;
pub mod header;
pub mod keys;
mod paths;
mod permissions;
mod reader;
mod record;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
mod writer;

pub use antivirus::{AntivirusGate, ClamdScanner, ScanError, ScanOracle, ScanVerdict};
pub use clock::{Clock, SystemClock};
pub use constants::{
    EXTERNAL_REF_PLACEHOLDER, HEADER_FILE_EXTENSION, SEMAPHORE_FILE_EXTENSION,
};
pub use digest::{detect_content_type, ContentDigest, DigestReader};
pub use header::HeaderRecord;
pub use keys::{FileKey, StorageName};
pub use paths::{FileKind, StorageRoots, Tier, TieredPathResolver};
pub use permissions::{
    platform_policy, CategoryGroups, FileCategory, NoopPermissions, PermissionPolicy,
};
#[cfg(unix)]
pub use permissions::PosixPermissions;
pub use reader::{ContentStream, StorageReader};
pub use record::{DepositKind, FileAttributes, FileRecord, FileStatus, FolderName};
pub use writer::StorageWriter;

pub use bsfm_types::{NonEmptyText, TextError};

use std::path::PathBuf;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// A file already exists at the resolved path (identity collision)
    #[error("A file already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The resolved physical file is absent
    #[error("No file found at {}", .0.display())]
    NotFound(PathBuf),

    /// The scan oracle reported malware; carries the detector's signature name
    #[error("Virus found: {0}")]
    Infected(String),

    /// The scan oracle could not be reached or answered nonsense
    #[error("Antivirus scan failed: {0}")]
    Scan(#[from] ScanError),

    /// The record's lifecycle state forbids the operation
    #[error("Operation forbidden: {0}")]
    Forbidden(String),

    /// A required classification attribute is missing
    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),

    /// A classification attribute failed validation
    #[error("Invalid attribute {name}: {reason}")]
    InvalidAttribute { name: &'static str, reason: String },

    /// A configured filesystem group cannot be resolved on this host
    #[error("Unknown group {group}: {reason}")]
    UnknownGroup { group: String, reason: String },

    /// A status change that the lifecycle does not allow
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: FileStatus, to: FileStatus },

    /// Bytes at rest do not match the size or digest recorded at deposit time
    #[error(
        "Integrity check failed for {}: expected {expected_size} bytes / {expected_hash}, found {actual_size} bytes / {actual_hash}",
        path.display()
    )]
    Integrity {
        path: PathBuf,
        expected_size: u64,
        expected_hash: String,
        actual_size: u64,
        actual_hash: String,
    },

    /// A header file could not be parsed back into a record
    #[error("Invalid header file: {0}")]
    InvalidHeader(String),

    /// I/O error occurred
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FilesError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for storage operations.
pub type FilesResult<T> = Result<T, FilesError>;
