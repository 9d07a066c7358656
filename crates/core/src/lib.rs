//! # Blob Store Core
//!
//! Runtime configuration, the metadata store collaborator and the file storage service.
//!
//! The storage mechanics (identity derivation, tiered layout, antivirus gating, lifecycle)
//! live in `bsfm_files`; this crate composes them with metadata bookkeeping.
//!
//! **No API concerns**: HTTP servers and CLIs belong in `api-rest` and `bsfm-cli`.

pub mod config;
pub mod constants;
pub mod error;
pub mod metadata;
pub mod recovery;
pub mod service;

pub use config::{ClamavConfig, CoreConfig};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use metadata::{
    FolderQuery, InMemoryMetadataStore, JsonFileMetadataStore, MetadataStore, RecordId,
    StoredRecord,
};
pub use recovery::RecoveryReport;
pub use service::{Download, FileStorageService};

pub use bsfm_files::{DepositKind, FileAttributes, FileRecord, FileStatus, NonEmptyText};
