//! The file record and its lifecycle.
//!
//! A [`FileRecord`] is the durable metadata unit. Its identity fields (keys, classification,
//! content digest, storage date) are fixed when the record is created and have no setters.
//! The only mutable part is the `status` / `status_linked_data` pair, and it only changes
//! through the transition methods below.
//!
//! ```text
//!            mark_stored()
//!   NEW ─────────────────────┬──> AVAILABLE (2)        ordinary and public deposits
//!                            └──> SPECIAL_READY (1)    special deposits, semaphore written
//!
//!   AVAILABLE / SPECIAL_READY / downstream codes
//!        ├─ mark_infected(sig) ──> VIRUS_INFECTED (-2)   read-time scan failure
//!        ├─ soft_delete() ────────> SOFT_DELETED (-1)
//!        └─ set_status(code) ─────> any code except NEW  administrative
//! ```
//!
//! Codes other than the reserved ones are owned by downstream consumers (for example
//! "processed" or "rejected") and are treated as readable.

use crate::constants::{
    ABSENT_VALUE, MAX_EXTERNAL_REF_LEN, MAX_FOLDER_LEN, MAX_OWNER_KEY_LEN,
};
use crate::digest::ContentDigest;
use crate::keys::{FileKey, IdentityTuple, StorageName};
use crate::{FilesError, FilesResult};
use bsfm_types::NonEmptyText;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a record: a signed integer with four reserved values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileStatus(i32);

impl FileStatus {
    /// Transient state between record construction and the first persist.
    pub const NEW: Self = Self(0);
    /// A special deposit whose semaphore has been written.
    pub const SPECIAL_READY: Self = Self(1);
    /// Default ready state for ordinary and public deposits.
    pub const AVAILABLE: Self = Self(2);
    /// Hidden administratively; content is still on disk.
    pub const SOFT_DELETED: Self = Self(-1);
    /// Condemned by a read-time scan.
    pub const VIRUS_INFECTED: Self = Self(-2);

    pub const fn from_code(code: i32) -> Self {
        Self(code)
    }

    pub const fn code(self) -> i32 {
        self.0
    }

    /// Whether this is one of the codes the storage core interprets.
    pub fn is_reserved(self) -> bool {
        matches!(
            self,
            Self::NEW | Self::SPECIAL_READY | Self::AVAILABLE | Self::SOFT_DELETED | Self::VIRUS_INFECTED
        )
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NEW => f.write_str("NEW"),
            Self::SPECIAL_READY => f.write_str("SPECIAL_READY"),
            Self::AVAILABLE => f.write_str("AVAILABLE"),
            Self::SOFT_DELETED => f.write_str("SOFT_DELETED"),
            Self::VIRUS_INFECTED => f.write_str("VIRUS_INFECTED"),
            Self(code) => write!(f, "{code}"),
        }
    }
}

/// A logical folder name.
///
/// Folder names become a directory under the special root, so anything that could escape
/// it (separators, `.`/`..`, NUL) is rejected.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FolderName(String);

impl FolderName {
    pub fn new(input: &str) -> FilesResult<Self> {
        let invalid = |reason: &str| FilesError::InvalidAttribute {
            name: "logicalFolder",
            reason: reason.to_owned(),
        };

        let text = NonEmptyText::with_max_len(input, MAX_FOLDER_LEN)
            .map_err(|e| invalid(&e.to_string()))?;
        let name = text.into_inner();
        if name == "." || name == ".." {
            return Err(invalid("relative path components are not folder names"));
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(invalid("folder names cannot contain path separators"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FolderName {
    type Error = FilesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<FolderName> for String {
    fn from(value: FolderName) -> Self {
        value.0
    }
}

impl fmt::Display for FolderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which deposit entry point a file arrived through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepositKind {
    Ordinary,
    /// Emits a semaphore for the external batch consumer; requires an external reference.
    Special,
    /// Retrievable through the public content path.
    Public,
}

impl DepositKind {
    pub fn is_special(self) -> bool {
        self == Self::Special
    }

    pub fn is_public(self) -> bool {
        self == Self::Public
    }
}

/// Caller-supplied attributes of a deposit.
#[derive(Clone, Debug)]
pub struct FileAttributes {
    pub original_file_name: NonEmptyText,
    pub content_type: NonEmptyText,
    pub owner_key: NonEmptyText,
    pub target_year: i32,
    pub external_ref: Option<String>,
    pub is_attachment: bool,
}

impl FileAttributes {
    /// External reference with blank values folded to `None`.
    fn normalized_external_ref(&self) -> FilesResult<Option<NonEmptyText>> {
        match self.external_ref.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            // header files use this literal for "no external reference"
            Some(ABSENT_VALUE) => Err(FilesError::InvalidAttribute {
                name: "externalRef",
                reason: format!("'{ABSENT_VALUE}' is reserved"),
            }),
            Some(value) => NonEmptyText::with_max_len(value, MAX_EXTERNAL_REF_LEN)
                .map(Some)
                .map_err(|e| FilesError::InvalidAttribute {
                    name: "externalRef",
                    reason: e.to_string(),
                }),
        }
    }
}

/// The durable metadata unit of a stored file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    file_key: FileKey,
    storage_hashed_file_name: StorageName,
    original_file_name: NonEmptyText,
    content_type: NonEmptyText,
    content_size: u64,
    content_hash: String,
    logical_folder: FolderName,
    owner_key: NonEmptyText,
    target_year: i32,
    external_ref: Option<NonEmptyText>,
    storage_date: NaiveDate,
    status: FileStatus,
    status_linked_data: Option<String>,
    is_special: bool,
    is_public: bool,
    is_attachment: bool,
}

impl FileRecord {
    /// Builds a new record in state `NEW` for content deposited on `storage_date`.
    ///
    /// Attribute validation (including the external reference that special deposits
    /// require) happens before the content is hashed.
    ///
    /// # Errors
    ///
    /// - [`FilesError::MissingAttribute`] for a special deposit without external reference
    /// - [`FilesError::InvalidAttribute`] for an over-long owner key or external reference
    pub fn create(
        kind: DepositKind,
        folder: FolderName,
        attributes: FileAttributes,
        content: &[u8],
        storage_date: NaiveDate,
    ) -> FilesResult<Self> {
        let external_ref = attributes.normalized_external_ref()?;
        if kind.is_special() && external_ref.is_none() {
            return Err(FilesError::MissingAttribute("externalRef"));
        }
        if attributes.owner_key.as_str().chars().count() > MAX_OWNER_KEY_LEN {
            return Err(FilesError::InvalidAttribute {
                name: "ownerKey",
                reason: format!("must be at most {MAX_OWNER_KEY_LEN} characters"),
            });
        }

        let digest = ContentDigest::of(content);
        Ok(Self::assemble(
            kind.is_special(),
            kind.is_public(),
            folder,
            attributes,
            external_ref,
            digest,
            storage_date,
        ))
    }

    /// Rebuilds a record from previously stored attributes, re-deriving its keys.
    pub(crate) fn restore(
        is_special: bool,
        is_public: bool,
        folder: FolderName,
        attributes: FileAttributes,
        digest: ContentDigest,
        storage_date: NaiveDate,
    ) -> FilesResult<Self> {
        let external_ref = attributes.normalized_external_ref()?;
        Ok(Self::assemble(
            is_special,
            is_public,
            folder,
            attributes,
            external_ref,
            digest,
            storage_date,
        ))
    }

    fn assemble(
        is_special: bool,
        is_public: bool,
        folder: FolderName,
        attributes: FileAttributes,
        external_ref: Option<NonEmptyText>,
        digest: ContentDigest,
        storage_date: NaiveDate,
    ) -> Self {
        let (file_key, storage_hashed_file_name) = IdentityTuple {
            owner_key: attributes.owner_key.as_str(),
            is_special,
            is_public,
            folder: folder.as_str(),
            target_year: attributes.target_year,
            external_ref: external_ref.as_ref().map(NonEmptyText::as_str),
            original_file_name: attributes.original_file_name.as_str(),
        }
        .derive();

        Self {
            file_key,
            storage_hashed_file_name,
            original_file_name: attributes.original_file_name,
            content_type: attributes.content_type,
            content_size: digest.size,
            content_hash: digest.hash,
            logical_folder: folder,
            owner_key: attributes.owner_key,
            target_year: attributes.target_year,
            external_ref,
            storage_date,
            status: FileStatus::NEW,
            status_linked_data: None,
            is_special,
            is_public,
            is_attachment: attributes.is_attachment,
        }
    }

    pub fn file_key(&self) -> &FileKey {
        &self.file_key
    }

    pub fn storage_name(&self) -> &StorageName {
        &self.storage_hashed_file_name
    }

    pub fn original_file_name(&self) -> &str {
        self.original_file_name.as_str()
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_str()
    }

    pub fn content_size(&self) -> u64 {
        self.content_size
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn logical_folder(&self) -> &FolderName {
        &self.logical_folder
    }

    pub fn owner_key(&self) -> &str {
        self.owner_key.as_str()
    }

    pub fn target_year(&self) -> i32 {
        self.target_year
    }

    pub fn external_ref(&self) -> Option<&str> {
        self.external_ref.as_ref().map(NonEmptyText::as_str)
    }

    pub fn storage_date(&self) -> NaiveDate {
        self.storage_date
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn status_linked_data(&self) -> Option<&str> {
        self.status_linked_data.as_deref()
    }

    pub fn is_special(&self) -> bool {
        self.is_special
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub fn is_attachment(&self) -> bool {
        self.is_attachment
    }

    /// Whether `other` describes the same stored file (every field but the status pair).
    pub fn same_identity(&self, other: &FileRecord) -> bool {
        let strip = |r: &FileRecord| FileRecord {
            status: FileStatus::NEW,
            status_linked_data: None,
            ..r.clone()
        };
        strip(self) == strip(other)
    }

    /// `NEW` → `AVAILABLE`, or `SPECIAL_READY` for special records, once physical writes succeed.
    pub fn mark_stored(&mut self) -> FilesResult<()> {
        let target = if self.is_special {
            FileStatus::SPECIAL_READY
        } else {
            FileStatus::AVAILABLE
        };
        if self.status != FileStatus::NEW {
            return Err(FilesError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Records a read-time infection, keeping the detector's signature.
    pub fn mark_infected(&mut self, signature: impl Into<String>) {
        self.status = FileStatus::VIRUS_INFECTED;
        self.status_linked_data = Some(signature.into());
    }

    /// Administrative hide. The content stays on disk untouched.
    pub fn soft_delete(&mut self) {
        self.status = FileStatus::SOFT_DELETED;
    }

    /// Administrative status update; also the only way out of `VIRUS_INFECTED`.
    ///
    /// # Errors
    ///
    /// [`FilesError::InvalidTransition`] when asked to go back to `NEW`.
    pub fn set_status(
        &mut self,
        status: FileStatus,
        linked_data: Option<String>,
    ) -> FilesResult<()> {
        if status == FileStatus::NEW {
            return Err(FilesError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.status_linked_data = linked_data;
        Ok(())
    }

    /// Refuses reads that the lifecycle does not allow.
    ///
    /// Infected records fail with the stored signature without consulting the oracle again.
    pub fn ensure_readable(&self) -> FilesResult<()> {
        match self.status {
            FileStatus::SOFT_DELETED => Err(FilesError::Forbidden(format!(
                "file {} has been deleted",
                self.file_key
            ))),
            FileStatus::NEW => Err(FilesError::Forbidden(format!(
                "file {} is not available yet",
                self.file_key
            ))),
            FileStatus::VIRUS_INFECTED => Err(FilesError::Infected(
                self.status_linked_data
                    .clone()
                    .unwrap_or_else(|| "unknown signature".into()),
            )),
            _ => Ok(()),
        }
    }
}
