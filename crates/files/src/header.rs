//! Header and semaphore file codecs.
//!
//! A header file is a redundant, human-readable shadow of a metadata record, one value per
//! line in a fixed order:
//!
//! ```text
//! fileKey
//! ownerKey
//! logicalFolder
//! storageDate          YYYY-MM-DD
//! originalFileName
//! contentType
//! contentSize
//! contentHash
//! targetYear
//! externalRef          "null" when absent
//! isSpecial            true | false
//! isPublic             true | false
//! isAttachment         true | false
//! ```
//!
//! Because headers are never archived they stay searchable, and [`HeaderRecord::parse`]
//! plus [`HeaderRecord::into_record`] rebuild the record if the metadata store is lost.
//!
//! A semaphore file is a `key=value` block telling the external batch consumer where a
//! special deposit's content lives.

use crate::constants::ABSENT_VALUE;
use crate::digest::ContentDigest;
use crate::keys::{FileKey, StorageName};
use crate::record::{FileAttributes, FileRecord, FolderName};
use crate::{FilesError, FilesResult};
use bsfm_types::NonEmptyText;
use chrono::NaiveDate;
use std::fmt::Write as _;
use std::path::Path;

const HEADER_LINE_COUNT: usize = 13;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// The descriptive fields of a record as they appear in a header file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderRecord {
    pub file_key: FileKey,
    pub owner_key: String,
    pub logical_folder: String,
    pub storage_date: NaiveDate,
    pub original_file_name: String,
    pub content_type: String,
    pub content_size: u64,
    pub content_hash: String,
    pub target_year: i32,
    pub external_ref: Option<String>,
    pub is_special: bool,
    pub is_public: bool,
    pub is_attachment: bool,
}

impl HeaderRecord {
    pub fn from_record(record: &FileRecord) -> Self {
        Self {
            file_key: record.file_key().clone(),
            owner_key: record.owner_key().to_owned(),
            logical_folder: record.logical_folder().as_str().to_owned(),
            storage_date: record.storage_date(),
            original_file_name: record.original_file_name().to_owned(),
            content_type: record.content_type().to_owned(),
            content_size: record.content_size(),
            content_hash: record.content_hash().to_owned(),
            target_year: record.target_year(),
            external_ref: record.external_ref().map(str::to_owned),
            is_special: record.is_special(),
            is_public: record.is_public(),
            is_attachment: record.is_attachment(),
        }
    }

    /// Renders the header file body; every line, including the last, ends in `\n`.
    pub fn render(&self) -> String {
        let lines = [
            self.file_key.to_string(),
            self.owner_key.clone(),
            self.logical_folder.clone(),
            self.storage_date.format(DATE_FORMAT).to_string(),
            self.original_file_name.clone(),
            self.content_type.clone(),
            self.content_size.to_string(),
            self.content_hash.clone(),
            self.target_year.to_string(),
            self.external_ref
                .clone()
                .unwrap_or_else(|| ABSENT_VALUE.to_owned()),
            self.is_special.to_string(),
            self.is_public.to_string(),
            self.is_attachment.to_string(),
        ];
        let mut out = String::new();
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Parses a header file body.
    ///
    /// # Errors
    ///
    /// [`FilesError::InvalidHeader`] when the body does not have exactly 13 lines or a
    /// line does not parse as its field's type.
    pub fn parse(body: &str) -> FilesResult<Self> {
        let lines: Vec<&str> = body.lines().collect();
        if lines.len() != HEADER_LINE_COUNT {
            return Err(FilesError::InvalidHeader(format!(
                "expected {HEADER_LINE_COUNT} lines, found {}",
                lines.len()
            )));
        }

        let invalid = |field: &str, value: &str| {
            FilesError::InvalidHeader(format!("invalid {field}: '{value}'"))
        };
        let flag = |field: &str, value: &str| match value {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(invalid(field, value)),
        };

        Ok(Self {
            file_key: FileKey::parse(lines[0]).map_err(FilesError::InvalidHeader)?,
            owner_key: lines[1].to_owned(),
            logical_folder: lines[2].to_owned(),
            storage_date: NaiveDate::parse_from_str(lines[3], DATE_FORMAT)
                .map_err(|_| invalid("storageDate", lines[3]))?,
            original_file_name: lines[4].to_owned(),
            content_type: lines[5].to_owned(),
            content_size: lines[6]
                .parse()
                .map_err(|_| invalid("contentSize", lines[6]))?,
            content_hash: lines[7].to_owned(),
            target_year: lines[8]
                .parse()
                .map_err(|_| invalid("targetYear", lines[8]))?,
            external_ref: match lines[9] {
                ABSENT_VALUE => None,
                value => Some(value.to_owned()),
            },
            is_special: flag("isSpecial", lines[10])?,
            is_public: flag("isPublic", lines[11])?,
            is_attachment: flag("isAttachment", lines[12])?,
        })
    }

    /// Rebuilds the metadata record this header shadows.
    ///
    /// The keys are derived again from the header's attributes and must agree with both the
    /// recorded file key and `storage_name` (the header's file stem). The rebuilt record is in
    /// its post-deposit state: `SPECIAL_READY` for special records, `AVAILABLE` otherwise.
    pub fn into_record(self, storage_name: &StorageName) -> FilesResult<FileRecord> {
        let text = |field: &str, value: String| {
            NonEmptyText::new(value)
                .map_err(|e| FilesError::InvalidHeader(format!("invalid {field}: {e}")))
        };

        let folder = FolderName::new(&self.logical_folder)
            .map_err(|e| FilesError::InvalidHeader(e.to_string()))?;
        let attributes = FileAttributes {
            original_file_name: text("originalFileName", self.original_file_name)?,
            content_type: text("contentType", self.content_type)?,
            owner_key: text("ownerKey", self.owner_key)?,
            target_year: self.target_year,
            external_ref: self.external_ref,
            is_attachment: self.is_attachment,
        };
        let digest = ContentDigest {
            size: self.content_size,
            hash: self.content_hash,
        };

        let mut record = FileRecord::restore(
            self.is_special,
            self.is_public,
            folder,
            attributes,
            digest,
            self.storage_date,
        )?;

        if record.file_key() != &self.file_key {
            return Err(FilesError::InvalidHeader(format!(
                "recorded file key {} does not match its attributes",
                self.file_key
            )));
        }
        if record.storage_name() != storage_name {
            return Err(FilesError::InvalidHeader(format!(
                "header named {storage_name} describes {}",
                record.storage_name()
            )));
        }

        record.mark_stored()?;
        Ok(record)
    }
}

/// Renders the semaphore block for a special record whose content lives at `content_path`.
pub fn render_semaphore(record: &FileRecord, content_path: &Path) -> String {
    let mut out = String::new();
    let fields = [
        ("fileKey", record.file_key().to_string()),
        ("ownerKey", record.owner_key().to_owned()),
        ("dataFilePath", content_path.display().to_string()),
        ("originalFileName", record.original_file_name().to_owned()),
        ("contentType", record.content_type().to_owned()),
        ("targetYear", record.target_year().to_string()),
        (
            "externalRef",
            record.external_ref().unwrap_or(ABSENT_VALUE).to_owned(),
        ),
    ];
    for (key, value) in fields {
        // writing to a String cannot fail
        let _ = writeln!(out, "{key}={value}");
    }
    out
}
