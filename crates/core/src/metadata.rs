//! The metadata store collaborator.
//!
//! The service only needs a handful of queries: find by identity, find several identities,
//! list a folder with optional owner/year filters, save (insert or update) and delete by
//! internal id. [`MetadataStore`] is that surface; [`InMemoryMetadataStore`] and
//! [`JsonFileMetadataStore`] implement it.
//!
//! Both implementations enforce uniqueness of `fileKey` and storage name on insert and refuse
//! updates that would change a record's identity fields.

use crate::constants::{ANY_OWNER, ANY_YEAR};
use crate::{StoreError, StoreResult};
use bsfm_files::{FileKey, FileRecord, FolderName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Internal row id. Never shown to API clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted record together with its row id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub record: FileRecord,
}

/// Folder listing filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderQuery {
    pub folder: FolderName,
    pub owner: Option<String>,
    pub year: Option<i32>,
}

impl FolderQuery {
    /// Builds a query from wire values, where `*` or an empty owner and year `0` mean "any".
    pub fn new(folder: FolderName, owner: Option<&str>, year: Option<i32>) -> Self {
        let owner = owner
            .map(str::trim)
            .filter(|o| !o.is_empty() && *o != ANY_OWNER)
            .map(str::to_owned);
        let year = year.filter(|y| *y != ANY_YEAR);
        Self {
            folder,
            owner,
            year,
        }
    }

    fn matches(&self, record: &FileRecord) -> bool {
        record.logical_folder() == &self.folder
            && self.owner.as_deref().map_or(true, |o| record.owner_key() == o)
            && self.year.map_or(true, |y| record.target_year() == y)
    }
}

pub trait MetadataStore: Send + Sync {
    /// Zero or one record with the given file key.
    fn find_by_key(&self, key: &FileKey) -> StoreResult<Option<StoredRecord>>;

    /// The records among `keys` that exist, ordered by original filename.
    fn find_by_keys(&self, keys: &[FileKey]) -> StoreResult<Vec<StoredRecord>>;

    /// Records in a folder, ordered by original filename.
    fn list_folder(&self, query: &FolderQuery) -> StoreResult<Vec<StoredRecord>>;

    /// Inserts (`id == None`) or updates a record and returns its id.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] when an insert duplicates a file key or storage name, or an
    ///   update changes identity fields
    /// - [`StoreError::NotFound`] when updating an unknown id
    fn save(&self, id: Option<RecordId>, record: &FileRecord) -> StoreResult<RecordId>;

    /// Removes a record. Deleting an unknown id is NotFound.
    fn delete(&self, id: RecordId) -> StoreResult<()>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Table {
    next_id: u64,
    rows: BTreeMap<u64, FileRecord>,
}

impl Table {
    fn stored(id: u64, record: &FileRecord) -> StoredRecord {
        StoredRecord {
            id: RecordId(id),
            record: record.clone(),
        }
    }

    fn sorted(mut rows: Vec<StoredRecord>) -> Vec<StoredRecord> {
        rows.sort_by(|a, b| {
            a.record
                .original_file_name()
                .cmp(b.record.original_file_name())
                .then(a.id.cmp(&b.id))
        });
        rows
    }

    fn find_by_key(&self, key: &FileKey) -> Option<StoredRecord> {
        self.rows
            .iter()
            .find(|(_, r)| r.file_key() == key)
            .map(|(id, r)| Self::stored(*id, r))
    }

    fn find_by_keys(&self, keys: &[FileKey]) -> Vec<StoredRecord> {
        let rows = self
            .rows
            .iter()
            .filter(|(_, r)| keys.contains(r.file_key()))
            .map(|(id, r)| Self::stored(*id, r))
            .collect();
        Self::sorted(rows)
    }

    fn list_folder(&self, query: &FolderQuery) -> Vec<StoredRecord> {
        let rows = self
            .rows
            .iter()
            .filter(|(_, r)| query.matches(r))
            .map(|(id, r)| Self::stored(*id, r))
            .collect();
        Self::sorted(rows)
    }

    fn save(&mut self, id: Option<RecordId>, record: &FileRecord) -> StoreResult<RecordId> {
        match id {
            None => {
                let duplicate = self.rows.values().any(|r| {
                    r.file_key() == record.file_key() || r.storage_name() == record.storage_name()
                });
                if duplicate {
                    return Err(StoreError::Conflict(format!(
                        "file {} already exists",
                        record.file_key()
                    )));
                }
                self.next_id += 1;
                self.rows.insert(self.next_id, record.clone());
                Ok(RecordId(self.next_id))
            }
            Some(id) => {
                let existing = self
                    .rows
                    .get_mut(&id.0)
                    .ok_or_else(|| StoreError::NotFound(format!("no record with id {id}")))?;
                if !existing.same_identity(record) {
                    return Err(StoreError::Conflict(format!(
                        "record {id} cannot change its identity fields"
                    )));
                }
                *existing = record.clone();
                Ok(id)
            }
        }
    }

    fn delete(&mut self, id: RecordId) -> StoreResult<()> {
        self.rows
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("no record with id {id}")))
    }
}

fn lock(table: &Mutex<Table>) -> MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Volatile store for tests and single-process tools.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    table: Mutex<Table>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn find_by_key(&self, key: &FileKey) -> StoreResult<Option<StoredRecord>> {
        Ok(lock(&self.table).find_by_key(key))
    }

    fn find_by_keys(&self, keys: &[FileKey]) -> StoreResult<Vec<StoredRecord>> {
        Ok(lock(&self.table).find_by_keys(keys))
    }

    fn list_folder(&self, query: &FolderQuery) -> StoreResult<Vec<StoredRecord>> {
        Ok(lock(&self.table).list_folder(query))
    }

    fn save(&self, id: Option<RecordId>, record: &FileRecord) -> StoreResult<RecordId> {
        lock(&self.table).save(id, record)
    }

    fn delete(&self, id: RecordId) -> StoreResult<()> {
        lock(&self.table).delete(id)
    }
}

/// Store persisted as one JSON document, rewritten atomically after every change.
#[derive(Debug)]
pub struct JsonFileMetadataStore {
    path: PathBuf,
    table: Mutex<Table>,
}

impl JsonFileMetadataStore {
    /// Opens the store at `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let table = match fs::read_to_string(&path) {
            Ok(body) => serde_json::from_str(&body).map_err(|e| {
                StoreError::ServerFault(format!(
                    "failed to parse metadata file {}: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No metadata file at {}, starting empty", path.display());
                Table::default()
            }
            Err(e) => {
                return Err(StoreError::ServerFault(format!(
                    "failed to read metadata file {}: {e}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the table and persists it; memory is only updated once
    /// the file has been replaced.
    fn mutate<T>(&self, change: impl FnOnce(&mut Table) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = lock(&self.table);
        let mut next = guard.clone();
        let out = change(&mut next)?;
        persist(&self.path, &next)?;
        *guard = next;
        Ok(out)
    }
}

fn persist(path: &Path, table: &Table) -> StoreResult<()> {
    let fault = |e: &dyn std::fmt::Display| {
        tracing::error!("Failed to write metadata file {}: {}", path.display(), e);
        StoreError::ServerFault(format!("failed to write metadata file {}", path.display()))
    };

    let body = serde_json::to_string_pretty(table).map_err(|e| fault(&e))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| fault(&e))?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs::write(&temp, body).map_err(|e| fault(&e))?;
    fs::rename(&temp, path).map_err(|e| fault(&e))
}

impl MetadataStore for JsonFileMetadataStore {
    fn find_by_key(&self, key: &FileKey) -> StoreResult<Option<StoredRecord>> {
        Ok(lock(&self.table).find_by_key(key))
    }

    fn find_by_keys(&self, keys: &[FileKey]) -> StoreResult<Vec<StoredRecord>> {
        Ok(lock(&self.table).find_by_keys(keys))
    }

    fn list_folder(&self, query: &FolderQuery) -> StoreResult<Vec<StoredRecord>> {
        Ok(lock(&self.table).list_folder(query))
    }

    fn save(&self, id: Option<RecordId>, record: &FileRecord) -> StoreResult<RecordId> {
        self.mutate(|table| table.save(id, record))
    }

    fn delete(&self, id: RecordId) -> StoreResult<()> {
        self.mutate(|table| table.delete(id))
    }
}
