//! # File storage service
//!
//! Composes the storage core (writer, reader, antivirus gate) with the metadata store into
//! the operations the API layers expose: deposit, lookup, download, status management and
//! deletion.
//!
//! ## Deposit
//!
//! 1. Validate attributes and build the record in state `NEW` (special deposits without an
//!    external reference fail here, before hashing or I/O)
//! 2. Refuse the deposit if the metadata store already knows the derived file key
//! 3. Scan and write the content, write the header, write the semaphore for special deposits
//! 4. Advance to `AVAILABLE` / `SPECIAL_READY` and insert the metadata record
//!
//! A failure after step 3 started removes the files this call created. Files that already
//! existed (the losing side of a concurrent deposit) are never touched.
//!
//! ## Download
//!
//! Every download re-resolves the content tier and re-scans the bytes. A read-time infection
//! is saved to the metadata store before the error is returned.

use crate::config::CoreConfig;
use crate::metadata::{FolderQuery, JsonFileMetadataStore, MetadataStore, StoredRecord};
use crate::recovery::{scan_headers, RecoveryReport};
use crate::{StoreError, StoreResult};
use bsfm_files::{
    platform_policy, AntivirusGate, ClamdScanner, Clock, ContentStream, DepositKind,
    FileAttributes, FileKey, FileRecord, FileStatus, FolderName, ScanOracle, StorageReader,
    StorageWriter, SystemClock, TieredPathResolver,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// A record together with its verified content stream.
#[derive(Debug)]
pub struct Download {
    pub record: FileRecord,
    pub content: ContentStream,
}

#[derive(Clone)]
pub struct FileStorageService {
    store: Arc<dyn MetadataStore>,
    writer: StorageWriter,
    reader: StorageReader,
    clock: Arc<dyn Clock>,
    header_root: PathBuf,
}

impl FileStorageService {
    /// Builds the service from its collaborators.
    ///
    /// Fails if a configured filesystem group cannot be resolved.
    pub fn new(
        cfg: &CoreConfig,
        store: Arc<dyn MetadataStore>,
        oracle: Arc<dyn ScanOracle>,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let resolver = TieredPathResolver::new(cfg.roots().clone(), cfg.archive_after_days());
        let gate = AntivirusGate::new(oracle);
        let permissions = platform_policy(cfg.groups())?;
        Ok(Self {
            store,
            writer: StorageWriter::new(resolver.clone(), gate.clone(), permissions, clock.clone()),
            reader: StorageReader::new(resolver, gate, clock.clone()),
            clock,
            header_root: cfg.roots().headers.clone(),
        })
    }

    /// Builds the production service: JSON metadata file, clamd oracle, system clock.
    pub fn from_config(cfg: &CoreConfig) -> StoreResult<Self> {
        let store = JsonFileMetadataStore::open(cfg.metadata_file())?;
        let clamav = cfg.clamav();
        let oracle = ClamdScanner::new(clamav.host.clone(), clamav.port, clamav.timeout);
        Self::new(
            cfg,
            Arc::new(store),
            Arc::new(oracle),
            Arc::new(SystemClock),
        )
    }

    /// Stores a new file and returns its record.
    pub fn deposit(
        &self,
        kind: DepositKind,
        folder: &str,
        attributes: FileAttributes,
        content: &[u8],
    ) -> StoreResult<FileRecord> {
        let folder = FolderName::new(folder)?;
        let storage_date = self.clock.today();
        let mut record = FileRecord::create(kind, folder, attributes, content, storage_date)?;

        if self.store.find_by_key(record.file_key())?.is_some() {
            tracing::warn!("Refusing duplicate deposit of {}", record.file_key());
            return Err(StoreError::Conflict(format!(
                "file {} already exists",
                record.file_key()
            )));
        }

        let mut created = Vec::new();
        let saved = self
            .write_artifacts(&mut record, content, &mut created)
            .and_then(|()| self.store.save(None, &record));

        match saved {
            Ok(id) => {
                tracing::info!(
                    "Deposited {} as {} (record {}, status {})",
                    record.original_file_name(),
                    record.file_key(),
                    id,
                    record.status()
                );
                Ok(record)
            }
            Err(e) => {
                if !created.is_empty() {
                    tracing::warn!(
                        "Deposit of {} failed, removing {} created file(s)",
                        record.file_key(),
                        created.len()
                    );
                    self.writer.discard(&created);
                }
                log_failure("deposit", &e);
                Err(e)
            }
        }
    }

    fn write_artifacts(
        &self,
        record: &mut FileRecord,
        content: &[u8],
        created: &mut Vec<PathBuf>,
    ) -> StoreResult<()> {
        let content_path = self.writer.write_content(record, content)?;
        created.push(content_path.clone());
        created.push(self.writer.write_header(record)?);
        if record.is_special() {
            created.push(self.writer.write_semaphore(record, &content_path)?);
        }
        record.mark_stored()?;
        Ok(())
    }

    pub fn get_info(&self, file_key: &str) -> StoreResult<FileRecord> {
        Ok(self.lookup(file_key)?.record)
    }

    /// Looks up several keys at once; any unknown key fails the whole call as Forbidden.
    pub fn get_multiple(&self, file_keys: &[String]) -> StoreResult<Vec<FileRecord>> {
        let unique: BTreeSet<&str> = file_keys.iter().map(|k| k.trim()).collect();
        let keys = unique
            .iter()
            .map(|k| FileKey::parse(k))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| forbidden_enumeration())?;

        let found = self.store.find_by_keys(&keys)?;
        if found.len() != keys.len() {
            tracing::warn!(
                "Multiple lookup asked for {} keys, {} exist",
                keys.len(),
                found.len()
            );
            return Err(forbidden_enumeration());
        }
        Ok(found.into_iter().map(|s| s.record).collect())
    }

    /// Lists a folder. `*`/empty owner and year `0` are wildcards; an empty result is NotFound.
    pub fn list_folder(
        &self,
        folder: &str,
        owner: Option<&str>,
        year: Option<i32>,
    ) -> StoreResult<Vec<FileRecord>> {
        let query = FolderQuery::new(FolderName::new(folder)?, owner, year);
        let found = self.store.list_folder(&query)?;
        if found.is_empty() {
            return Err(StoreError::NotFound(format!("no files in folder {folder}")));
        }
        Ok(found.into_iter().map(|s| s.record).collect())
    }

    pub fn download(&self, file_key: &str) -> StoreResult<Download> {
        let stored = self.lookup(file_key)?;
        self.open(stored)
    }

    /// Downloads through the public path, which only serves public records.
    pub fn download_public(&self, file_key: &str) -> StoreResult<Download> {
        let stored = self.lookup(file_key)?;
        if !stored.record.is_public() {
            tracing::warn!("Refusing public download of private file {}", file_key);
            return Err(StoreError::Forbidden(format!("file {file_key} is not public")));
        }
        self.open(stored)
    }

    fn open(&self, stored: StoredRecord) -> StoreResult<Download> {
        let StoredRecord { id, mut record } = stored;
        let before = record.status();

        match self.reader.open_content(&mut record) {
            Ok(content) => Ok(Download { record, content }),
            Err(e) => {
                if record.status() != before {
                    self.store.save(Some(id), &record)?;
                    tracing::warn!("Marked {} as {}", record.file_key(), record.status());
                }
                let e = StoreError::from(e);
                log_failure("download", &e);
                Err(e)
            }
        }
    }

    /// Administrative status change; the only way to clear `VIRUS_INFECTED`.
    pub fn update_status(
        &self,
        file_key: &str,
        status: Option<i32>,
        status_linked_data: Option<String>,
    ) -> StoreResult<FileRecord> {
        let code = status.ok_or_else(|| StoreError::InvalidInput("status is required".into()))?;
        let StoredRecord { id, mut record } = self.lookup(file_key)?;

        record.set_status(FileStatus::from_code(code), status_linked_data)?;
        self.store.save(Some(id), &record)?;
        tracing::info!("Status of {} set to {}", record.file_key(), record.status());
        Ok(record)
    }

    /// Hides a record. Its files stay on disk unchanged.
    pub fn soft_delete(&self, file_key: &str) -> StoreResult<FileRecord> {
        let StoredRecord { id, mut record } = self.lookup(file_key)?;
        record.soft_delete();
        self.store.save(Some(id), &record)?;
        tracing::info!("Soft-deleted {}", record.file_key());
        Ok(record)
    }

    /// Removes the physical files, then the metadata record.
    ///
    /// A filesystem failure leaves the metadata in place so the delete can be retried.
    pub fn hard_delete(&self, file_key: &str) -> StoreResult<()> {
        let StoredRecord { id, record } = self.lookup(file_key)?;

        self.writer.remove_files(&record).map_err(|e| {
            let e = StoreError::from(e);
            log_failure("hard delete", &e);
            e
        })?;
        self.store.delete(id)?;
        tracing::info!("Deleted {}", record.file_key());
        Ok(())
    }

    /// Rebuilds metadata records from header files for keys the store does not know.
    pub fn recover_from_headers(&self) -> StoreResult<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for scanned in scan_headers(&self.header_root)? {
            let record = match scanned.record {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Skipping header {}: {}", scanned.path.display(), e);
                    report.failed.push((scanned.path, e.to_string()));
                    continue;
                }
            };

            if self.store.find_by_key(record.file_key())?.is_some() {
                report.present.push(record.file_key().clone());
                continue;
            }
            match self.store.save(None, &record) {
                Ok(_) => report.restored.push(record.file_key().clone()),
                Err(e) => report.failed.push((scanned.path, e.to_string())),
            }
        }

        tracing::info!(
            "Recovery restored {} record(s), {} already present, {} failed",
            report.restored.len(),
            report.present.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn lookup(&self, file_key: &str) -> StoreResult<StoredRecord> {
        let not_found = || {
            tracing::warn!("Unknown file key {}", file_key);
            StoreError::NotFound(format!("file {file_key} not found"))
        };
        let key = FileKey::parse(file_key.trim()).map_err(|_| not_found())?;
        self.store.find_by_key(&key)?.ok_or_else(not_found)
    }
}

fn forbidden_enumeration() -> StoreError {
    StoreError::Forbidden("one or more requested files are not accessible".into())
}

fn log_failure(operation: &str, e: &StoreError) {
    match e {
        StoreError::ServerFault(_) => tracing::error!("{} failed: {}", operation, e),
        _ => tracing::warn!("{} refused: {}", operation, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClamavConfig;
    use crate::metadata::{InMemoryMetadataStore, RecordId};
    use bsfm_files::testing::{FixedClock, ScriptedScanner};
    use bsfm_files::{CategoryGroups, NonEmptyText, StorageRoots};
    use chrono::NaiveDate;
    use std::io::Read;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        scanner: Arc<ScriptedScanner>,
        store: Arc<InMemoryMetadataStore>,
        service: FileStorageService,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let cfg = CoreConfig::new(
            StorageRoots::new(
                dir.path().join("active"),
                dir.path().join("archived"),
                dir.path().join("headers"),
                dir.path().join("specials"),
            ),
            0,
            dir.path().join("meta.json"),
            ClamavConfig {
                host: "localhost".into(),
                port: 3310,
                timeout: Duration::from_secs(1),
            },
            CategoryGroups::default(),
        )
        .unwrap();
        let scanner = Arc::new(ScriptedScanner::new());
        let store = Arc::new(InMemoryMetadataStore::new());
        let clock = Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()));
        let service =
            FileStorageService::new(&cfg, store.clone(), scanner.clone(), clock).unwrap();
        Fixture {
            dir,
            scanner,
            store,
            service,
        }
    }

    fn attributes(name: &str, external_ref: Option<&str>) -> FileAttributes {
        FileAttributes {
            original_file_name: NonEmptyText::new(name).unwrap(),
            content_type: NonEmptyText::new("text/plain").unwrap(),
            owner_key: NonEmptyText::new("ACME").unwrap(),
            target_year: 2024,
            external_ref: external_ref.map(str::to_owned),
            is_attachment: true,
        }
    }

    #[test]
    fn get_multiple_is_all_or_nothing() {
        let fx = fixture();
        let a = fx
            .service
            .deposit(DepositKind::Ordinary, "DOCS", attributes("b.txt", None), b"b")
            .unwrap();
        let b = fx
            .service
            .deposit(DepositKind::Ordinary, "DOCS", attributes("a.txt", None), b"a")
            .unwrap();

        let keys = vec![
            a.file_key().to_string(),
            b.file_key().to_string(),
            a.file_key().to_string(),
        ];
        let found = fx.service.get_multiple(&keys).unwrap();
        let names: Vec<_> = found.iter().map(FileRecord::original_file_name).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);

        let (unknown, _) = bsfm_files::keys::derive("X", false, false, "Y", 1, None, "z");
        let with_unknown = vec![a.file_key().to_string(), unknown.to_string()];
        assert!(matches!(
            fx.service.get_multiple(&with_unknown),
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            fx.service.get_multiple(&["garbage".to_string()]),
            Err(StoreError::Forbidden(_))
        ));
    }

    #[test]
    fn empty_folder_listing_is_not_found() {
        let fx = fixture();
        assert!(matches!(
            fx.service.list_folder("DOCS", None, None),
            Err(StoreError::NotFound(_))
        ));

        fx.service
            .deposit(DepositKind::Ordinary, "DOCS", attributes("a.txt", None), b"a")
            .unwrap();
        assert_eq!(fx.service.list_folder("DOCS", Some("*"), Some(0)).unwrap().len(), 1);
        assert!(fx.service.list_folder("DOCS", Some("GLOBEX"), None).is_err());
    }

    #[test]
    fn public_download_requires_public_record() {
        let fx = fixture();
        let private = fx
            .service
            .deposit(DepositKind::Ordinary, "DOCS", attributes("a.txt", None), b"a")
            .unwrap();
        let public = fx
            .service
            .deposit(DepositKind::Public, "DOCS", attributes("a.txt", None), b"a")
            .unwrap();

        assert!(matches!(
            fx.service.download_public(private.file_key().as_str()),
            Err(StoreError::Forbidden(_))
        ));

        let mut download = fx.service.download_public(public.file_key().as_str()).unwrap();
        let mut body = String::new();
        download.content.read_to_string(&mut body).unwrap();
        assert_eq!(body, "a");
    }

    #[test]
    fn update_status_requires_a_status_and_clears_infection() {
        let fx = fixture();
        let record = fx
            .service
            .deposit(DepositKind::Ordinary, "DOCS", attributes("a.txt", None), b"payload")
            .unwrap();
        let key = record.file_key().as_str();

        assert!(matches!(
            fx.service.update_status(key, None, None),
            Err(StoreError::InvalidInput(_))
        ));

        fx.scanner.flag("payload", "Sig-1");
        assert!(matches!(fx.service.download(key), Err(StoreError::Infected(_))));
        fx.scanner.clear();
        assert!(matches!(fx.service.download(key), Err(StoreError::Infected(_))));

        let cleared = fx
            .service
            .update_status(key, Some(FileStatus::AVAILABLE.code()), None)
            .unwrap();
        assert_eq!(cleared.status(), FileStatus::AVAILABLE);
        assert!(fx.service.download(key).is_ok());
    }

    #[test]
    fn downstream_status_codes_are_stored_verbatim() {
        let fx = fixture();
        let record = fx
            .service
            .deposit(
                DepositKind::Special,
                "TALENT",
                attributes("cv.pdf", Some("EXT-1")),
                b"cv",
            )
            .unwrap();
        let key = record.file_key().as_str();

        let processed = fx
            .service
            .update_status(key, Some(10), Some("batch 7".into()))
            .unwrap();
        assert_eq!(processed.status().code(), 10);
        assert_eq!(processed.status_linked_data(), Some("batch 7"));
        assert_eq!(fx.service.get_info(key).unwrap(), processed);
    }

    #[test]
    fn unknown_and_malformed_keys_are_not_found() {
        let fx = fixture();
        assert!(matches!(
            fx.service.get_info("not-a-key"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.hard_delete("not-a-key"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn metadata_failure_after_writes_removes_created_files() {
        struct RefusingStore;
        impl MetadataStore for RefusingStore {
            fn find_by_key(&self, _: &FileKey) -> StoreResult<Option<StoredRecord>> {
                Ok(None)
            }
            fn find_by_keys(&self, _: &[FileKey]) -> StoreResult<Vec<StoredRecord>> {
                Ok(Vec::new())
            }
            fn list_folder(&self, _: &FolderQuery) -> StoreResult<Vec<StoredRecord>> {
                Ok(Vec::new())
            }
            fn save(&self, _: Option<RecordId>, _: &FileRecord) -> StoreResult<RecordId> {
                Err(StoreError::ServerFault("database offline".into()))
            }
            fn delete(&self, _: RecordId) -> StoreResult<()> {
                Ok(())
            }
        }

        let fx = fixture();
        let service = FileStorageService {
            store: Arc::new(RefusingStore),
            ..fx.service.clone()
        };

        let result = service.deposit(
            DepositKind::Special,
            "TALENT",
            attributes("cv.pdf", Some("EXT-1")),
            b"cv",
        );
        assert!(matches!(result, Err(StoreError::ServerFault(_))));

        let leftover = walk(fx.dir.path());
        assert!(leftover.is_empty(), "left behind: {leftover:?}");
    }

    fn walk(dir: &std::path::Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                files.extend(walk(&path));
            } else {
                files.push(path);
            }
        }
        files
    }
}
