//! Create-only writes of content, header and semaphore files.
//!
//! Every write resolves its path through the [`TieredPathResolver`], creates missing
//! directories below the storage root (applying the category's permission policy to the
//! ones it created), then creates the file with `create_new`. An existing file is reported
//! as [`FilesError::AlreadyExists`] and never overwritten: that is how identity collisions
//! become conflicts, including between concurrent deposits.

use crate::antivirus::AntivirusGate;
use crate::clock::Clock;
use crate::header::{render_semaphore, HeaderRecord};
use crate::paths::{FileKind, TieredPathResolver};
use crate::permissions::{FileCategory, PermissionPolicy};
use crate::record::FileRecord;
use crate::{FilesError, FilesResult};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes and removes the physical artifacts of records.
#[derive(Clone)]
pub struct StorageWriter {
    resolver: TieredPathResolver,
    gate: AntivirusGate,
    permissions: Arc<dyn PermissionPolicy>,
    clock: Arc<dyn Clock>,
}

impl StorageWriter {
    pub fn new(
        resolver: TieredPathResolver,
        gate: AntivirusGate,
        permissions: Arc<dyn PermissionPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolver,
            gate,
            permissions,
            clock,
        }
    }

    /// Scans `bytes` and, if clean, writes them as the record's content file.
    ///
    /// The scan happens before any filesystem access, so an infected deposit leaves nothing
    /// behind.
    ///
    /// # Errors
    ///
    /// - [`FilesError::Infected`] / [`FilesError::Scan`] from the gate
    /// - [`FilesError::AlreadyExists`] if the content file exists
    /// - [`FilesError::Io`] for any other filesystem failure
    pub fn write_content(&self, record: &FileRecord, bytes: &[u8]) -> FilesResult<PathBuf> {
        self.gate.ensure_clean(&mut &bytes[..])?;

        let path = self
            .resolver
            .resolve(record, FileKind::Content, self.clock.as_ref());
        self.create_exclusive(&path, bytes, FileCategory::Files)?;
        Ok(path)
    }

    /// Writes the record's header file.
    pub fn write_header(&self, record: &FileRecord) -> FilesResult<PathBuf> {
        let path = self
            .resolver
            .resolve(record, FileKind::Header, self.clock.as_ref());
        let body = HeaderRecord::from_record(record).render();
        self.create_exclusive(&path, body.as_bytes(), FileCategory::Headers)?;
        Ok(path)
    }

    /// Writes the hand-off marker for a special record whose content is at `content_path`.
    pub fn write_semaphore(&self, record: &FileRecord, content_path: &Path) -> FilesResult<PathBuf> {
        let path = self
            .resolver
            .resolve(record, FileKind::Semaphore, self.clock.as_ref());
        let body = render_semaphore(record, content_path);
        self.create_exclusive(&path, body.as_bytes(), FileCategory::Specials)?;
        Ok(path)
    }

    /// Removes every physical artifact of `record`: semaphore (special records only),
    /// content in the tier selected by age, and header.
    ///
    /// Missing files are skipped; any other failure stops and is returned.
    pub fn remove_files(&self, record: &FileRecord) -> FilesResult<()> {
        let mut kinds = Vec::with_capacity(3);
        if record.is_special() {
            kinds.push(FileKind::Semaphore);
        }
        kinds.extend([FileKind::Content, FileKind::Header]);

        for kind in kinds {
            let path = self.resolver.resolve(record, kind, self.clock.as_ref());
            remove_if_present(&path)?;
        }
        Ok(())
    }

    /// Best-effort removal of files created by a deposit that failed later on.
    pub fn discard(&self, paths: &[PathBuf]) {
        for path in paths.iter().rev() {
            if let Err(e) = remove_if_present(path) {
                tracing::error!("Failed to remove {} after aborted deposit: {}", path.display(), e);
            }
        }
    }

    fn create_exclusive(&self, path: &Path, bytes: &[u8], category: FileCategory) -> FilesResult<()> {
        if let Some(parent) = path.parent() {
            self.create_dirs(parent, category)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::warn!("Refusing to overwrite {}", path.display());
                return Err(FilesError::AlreadyExists(path.to_path_buf()));
            }
            Err(e) => return Err(FilesError::io(path, e)),
        };

        let written = file
            .write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| FilesError::io(path, e))
            .and_then(|()| self.permissions.apply_to_file(path, category));

        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(path) {
                tracing::error!(
                    "Failed to remove partially written {}: {}",
                    path.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::debug!("Created {}", path.display());
        Ok(())
    }

    /// Creates `dir` and any missing ancestors up to its storage root.
    fn create_dirs(&self, dir: &Path, category: FileCategory) -> FilesResult<()> {
        if dir.is_dir() {
            return Ok(());
        }

        let Some(root) = self.resolver.root_for(dir) else {
            return fs::create_dir_all(dir).map_err(|e| FilesError::io(dir, e));
        };
        if !root.is_dir() {
            fs::create_dir_all(root).map_err(|e| FilesError::io(root, e))?;
        }

        let missing: Vec<&Path> = dir
            .ancestors()
            .take_while(|p| *p != root && !p.is_dir())
            .collect();

        for path in missing.into_iter().rev() {
            match fs::create_dir(path) {
                Ok(()) => self.permissions.apply_to_dir(path, category)?,
                // another deposit created it concurrently
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(FilesError::io(path, e)),
            }
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> FilesResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FilesError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::StorageRoots;
    use crate::permissions::NoopPermissions;
    use crate::record::tests::record_on;
    use crate::record::DepositKind;
    use crate::testing::{FixedClock, ScriptedScanner};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        roots: StorageRoots,
        scanner: Arc<ScriptedScanner>,
        writer: StorageWriter,
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let roots = StorageRoots::new(
            dir.path().join("active"),
            dir.path().join("archived"),
            dir.path().join("headers"),
            dir.path().join("specials"),
        );
        let scanner = Arc::new(ScriptedScanner::new());
        let writer = StorageWriter::new(
            TieredPathResolver::new(roots.clone(), 30),
            AntivirusGate::new(scanner.clone()),
            Arc::new(NoopPermissions),
            Arc::new(FixedClock::new(today())),
        );
        Fixture {
            _dir: dir,
            roots,
            scanner,
            writer,
        }
    }

    fn count_files(root: &Path) -> usize {
        if !root.exists() {
            return 0;
        }
        fs::read_dir(root)
            .unwrap()
            .map(|entry| {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    count_files(&path)
                } else {
                    1
                }
            })
            .sum()
    }

    #[test]
    fn writes_content_header_and_semaphore() {
        let fx = fixture();
        let record = record_on(DepositKind::Special, today());

        let content = fx.writer.write_content(&record, b"%PDF-1.7 test").unwrap();
        let header = fx.writer.write_header(&record).unwrap();
        let semaphore = fx.writer.write_semaphore(&record, &content).unwrap();

        assert!(content.starts_with(fx.roots.active.join("2024/03/05")));
        assert_eq!(fs::read(&content).unwrap(), b"%PDF-1.7 test");
        assert_eq!(fs::read_to_string(&header).unwrap().lines().count(), 13);
        assert_eq!(semaphore.parent().unwrap(), fx.roots.specials.join("DOCS"));
        assert!(fs::read_to_string(&semaphore)
            .unwrap()
            .contains(&format!("dataFilePath={}", content.display())));
    }

    #[test]
    fn existing_content_is_never_overwritten() {
        let fx = fixture();
        let record = record_on(DepositKind::Ordinary, today());

        let path = fx.writer.write_content(&record, b"first").unwrap();
        let second = fx.writer.write_content(&record, b"second");

        assert!(matches!(second, Err(FilesError::AlreadyExists(p)) if p == path));
        assert_eq!(fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn infected_content_creates_nothing() {
        let fx = fixture();
        fx.scanner.flag("EICAR", "Eicar-Test-Signature");
        let record = record_on(DepositKind::Ordinary, today());

        let result = fx.writer.write_content(&record, b"xx EICAR xx");

        assert!(matches!(result, Err(FilesError::Infected(sig)) if sig == "Eicar-Test-Signature"));
        assert!(!fx.roots.active.exists());
    }

    #[test]
    fn unavailable_oracle_fails_the_write() {
        let fx = fixture();
        fx.scanner.set_unavailable(true);
        let record = record_on(DepositKind::Ordinary, today());

        let result = fx.writer.write_content(&record, b"data");
        assert!(matches!(result, Err(FilesError::Scan(_))));
        assert_eq!(count_files(&fx.roots.active), 0);
    }

    #[test]
    fn permission_failure_removes_the_partial_file() {
        struct RefusingFiles;
        impl PermissionPolicy for RefusingFiles {
            fn apply_to_file(&self, path: &Path, _: FileCategory) -> FilesResult<()> {
                Err(FilesError::io(
                    path,
                    io::Error::new(io::ErrorKind::PermissionDenied, "chown refused"),
                ))
            }
            fn apply_to_dir(&self, _: &Path, _: FileCategory) -> FilesResult<()> {
                Ok(())
            }
        }

        let fx = fixture();
        let writer = StorageWriter {
            permissions: Arc::new(RefusingFiles),
            ..fx.writer.clone()
        };
        let record = record_on(DepositKind::Ordinary, today());

        let result = writer.write_content(&record, b"%PDF-1.7 test");
        assert!(matches!(result, Err(FilesError::Io { .. })));
        assert_eq!(count_files(&fx.roots.active), 0);
    }

    #[test]
    fn remove_files_is_idempotent() {
        let fx = fixture();
        let record = record_on(DepositKind::Special, today());

        let content = fx.writer.write_content(&record, b"data").unwrap();
        fx.writer.write_header(&record).unwrap();
        fx.writer.write_semaphore(&record, &content).unwrap();

        fx.writer.remove_files(&record).unwrap();
        assert_eq!(count_files(&fx.roots.active), 0);
        assert_eq!(count_files(&fx.roots.headers), 0);
        assert_eq!(count_files(&fx.roots.specials), 0);

        fx.writer.remove_files(&record).unwrap();
    }

    #[test]
    fn discard_removes_listed_paths() {
        let fx = fixture();
        let record = record_on(DepositKind::Ordinary, today());

        let content = fx.writer.write_content(&record, b"data").unwrap();
        let header = fx.writer.write_header(&record).unwrap();
        fx.writer.discard(&[content.clone(), header.clone()]);

        assert!(!content.exists());
        assert!(!header.exists());
    }

    #[cfg(unix)]
    #[test]
    fn posix_policy_applies_to_created_directories_and_files() {
        use crate::permissions::{CategoryGroups, PosixPermissions};
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let roots = StorageRoots::new(
            dir.path().join("active"),
            dir.path().join("archived"),
            dir.path().join("headers"),
            dir.path().join("specials"),
        );
        let writer = StorageWriter::new(
            TieredPathResolver::new(roots.clone(), 0),
            AntivirusGate::new(Arc::new(ScriptedScanner::new())),
            Arc::new(PosixPermissions::new(&CategoryGroups::default()).unwrap()),
            Arc::new(FixedClock::new(today())),
        );
        let record = record_on(DepositKind::Ordinary, today());

        let header = writer.write_header(&record).unwrap();
        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;

        assert_eq!(mode(&header), 0o600);
        assert_eq!(mode(header.parent().unwrap()), 0o710);
        assert_eq!(mode(&roots.headers.join("2024")), 0o710);
    }
}
