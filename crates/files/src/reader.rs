//! Opening stored content for reading.

use crate::antivirus::{AntivirusGate, ScanVerdict};
use crate::clock::Clock;
use crate::digest::DigestReader;
use crate::paths::{FileKind, TieredPathResolver};
use crate::record::FileRecord;
use crate::{FilesError, FilesResult};
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A verified content file, positioned at its first byte.
#[derive(Debug)]
pub struct ContentStream {
    file: File,
    path: PathBuf,
    len: u64,
}

impl ContentStream {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for ContentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// Locates a record's content and re-verifies it before handing it out.
#[derive(Clone)]
pub struct StorageReader {
    resolver: TieredPathResolver,
    gate: AntivirusGate,
    clock: Arc<dyn Clock>,
}

impl StorageReader {
    pub fn new(resolver: TieredPathResolver, gate: AntivirusGate, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver,
            gate,
            clock,
        }
    }

    /// Opens the content of `record`.
    ///
    /// The bytes at rest are scanned again and checked against the recorded size and hash.
    /// A read-time infection moves `record` to `VIRUS_INFECTED` (with the signature as
    /// linked data) before the error is returned; persisting that change is the caller's job.
    ///
    /// Records already marked infected fail straight away with their stored signature.
    ///
    /// # Errors
    ///
    /// - [`FilesError::Forbidden`] for soft-deleted or not yet stored records
    /// - [`FilesError::Infected`] for infected content
    /// - [`FilesError::NotFound`] if the content file is absent from its tier
    /// - [`FilesError::Integrity`] if the bytes differ from what was deposited
    /// - [`FilesError::Scan`] / [`FilesError::Io`] for oracle and filesystem faults
    pub fn open_content(&self, record: &mut FileRecord) -> FilesResult<ContentStream> {
        record.ensure_readable()?;

        let path = self
            .resolver
            .resolve(record, FileKind::Content, self.clock.as_ref());
        let file = open(&path)?;

        let mut verifying = DigestReader::new(file);
        if let ScanVerdict::Infected(signature) = self.gate.scan(&mut verifying)? {
            tracing::warn!(
                "Stored file {} is infected: {}",
                record.file_key(),
                signature
            );
            record.mark_infected(signature.clone());
            return Err(FilesError::Infected(signature));
        }

        let (actual, mut file) = verifying.finish().map_err(|e| FilesError::io(&path, e))?;
        if actual.size != record.content_size() || actual.hash != record.content_hash() {
            tracing::error!("Stored file {} failed integrity check", record.file_key());
            return Err(FilesError::Integrity {
                path,
                expected_size: record.content_size(),
                expected_hash: record.content_hash().to_owned(),
                actual_size: actual.size,
                actual_hash: actual.hash,
            });
        }

        // serve the handle that was scanned, not whatever the path points at now
        file.rewind().map_err(|e| FilesError::io(&path, e))?;
        Ok(ContentStream {
            file,
            path,
            len: actual.size,
        })
    }
}

fn open(path: &Path) -> FilesResult<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => FilesError::NotFound(path.to_path_buf()),
        _ => FilesError::io(path, e),
    })
}
