//! Metadata recovery from header files.
//!
//! Header files live at `<header root>/YYYY/MM/DD/<STORAGE NAME>.bsfh` and are never archived,
//! so walking that tree finds every record that was ever stored, even if the metadata store
//! has been lost.

use crate::{StoreError, StoreResult};
use bsfm_files::{FileKey, FileRecord, FilesError, HeaderRecord, StorageName, HEADER_FILE_EXTENSION};
use std::fs;
use std::path::{Path, PathBuf};

/// Depth of the `YYYY/MM/DD` shard below the header root.
const SHARD_DEPTH: usize = 3;

/// One header file and the record rebuilt from it.
#[derive(Debug)]
pub struct ScannedHeader {
    pub path: PathBuf,
    pub record: Result<FileRecord, FilesError>,
}

/// Outcome of a recovery run.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Records inserted into the metadata store.
    pub restored: Vec<FileKey>,
    /// Records the store already had.
    pub present: Vec<FileKey>,
    /// Header files that could not be turned into records.
    pub failed: Vec<(PathBuf, String)>,
}

/// Reads every header file below `header_root`, in path order.
///
/// A missing root yields no headers. Unreadable or inconsistent header files are reported per
/// file; only a failure to list a directory aborts the scan.
pub fn scan_headers(header_root: &Path) -> StoreResult<Vec<ScannedHeader>> {
    let mut files = Vec::new();
    if header_root.is_dir() {
        collect(header_root, 0, &mut files)?;
    }
    files.sort();

    Ok(files
        .into_iter()
        .map(|path| {
            let record = read_header(&path);
            ScannedHeader { path, record }
        })
        .collect())
}

fn collect(dir: &Path, depth: usize, files: &mut Vec<PathBuf>) -> StoreResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| {
        StoreError::ServerFault(format!("failed to list {}: {e}", dir.display()))
    })?;

    for entry in entries {
        let path = entry
            .map_err(|e| StoreError::ServerFault(format!("failed to list {}: {e}", dir.display())))?
            .path();
        if depth < SHARD_DEPTH {
            if path.is_dir() {
                collect(&path, depth + 1, files)?;
            }
        } else if path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(HEADER_FILE_EXTENSION))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn read_header(path: &Path) -> Result<FileRecord, FilesError> {
    let stem = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(HEADER_FILE_EXTENSION))
        .ok_or_else(|| FilesError::InvalidHeader(format!("unexpected name {}", path.display())))?;
    let storage_name = StorageName::parse(stem).map_err(FilesError::InvalidHeader)?;

    let body = fs::read_to_string(path).map_err(|source| FilesError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    HeaderRecord::parse(&body)?.into_record(&storage_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_root_yields_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(scan_headers(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn stray_files_are_ignored_and_bad_headers_reported() {
        let dir = TempDir::new().unwrap();
        let day = dir.path().join("2024").join("03").join("05");
        fs::create_dir_all(&day).unwrap();
        fs::write(dir.path().join("README"), "not a header").unwrap();
        fs::write(day.join("notes.txt"), "ignored").unwrap();
        fs::write(day.join(format!("{}.bsfh", "A".repeat(64))), "garbage").unwrap();
        fs::write(day.join("lowercase.bsfh"), "garbage").unwrap();

        let scanned = scan_headers(dir.path()).unwrap();
        assert_eq!(scanned.len(), 2);
        assert!(scanned
            .iter()
            .all(|s| matches!(s.record, Err(FilesError::InvalidHeader(_)))));
    }
}
