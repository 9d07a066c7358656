//! Physical path resolution and active/archived tiering.
//!
//! Content and headers are sharded by the record's storage date (`YYYY/MM/DD`), which bounds
//! directory fan-out. The content root is chosen by age on every access; files are never
//! relocated between tiers.

use crate::clock::Clock;
use crate::constants::{HEADER_FILE_EXTENSION, SEMAPHORE_FILE_EXTENSION};
use crate::record::FileRecord;
use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};

/// The four top-level storage locations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageRoots {
    pub active: PathBuf,
    pub archived: PathBuf,
    pub headers: PathBuf,
    pub specials: PathBuf,
}

impl StorageRoots {
    pub fn new(
        active: impl Into<PathBuf>,
        archived: impl Into<PathBuf>,
        headers: impl Into<PathBuf>,
        specials: impl Into<PathBuf>,
    ) -> Self {
        Self {
            active: active.into(),
            archived: archived.into(),
            headers: headers.into(),
            specials: specials.into(),
        }
    }
}

/// The physical artifacts a record can own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Content,
    Header,
    Semaphore,
}

/// Content storage tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Active,
    Archived,
}

/// Maps a record and artifact kind to a concrete path.
#[derive(Clone, Debug)]
pub struct TieredPathResolver {
    roots: StorageRoots,
    archive_after_days: i64,
}

impl TieredPathResolver {
    /// `archive_after_days <= 0` disables archiving: all content resolves to the active root.
    pub fn new(roots: StorageRoots, archive_after_days: i64) -> Self {
        Self {
            roots,
            archive_after_days,
        }
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    /// Tier of content stored on `storage_date`, as seen on `today`.
    ///
    /// Content moves to the archived tier once it is strictly older than the threshold.
    pub fn tier(&self, storage_date: NaiveDate, today: NaiveDate) -> Tier {
        let age = today.signed_duration_since(storage_date).num_days();
        if self.archive_after_days > 0 && age > self.archive_after_days {
            Tier::Archived
        } else {
            Tier::Active
        }
    }

    /// Path of one artifact of `record`, with the tier evaluated on `today`.
    pub fn resolve_on(&self, record: &FileRecord, kind: FileKind, today: NaiveDate) -> PathBuf {
        let name = record.storage_name().as_str();
        match kind {
            FileKind::Content => {
                let root = match self.tier(record.storage_date(), today) {
                    Tier::Active => &self.roots.active,
                    Tier::Archived => &self.roots.archived,
                };
                date_shard(root, record.storage_date()).join(name)
            }
            FileKind::Header => date_shard(&self.roots.headers, record.storage_date())
                .join(format!("{name}{HEADER_FILE_EXTENSION}")),
            FileKind::Semaphore => self
                .roots
                .specials
                .join(record.logical_folder().as_str())
                .join(format!("{name}{SEMAPHORE_FILE_EXTENSION}")),
        }
    }

    /// Path of one artifact of `record` as of the clock's current date.
    pub fn resolve(&self, record: &FileRecord, kind: FileKind, clock: &dyn Clock) -> PathBuf {
        self.resolve_on(record, kind, clock.today())
    }

    /// The configured root containing `path`; directory creation stops there.
    pub(crate) fn root_for(&self, path: &Path) -> Option<&Path> {
        [
            &self.roots.active,
            &self.roots.archived,
            &self.roots.headers,
            &self.roots.specials,
        ]
        .into_iter()
        .map(PathBuf::as_path)
        .find(|root| path.starts_with(root))
    }
}

fn date_shard(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}", date.day()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::record_on;
    use crate::record::DepositKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn resolver(threshold: i64) -> TieredPathResolver {
        TieredPathResolver::new(
            StorageRoots::new("/active", "/archived", "/headers", "/specials"),
            threshold,
        )
    }

    #[test]
    fn content_and_header_are_sharded_by_storage_date() {
        let record = record_on(DepositKind::Ordinary, date(2024, 3, 5));
        let name = record.storage_name().as_str().to_owned();
        let r = resolver(365);

        assert_eq!(
            r.resolve_on(&record, FileKind::Content, date(2024, 3, 6)),
            PathBuf::from(format!("/active/2024/03/05/{name}"))
        );
        assert_eq!(
            r.resolve_on(&record, FileKind::Header, date(2024, 3, 6)),
            PathBuf::from(format!("/headers/2024/03/05/{name}.bsfh"))
        );
    }

    #[test]
    fn semaphore_lives_in_the_folder_under_the_special_root() {
        let record = record_on(DepositKind::Special, date(2024, 3, 5));
        let name = record.storage_name().as_str().to_owned();

        assert_eq!(
            resolver(0).resolve_on(&record, FileKind::Semaphore, date(2030, 1, 1)),
            PathBuf::from(format!("/specials/DOCS/{name}.go"))
        );
    }

    #[test]
    fn aging_past_the_threshold_only_changes_the_root() {
        let record = record_on(DepositKind::Ordinary, date(2024, 1, 1));
        let r = resolver(30);

        let young = r.resolve_on(&record, FileKind::Content, date(2024, 1, 31));
        let old = r.resolve_on(&record, FileKind::Content, date(2024, 2, 1));

        assert!(young.starts_with("/active"));
        assert!(old.starts_with("/archived"));
        assert_eq!(
            young.strip_prefix("/active").unwrap(),
            old.strip_prefix("/archived").unwrap()
        );
    }

    #[test]
    fn headers_are_never_archived() {
        let record = record_on(DepositKind::Ordinary, date(2020, 1, 1));
        let header = resolver(1).resolve_on(&record, FileKind::Header, date(2026, 1, 1));
        assert!(header.starts_with("/headers/2020/01/01"));
    }

    #[test]
    fn non_positive_threshold_disables_archiving() {
        let stored = date(2000, 1, 1);
        let today = date(2026, 1, 1);
        assert_eq!(resolver(0).tier(stored, today), Tier::Active);
        assert_eq!(resolver(-5).tier(stored, today), Tier::Active);
        assert_eq!(resolver(1).tier(stored, today), Tier::Archived);
    }

    #[test]
    fn root_for_finds_the_owning_root() {
        let r = resolver(0);
        assert_eq!(
            r.root_for(Path::new("/headers/2024/01/01/X.bsfh")),
            Some(Path::new("/headers"))
        );
        assert_eq!(r.root_for(Path::new("/elsewhere/file")), None);
    }
}
