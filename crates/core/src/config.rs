//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Request handling never reads environment variables.

use crate::constants::{
    DEFAULT_CLAMAV_HOST, DEFAULT_CLAMAV_PORT, DEFAULT_CLAMAV_TIMEOUT_SECS, DEFAULT_METADATA_FILE,
    ENV_ACTIVE_ROOT, ENV_ARCHIVED_ROOT, ENV_ARCHIVE_AFTER_DAYS, ENV_CLAMAV_HOST, ENV_CLAMAV_PORT,
    ENV_CLAMAV_TIMEOUT_SECS, ENV_FILES_GROUP, ENV_HEADERS_GROUP, ENV_HEADER_ROOT,
    ENV_METADATA_FILE, ENV_SPECIALS_GROUP, ENV_SPECIAL_ROOT,
};
use crate::{StoreError, StoreResult};
use bsfm_files::{CategoryGroups, StorageRoots};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Scan oracle endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClamavConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    roots: StorageRoots,
    archive_after_days: i64,
    metadata_file: PathBuf,
    clamav: ClamavConfig,
    groups: CategoryGroups,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(
        roots: StorageRoots,
        archive_after_days: i64,
        metadata_file: PathBuf,
        clamav: ClamavConfig,
        groups: CategoryGroups,
    ) -> StoreResult<Self> {
        if clamav.host.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "scan oracle host cannot be empty".into(),
            ));
        }

        Ok(Self {
            roots,
            archive_after_days,
            metadata_file,
            clamav,
            groups,
        })
    }

    /// Resolves the configuration from the process environment.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        let required = |name: &str| -> StoreResult<PathBuf> {
            non_blank(lookup(name))
                .map(PathBuf::from)
                .ok_or_else(|| StoreError::InvalidInput(format!("{name} must be set")))
        };

        let roots = StorageRoots::new(
            required(ENV_ACTIVE_ROOT)?,
            required(ENV_ARCHIVED_ROOT)?,
            required(ENV_HEADER_ROOT)?,
            required(ENV_SPECIAL_ROOT)?,
        );

        let clamav = ClamavConfig {
            host: non_blank(lookup(ENV_CLAMAV_HOST))
                .unwrap_or_else(|| DEFAULT_CLAMAV_HOST.to_owned()),
            port: parse_or(ENV_CLAMAV_PORT, lookup(ENV_CLAMAV_PORT), DEFAULT_CLAMAV_PORT)?,
            timeout: Duration::from_secs(parse_or(
                ENV_CLAMAV_TIMEOUT_SECS,
                lookup(ENV_CLAMAV_TIMEOUT_SECS),
                DEFAULT_CLAMAV_TIMEOUT_SECS,
            )?),
        };

        let groups = CategoryGroups {
            files: group_from_env_value(lookup(ENV_FILES_GROUP)),
            headers: group_from_env_value(lookup(ENV_HEADERS_GROUP)),
            specials: group_from_env_value(lookup(ENV_SPECIALS_GROUP)),
        };

        Self::new(
            roots,
            archive_after_days_from_env_value(lookup(ENV_ARCHIVE_AFTER_DAYS))?,
            non_blank(lookup(ENV_METADATA_FILE))
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_METADATA_FILE)),
            clamav,
            groups,
        )
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    pub fn archive_after_days(&self) -> i64 {
        self.archive_after_days
    }

    pub fn metadata_file(&self) -> &Path {
        &self.metadata_file
    }

    pub fn clamav(&self) -> &ClamavConfig {
        &self.clamav
    }

    pub fn groups(&self) -> &CategoryGroups {
        &self.groups
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, value: Option<String>, default: T) -> StoreResult<T> {
    match non_blank(value) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| StoreError::InvalidInput(format!("{name} has invalid value '{v}'"))),
    }
}

/// Parse the archive threshold from an optional string value.
///
/// If `value` is `None` or empty/whitespace, archiving is disabled (`0`). Negative values are
/// accepted and also disable archiving.
pub fn archive_after_days_from_env_value(value: Option<String>) -> StoreResult<i64> {
    parse_or(ENV_ARCHIVE_AFTER_DAYS, value, 0)
}

/// Parse an optional group: a group name or a numeric gid, resolved when the permission
/// policy is built. Blank means no group.
pub fn group_from_env_value(value: Option<String>) -> Option<String> {
    non_blank(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const ROOTS: [(&str, &str); 4] = [
        (ENV_ACTIVE_ROOT, "/nas/active"),
        (ENV_ARCHIVED_ROOT, "/nas/archived"),
        (ENV_HEADER_ROOT, "/nas/headers"),
        (ENV_SPECIAL_ROOT, "/nas/specials"),
    ];

    #[test]
    fn defaults_apply_when_only_roots_are_set() {
        let cfg = CoreConfig::from_lookup(lookup(&ROOTS)).unwrap();

        assert_eq!(cfg.roots().active, PathBuf::from("/nas/active"));
        assert_eq!(cfg.roots().specials, PathBuf::from("/nas/specials"));
        assert_eq!(cfg.archive_after_days(), 0);
        assert_eq!(cfg.metadata_file(), Path::new(DEFAULT_METADATA_FILE));
        assert_eq!(cfg.clamav().host, "clamav");
        assert_eq!(cfg.clamav().port, 3310);
        assert_eq!(cfg.clamav().timeout, Duration::from_secs(30));
        assert_eq!(cfg.groups(), &CategoryGroups::default());
    }

    #[test]
    fn missing_root_is_rejected() {
        let err = CoreConfig::from_lookup(lookup(&ROOTS[..3])).unwrap_err();
        assert!(err.to_string().contains(ENV_SPECIAL_ROOT));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = ROOTS.to_vec();
        vars.extend([
            (ENV_ARCHIVE_AFTER_DAYS, "365"),
            (ENV_CLAMAV_HOST, "scanner.local"),
            (ENV_CLAMAV_PORT, "3311"),
            (ENV_HEADERS_GROUP, "1002"),
            (ENV_SPECIALS_GROUP, "nas-specials"),
        ]);
        let cfg = CoreConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(cfg.archive_after_days(), 365);
        assert_eq!(cfg.clamav().host, "scanner.local");
        assert_eq!(cfg.clamav().port, 3311);
        assert_eq!(cfg.groups().headers.as_deref(), Some("1002"));
        assert_eq!(cfg.groups().specials.as_deref(), Some("nas-specials"));
        assert_eq!(cfg.groups().files, None);
    }

    #[test]
    fn archive_threshold_parsing() {
        assert_eq!(archive_after_days_from_env_value(None).unwrap(), 0);
        assert_eq!(archive_after_days_from_env_value(Some("  ".into())).unwrap(), 0);
        assert_eq!(archive_after_days_from_env_value(Some("-3".into())).unwrap(), -3);
        assert!(archive_after_days_from_env_value(Some("soon".into())).is_err());
    }

    #[test]
    fn group_parsing_accepts_names_and_gids() {
        assert_eq!(group_from_env_value(None), None);
        assert_eq!(group_from_env_value(Some("  ".into())), None);
        assert_eq!(group_from_env_value(Some("42".into())).as_deref(), Some("42"));
        assert_eq!(
            group_from_env_value(Some(" nas-files ".into())).as_deref(),
            Some("nas-files")
        );
    }
}
