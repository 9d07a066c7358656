//! Constants used throughout the blob store core crate.
//!
//! Environment variable names, their defaults, and the URI shapes records are presented
//! under.

pub const ENV_ACTIVE_ROOT: &str = "BSFM_ACTIVE_ROOT";
pub const ENV_ARCHIVED_ROOT: &str = "BSFM_ARCHIVED_ROOT";
pub const ENV_HEADER_ROOT: &str = "BSFM_HEADER_ROOT";
pub const ENV_SPECIAL_ROOT: &str = "BSFM_SPECIAL_ROOT";
pub const ENV_ARCHIVE_AFTER_DAYS: &str = "BSFM_ARCHIVE_AFTER_DAYS";
pub const ENV_METADATA_FILE: &str = "BSFM_METADATA_FILE";
pub const ENV_CLAMAV_HOST: &str = "CLAMAV_HOST";
pub const ENV_CLAMAV_PORT: &str = "CLAMAV_PORT";
pub const ENV_CLAMAV_TIMEOUT_SECS: &str = "CLAMAV_TIMEOUT_SECS";
/// Group (name or numeric gid) given to content files.
pub const ENV_FILES_GROUP: &str = "BSFM_FILES_GROUP";
pub const ENV_HEADERS_GROUP: &str = "BSFM_HEADERS_GROUP";
pub const ENV_SPECIALS_GROUP: &str = "BSFM_SPECIALS_GROUP";

/// Default metadata store file when none is configured.
pub const DEFAULT_METADATA_FILE: &str = "bsfm-metadata.json";

pub const DEFAULT_CLAMAV_HOST: &str = "clamav";
pub const DEFAULT_CLAMAV_PORT: u16 = 3310;
pub const DEFAULT_CLAMAV_TIMEOUT_SECS: u64 = 30;

/// Owner filter value meaning "any owner".
pub const ANY_OWNER: &str = "*";

/// Year filter value meaning "any year".
pub const ANY_YEAR: i32 = 0;

/// Prefix of every REST route.
pub const API_PREFIX: &str = "/api/v1";
