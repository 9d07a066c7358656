//! Constants shared by the storage core.
//!
//! File extensions and identity-tuple formatting rules live here so that the writer, the
//! reader and the header recovery path can never disagree about them.

/// Extension appended to the storage name of header files.
pub const HEADER_FILE_EXTENSION: &str = ".bsfh";

/// Extension appended to the storage name of semaphore files.
pub const SEMAPHORE_FILE_EXTENSION: &str = ".go";

/// Stand-in for an absent external reference in the identity tuple.
pub const EXTERNAL_REF_PLACEHOLDER: &str = "-";

/// Separator between the fields of the identity tuple.
pub(crate) const IDENTITY_DELIMITER: char = '/';

/// Text written to header and semaphore files for an absent external reference.
pub(crate) const ABSENT_VALUE: &str = "null";

/// Maximum lengths of the stored classification attributes.
pub(crate) const MAX_OWNER_KEY_LEN: usize = 20;
pub(crate) const MAX_FOLDER_LEN: usize = 256;
pub(crate) const MAX_EXTERNAL_REF_LEN: usize = 30;
