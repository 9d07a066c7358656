//! Filesystem group and mode assignment for newly created files and directories.
//!
//! The writer calls into a [`PermissionPolicy`] chosen once at construction, so the host
//! check happens in [`platform_policy`] and never at call time.

use crate::{FilesError, FilesResult};
#[cfg(unix)]
use nix::unistd::{self, Gid};
use std::path::Path;

/// The permission category of a physical artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileCategory {
    /// Content files: owner read/write, group read.
    Files,
    /// Header files: owner read/write only.
    Headers,
    /// Semaphore files: owner and group read/write, so consumers can remove them.
    Specials,
}

impl FileCategory {
    pub fn file_mode(self) -> u32 {
        match self {
            Self::Files => 0o640,
            Self::Headers => 0o600,
            Self::Specials => 0o660,
        }
    }

    /// Directory mode: the file mode plus traverse for owner and group.
    pub fn dir_mode(self) -> u32 {
        self.file_mode() | 0o110
    }
}

/// Group assigned to each category, if any: a group name or a numeric gid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryGroups {
    pub files: Option<String>,
    pub headers: Option<String>,
    pub specials: Option<String>,
}

impl CategoryGroups {
    pub fn group(&self, category: FileCategory) -> Option<&str> {
        match category {
            FileCategory::Files => self.files.as_deref(),
            FileCategory::Headers => self.headers.as_deref(),
            FileCategory::Specials => self.specials.as_deref(),
        }
    }
}

/// Applies ownership and mode to files and directories the writer has just created.
pub trait PermissionPolicy: Send + Sync {
    fn apply_to_file(&self, path: &Path, category: FileCategory) -> FilesResult<()>;
    fn apply_to_dir(&self, path: &Path, category: FileCategory) -> FilesResult<()>;
}

/// Leaves whatever the host's defaults produced.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPermissions;

impl PermissionPolicy for NoopPermissions {
    fn apply_to_file(&self, _path: &Path, _category: FileCategory) -> FilesResult<()> {
        Ok(())
    }

    fn apply_to_dir(&self, _path: &Path, _category: FileCategory) -> FilesResult<()> {
        Ok(())
    }
}

/// POSIX mode bits plus an optional group per category.
///
/// Group names are resolved once, when the policy is built.
#[cfg(unix)]
#[derive(Clone, Copy, Debug, Default)]
pub struct PosixPermissions {
    files: Option<Gid>,
    headers: Option<Gid>,
    specials: Option<Gid>,
}

#[cfg(unix)]
impl PosixPermissions {
    /// # Errors
    ///
    /// [`FilesError::UnknownGroup`] if a configured group name does not exist on this host.
    pub fn new(groups: &CategoryGroups) -> FilesResult<Self> {
        Ok(Self {
            files: resolve_group(groups.group(FileCategory::Files))?,
            headers: resolve_group(groups.group(FileCategory::Headers))?,
            specials: resolve_group(groups.group(FileCategory::Specials))?,
        })
    }

    pub fn gid(&self, category: FileCategory) -> Option<Gid> {
        match category {
            FileCategory::Files => self.files,
            FileCategory::Headers => self.headers,
            FileCategory::Specials => self.specials,
        }
    }

    fn apply(&self, path: &Path, category: FileCategory, mode: u32) -> FilesResult<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(gid) = self.gid(category) {
            unistd::chown(path, None, Some(gid))
                .map_err(|e| FilesError::io(path, std::io::Error::from(e)))?;
        }
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| FilesError::io(path, e))
    }
}

#[cfg(unix)]
fn resolve_group(group: Option<&str>) -> FilesResult<Option<Gid>> {
    let Some(group) = group else {
        return Ok(None);
    };
    if let Ok(raw) = group.parse::<u32>() {
        return Ok(Some(Gid::from_raw(raw)));
    }

    let unknown = |reason: String| FilesError::UnknownGroup {
        group: group.to_owned(),
        reason,
    };
    match unistd::Group::from_name(group) {
        Ok(Some(found)) => {
            tracing::debug!("Resolved group {} to gid {}", group, found.gid);
            Ok(Some(found.gid))
        }
        Ok(None) => Err(unknown("no such group".into())),
        Err(e) => Err(unknown(e.to_string())),
    }
}

#[cfg(unix)]
impl PermissionPolicy for PosixPermissions {
    fn apply_to_file(&self, path: &Path, category: FileCategory) -> FilesResult<()> {
        self.apply(path, category, category.file_mode())
    }

    fn apply_to_dir(&self, path: &Path, category: FileCategory) -> FilesResult<()> {
        self.apply(path, category, category.dir_mode())
    }
}

/// The policy for the current host: POSIX modes on unix, nothing elsewhere.
pub fn platform_policy(groups: &CategoryGroups) -> FilesResult<std::sync::Arc<dyn PermissionPolicy>> {
    #[cfg(unix)]
    {
        Ok(std::sync::Arc::new(PosixPermissions::new(groups)?))
    }
    #[cfg(not(unix))]
    {
        let _ = groups;
        Ok(std::sync::Arc::new(NoopPermissions))
    }
}
