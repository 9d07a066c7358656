use bsfm_files::FilesError;

/// The classes of failure callers need to tell apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    Infected,
    Forbidden,
    ServerFault,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("virus found: {0}")]
    Infected(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("server fault: {0}")]
    ServerFault(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Infected(_) => ErrorKind::Infected,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::ServerFault(_) => ErrorKind::ServerFault,
        }
    }
}

impl From<FilesError> for StoreError {
    fn from(err: FilesError) -> Self {
        match err {
            FilesError::AlreadyExists(_) => Self::Conflict(err.to_string()),
            FilesError::NotFound(_) => Self::NotFound(err.to_string()),
            FilesError::Infected(signature) => Self::Infected(signature),
            FilesError::Forbidden(reason) => Self::Forbidden(reason),
            FilesError::MissingAttribute(_)
            | FilesError::InvalidAttribute { .. }
            | FilesError::InvalidTransition { .. }
            | FilesError::UnknownGroup { .. } => Self::InvalidInput(err.to_string()),
            FilesError::Scan(_)
            | FilesError::Integrity { .. }
            | FilesError::InvalidHeader(_)
            | FilesError::Io { .. } => Self::ServerFault(err.to_string()),
        }
    }
}

impl From<bsfm_types::TextError> for StoreError {
    fn from(err: bsfm_types::TextError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
