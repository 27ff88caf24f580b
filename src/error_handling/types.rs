use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    DirectoryMissing(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::DirectoryMissing(e) => write!(f, "Directory error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures of an audit storage backend.
///
/// Every variant carries enough context (file path or backend message) for
/// an operator to identify the affected store.
#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed(String),
    WriteFailed(String),
    ReadFailed(String),
    CloseFailed(String),
    ArchiveExists(PathBuf),
    ArchiveFailed { from: PathBuf, to: PathBuf, reason: String },
    InvalidRotationPeriod,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(e) => write!(f, "Storage connection failed: {}", e),
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
            StorageError::CloseFailed(e) => write!(f, "Storage close failed: {}", e),
            StorageError::ArchiveExists(p) => {
                write!(f, "Archive file {} already exists", p.display())
            }
            StorageError::ArchiveFailed { from, to, reason } => write!(
                f,
                "Could not archive {} to {}: {}",
                from.display(),
                to.display(),
                reason
            ),
            StorageError::InvalidRotationPeriod => {
                write!(f, "Rotation period must be greater than zero")
            }
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum SnapshotError {
    IoError { path: PathBuf, source: std::io::Error },
    Serialize(String),
    /// The stream itself could not be read past some point.
    Malformed(String),
    /// Individual records were rejected; the rest of the stream was kept.
    Records { failed: usize, first: String },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::IoError { path, source } => {
                write!(f, "Snapshot IO error on {}: {}", path.display(), source)
            }
            SnapshotError::Serialize(e) => write!(f, "Snapshot serialization failed: {}", e),
            SnapshotError::Malformed(e) => write!(f, "Snapshot parse failure: {}", e),
            SnapshotError::Records { failed, first } => write!(
                f,
                "Snapshot parse failure: {} record(s) rejected, first error: {}",
                failed, first
            ),
        }
    }
}

impl std::error::Error for SnapshotError {}

#[derive(Debug)]
pub enum ListOptionsError {
    UnsupportedFilter(String),
    UnsupportedSort(String),
    BadPagination(String),
}

impl fmt::Display for ListOptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListOptionsError::UnsupportedFilter(e) => write!(f, "Unsupported filter field: {}", e),
            ListOptionsError::UnsupportedSort(e) => write!(f, "Unsupported sort field: {}", e),
            ListOptionsError::BadPagination(e) => write!(f, "Invalid pagination: {}", e),
        }
    }
}

impl std::error::Error for ListOptionsError {}

#[derive(Debug)]
pub enum AuditError {
    StorageError(StorageError),
    InvalidQuery(ListOptionsError),
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditError::StorageError(e) => write!(f, "Audit log storage error: {}", e),
            AuditError::InvalidQuery(e) => write!(f, "Audit log query error: {}", e),
        }
    }
}

impl std::error::Error for AuditError {}

impl From<StorageError> for AuditError {
    fn from(err: StorageError) -> Self {
        AuditError::StorageError(err)
    }
}

impl From<ListOptionsError> for AuditError {
    fn from(err: ListOptionsError) -> Self {
        AuditError::InvalidQuery(err)
    }
}
