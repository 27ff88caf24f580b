use crate::auditlog::entry::Entry;
use crate::auditlog::query::ListOptions;
use crate::error_handling::types::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

/// A single audit store file.
///
/// Implementations own one backing file at a time. The rotation layer
/// closes a provider, moves its file away and opens a fresh one at the same
/// path, so `open` must create the file and schema when they do not exist.
#[async_trait]
pub trait StorageProvider: Send + Sync + Sized + 'static {
    async fn open(path: &Path) -> Result<Self, StorageError>;

    async fn save(&self, entry: &Entry) -> Result<(), StorageError>;

    /// Entries matching the filters, sorted and paginated.
    async fn list(&self, options: &ListOptions) -> Result<Vec<Entry>, StorageError>;

    /// Number of entries matching the filters. Pagination is ignored.
    async fn count(&self, options: &ListOptions) -> Result<u64, StorageError>;

    /// Timestamp of the oldest stored entry, `None` when the store is empty.
    async fn oldest_timestamp(&self) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Releases the backing file. The provider must not be used afterwards.
    async fn close(&self) -> Result<(), StorageError>;
}
