//! Time-based rotation of the audit store.
//!
//! Writes always go to `<data_dir>/auditlog.db`. Once per rotation period the
//! active file is closed, renamed to `auditlog.YYYY-MM-DD.db` and replaced by
//! a fresh store. Readers and writers share a read lock on the active
//! provider; rotation takes the write lock, so no entry is written to a file
//! that is being moved.

use crate::auditlog::entry::Entry;
use crate::auditlog::provider::StorageProvider;
use crate::auditlog::query::ListOptions;
use crate::error_handling::types::StorageError;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const ACTIVE_FILE_NAME: &str = "auditlog.db";

/// Archive name for a rotation happening at `at` (UTC date).
pub fn archive_file_name(at: DateTime<Utc>) -> String {
    format!("auditlog.{}.db", at.format("%Y-%m-%d"))
}

struct Shared<P> {
    period: Duration,
    data_dir: PathBuf,
    /// `None` only if reopening the active file failed after a rotation error.
    provider: RwLock<Option<P>>,
}

impl<P: StorageProvider> Shared<P> {
    fn active_path(&self) -> PathBuf {
        self.data_dir.join(ACTIVE_FILE_NAME)
    }

    async fn rotate_locked(
        &self,
        slot: &mut Option<P>,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, StorageError> {
        let active = self.active_path();
        let archive = self.data_dir.join(archive_file_name(now));
        if archive.exists() {
            return Err(StorageError::ArchiveExists(archive));
        }

        if let Some(provider) = slot.as_ref() {
            provider.close().await?;
        }
        *slot = None;

        if let Err(e) = tokio::fs::rename(&active, &archive).await {
            error!(
                "Could not move {} to {}: {}",
                active.display(),
                archive.display(),
                e
            );
            *slot = Some(P::open(&active).await?);
            return Err(StorageError::ArchiveFailed {
                from: active,
                to: archive,
                reason: e.to_string(),
            });
        }

        *slot = Some(P::open(&active).await?);
        info!("Audit log rotated, archived to {}", archive.display());
        Ok(archive)
    }

    async fn rotate_if_needed(&self, now: DateTime<Utc>) -> Result<Option<PathBuf>, StorageError> {
        let mut slot = self.provider.write().await;
        let oldest = match slot.as_ref() {
            Some(provider) => provider.oldest_timestamp().await?,
            None => None,
        };
        let period = chrono::Duration::from_std(self.period)
            .map_err(|_| StorageError::InvalidRotationPeriod)?;
        match oldest {
            Some(oldest) if now - oldest > period => {
                debug!("Oldest audit entry from {} is past the rotation period", oldest);
                self.rotate_locked(&mut slot, now).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Periodic rotation; an empty store is left in place.
    async fn tick(&self) -> Result<(), StorageError> {
        let mut slot = self.provider.write().await;
        let empty = match slot.as_ref() {
            Some(provider) => provider.oldest_timestamp().await?.is_none(),
            None => false,
        };
        if empty {
            debug!("Audit log is empty, skipping rotation");
            return Ok(());
        }
        self.rotate_locked(&mut slot, Utc::now()).await.map(|_| ())
    }
}

pub struct RotationProvider<P: StorageProvider> {
    shared: Arc<Shared<P>>,
    shutdown: watch::Sender<bool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl<P: StorageProvider> RotationProvider<P> {
    /// Opens the active store, rotates it right away if its oldest entry is
    /// older than `period`, then starts the rotation ticker.
    pub async fn open(data_dir: &Path, period: Duration) -> Result<Self, StorageError> {
        if period.is_zero() {
            return Err(StorageError::InvalidRotationPeriod);
        }
        let active = data_dir.join(ACTIVE_FILE_NAME);
        let provider = P::open(&active).await?;
        let shared = Arc::new(Shared {
            period,
            data_dir: data_dir.to_path_buf(),
            provider: RwLock::new(Some(provider)),
        });

        if let Err(e) = shared.rotate_if_needed(Utc::now()).await {
            if let Some(provider) = shared.provider.write().await.take() {
                let _ = provider.close().await;
            }
            return Err(e);
        }

        let (shutdown, mut stop) = watch::channel(false);
        let ticking = Arc::clone(&shared);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = ticking.tick().await {
                            error!("Could not rotate auditlog: {}", e);
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
            debug!("Audit log rotation stopped");
        });
        info!(
            "Audit log at {} rotates every {:?}",
            active.display(),
            period
        );

        Ok(Self {
            shared,
            shutdown,
            ticker: Mutex::new(Some(handle)),
        })
    }

    pub fn period(&self) -> Duration {
        self.shared.period
    }

    pub fn active_path(&self) -> PathBuf {
        self.shared.active_path()
    }

    pub async fn save(&self, entry: &Entry) -> Result<(), StorageError> {
        match self.shared.provider.read().await.as_ref() {
            Some(provider) => provider.save(entry).await,
            None => Err(StorageError::WriteFailed("no active audit store".into())),
        }
    }

    pub async fn list(&self, options: &ListOptions) -> Result<Vec<Entry>, StorageError> {
        match self.shared.provider.read().await.as_ref() {
            Some(provider) => provider.list(options).await,
            None => Err(StorageError::ReadFailed("no active audit store".into())),
        }
    }

    pub async fn count(&self, options: &ListOptions) -> Result<u64, StorageError> {
        match self.shared.provider.read().await.as_ref() {
            Some(provider) => provider.count(options).await,
            None => Err(StorageError::ReadFailed("no active audit store".into())),
        }
    }

    /// Archives the active store now and returns the archive path.
    pub async fn rotate(&self) -> Result<PathBuf, StorageError> {
        self.rotate_at(Utc::now()).await
    }

    pub(crate) async fn rotate_at(&self, now: DateTime<Utc>) -> Result<PathBuf, StorageError> {
        let mut slot = self.shared.provider.write().await;
        self.shared.rotate_locked(&mut slot, now).await
    }

    /// Rotates only when the oldest entry is older than the period.
    pub async fn rotate_if_needed(&self) -> Result<Option<PathBuf>, StorageError> {
        self.shared.rotate_if_needed(Utc::now()).await
    }

    /// Stops the ticker, waits for it, then closes the active store.
    pub async fn close(&self) -> Result<(), StorageError> {
        let _ = self.shutdown.send(true);
        let handle = self
            .ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Audit log rotation task ended abnormally: {}", e);
            }
        }
        match self.shared.provider.write().await.take() {
            Some(provider) => provider.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_archive_file_name() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 23, 59, 0).unwrap();
        assert_eq!(archive_file_name(at), "auditlog.2026-03-09.db");
    }
}
