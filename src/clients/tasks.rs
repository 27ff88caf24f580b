use crate::clients::registry::ClientSessionRegistry;
use crate::clients::snapshot;
use crate::scheduler::{Task, TaskError};
use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Drops sessions that stayed disconnected longer than `keep_disconnected`.
pub struct CleanupTask {
    registry: Arc<ClientSessionRegistry>,
    keep_disconnected: Option<Duration>,
}

impl CleanupTask {
    pub fn new(registry: Arc<ClientSessionRegistry>, keep_disconnected: Option<Duration>) -> Self {
        Self {
            registry,
            keep_disconnected,
        }
    }
}

#[async_trait]
impl Task for CleanupTask {
    fn name(&self) -> &'static str {
        "cleanup-obsolete-clients"
    }

    async fn run(&self) -> Result<(), TaskError> {
        let removed = self.registry.prune_obsolete(self.keep_disconnected);
        debug!("{} obsolete client(s) pruned", removed);
        Ok(())
    }
}

/// Periodically writes the registry snapshot to disk.
pub struct SaveToFileTask {
    registry: Arc<ClientSessionRegistry>,
    path: PathBuf,
}

impl SaveToFileTask {
    pub fn new(registry: Arc<ClientSessionRegistry>, path: PathBuf) -> Self {
        Self { registry, path }
    }
}

#[async_trait]
impl Task for SaveToFileTask {
    fn name(&self) -> &'static str {
        "save-clients"
    }

    async fn run(&self) -> Result<(), TaskError> {
        let registry = Arc::clone(&self.registry);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || snapshot::save_all(&registry, &path)).await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::client_session::ClientSession;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cleanup_task() {
        let mut old = ClientSession::new("old");
        old.disconnected = Some(Utc::now() - chrono::Duration::hours(2));
        let registry = Arc::new(ClientSessionRegistry::new(
            vec![old, ClientSession::new("live")],
            None,
        ));
        let task = CleanupTask::new(registry.clone(), Some(Duration::from_secs(60)));
        task.run().await.unwrap();
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_save_to_file_task() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clients.json");
        let registry = Arc::new(ClientSessionRegistry::new(
            vec![ClientSession::new("a"), ClientSession::new("b")],
            None,
        ));
        SaveToFileTask::new(registry, path.clone()).run().await.unwrap();
        assert_eq!(snapshot::load_from(&path, None).sessions.len(), 2);
    }

    #[tokio::test]
    async fn test_save_to_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("clients.json");
        let registry = Arc::new(ClientSessionRegistry::new(vec![], None));
        assert!(SaveToFileTask::new(registry, path).run().await.is_err());
    }
}
