//! Audit log of administrative actions.
//!
//! Components:
//! - `entry`: the audit record and its fluent builder.
//! - `provider`: the storage backend trait.
//! - `sqlite`: SQLite backend (SeaORM), one file per period.
//! - `rotation`: periodic archiving of the active store.
//! - `query`: filtering, sorting and pagination of listings.
//! - `obfuscation`: IP masking applied before persistence.

pub mod db_entities;
pub mod entry;
pub mod obfuscation;
pub mod provider;
pub mod query;
pub mod rotation;
pub mod sqlite;


pub use entry::{Entry, EntryBuilder};
pub use query::ListOptions;

use crate::clients::client_session::ClientSession;
use crate::configuration::{AuditLogConfig, RotationPeriod};
use crate::error_handling::types::AuditError;
use log::{error, info};
use rotation::RotationProvider;
use serde::Serialize;
use sqlite::SqliteProvider;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

pub const APPLICATION_CLIENT: &str = "client";
pub const APPLICATION_CLIENT_ACL: &str = "client.acl";
pub const APPLICATION_CLIENT_AUTH: &str = "client.auth";
pub const APPLICATION_CLIENT_COMMAND: &str = "client.command";
pub const APPLICATION_CLIENT_GROUP: &str = "client.group";
pub const APPLICATION_CLIENT_SCRIPT: &str = "client.script";
pub const APPLICATION_CLIENT_TUNNEL: &str = "client.tunnel";
pub const APPLICATION_AUTH_USER: &str = "auth.user";
pub const APPLICATION_AUTH_USER_TOTP: &str = "auth.user.totp";
pub const APPLICATION_LIBRARY_COMMAND: &str = "library.command";
pub const APPLICATION_LIBRARY_SCRIPT: &str = "library.script";
pub const APPLICATION_VAULT: &str = "vault";

pub const ACTION_CREATE: &str = "create";
pub const ACTION_UPDATE: &str = "update";
pub const ACTION_DELETE: &str = "delete";
pub const ACTION_EXECUTE_START: &str = "execute.start";
pub const ACTION_EXECUTE_DONE: &str = "execute.done";
pub const ACTION_SUCCESS: &str = "success";
pub const ACTION_FAILED: &str = "failed";

/// Lookup of live client sessions, used to resolve client hostnames.
pub trait ClientGetter: Send + Sync {
    fn get_by_id(&self, id: &str) -> Option<ClientSession>;
}

/// Caller identity of an API request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub username: String,
    /// Peer address as `host:port`
    pub remote_addr: String,
}

impl RequestOrigin {
    pub fn new(username: impl Into<String>, remote_addr: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            remote_addr: remote_addr.into(),
        }
    }

    /// Host part of `remote_addr`, `None` when it has no port.
    pub fn remote_ip(&self) -> Option<String> {
        if let Ok(addr) = self.remote_addr.parse::<SocketAddr>() {
            return Some(addr.ip().to_string());
        }
        let (host, port) = self.remote_addr.rsplit_once(':')?;
        if port.is_empty() || host.is_empty() || host.contains(':') {
            return None;
        }
        Some(host.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditPage {
    pub entries: Vec<Entry>,
    /// Matching entries ignoring pagination
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuditLogStatus {
    pub enabled: bool,
    pub rotation: RotationPeriod,
}

pub struct AuditLog {
    config: AuditLogConfig,
    client_getter: Arc<dyn ClientGetter>,
    store: Option<RotationProvider<SqliteProvider>>,
}

impl AuditLog {
    /// Opens the rotating store under `data_dir` when auditing is enabled.
    /// A disabled audit log never touches the disk.
    pub async fn new(
        config: AuditLogConfig,
        client_getter: Arc<dyn ClientGetter>,
        data_dir: &Path,
    ) -> Result<Self, AuditError> {
        let store = if config.enable {
            let store = RotationProvider::<SqliteProvider>::open(
                data_dir,
                config.rotation.as_duration(),
            )
            .await?;
            info!("Audit log enabled, rotation {}", config.rotation);
            Some(store)
        } else {
            info!("Audit log disabled");
            None
        };
        Ok(Self {
            config,
            client_getter,
            store,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn entry(&self, application: &str, action: &str) -> EntryBuilder<'_> {
        if !self.is_enabled() {
            return EntryBuilder::Disabled;
        }
        EntryBuilder::Active {
            entry: Entry::new(application, action),
            log: self,
        }
    }

    pub(crate) fn client_getter(&self) -> &dyn ClientGetter {
        self.client_getter.as_ref()
    }

    pub(crate) async fn save_prepared(&self, mut entry: Entry) -> Result<(), AuditError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if self.config.use_ip_obfuscation && !entry.remote_ip.is_empty() {
            entry.remote_ip = obfuscation::obfuscate_ip(&entry.remote_ip);
        }
        store.save(&entry).await.map_err(|e| {
            error!("Could not save auditlog entry: {}", e);
            AuditError::from(e)
        })
    }

    pub async fn list(&self, options: &ListOptions) -> Result<AuditPage, AuditError> {
        options.validate()?;
        let Some(store) = &self.store else {
            return Ok(AuditPage {
                entries: Vec::new(),
                total: 0,
            });
        };
        let entries = store.list(options).await?;
        let total = store.count(&options.without_pagination()).await?;
        Ok(AuditPage { entries, total })
    }

    pub fn status(&self) -> AuditLogStatus {
        AuditLogStatus {
            enabled: self.is_enabled(),
            rotation: self.config.rotation,
        }
    }

    pub async fn close(&self) -> Result<(), AuditError> {
        match &self.store {
            Some(store) => store.close().await.map_err(AuditError::from),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_ip() {
        assert_eq!(
            RequestOrigin::new("admin", "192.0.2.1:5000").remote_ip(),
            Some("192.0.2.1".to_string())
        );
        assert_eq!(
            RequestOrigin::new("admin", "[2001:db8::1]:443").remote_ip(),
            Some("2001:db8::1".to_string())
        );
        assert_eq!(
            RequestOrigin::new("admin", "proxy.local:8080").remote_ip(),
            Some("proxy.local".to_string())
        );
        assert_eq!(RequestOrigin::new("admin", "192.0.2.1").remote_ip(), None);
        assert_eq!(RequestOrigin::new("admin", "").remote_ip(), None);
    }
}
