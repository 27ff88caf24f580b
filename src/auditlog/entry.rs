use crate::auditlog::{AuditLog, RequestOrigin};
use crate::clients::client_session::ClientSession;
use crate::error_handling::types::AuditError;
use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A single audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub remote_ip: String,
    pub application: String,
    pub action: String,
    /// Identifier of the affected object
    #[serde(rename = "affected_id")]
    pub id: String,
    pub client_id: String,
    pub client_hostname: String,
    /// JSON-encoded request payload, empty when not recorded
    pub request: String,
    /// JSON-encoded response payload, empty when not recorded
    pub response: String,
}

impl Entry {
    pub fn new(application: &str, action: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            username: String::new(),
            remote_ip: String::new(),
            application: application.to_string(),
            action: action.to_string(),
            id: String::new(),
            client_id: String::new(),
            client_hostname: String::new(),
            request: String::new(),
            response: String::new(),
        }
    }
}

/// Fluent construction of an audit entry.
///
/// When the audit log is disabled every method is a no-op and `save` returns
/// `Ok(())`, so call sites never have to check whether auditing is on.
pub enum EntryBuilder<'a> {
    Disabled,
    Active { entry: Entry, log: &'a AuditLog },
}

impl<'a> EntryBuilder<'a> {
    fn map(self, f: impl FnOnce(&mut Entry, &'a AuditLog)) -> Self {
        match self {
            EntryBuilder::Disabled => EntryBuilder::Disabled,
            EntryBuilder::Active { mut entry, log } => {
                f(&mut entry, log);
                EntryBuilder::Active { entry, log }
            }
        }
    }

    /// The entry as built so far, `None` when disabled.
    pub fn entry(&self) -> Option<&Entry> {
        match self {
            EntryBuilder::Disabled => None,
            EntryBuilder::Active { entry, .. } => Some(entry),
        }
    }

    pub fn with_id(self, id: impl Display) -> Self {
        self.map(|e, _| e.id = id.to_string())
    }

    /// Records the authenticated user and the caller IP.
    pub fn with_http_request(self, origin: &RequestOrigin) -> Self {
        self.map(|e, _| {
            e.username = origin.username.clone();
            match origin.remote_ip() {
                Some(ip) => e.remote_ip = ip,
                None => error!(
                    "Could not split remote address {:?} for auditlog",
                    origin.remote_addr
                ),
            }
        })
    }

    pub fn with_request<T: Serialize + ?Sized>(self, request: &T) -> Self {
        self.map(|e, _| match serde_json::to_string(request) {
            Ok(json) => e.request = json,
            Err(err) => error!("Could not marshal auditlog request: {}", err),
        })
    }

    pub fn with_response<T: Serialize + ?Sized>(self, response: &T) -> Self {
        self.map(|e, _| match serde_json::to_string(response) {
            Ok(json) => e.response = json,
            Err(err) => error!("Could not marshal auditlog response: {}", err),
        })
    }

    /// The client hostname is taken from the session's connection address.
    pub fn with_client(self, client: &ClientSession) -> Self {
        self.map(|e, _| {
            e.client_id = client.id.clone();
            e.client_hostname = client.address.clone();
        })
    }

    /// Resolves the client through the registry. An unknown id keeps the
    /// hostname blank.
    pub fn with_client_id(self, client_id: &str) -> Self {
        self.map(|e, log| {
            e.client_id = client_id.to_string();
            match log.client_getter().get_by_id(client_id) {
                Some(client) => e.client_hostname = client.address,
                None => warn!("Client {} not found for auditlog", client_id),
            }
        })
    }

    pub async fn save(self) -> Result<(), AuditError> {
        match self {
            EntryBuilder::Disabled => Ok(()),
            EntryBuilder::Active { entry, log } => log.save_prepared(entry).await,
        }
    }

    /// Saves one copy of the entry per client. Every client is attempted;
    /// the first error is returned.
    pub async fn save_for_multiple_clients(
        self,
        clients: &[ClientSession],
    ) -> Result<(), AuditError> {
        let (entry, log) = match self {
            EntryBuilder::Disabled => return Ok(()),
            EntryBuilder::Active { entry, log } => (entry, log),
        };
        let mut first_error = None;
        for client in clients {
            let mut per_client = entry.clone();
            per_client.client_id = client.id.clone();
            per_client.client_hostname = client.address.clone();
            if let Err(e) = log.save_prepared(per_client).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
