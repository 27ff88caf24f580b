use crate::auditlog::ClientGetter;
use crate::clients::client_session::{ClientSession, Remote, Tunnel};
use crate::clients::filter::ClientFilter;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Thread-safe in-memory store of client sessions keyed by client id.
///
/// The registry owns every session; readers always get copies. Sessions that
/// were disconnected longer than `keep_disconnected` are obsolete: they are
/// hidden from lookups and listings until [`prune_obsolete`] removes them.
///
/// [`prune_obsolete`]: ClientSessionRegistry::prune_obsolete
pub struct ClientSessionRegistry {
    sessions: RwLock<HashMap<String, ClientSession>>,
    keep_disconnected: Option<Duration>,
}

impl ClientSessionRegistry {
    pub fn new(initial: Vec<ClientSession>, keep_disconnected: Option<Duration>) -> Self {
        let sessions = initial
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect::<HashMap<_, _>>();
        Self {
            sessions: RwLock::new(sessions),
            keep_disconnected,
        }
    }

    pub fn keep_disconnected(&self) -> Option<Duration> {
        self.keep_disconnected
    }

    // Writes are single map operations, poisoning is recovered.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ClientSession>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ClientSession>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts a session or replaces the one with the same id.
    pub fn upsert(&self, session: ClientSession) {
        debug!("Saving client session {}", session.banner());
        self.write().insert(session.id.clone(), session);
    }

    /// Stamps the session as disconnected at `at`. Returns `false` when the
    /// id is unknown.
    pub fn mark_disconnected(&self, id: &str, at: DateTime<Utc>) -> bool {
        match self.write().get_mut(id) {
            Some(session) => {
                session.disconnected = Some(at);
                true
            }
            None => {
                debug!("Ignoring disconnect of unknown client {}", id);
                false
            }
        }
    }

    pub fn delete(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }

    /// Returns a non-obsolete session, connected or not.
    pub fn get_by_id(&self, id: &str) -> Option<ClientSession> {
        let now = Utc::now();
        self.read()
            .get(id)
            .filter(|s| !s.obsolete_at(self.keep_disconnected, now))
            .cloned()
    }

    /// Returns a session only while it is connected.
    pub fn get_active_by_id(&self, id: &str) -> Option<ClientSession> {
        self.read().get(id).filter(|s| s.is_connected()).cloned()
    }

    /// Non-obsolete sessions matching `filter`, ordered by id.
    pub fn list(&self, filter: &ClientFilter) -> Vec<ClientSession> {
        let now = Utc::now();
        let mut result: Vec<ClientSession> = self
            .read()
            .values()
            .filter(|s| !s.obsolete_at(self.keep_disconnected, now) && filter.matches(s))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        result
    }

    pub fn get_all(&self) -> Vec<ClientSession> {
        self.list(&ClientFilter::default())
    }

    pub fn get_all_by_client_auth_id(&self, client_auth_id: &str) -> Vec<ClientSession> {
        self.list(&ClientFilter {
            client_auth_id: Some(client_auth_id.to_string()),
            ..Default::default()
        })
    }

    /// Number of non-obsolete sessions.
    pub fn count(&self) -> usize {
        let now = Utc::now();
        self.read()
            .values()
            .filter(|s| !s.obsolete_at(self.keep_disconnected, now))
            .count()
    }

    pub fn count_active(&self) -> usize {
        self.read().values().filter(|s| s.is_connected()).count()
    }

    pub fn count_disconnected(&self) -> usize {
        let now = Utc::now();
        self.read()
            .values()
            .filter(|s| !s.is_connected() && !s.obsolete_at(self.keep_disconnected, now))
            .count()
    }

    /// Removes every session disconnected longer than `expiration`. `None` or
    /// a zero duration never expires anything. Returns the number removed.
    pub fn prune_obsolete(&self, expiration: Option<Duration>) -> usize {
        self.prune_obsolete_at(expiration, Utc::now())
    }

    pub(crate) fn prune_obsolete_at(&self, expiration: Option<Duration>, now: DateTime<Utc>) -> usize {
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, s| {
            let obsolete = s.obsolete_at(expiration, now);
            if obsolete {
                debug!("Removing obsolete client session {}", s.banner());
            }
            !obsolete
        });
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Removed {} obsolete client session(s)", removed);
        }
        removed
    }

    /// Opens (or reuses) a tunnel on a stored session.
    pub fn add_tunnel(&self, client_id: &str, remote: Remote) -> Option<Tunnel> {
        self.write()
            .get_mut(client_id)
            .map(|session| session.start_tunnel(remote))
    }

    pub fn remove_tunnel(&self, client_id: &str, tunnel_id: &str) -> bool {
        self.write()
            .get_mut(client_id)
            .map(|session| session.remove_tunnel(tunnel_id))
            .unwrap_or(false)
    }

    /// Copy of every stored session, obsolete ones included, for persistence.
    pub fn snapshot(&self) -> Vec<ClientSession> {
        let mut all: Vec<ClientSession> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

impl ClientGetter for ClientSessionRegistry {
    fn get_by_id(&self, id: &str) -> Option<ClientSession> {
        ClientSessionRegistry::get_by_id(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::filter::{ConnectionState, TagsOperator};
    use std::sync::Arc;
    use std::thread;

    fn session(id: &str) -> ClientSession {
        let mut s = ClientSession::new(id);
        s.name = format!("name-{}", id);
        s
    }

    fn disconnected(id: &str, ago: chrono::Duration) -> ClientSession {
        let mut s = session(id);
        s.disconnected = Some(Utc::now() - ago);
        s
    }

    #[test]
    fn test_upsert_and_get() {
        let registry = ClientSessionRegistry::new(vec![], None);
        let s = session("a");
        registry.upsert(s.clone());
        assert_eq!(registry.get_by_id("a"), Some(s));

        let mut replaced = session("a");
        replaced.hostname = "new-host".into();
        registry.upsert(replaced.clone());
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get_by_id("a"), Some(replaced));
        assert_eq!(registry.get_by_id("missing"), None);
    }

    #[test]
    fn test_mark_disconnected() {
        let registry = ClientSessionRegistry::new(vec![session("a")], None);
        let at = Utc::now();
        assert!(registry.mark_disconnected("a", at));
        assert_eq!(registry.get_by_id("a").unwrap().disconnected, Some(at));
        assert_eq!(registry.get_active_by_id("a"), None);
        assert!(!registry.mark_disconnected("missing", at));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_prune_obsolete() {
        let registry = ClientSessionRegistry::new(
            vec![
                session("connected"),
                disconnected("recent", chrono::Duration::minutes(30)),
                disconnected("old", chrono::Duration::hours(2)),
                disconnected("ancient", chrono::Duration::days(10)),
            ],
            None,
        );

        assert_eq!(registry.prune_obsolete(None), 0);
        assert_eq!(registry.prune_obsolete(Some(Duration::ZERO)), 0);
        assert_eq!(registry.prune_obsolete(Some(Duration::from_secs(3600))), 2);

        let ids: Vec<_> = registry.snapshot().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["connected", "recent"]);

        // Connected sessions survive any expiration.
        assert_eq!(registry.prune_obsolete(Some(Duration::from_nanos(1))), 1);
        assert!(registry.get_by_id("connected").is_some());
    }

    #[test]
    fn test_obsolete_sessions_are_hidden() {
        let registry = ClientSessionRegistry::new(
            vec![
                session("a"),
                disconnected("b", chrono::Duration::minutes(5)),
                disconnected("c", chrono::Duration::hours(5)),
            ],
            Some(Duration::from_secs(3600)),
        );
        let ids: Vec<_> = registry.get_all().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(registry.get_by_id("c"), None);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.count_active(), 1);
        assert_eq!(registry.count_disconnected(), 1);
        assert_eq!(registry.snapshot().len(), 3);
    }

    #[test]
    fn test_list_with_filter() {
        let mut a = session("a");
        a.tags = vec!["prod".into()];
        a.labels.insert("city".into(), "Cologne".into());
        let mut b = disconnected("b", chrono::Duration::minutes(1));
        b.tags = vec!["prod".into()];
        let registry = ClientSessionRegistry::new(vec![a, b, session("c")], None);

        let prod = ClientFilter::default().with_tags(["prod"], TagsOperator::Or);
        assert_eq!(registry.list(&prod).len(), 2);

        let prod_connected = prod.clone().with_connection(ConnectionState::Connected);
        let ids: Vec<_> = registry.list(&prod_connected).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a"]);

        let cologne = ClientFilter::default().with_label("city:Cologne".parse().unwrap());
        assert_eq!(registry.list(&cologne).len(), 1);
    }

    #[test]
    fn test_tunnels_go_through_registry() {
        let registry = ClientSessionRegistry::new(vec![session("a")], None);
        let remote = Remote {
            local_host: "0.0.0.0".into(),
            local_port: 3000,
            remote_host: "localhost".into(),
            remote_port: 22,
            ..Default::default()
        };
        let tunnel = registry.add_tunnel("a", remote.clone()).unwrap();
        assert_eq!(registry.get_by_id("a").unwrap().tunnels, vec![tunnel.clone()]);
        assert!(registry.add_tunnel("missing", remote).is_none());
        assert!(registry.remove_tunnel("a", &tunnel.id));
        assert!(!registry.remove_tunnel("missing", &tunnel.id));
        assert!(registry.get_by_id("a").unwrap().tunnels.is_empty());
    }

    #[test]
    fn test_client_auth_id_lookup_and_delete() {
        let mut a = session("a");
        a.client_auth_id = "user1".into();
        let registry = ClientSessionRegistry::new(vec![a, session("b")], None);
        assert_eq!(registry.get_all_by_client_auth_id("user1").len(), 1);
        assert!(registry.delete("a"));
        assert!(!registry.delete("a"));
        assert!(registry.get_all_by_client_auth_id("user1").is_empty());
    }

    #[test]
    fn test_concurrent_upserts() {
        let registry = Arc::new(ClientSessionRegistry::new(vec![], None));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("client-{}", i);
                        registry.upsert(session(&id));
                        if t % 2 == 0 {
                            registry.mark_disconnected(&id, Utc::now());
                        }
                        let _ = registry.get_all();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.count(), 50);
    }
}
