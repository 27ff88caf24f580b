use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelProtocol {
    #[default]
    Tcp,
    Udp,
}

/// A port mapping requested by a client or by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Remote {
    pub local_host: String,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    #[serde(default)]
    pub protocol: TunnelProtocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<String>,
}

/// An active port-forward exposed on behalf of a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunnel {
    pub id: String,
    #[serde(flatten)]
    pub remote: Remote,
}

impl Tunnel {
    fn serves(&self, remote: &Remote) -> bool {
        self.remote.local_host == remote.local_host
            && self.remote.local_port == remote.local_port
            && self.remote.remote_host == remote.remote_host
            && self.remote.remote_port == remote.remote_port
            && self.remote.protocol == remote.protocol
    }
}

/// Handshake payload delivered by the transport once a client is
/// authenticated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionRequest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub os_arch: String,
    #[serde(default)]
    pub os_family: String,
    #[serde(default)]
    pub os_kernel: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub ipv4: Vec<String>,
    #[serde(default)]
    pub ipv6: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub remotes: Vec<Remote>,
    #[serde(default)]
    pub client_auth_id: String,
}

/// State of one agent as tracked by the server.
///
/// `disconnected` is `None` while the agent is connected and holds the time
/// of the last disconnect otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSession {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub os_arch: String,
    #[serde(default)]
    pub os_family: String,
    #[serde(default)]
    pub os_kernel: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub ipv4: Vec<String>,
    #[serde(default)]
    pub ipv6: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub tunnels: Vec<Tunnel>,
    #[serde(default)]
    pub client_auth_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected: Option<DateTime<Utc>>,
}

impl ClientSession {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            hostname: String::new(),
            os: String::new(),
            os_arch: String::new(),
            os_family: String::new(),
            os_kernel: String::new(),
            version: String::new(),
            address: String::new(),
            ipv4: Vec::new(),
            ipv6: Vec::new(),
            tags: Vec::new(),
            labels: BTreeMap::new(),
            tunnels: Vec::new(),
            client_auth_id: String::new(),
            disconnected: None,
        }
    }

    /// Builds a connected session out of a handshake, opening one tunnel per
    /// requested remote.
    pub fn from_connection_request(request: ConnectionRequest, address: SocketAddr) -> Self {
        let mut session = Self {
            id: request.id,
            name: request.name,
            hostname: request.hostname,
            os: request.os,
            os_arch: request.os_arch,
            os_family: request.os_family,
            os_kernel: request.os_kernel,
            version: request.version,
            address: address.to_string(),
            ipv4: request.ipv4,
            ipv6: request.ipv6,
            tags: request.tags,
            labels: request.labels,
            tunnels: Vec::with_capacity(request.remotes.len()),
            client_auth_id: request.client_auth_id,
            disconnected: None,
        };
        for remote in request.remotes {
            session.start_tunnel(remote);
        }
        session
    }

    pub fn is_connected(&self) -> bool {
        self.disconnected.is_none()
    }

    /// True if the session was disconnected longer than `keep` before `now`.
    /// A `None` or zero `keep` never expires anything.
    pub fn obsolete_at(&self, keep: Option<Duration>, now: DateTime<Utc>) -> bool {
        let keep = match keep {
            Some(k) if !k.is_zero() => k,
            _ => return false,
        };
        let Some(disconnected) = self.disconnected else {
            return false;
        };
        match chrono::Duration::from_std(keep) {
            Ok(keep) => now.signed_duration_since(disconnected) > keep,
            // Out of chrono's range: nothing can be that old.
            Err(_) => false,
        }
    }

    pub fn obsolete(&self, keep: Option<Duration>) -> bool {
        self.obsolete_at(keep, Utc::now())
    }

    pub fn find_tunnel(&self, id: &str) -> Option<&Tunnel> {
        self.tunnels.iter().find(|t| t.id == id)
    }

    /// Returns the tunnel serving `remote`, creating it when missing.
    pub(crate) fn start_tunnel(&mut self, remote: Remote) -> Tunnel {
        if let Some(existing) = self.tunnels.iter().find(|t| t.serves(&remote)) {
            return existing.clone();
        }
        let tunnel = Tunnel {
            id: self.next_tunnel_id().to_string(),
            remote,
        };
        self.tunnels.push(tunnel.clone());
        tunnel
    }

    pub(crate) fn remove_tunnel(&mut self, id: &str) -> bool {
        let before = self.tunnels.len();
        self.tunnels.retain(|t| t.id != id);
        self.tunnels.len() != before
    }

    // One past the highest numeric id in use.
    fn next_tunnel_id(&self) -> u64 {
        self.tunnels
            .iter()
            .filter_map(|t| t.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Short human readable description used in log lines.
    pub fn banner(&self) -> String {
        let mut banner = self.id.clone();
        if !self.name.is_empty() {
            banner.push_str(&format!(" ({})", self.name));
        }
        for tag in &self.tags {
            banner.push_str(&format!(" #{}", tag));
        }
        banner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(lport: u16, rport: u16) -> Remote {
        Remote {
            local_host: "0.0.0.0".into(),
            local_port: lport,
            remote_host: "127.0.0.1".into(),
            remote_port: rport,
            ..Default::default()
        }
    }

    #[test]
    fn test_from_connection_request() {
        let request = ConnectionRequest {
            id: "client-1".into(),
            name: "edge".into(),
            hostname: "edge.local".into(),
            tags: vec!["linux".into()],
            remotes: vec![remote(2222, 22), remote(8080, 80)],
            ..Default::default()
        };
        let session =
            ClientSession::from_connection_request(request, "192.0.2.10:51000".parse().unwrap());
        assert_eq!(session.address, "192.0.2.10:51000");
        assert!(session.is_connected());
        let ids: Vec<_> = session.tunnels.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(session.banner(), "client-1 (edge) #linux");
    }

    #[test]
    fn test_start_tunnel_reuses_identical_mapping() {
        let mut session = ClientSession::new("c");
        let first = session.start_tunnel(remote(2222, 22));
        let again = session.start_tunnel(remote(2222, 22));
        assert_eq!(first, again);
        assert_eq!(session.tunnels.len(), 1);
    }

    #[test]
    fn test_tunnel_ids_follow_highest_in_use() {
        let mut session = ClientSession::new("c");
        session.start_tunnel(remote(1, 1));
        let second = session.start_tunnel(remote(2, 2));
        assert!(session.remove_tunnel("1"));
        assert!(!session.remove_tunnel("1"));
        let third = session.start_tunnel(remote(3, 3));
        assert_eq!(second.id, "2");
        assert_eq!(third.id, "3");

        assert!(session.remove_tunnel("3"));
        let fourth = session.start_tunnel(remote(4, 4));
        assert_eq!(fourth.id, "3");
    }

    #[test]
    fn test_obsolete() {
        let now = Utc::now();
        let hour = Some(Duration::from_secs(3600));
        let mut session = ClientSession::new("c");
        assert!(!session.obsolete_at(hour, now));

        session.disconnected = Some(now - chrono::Duration::minutes(30));
        assert!(!session.obsolete_at(hour, now));

        session.disconnected = Some(now - chrono::Duration::hours(2));
        assert!(session.obsolete_at(hour, now));
        assert!(!session.obsolete_at(None, now));
        assert!(!session.obsolete_at(Some(Duration::ZERO), now));
    }

    #[test]
    fn test_obsolete_with_huge_keep() {
        let now = Utc::now();
        let mut session = ClientSession::new("c");
        session.disconnected = Some(now - chrono::Duration::days(365));
        let keep = Some(Duration::from_secs(10_000_000_000_000));
        assert!(!session.obsolete_at(keep, now));
        assert!(!session.obsolete_at(Some(Duration::from_secs(u64::MAX)), now));
    }

    #[test]
    fn test_json_field_names() {
        let mut session = ClientSession::new("c");
        session.os_arch = "amd64".into();
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["os_arch"], "amd64");
        assert!(json.get("disconnected").is_none());
    }
}
