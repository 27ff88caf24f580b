//! Field selection for client listings (`fields[clients]=id,name`).
//!
//! Every exposed field has an explicit variant and accessor, so renaming a
//! struct field breaks the build instead of silently dropping it from
//! responses.

use crate::clients::client_session::ClientSession;
use log::error;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientField {
    Id,
    Name,
    Hostname,
    Os,
    OsArch,
    OsFamily,
    OsKernel,
    Version,
    Address,
    Ipv4,
    Ipv6,
    Tags,
    Labels,
    Tunnels,
    ClientAuthId,
    Connection,
    Disconnected,
}

impl ClientField {
    pub const ALL: [ClientField; 17] = [
        ClientField::Id,
        ClientField::Name,
        ClientField::Hostname,
        ClientField::Os,
        ClientField::OsArch,
        ClientField::OsFamily,
        ClientField::OsKernel,
        ClientField::Version,
        ClientField::Address,
        ClientField::Ipv4,
        ClientField::Ipv6,
        ClientField::Tags,
        ClientField::Labels,
        ClientField::Tunnels,
        ClientField::ClientAuthId,
        ClientField::Connection,
        ClientField::Disconnected,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ClientField::Id => "id",
            ClientField::Name => "name",
            ClientField::Hostname => "hostname",
            ClientField::Os => "os",
            ClientField::OsArch => "os_arch",
            ClientField::OsFamily => "os_family",
            ClientField::OsKernel => "os_kernel",
            ClientField::Version => "version",
            ClientField::Address => "address",
            ClientField::Ipv4 => "ipv4",
            ClientField::Ipv6 => "ipv6",
            ClientField::Tags => "tags",
            ClientField::Labels => "labels",
            ClientField::Tunnels => "tunnels",
            ClientField::ClientAuthId => "client_auth_id",
            ClientField::Connection => "connection_state",
            ClientField::Disconnected => "disconnected",
        }
    }

    fn value(&self, s: &ClientSession) -> Value {
        match self {
            ClientField::Id => Value::from(s.id.as_str()),
            ClientField::Name => Value::from(s.name.as_str()),
            ClientField::Hostname => Value::from(s.hostname.as_str()),
            ClientField::Os => Value::from(s.os.as_str()),
            ClientField::OsArch => Value::from(s.os_arch.as_str()),
            ClientField::OsFamily => Value::from(s.os_family.as_str()),
            ClientField::OsKernel => Value::from(s.os_kernel.as_str()),
            ClientField::Version => Value::from(s.version.as_str()),
            ClientField::Address => Value::from(s.address.as_str()),
            ClientField::Ipv4 => Value::from(s.ipv4.clone()),
            ClientField::Ipv6 => Value::from(s.ipv6.clone()),
            ClientField::Tags => Value::from(s.tags.clone()),
            ClientField::Labels => Value::Object(
                s.labels
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect(),
            ),
            ClientField::Tunnels => match serde_json::to_value(&s.tunnels) {
                Ok(tunnels) => tunnels,
                Err(e) => {
                    error!("Could not render tunnels of client {}: {}", s.id, e);
                    Value::Null
                }
            },
            ClientField::ClientAuthId => Value::from(s.client_auth_id.as_str()),
            ClientField::Connection => {
                Value::from(if s.is_connected() { "connected" } else { "disconnected" })
            }
            ClientField::Disconnected => s
                .disconnected
                .map(|d| Value::from(d.to_rfc3339()))
                .unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField(pub String);

impl fmt::Display for UnknownField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown client field {:?}", self.0)
    }
}

impl std::error::Error for UnknownField {}

impl FromStr for ClientField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClientField::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

/// Parses a comma separated field list such as `id,name,tags`.
pub fn parse_fields(list: &str) -> Result<Vec<ClientField>, UnknownField> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ClientField::from_str)
        .collect()
}

/// Renders only the requested fields. An empty selection renders all of them.
pub fn project(session: &ClientSession, fields: &[ClientField]) -> Map<String, Value> {
    let fields: &[ClientField] = if fields.is_empty() {
        &ClientField::ALL
    } else {
        fields
    };
    fields
        .iter()
        .map(|f| (f.name().to_string(), f.value(session)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::client_session::Remote;
    use chrono::Utc;

    #[test]
    fn test_project_selected_fields() {
        let mut s = ClientSession::new("c1");
        s.name = "edge".into();
        s.tags = vec!["a".into()];
        let fields = parse_fields("id, tags,connection_state").unwrap();
        let map = project(&s, &fields);
        assert_eq!(map.len(), 3);
        assert_eq!(map["id"], "c1");
        assert_eq!(map["tags"], serde_json::json!(["a"]));
        assert_eq!(map["connection_state"], "connected");
        assert!(!map.contains_key("name"));
    }

    #[test]
    fn test_project_all_fields() {
        let mut s = ClientSession::new("c1");
        s.disconnected = Some(Utc::now());
        let map = project(&s, &[]);
        assert_eq!(map.len(), ClientField::ALL.len());
        assert_eq!(map["connection_state"], "disconnected");
        assert!(map["disconnected"].is_string());
    }

    #[test]
    fn test_project_tunnels() {
        let mut s = ClientSession::new("c1");
        s.start_tunnel(Remote {
            local_host: "0.0.0.0".into(),
            local_port: 2222,
            remote_host: "127.0.0.1".into(),
            remote_port: 22,
            ..Default::default()
        });
        let map = project(&s, &[ClientField::Tunnels]);
        assert_eq!(
            map["tunnels"],
            serde_json::json!([{
                "id": "1",
                "local_host": "0.0.0.0",
                "local_port": 2222,
                "remote_host": "127.0.0.1",
                "remote_port": 22,
                "protocol": "tcp",
            }])
        );
    }

    #[test]
    fn test_unknown_field() {
        assert_eq!(
            parse_fields("id,secret"),
            Err(UnknownField("secret".to_string()))
        );
    }

    #[test]
    fn test_names_round_trip() {
        for f in ClientField::ALL {
            assert_eq!(f.name().parse::<ClientField>(), Ok(f));
        }
    }
}
