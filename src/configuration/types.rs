use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const DAY: u64 = 24 * 60 * 60;

/// How long one audit store accumulates entries before it is archived.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPeriod {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Yearly,
}

impl RotationPeriod {
    pub fn as_duration(&self) -> Duration {
        match self {
            RotationPeriod::Daily => Duration::from_secs(DAY),
            RotationPeriod::Weekly => Duration::from_secs(7 * DAY),
            RotationPeriod::Monthly => Duration::from_secs(30 * DAY),
            RotationPeriod::Yearly => Duration::from_secs(365 * DAY),
        }
    }
}

impl fmt::Display for RotationPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RotationPeriod::Daily => "daily",
            RotationPeriod::Weekly => "weekly",
            RotationPeriod::Monthly => "monthly",
            RotationPeriod::Yearly => "yearly",
        };
        f.write_str(s)
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub keep_disconnected_clients_secs: u64,
    #[serde(default = "default_task_interval")]
    pub purge_disconnected_clients_interval_secs: u64,
    #[serde(default = "default_task_interval")]
    pub save_clients_interval_secs: u64,
}

fn default_task_interval() -> u64 {
    60
}

#[derive(Debug, PartialEq, Clone, Default, Deserialize)]
pub struct AuditLogConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub use_ip_obfuscation: bool,
    #[serde(default)]
    pub rotation: RotationPeriod,
}
