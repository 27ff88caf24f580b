use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the client session snapshot inside the data directory.
const CLIENTS_SNAPSHOT_FILE: &str = "clients.json";

/// Command-line arguments of the server binary.
///
/// Only the location of the configuration file and a data directory
/// override are accepted on the command line; everything else lives in the
/// TOML file.
#[derive(Parser, Debug, Clone)]
#[command(name = "tunnelhub")]
#[command(version)]
#[command(about = "Reverse-tunnel server session registry and audit log")]
pub struct CliArgs {
    /// Path to the TOML configuration file
    pub config_file: PathBuf,

    /// Overrides `server.data_dir` from the configuration file
    ///
    /// # Command Line
    /// Use `--data-dir <PATH>` or the `TUNNELHUB_DATA_DIR` environment variable
    #[arg(long, env = "TUNNELHUB_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

/// Application configuration loaded from a TOML file.
///
/// ```toml
/// [server]
/// data_dir = "/var/lib/tunnelhub"
/// keep_disconnected_clients_secs = 3600
///
/// [audit_log]
/// enable = true
/// rotation = "monthly"
/// ```
///
/// # Fields Overview
///
/// - `server`: data directory and client bookkeeping intervals
/// - `audit_log`: whether the audit log is enabled, IP obfuscation and the
///   rotation period
#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub audit_log: AuditLogConfig,
}

impl Config {
    /// Reads and validates the configuration stored at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration without validating it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(ref dir) = args.data_dir {
            self.server.data_dir = dir.clone();
        }
    }

    /// Rejects values the runtime components cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::DirectoryMissing(
                "server.data_dir must not be empty".to_string(),
            ));
        }
        if self.server.keep_disconnected_clients_secs > 0 {
            if self.server.purge_disconnected_clients_interval_secs == 0 {
                return Err(ConfigError::NotInRange(
                    "server.purge_disconnected_clients_interval_secs must be positive".to_string(),
                ));
            }
            if self.server.save_clients_interval_secs == 0 {
                return Err(ConfigError::NotInRange(
                    "server.save_clients_interval_secs must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// How long disconnected clients are kept, `None` meaning forever.
    pub fn keep_disconnected_clients(&self) -> Option<Duration> {
        match self.server.keep_disconnected_clients_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.server.purge_disconnected_clients_interval_secs)
    }

    pub fn save_clients_interval(&self) -> Duration {
        Duration::from_secs(self.server.save_clients_interval_secs)
    }

    pub fn clients_snapshot_path(&self) -> PathBuf {
        self.server.data_dir.join(CLIENTS_SNAPSHOT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const FULL: &str = r#"
        [server]
        data_dir = "/var/lib/tunnelhub"
        keep_disconnected_clients_secs = 3600
        purge_disconnected_clients_interval_secs = 30
        save_clients_interval_secs = 10

        [audit_log]
        enable = true
        use_ip_obfuscation = true
        rotation = "weekly"
    "#;

    #[test]
    fn test_from_toml_full() {
        let config = Config::from_toml(FULL).unwrap();
        assert_eq!(config.server.data_dir, PathBuf::from("/var/lib/tunnelhub"));
        assert_eq!(
            config.keep_disconnected_clients(),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(config.purge_interval(), Duration::from_secs(30));
        assert_eq!(config.save_clients_interval(), Duration::from_secs(10));
        assert!(config.audit_log.enable);
        assert!(config.audit_log.use_ip_obfuscation);
        assert_eq!(config.audit_log.rotation, RotationPeriod::Weekly);
        assert_eq!(
            config.clients_snapshot_path(),
            PathBuf::from("/var/lib/tunnelhub/clients.json")
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("[server]\ndata_dir = \"/tmp\"\n").unwrap();
        assert_eq!(config.keep_disconnected_clients(), None);
        assert_eq!(config.purge_interval(), Duration::from_secs(60));
        assert!(!config.audit_log.enable);
        assert_eq!(config.audit_log.rotation, RotationPeriod::Monthly);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_rotation_is_rejected() {
        let err = Config::from_toml(
            "[server]\ndata_dir = \"/tmp\"\n[audit_log]\nrotation = \"hourly\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_zero_interval_is_rejected_when_keeping_clients() {
        let config = Config::from_toml(
            "[server]\ndata_dir = \"/tmp\"\nkeep_disconnected_clients_secs = 5\nsave_clients_interval_secs = 0\n",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NotInRange(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tunnelhub.toml");
        fs::write(&path, FULL).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.audit_log.rotation, RotationPeriod::Weekly);

        let missing = Config::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_rotation_durations() {
        assert_eq!(RotationPeriod::Daily.as_duration(), Duration::from_secs(86_400));
        assert_eq!(RotationPeriod::Weekly.as_duration(), Duration::from_secs(604_800));
        assert_eq!(RotationPeriod::Monthly.to_string(), "monthly");
    }

    #[test]
    #[serial]
    fn test_cli_data_dir_from_env() {
        std::env::set_var("TUNNELHUB_DATA_DIR", "/srv/tunnelhub");
        let args = CliArgs::try_parse_from(["tunnelhub", "/etc/tunnelhub.toml"]);
        std::env::remove_var("TUNNELHUB_DATA_DIR");
        let args = args.unwrap_or_else(|e| panic!("{}", e));

        let mut config = Config::from_toml(FULL).unwrap();
        config.apply_args(&args);
        assert_eq!(args.config_file, PathBuf::from("/etc/tunnelhub.toml"));
        assert_eq!(config.server.data_dir, PathBuf::from("/srv/tunnelhub"));
    }

    #[test]
    #[serial]
    fn test_cli_without_override() {
        std::env::remove_var("TUNNELHUB_DATA_DIR");
        let args = CliArgs::try_parse_from(["tunnelhub", "cfg.toml"]).unwrap();
        let mut config = Config::from_toml(FULL).unwrap();
        config.apply_args(&args);
        assert_eq!(config.server.data_dir, PathBuf::from("/var/lib/tunnelhub"));
    }
}
