use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use tunnelhub::auditlog::AuditLog;
use tunnelhub::clients::registry::ClientSessionRegistry;
use tunnelhub::clients::snapshot;
use tunnelhub::clients::tasks::{CleanupTask, SaveToFileTask};
use tunnelhub::configuration::{CliArgs, Config};
use tunnelhub::scheduler::Scheduler;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = CliArgs::parse();

    info!("Importing configuration from {}", args.config_file.display());
    let mut config = Config::from_file(&args.config_file).unwrap_or_else(|e| {
        error!("Unable to import configuration from file: {}", e);
        std::process::exit(1);
    });
    config.apply_args(&args);
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    info!("Configuration imported successfully");

    let data_dir = config.server.data_dir.clone();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        error!("Unable to create data directory {}: {}", data_dir.display(), e);
        std::process::exit(1);
    }

    let keep = config.keep_disconnected_clients();
    let snapshot_path = config.clients_snapshot_path();
    let load = snapshot::load_from(&snapshot_path, keep);
    if let Some(ref e) = load.error {
        warn!(
            "Client snapshot {} only partially restored ({} session(s) recovered): {}",
            snapshot_path.display(),
            load.sessions.len(),
            e
        );
    }
    info!(
        "Restored {} client session(s), {} obsolete discarded",
        load.sessions.len(),
        load.discarded
    );
    let registry = Arc::new(ClientSessionRegistry::new(load.sessions, keep));

    let audit_log = AuditLog::new(config.audit_log.clone(), registry.clone(), &data_dir)
        .await
        .unwrap_or_else(|e| {
            error!("Unable to open the audit log: {}, exiting...", e);
            std::process::exit(1);
        });

    let mut scheduler = Scheduler::new();
    if keep.is_some() {
        scheduler.spawn(
            Arc::new(CleanupTask::new(registry.clone(), keep)),
            config.purge_interval(),
        );
        scheduler.spawn(
            Arc::new(SaveToFileTask::new(registry.clone(), snapshot_path.clone())),
            config.save_clients_interval(),
        );
    }

    info!("Server ready, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for the shutdown signal: {}", e);
    }
    info!("Shutting down");

    scheduler.shutdown().await;
    match snapshot::save_all(&registry, &snapshot_path) {
        Ok(n) => info!("Saved {} client session(s) to {}", n, snapshot_path.display()),
        Err(e) => error!("Final client snapshot failed: {}", e),
    }
    if let Err(e) = audit_log.close().await {
        error!("Unable to close the audit log: {}", e);
    }
}
