use anyhow::Result;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod face_service;
mod http_fetch;
mod scheduler;

use config::{BusKind, Config};
use dbus_interface::FaceSyncService;

const BUS_NAME: &str = "org.facesync.FaceSync1";
const OBJECT_PATH: &str = "/org/facesync/FaceSync1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facesyncd starting");

    let config = Config::from_env();
    tracing::info!(
        index = %config.index_db_path.display(),
        directory = %config.directory_db_path.display(),
        collection = %config.collection_id,
        "configuration loaded"
    );

    let engine = engine::spawn_engine(config.clone()).await?;

    let service = FaceSyncService {
        engine: engine.clone(),
        collection_id: config.collection_id.clone(),
        sync_interval_secs: config.sync_interval_secs,
    };

    let builder = match config.bus {
        BusKind::System => zbus::connection::Builder::system()?,
        BusKind::Session => zbus::connection::Builder::session()?,
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;
    tracing::info!(bus = ?config.bus, name = BUS_NAME, "D-Bus interface registered");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.sync_interval_secs > 0 {
        Some(scheduler::spawn_scheduler(
            engine,
            std::time::Duration::from_secs(config.sync_interval_secs),
            shutdown_rx,
        ))
    } else {
        tracing::info!("scheduled sync disabled");
        None
    };

    tracing::info!("facesyncd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facesyncd shutting down");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        handle.await?;
    }

    Ok(())
}
