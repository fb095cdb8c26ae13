use crate::engine::EngineHandle;
use serde::Serialize;
use std::fmt::Display;
use zbus::interface;

/// D-Bus interface for the facesync daemon.
///
/// Bus name: org.facesync.FaceSync1
/// Object path: /org/facesync/FaceSync1
pub struct FaceSyncService {
    pub engine: EngineHandle,
    pub collection_id: String,
    pub sync_interval_secs: u64,
}

#[interface(name = "org.facesync.FaceSync1")]
impl FaceSyncService {
    /// Reconcile the face index against the employee directory.
    async fn sync_employees(&self) -> zbus::fdo::Result<String> {
        tracing::info!("sync requested over D-Bus");
        Ok(envelope(self.engine.sync().await))
    }

    /// Compute fingerprints for active entries that have none.
    async fn update_fingerprints(&self) -> zbus::fdo::Result<String> {
        tracing::info!("fingerprint backfill requested over D-Bus");
        Ok(envelope(self.engine.backfill().await))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "collection_id": self.collection_id,
            "sync_interval_secs": self.sync_interval_secs,
            "run_in_progress": self.engine.is_running(),
            "sync_runs": self.engine.sync_runs(),
        })
        .to_string())
    }
}

/// `{"success":true,"result":..}` or `{"success":false,"error":".."}`.
fn envelope<T: Serialize, E: Display>(result: Result<T, E>) -> String {
    match result {
        Ok(value) => serde_json::json!({ "success": true, "result": value }),
        Err(err) => serde_json::json!({ "success": false, "error": err.to_string() }),
    }
    .to_string()
}
