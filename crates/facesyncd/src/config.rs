use facesync_core::ReconcileOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    System,
    Session,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite face index.
    pub index_db_path: PathBuf,
    /// Path to the SQLite employee directory (opened read-only).
    pub directory_db_path: PathBuf,
    /// Directory status value that marks an employee as active.
    pub active_status: String,
    /// Prefix joined with each employee's photo path.
    pub image_base_url: String,
    /// Base URL of the face indexing service.
    pub face_service_url: String,
    /// Optional bearer token for the face indexing service.
    pub face_service_token: Option<String>,
    /// Face collection new registrations go to.
    pub collection_id: String,
    /// Seconds between background runs; 0 disables the schedule.
    pub sync_interval_secs: u64,
    /// Timeout for the HEAD metadata probe.
    pub probe_timeout_secs: u64,
    /// Timeout for a full image download.
    pub fetch_timeout_secs: u64,
    /// Timeout for face service calls.
    pub remote_timeout_secs: u64,
    pub bus: BusKind,
}

impl Config {
    /// Load configuration from `FACESYNC_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facesync");

        let index_db_path = std::env::var("FACESYNC_INDEX_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("index.db"));

        let directory_db_path = std::env::var("FACESYNC_DIRECTORY_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("directory.db"));

        Self {
            index_db_path,
            directory_db_path,
            active_status: env_string("FACESYNC_ACTIVE_STATUS", "ACTIVO"),
            image_base_url: env_string("FACESYNC_IMAGE_BASE_URL", "http://127.0.0.1/web"),
            face_service_url: env_string("FACESYNC_FACE_SERVICE_URL", "http://127.0.0.1:8085"),
            face_service_token: std::env::var("FACESYNC_FACE_SERVICE_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            collection_id: env_string("FACESYNC_COLLECTION_ID", "employees"),
            sync_interval_secs: env_u64("FACESYNC_SYNC_INTERVAL_SECS", 300),
            probe_timeout_secs: env_u64("FACESYNC_PROBE_TIMEOUT_SECS", 5),
            fetch_timeout_secs: env_u64("FACESYNC_FETCH_TIMEOUT_SECS", 15),
            remote_timeout_secs: env_u64("FACESYNC_REMOTE_TIMEOUT_SECS", 30),
            bus: match std::env::var("FACESYNC_DBUS_BUS").as_deref() {
                Ok("session") => BusKind::Session,
                _ => BusKind::System,
            },
        }
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        let mut options = ReconcileOptions::new(&self.collection_id, &self.image_base_url);
        options.active_status = self.active_status.clone();
        options
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
