use crate::config::Config;
use crate::face_service::HttpFaceIndexer;
use crate::http_fetch::HttpImageFetcher;
use facesync_core::{
    backfill_fingerprints, BackfillSummary, FetchError, ReconcileError, ReconcileOptions,
    Reconciler, RemoteError, RunSummary,
};
use facesync_store::{SqliteDirectory, SqliteIndexStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("a reconciliation run is already in progress")]
    RunInProgress,
    #[error("store error: {0}")]
    Store(#[from] facesync_store::Error),
    #[error("{0}")]
    Reconcile(#[from] ReconcileError),
    #[error("image fetcher setup failed: {0}")]
    Fetcher(#[from] FetchError),
    #[error("face service setup failed: {0}")]
    FaceService(#[from] RemoteError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Marks a run as in flight; cleared when dropped.
///
/// Travels with the request so the flag stays set until the engine thread
/// has finished the run, even if the caller stops waiting.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, EngineError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::RunInProgress)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Messages sent from D-Bus handlers and the scheduler to the engine thread.
enum EngineRequest {
    Sync {
        guard: RunGuard,
        reply: oneshot::Sender<Result<RunSummary, EngineError>>,
    },
    Backfill {
        guard: RunGuard,
        reply: oneshot::Sender<Result<BackfillSummary, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    in_flight: Arc<AtomicBool>,
    sync_runs: Arc<AtomicU64>,
}

impl EngineHandle {
    /// Run a full reconciliation pass. Fails fast if another run is in flight.
    pub async fn sync(&self) -> Result<RunSummary, EngineError> {
        let guard = RunGuard::acquire(&self.in_flight)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Sync {
                guard,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Fingerprint every active entry that has none. Shares the run guard with `sync`.
    pub async fn backfill(&self) -> Result<BackfillSummary, EngineError> {
        let guard = RunGuard::acquire(&self.in_flight)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Backfill {
                guard,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Sync runs the engine has finished since startup, failed ones included.
    pub fn sync_runs(&self) -> u64 {
        self.sync_runs.load(Ordering::Acquire)
    }
}

/// State owned by the engine thread.
struct Worker {
    index_db_path: PathBuf,
    directory_db_path: PathBuf,
    active_status: String,
    options: ReconcileOptions,
    fetcher: HttpImageFetcher,
    faces: HttpFaceIndexer,
}

impl Worker {
    fn new(config: &Config) -> Result<Self, EngineError> {
        let fetcher = HttpImageFetcher::new(config.probe_timeout(), config.fetch_timeout())?;
        let faces = HttpFaceIndexer::new(
            &config.face_service_url,
            config.face_service_token.clone(),
            config.remote_timeout(),
        )?;

        // Creates the schema and proves the index is writable.
        SqliteIndexStore::open(&config.index_db_path)?;
        tracing::info!(path = %config.index_db_path.display(), "face index opened");

        if !config.directory_db_path.exists() {
            tracing::warn!(
                path = %config.directory_db_path.display(),
                "employee directory not found; runs will fail until it exists"
            );
        }

        Ok(Self {
            index_db_path: config.index_db_path.clone(),
            directory_db_path: config.directory_db_path.clone(),
            active_status: config.active_status.clone(),
            options: config.reconcile_options(),
            fetcher,
            faces,
        })
    }

    /// One connection per store for the duration of the run, released on return.
    fn run_sync(&self) -> Result<RunSummary, EngineError> {
        let mut store = SqliteIndexStore::open(&self.index_db_path)?;
        let directory = SqliteDirectory::open(&self.directory_db_path, &self.active_status)?;
        let summary = Reconciler::new(
            &directory,
            &mut store,
            &self.fetcher,
            &self.faces,
            &self.options,
        )
        .run()?;
        Ok(summary)
    }

    fn run_backfill(&self) -> Result<BackfillSummary, EngineError> {
        let mut store = SqliteIndexStore::open(&self.index_db_path)?;
        Ok(backfill_fingerprints(&mut store, &self.fetcher)?)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// HTTP clients are built on that thread (the blocking reqwest client must
/// live outside the async runtime) and the index is opened once to fail fast
/// on a bad path. Requests are then served strictly one at a time.
pub async fn spawn_engine(config: Config) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), EngineError>>();
    let sync_runs = Arc::new(AtomicU64::new(0));
    let finished = Arc::clone(&sync_runs);

    std::thread::Builder::new()
        .name("facesync-engine".into())
        .spawn(move || {
            let worker = match Worker::new(&config) {
                Ok(worker) => {
                    let _ = ready_tx.send(Ok(()));
                    worker
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Sync { guard, reply } => {
                        let result = worker.run_sync();
                        if let Err(err) = &result {
                            tracing::error!(error = %err, "reconciliation run failed");
                        }
                        finished.fetch_add(1, Ordering::AcqRel);
                        drop(guard);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Backfill { guard, reply } => {
                        let result = worker.run_backfill();
                        if let Err(err) = &result {
                            tracing::error!(error = %err, "fingerprint backfill failed");
                        }
                        drop(guard);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    ready_rx.await.map_err(|_| EngineError::ChannelClosed)??;

    Ok(EngineHandle {
        tx,
        in_flight: Arc::new(AtomicBool::new(false)),
        sync_runs,
    })
}
