use crate::engine::{EngineError, EngineHandle};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run a reconciliation every `period` until `shutdown` flips to true.
///
/// The first run starts immediately, then one per period. A tick that lands
/// while a triggered run is still executing is skipped.
pub fn spawn_scheduler(
    engine: EngineHandle,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(period_secs = period.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match engine.sync().await {
                        Ok(summary) => tracing::info!(?summary, "scheduled sync finished"),
                        Err(EngineError::RunInProgress) => {
                            tracing::debug!("run already in progress; skipping tick");
                        }
                        Err(err) => tracing::error!(error = %err, "scheduled sync failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("scheduler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::engine::tests::{empty_directory, test_config};

    async fn wait_for_runs(engine: &EngineHandle, runs: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.sync_runs() < runs {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("scheduled sync did not run");
    }

    #[tokio::test]
    async fn test_scheduler_syncs_at_startup_and_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        empty_directory(&config.directory_db_path);
        let engine = spawn_engine(config).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = spawn_scheduler(engine.clone(), Duration::from_secs(3600), rx);
        wait_for_runs(&engine, 1).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_scheduler_runs_on_tick() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        empty_directory(&config.directory_db_path);
        let engine = spawn_engine(config).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = spawn_scheduler(engine.clone(), Duration::from_millis(50), rx);
        wait_for_runs(&engine, 3).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(!engine.is_running());
    }
}
