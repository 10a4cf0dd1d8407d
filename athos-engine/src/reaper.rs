//! Periodic removal of abandoned upload sessions

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use athos_core::*;
use crate::SessionStore;

/// Sweeps sessions idle for longer than `timeout`, every `interval`.
///
/// Memory hygiene only: clients whose sessions are reaped are not told and
/// must restart the transfer under a new id.
#[derive(Clone)]
pub struct Reaper {
    store: Arc<dyn SessionStore>,
    interval: Duration,
    timeout: Duration,
}

impl Reaper {
    pub fn new(store: Arc<dyn SessionStore>, interval: Duration, timeout: Duration) -> Self {
        Reaper {
            store,
            interval,
            timeout,
        }
    }

    /// One sweep against the current time
    pub async fn sweep(&self) -> Result<Vec<SessionId>> {
        self.sweep_at(Utc::now()).await
    }

    /// One sweep as if the clock read `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<Vec<SessionId>> {
        let Some(cutoff) = chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|timeout| now.checked_sub_signed(timeout))
        else {
            return Ok(Vec::new());
        };

        let reaped = self.store.remove_stale(cutoff).await?;
        for id in &reaped {
            info!(session_id = %id, "Discarded idle upload session");
        }
        Ok(reaped)
    }

    /// Run sweeps on a background task until the handle is shut down
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            info!(
                interval_secs = self.interval.as_secs(),
                timeout_secs = self.timeout.as_secs(),
                "Session reaper started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep().await {
                            Ok(reaped) if !reaped.is_empty() => {
                                debug!(count = reaped.len(), "Reaper sweep finished");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Reaper sweep failed"),
                        }
                    }
                    // Only ever flipped to true, or the handle was dropped.
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("Session reaper stopped");
        });

        ReaperHandle { shutdown_tx, task }
    }
}

/// Running reaper task
pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the timer and wait for the task to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Reaper task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySessionStore;

    fn metadata() -> UploadMetadata {
        UploadMetadata::new("a.pdf", OwnerRecordId::new("p1").unwrap())
    }

    #[tokio::test]
    async fn test_sweep_respects_timeout() {
        let store = Arc::new(MemorySessionStore::default());
        let id = SessionId::new("idle").unwrap();
        store.create_if_absent(&id, 2, metadata()).await.unwrap();

        let reaper = Reaper::new(store.clone(), Duration::from_secs(60), Duration::from_secs(600));

        let reaped = reaper.sweep_at(Utc::now() + chrono::Duration::minutes(5)).await.unwrap();
        assert!(reaped.is_empty());
        assert_eq!(store.len().await.unwrap(), 1);

        let reaped = reaper.sweep_at(Utc::now() + chrono::Duration::minutes(11)).await.unwrap();
        assert_eq!(reaped, vec![id]);
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spawned_reaper_sweeps_and_shuts_down() {
        let store = Arc::new(MemorySessionStore::default());
        let id = SessionId::new("abandoned").unwrap();
        store.create_if_absent(&id, 4, metadata()).await.unwrap();

        let handle = Reaper::new(store.clone(), Duration::from_millis(10), Duration::ZERO).spawn();

        let mut remaining = 1;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remaining = store.len().await.unwrap();
            if remaining == 0 {
                break;
            }
        }
        assert_eq!(remaining, 0);

        handle.shutdown().await;
    }
}
