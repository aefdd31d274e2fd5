use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::AppResult;

/// Removes expired pastes whenever it's triggered.
#[derive(Clone)]
pub struct Sweeper {
    database: Database,
    purged: Arc<AtomicU64>,
}

impl Sweeper {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            purged: Arc::default(),
        }
    }

    /// Run one purge. Failures are returned, not retried.
    pub async fn trigger(&self) -> AppResult<u64> {
        let count = self.database.purge_expired().await?;
        self.purged.fetch_add(count, Ordering::Relaxed);
        Ok(count)
    }

    /// Total pastes removed by this sweeper.
    pub fn purged(&self) -> u64 {
        self.purged.load(Ordering::Relaxed)
    }

    /// Trigger on a fixed interval until the returned handle is shut down.
    ///
    /// The first sweep happens immediately.
    pub fn spawn(self, interval: Duration) -> SweeperHandle {
        let token = CancellationToken::new();
        let sweeper = self.clone();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = sweeper.trigger().await {
                            warn!("failed to purge expired pastes: {err}");
                        }
                    }
                }
            }
            debug!("sweeper stopped");
        });

        SweeperHandle {
            sweeper: self,
            token,
            task,
        }
    }
}

pub struct SweeperHandle {
    sweeper: Sweeper,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn purged(&self) -> u64 {
        self.sweeper.purged()
    }

    /// Stop the task and wait for an in-flight sweep to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(err) = self.task.await {
            warn!("sweeper task failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::db::tests::memory_database;
    use crate::ids::HashIdGenerator;
    use crate::mapping;
    use crate::models::tests::request;
    use crate::models::Paste;

    async fn seed_expired(db: &Database, n: usize) {
        let past = mapping::now_local() - ChronoDuration::seconds(60);
        for i in 0..n {
            let paste = Paste::from_request_at(
                request(&format!("old {i}"), "public", 1),
                past,
                &HashIdGenerator,
            )
            .unwrap();
            db.insert(&paste).await.unwrap();
        }
    }

    #[tokio::test]
    async fn trigger_purges_once_and_records_count() {
        let (db, _) = memory_database(10);
        seed_expired(&db, 3).await;

        let sweeper = Sweeper::new(db);
        assert_eq!(sweeper.trigger().await.unwrap(), 3);
        assert_eq!(sweeper.trigger().await.unwrap(), 0);
        assert_eq!(sweeper.purged(), 3);
    }

    #[tokio::test]
    async fn spawned_sweeper_runs_until_shutdown() {
        let (db, _) = memory_database(10);
        seed_expired(&db, 2).await;

        let handle = Sweeper::new(db.clone()).spawn(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.purged(), 2);
        handle.shutdown().await;

        // nothing sweeps after shutdown
        seed_expired(&db, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(db.list_recent().await.unwrap().len(), 1);
    }
}
