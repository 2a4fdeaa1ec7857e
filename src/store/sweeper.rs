use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::ResultStore;
use crate::error::AppError;

/// Periodic purge of expired results
pub struct Sweeper;

impl Sweeper {
    /// Start sweeping every `interval`; the first sweep runs one interval
    /// from now
    pub fn spawn(store: Arc<ResultStore>, interval: Duration) -> SweeperHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        // tokio intervals reject a zero period
        let interval = interval.max(Duration::from_millis(1));

        let join = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!("Result sweeper started (every {:?})", interval);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = store.sweep_expired().await {
                            tracing::warn!("Sweep of expired results failed: {}", e);
                        }
                    }
                }
            }
            tracing::info!("Result sweeper stopped");
        });

        SweeperHandle { token, join }
    }
}

/// Owns the sweeper task; dropping it leaves the task running
pub struct SweeperHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the sweeper and wait for the current sweep, if any, to finish
    pub async fn stop(self) -> Result<(), AppError> {
        self.token.cancel();
        self.join
            .await
            .map_err(|e| AppError::TaskJoinError(format!("Sweeper task failed: {}", e)))
    }
}
