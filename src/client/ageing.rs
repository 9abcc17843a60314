use crate::client::HttpClientPool;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Periodically closes idle pooled connections so long-lived keep-alive
/// sockets do not pin traffic to a backend that has been rotated out.
#[derive(Clone)]
pub struct AgeingClient {
    pool: HttpClientPool,
    max_age: Duration,
}

impl AgeingClient {
    pub fn new(pool: HttpClientPool, max_age: Duration) -> Self {
        Self { pool, max_age }
    }

    pub fn pool(&self) -> &HttpClientPool {
        &self.pool
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Spawns the ageing ticker. The task exits when `shutdown` is cancelled.
    pub fn start_ageing_process(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let max_age = self.max_age;

        tokio::spawn(async move {
            if max_age.is_zero() {
                tracing::warn!(
                    target: "restq::ageing",
                    event = "ageing_disabled",
                    "connection max age is zero; idle connections will not be aged out"
                );
                return;
            }

            tracing::info!(
                target: "restq::ageing",
                event = "ageing_started",
                max_age_ms = max_age.as_millis() as u64
            );

            let mut ticker = interval_at(Instant::now() + max_age, max_age);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        tracing::info!(
                            target: "restq::ageing",
                            event = "closing_idle_connections"
                        );
                        pool.close_idle_connections();
                    }
                }
            }

            tracing::info!(target: "restq::ageing", event = "ageing_stopped");
        })
    }
}
