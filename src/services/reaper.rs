use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::JobStore;
use crate::services::feed::FeedError;

/// Recovers jobs whose worker died (or lost its status write) while they
/// were in `processing`.
pub struct Reaper {
    store: Arc<dyn JobStore>,
    claim_timeout: Duration,
    max_attempts: i32,
    sender: mpsc::Sender<Uuid>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapReport {
    pub requeued: usize,
    pub abandoned: usize,
}

impl Reaper {
    pub fn new(
        store: Arc<dyn JobStore>,
        claim_timeout: Duration,
        max_attempts: i32,
        sender: mpsc::Sender<Uuid>,
    ) -> Self {
        Self {
            store,
            claim_timeout,
            max_attempts,
            sender,
        }
    }

    /// One pass: fail exhausted claims, requeue the rest.
    pub async fn sweep_once(&self) -> Result<ReapReport, FeedError> {
        let sweep = self
            .store
            .sweep_stale(self.claim_timeout, self.max_attempts)
            .await?;

        for job_id in &sweep.abandoned {
            warn!(%job_id, max_attempts = self.max_attempts, "Abandoned stale print job");
            metrics::counter!("sticker_jobs_failed_total", "stage" => "abandoned").increment(1);
        }
        for job in &sweep.requeued {
            info!(job_id = %job.id, attempts = job.attempts, "Requeued stale print job");
            metrics::counter!("sticker_jobs_requeued_total").increment(1);
            self.sender.send(job.id).await.map_err(|_| FeedError::Closed)?;
        }

        Ok(ReapReport {
            requeued: sweep.requeued.len(),
            abandoned: sweep.abandoned.len(),
        })
    }

    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(_) => {}
                Err(FeedError::Closed) => return,
                Err(e) => error!(error = %e, "Stale job sweep failed"),
            }
        }
    }
}
