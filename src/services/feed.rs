use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{JobStore, PersistenceError};
use crate::models::job::{JobStatus, PrintJob};

const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Feed connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Malformed feed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Worker queue closed")]
    Closed,
}

/// Decode one insert notification. Returns the job id when the inserted row
/// is waiting to be printed.
pub fn decode_event(payload: &str) -> Result<Option<Uuid>, FeedError> {
    let job: PrintJob = serde_json::from_str(payload)?;
    Ok((job.status == JobStatus::Pending).then_some(job.id))
}

/// Push every pending job (oldest first) onto the worker queue.
///
/// Jobs that were already delivered are harmless: the claim rejects them.
pub async fn sweep_backlog(
    store: &dyn JobStore,
    limit: i64,
    sender: &mpsc::Sender<Uuid>,
) -> Result<usize, FeedError> {
    let pending = store.pending(limit).await?;
    let count = pending.len();
    for job in pending {
        sender.send(job.id).await.map_err(|_| FeedError::Closed)?;
    }
    if count > 0 {
        info!(count, "Queued pending backlog");
    }
    Ok(count)
}

/// Listens for `print_queue` inserts and forwards pending job ids to the
/// worker pool.
pub struct JobFeed {
    pool: PgPool,
    store: Arc<dyn JobStore>,
    channel: String,
    backlog_limit: i64,
    sender: mpsc::Sender<Uuid>,
}

impl JobFeed {
    pub fn new(
        pool: PgPool,
        store: Arc<dyn JobStore>,
        channel: impl Into<String>,
        backlog_limit: i64,
        sender: mpsc::Sender<Uuid>,
    ) -> Self {
        Self {
            pool,
            store,
            channel: channel.into(),
            backlog_limit,
            sender,
        }
    }

    /// Run until the worker queue closes.
    ///
    /// Connection errors are logged and retried; after every (re)connect the
    /// pending backlog is swept so inserts missed while disconnected still
    /// get printed.
    pub async fn run(self) -> Result<(), FeedError> {
        loop {
            match self.listen().await {
                Err(FeedError::Closed) => return Ok(()),
                Err(e) => {
                    error!(error = %e, channel = %self.channel, "Job feed error, retrying");
                    sleep(RETRY_DELAY).await;
                }
                Ok(()) => return Ok(()),
            }
        }
    }

    async fn listen(&self) -> Result<(), FeedError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel).await?;
        info!(channel = %self.channel, "Listening for print jobs");
        self.resync().await?;

        loop {
            match listener.try_recv().await? {
                Some(notification) => self.forward(notification.payload()).await?,
                None => {
                    warn!(channel = %self.channel, "Job feed connection lost, reconnecting");
                    // Re-issuing LISTEN forces the reconnect before the sweep.
                    listener.listen(&self.channel).await?;
                    self.resync().await?;
                }
            }
        }
    }

    async fn resync(&self) -> Result<(), FeedError> {
        sweep_backlog(self.store.as_ref(), self.backlog_limit, &self.sender).await?;
        Ok(())
    }

    async fn forward(&self, payload: &str) -> Result<(), FeedError> {
        match decode_event(payload) {
            Ok(Some(job_id)) => {
                metrics::counter!("sticker_jobs_received_total").increment(1);
                debug!(%job_id, "Print job received");
                self.sender.send(job_id).await.map_err(|_| FeedError::Closed)
            }
            Ok(None) => {
                debug!("Ignoring insert that is not pending");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Discarding undecodable feed event");
                Ok(())
            }
        }
    }
}
