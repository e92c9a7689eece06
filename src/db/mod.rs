use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::models::job::{JobStatus, PrintJob};

pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of one stale-claim sweep.
#[derive(Debug, Default)]
pub struct StaleSweep {
    /// Returned to `pending`; the caller feeds them back to the workers.
    pub requeued: Vec<PrintJob>,
    /// Marked `failed` after exhausting their attempts.
    pub abandoned: Vec<Uuid>,
}

/// Persistence the print pipeline needs from the job table.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Move `pending` → `processing`. `None` if the job was already taken.
    async fn claim(&self, job_id: Uuid) -> Result<Option<PrintJob>, PersistenceError>;

    /// Write the terminal status of the claim numbered `attempt`. Returns
    /// false if that claim no longer holds the job (nothing written).
    async fn finish(
        &self,
        job_id: Uuid,
        attempt: i32,
        status: JobStatus,
        error: Option<&str>,
        output_path: Option<&str>,
    ) -> Result<bool, PersistenceError>;

    /// Keep a running claim from looking stale. Returns false if the claim
    /// was lost.
    async fn heartbeat(&self, job_id: Uuid, attempt: i32) -> Result<bool, PersistenceError>;

    async fn pending(&self, limit: i64) -> Result<Vec<PrintJob>, PersistenceError>;

    async fn sweep_stale(
        &self,
        older_than: Duration,
        max_attempts: i32,
    ) -> Result<StaleSweep, PersistenceError>;
}

/// [`JobStore`] over the `print_queue` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn claim(&self, job_id: Uuid) -> Result<Option<PrintJob>, PersistenceError> {
        Ok(queries::claim_job(&self.pool, job_id).await?)
    }

    async fn finish(
        &self,
        job_id: Uuid,
        attempt: i32,
        status: JobStatus,
        error: Option<&str>,
        output_path: Option<&str>,
    ) -> Result<bool, PersistenceError> {
        Ok(queries::finish_job(&self.pool, job_id, attempt, status, error, output_path).await?)
    }

    async fn heartbeat(&self, job_id: Uuid, attempt: i32) -> Result<bool, PersistenceError> {
        Ok(queries::touch_claim(&self.pool, job_id, attempt).await?)
    }

    async fn pending(&self, limit: i64) -> Result<Vec<PrintJob>, PersistenceError> {
        Ok(queries::get_pending_jobs(&self.pool, limit).await?)
    }

    async fn sweep_stale(
        &self,
        older_than: Duration,
        max_attempts: i32,
    ) -> Result<StaleSweep, PersistenceError> {
        let abandoned = queries::abandon_stale_jobs(&self.pool, older_than, max_attempts).await?;
        let requeued = queries::requeue_stale_jobs(&self.pool, older_than, max_attempts).await?;
        Ok(StaleSweep {
            requeued,
            abandoned,
        })
    }
}
