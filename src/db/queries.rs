use std::time::Duration;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{JobStatus, PrintJob};

const JOB_COLUMNS: &str = "id, order_id, image_path, status, \"type\", customer_name, printer_name, \
                           attempts, claimed_at, error, output_path, created_at, updated_at";

fn job_from_row(row: &PgRow) -> Result<PrintJob, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<JobStatus>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(PrintJob {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        image_path: row.try_get("image_path")?,
        status,
        kind: row.try_get("type")?,
        customer_name: row.try_get("customer_name")?,
        printer_name: row.try_get("printer_name")?,
        attempts: row.try_get("attempts")?,
        claimed_at: row.try_get("claimed_at")?,
        error: row.try_get("error")?,
        output_path: row.try_get("output_path")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new pending print job (what the sticker booth page does).
pub async fn create_job(
    pool: &PgPool,
    order_id: &str,
    image_path: &str,
    customer_name: Option<&str>,
    printer_name: Option<&str>,
) -> Result<PrintJob, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO print_queue (order_id, image_path, status, customer_name, printer_name)
        VALUES ($1, $2, 'pending', $3, $4)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(order_id)
    .bind(image_path)
    .bind(customer_name)
    .bind(printer_name)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<PrintJob>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM print_queue WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Atomically move a job from `pending` to `processing`.
///
/// Returns `None` when the job is unknown or another delivery already
/// claimed it.
pub async fn claim_job(pool: &PgPool, job_id: Uuid) -> Result<Option<PrintJob>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE print_queue
        SET status = 'processing',
            claimed_at = NOW(),
            attempts = attempts + 1
        WHERE id = $1 AND status = 'pending'
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Record the terminal outcome of a claimed job.
///
/// `attempt` is the claim's `attempts` value. Only the row still held by
/// that claim is updated, so a job never transitions twice and a requeued
/// claim cannot overwrite a newer one. Returns whether a row changed.
pub async fn finish_job(
    pool: &PgPool,
    job_id: Uuid,
    attempt: i32,
    status: JobStatus,
    error: Option<&str>,
    output_path: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE print_queue
        SET status = $1,
            error = $2,
            output_path = $3
        WHERE id = $4 AND status = 'processing' AND attempts = $5
        "#,
    )
    .bind(status.as_str())
    .bind(error)
    .bind(output_path)
    .bind(job_id)
    .bind(attempt)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Refresh `claimed_at` for a claim that is still being worked on.
///
/// Returns false when the claim is no longer held.
pub async fn touch_claim(pool: &PgPool, job_id: Uuid, attempt: i32) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE print_queue
        SET claimed_at = NOW()
        WHERE id = $1 AND status = 'processing' AND attempts = $2
        "#,
    )
    .bind(job_id)
    .bind(attempt)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Pending jobs, oldest first (backlog sweep after startup or a feed reconnect).
pub async fn get_pending_jobs(pool: &PgPool, limit: i64) -> Result<Vec<PrintJob>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM print_queue
        WHERE status = 'pending'
        ORDER BY created_at ASC
        LIMIT $1
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Fail jobs stuck in `processing` that have used up their attempts.
pub async fn abandon_stale_jobs(
    pool: &PgPool,
    older_than: Duration,
    max_attempts: i32,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        UPDATE print_queue
        SET status = 'failed',
            error = 'abandoned in processing after ' || attempts || ' attempts'
        WHERE status = 'processing'
          AND claimed_at < NOW() - make_interval(secs => $1)
          AND attempts >= $2
        RETURNING id
        "#,
    )
    .bind(older_than.as_secs_f64())
    .bind(max_attempts)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|r| r.try_get("id")).collect()
}

/// Return jobs stuck in `processing` to `pending` so they can be claimed again.
pub async fn requeue_stale_jobs(
    pool: &PgPool,
    older_than: Duration,
    max_attempts: i32,
) -> Result<Vec<PrintJob>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        UPDATE print_queue
        SET status = 'pending',
            claimed_at = NULL
        WHERE status = 'processing'
          AND claimed_at < NOW() - make_interval(secs => $1)
          AND attempts < $2
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(older_than.as_secs_f64())
    .bind(max_attempts)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}
