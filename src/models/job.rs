use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

/// Status of a sticker print job in `print_queue`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Printed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// A request to render and print one sticker.
///
/// Rows arrive either from the insert feed (`row_to_json(NEW)`) or from
/// direct queries, so every column the trigger payload may omit is defaulted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrintJob {
    pub id: Uuid,
    pub order_id: String,
    pub image_path: String,
    pub status: JobStatus,
    /// Column `type` (e.g. `selfie`).
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Overrides the worker's default printer when set.
    #[serde(default)]
    pub printer_name: Option<String>,
    #[serde(default)]
    pub attempts: i32,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    /// Retained raster of a failed job, kept for diagnosis.
    #[serde(default)]
    pub output_path: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PrintJob {
    /// A freshly inserted job, as the sticker booth page creates it.
    pub fn new_pending(order_id: impl Into<String>, image_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order_id.into(),
            image_path: image_path.into(),
            status: JobStatus::Pending,
            kind: Some("selfie".to_string()),
            customer_name: None,
            printer_name: None,
            attempts: 0,
            claimed_at: None,
            error: None,
            output_path: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Printer this job must be sent to.
    pub fn printer<'a>(&'a self, default: &'a str) -> &'a str {
        self.printer_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(default)
    }
}

/// Response for querying job status.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub order_id: String,
    pub status: JobStatus,
    pub attempts: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<PrintJob> for JobStatusResponse {
    fn from(job: PrintJob) -> Self {
        Self {
            job_id: job.id,
            order_id: job.order_id,
            status: job.status,
            attempts: job.attempts,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
