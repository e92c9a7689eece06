//! In-memory stand-ins for the job table, object storage and print spooler

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sticker_print_worker::db::{JobStore, PersistenceError, StaleSweep};
use sticker_print_worker::imaging::{dither::is_binary, CanvasSize};
use sticker_print_worker::models::job::{JobStatus, PrintJob};
use sticker_print_worker::services::pipeline::{PipelineSettings, PrintPipeline};
use sticker_print_worker::services::printer::{DispatchError, PrintDispatcher, PrintSubmitter};
use sticker_print_worker::services::storage::{AcquisitionError, ImageSource};
use uuid::Uuid;

pub const DEFAULT_PRINTER: &str = "Brother_QL_800";

/// Job table kept in a map, with the same claim/finish rules as Postgres.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, PrintJob>>,
    fail_writes: AtomicBool,
}

impl MemoryJobStore {
    pub fn insert(&self, job: PrintJob) -> Uuid {
        let id = job.id;
        self.jobs.lock().unwrap().insert(id, job);
        id
    }

    pub fn get(&self, id: Uuid) -> PrintJob {
        self.jobs.lock().unwrap().get(&id).cloned().expect("job exists")
    }

    /// Make every terminal status write fail until reset.
    pub fn fail_status_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn claim(&self, job_id: Uuid) -> Result<Option<PrintJob>, PersistenceError> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.attempts += 1;
                job.claimed_at = Some(Utc::now());
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn finish(
        &self,
        job_id: Uuid,
        attempt: i32,
        status: JobStatus,
        error: Option<&str>,
        output_path: Option<&str>,
    ) -> Result<bool, PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Processing && job.attempts == attempt => {
                job.status = status;
                job.error = error.map(str::to_string);
                job.output_path = output_path.map(str::to_string);
                job.updated_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn heartbeat(&self, job_id: Uuid, attempt: i32) -> Result<bool, PersistenceError> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Processing && job.attempts == attempt => {
                job.claimed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pending(&self, limit: i64) -> Result<Vec<PrintJob>, PersistenceError> {
        let jobs = self.jobs.lock().unwrap();
        let mut pending: Vec<PrintJob> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|j| j.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn sweep_stale(
        &self,
        older_than: Duration,
        max_attempts: i32,
    ) -> Result<StaleSweep, PersistenceError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap();
        let mut jobs = self.jobs.lock().unwrap();
        let mut sweep = StaleSweep::default();
        for job in jobs.values_mut() {
            let stale = job.status == JobStatus::Processing
                && job.claimed_at.is_some_and(|at| at < cutoff);
            if !stale {
                continue;
            }
            if job.attempts >= max_attempts {
                job.status = JobStatus::Failed;
                job.error = Some(format!(
                    "abandoned in processing after {} attempts",
                    job.attempts
                ));
                sweep.abandoned.push(job.id);
            } else {
                job.status = JobStatus::Pending;
                job.claimed_at = None;
                sweep.requeued.push(job.clone());
            }
        }
        Ok(sweep)
    }
}

/// Object storage backed by a map of keys to bytes.
#[derive(Default)]
pub struct StaticImageSource {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl StaticImageSource {
    pub fn with(key: &str, bytes: Vec<u8>) -> Self {
        let source = Self::default();
        source.put(key, bytes);
        source
    }

    pub fn put(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }
}

#[async_trait]
impl ImageSource for StaticImageSource {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, AcquisitionError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| AcquisitionError::NotFound(key.to_string()))
    }
}

/// What the spooler saw for one submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub printer: String,
    pub file: PathBuf,
    pub dimensions: Option<(u32, u32)>,
    pub one_bit: bool,
}

/// Print spooler that inspects the submitted file instead of printing it.
pub struct RecordingSubmitter {
    submissions: Mutex<Vec<Submission>>,
    reject: AtomicBool,
    active: AtomicUsize,
    max_active: AtomicUsize,
    latency: Duration,
}

impl Default for RecordingSubmitter {
    fn default() -> Self {
        Self::slow(Duration::from_millis(10))
    }
}

impl RecordingSubmitter {
    /// Each submission takes `latency` to complete.
    pub fn slow(latency: Duration) -> Self {
        Self {
            submissions: Mutex::default(),
            reject: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            latency,
        }
    }

    pub fn rejecting() -> Self {
        let submitter = Self::default();
        submitter.reject.store(true, Ordering::SeqCst);
        submitter
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    /// Highest number of submissions that were running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrintSubmitter for RecordingSubmitter {
    async fn submit(&self, printer: &str, file: &Path) -> Result<(), DispatchError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let raster = image::open(file).ok().map(|img| img.to_luma8());
        self.submissions.lock().unwrap().push(Submission {
            printer: printer.to_string(),
            file: file.to_path_buf(),
            dimensions: raster.as_ref().map(|r| r.dimensions()),
            one_bit: raster.as_ref().is_some_and(is_binary),
        });

        tokio::time::sleep(self.latency).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.reject.load(Ordering::SeqCst) {
            return Err(DispatchError::Spawn {
                program: "lp".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "printer offline"),
            });
        }
        Ok(())
    }
}

/// Fresh output directory per test.
pub fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("sticker-print-test-{}", Uuid::new_v4()))
}

pub fn settings(output_dir: PathBuf) -> PipelineSettings {
    PipelineSettings {
        canvas: CanvasSize::default(),
        output_dir,
        default_printer: DEFAULT_PRINTER.to_string(),
        fallback_caption: "Sticker Booth".to_string(),
        acquisition_timeout: Duration::from_secs(5),
        claim_timeout: Duration::from_secs(30),
    }
}

/// Pipeline wired to in-memory fakes.
pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub source: Arc<StaticImageSource>,
    pub submitter: Arc<RecordingSubmitter>,
    pub pipeline: Arc<PrintPipeline>,
    pub output_dir: PathBuf,
}

impl Harness {
    pub fn new(source: StaticImageSource, submitter: RecordingSubmitter) -> Self {
        Self::with_settings(source, submitter, settings(scratch_dir()))
    }

    pub fn with_settings(
        source: StaticImageSource,
        submitter: RecordingSubmitter,
        settings: PipelineSettings,
    ) -> Self {
        let store = Arc::new(MemoryJobStore::default());
        let source = Arc::new(source);
        let submitter = Arc::new(submitter);
        let output_dir = settings.output_dir.clone();
        let dispatcher = Arc::new(PrintDispatcher::new(
            submitter.clone(),
            Duration::from_secs(5),
        ));
        let pipeline = Arc::new(PrintPipeline::new(
            store.clone(),
            source.clone(),
            dispatcher,
            settings,
        ));
        Self {
            store,
            source,
            submitter,
            pipeline,
            output_dir,
        }
    }

    pub fn output_for(&self, job_id: Uuid) -> PathBuf {
        self.pipeline.settings().output_path(job_id)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.output_dir);
    }
}
