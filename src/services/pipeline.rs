use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use strum::{Display, IntoStaticStr};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::{JobStore, PersistenceError};
use crate::imaging::{self, CanvasSize, DecodeError, OutputError, RenderError, TextError};
use crate::models::job::PrintJob;
use crate::models::sticker::StickerText;
use crate::services::printer::{DispatchError, PrintDispatcher};
use crate::services::reconciler::Reconciler;
use crate::services::storage::{fetch_with_timeout, AcquisitionError, ImageSource};

/// Step of the print pipeline, used to tag failures in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Acquisition,
    Preprocessing,
    Compositing,
    Output,
    Dispatch,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Image acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Preprocessing failed: {0}")]
    Preprocessing(#[from] DecodeError),

    #[error("Overlay compositing failed: {0}")]
    Compositing(#[from] TextError),

    #[error("Render task did not complete: {0}")]
    RenderTask(#[from] tokio::task::JoinError),

    #[error("Writing sticker failed: {0}")]
    Output(#[from] OutputError),

    #[error("Print dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Acquisition(_) => Stage::Acquisition,
            PipelineError::Preprocessing(_) => Stage::Preprocessing,
            PipelineError::Compositing(_) | PipelineError::RenderTask(_) => Stage::Compositing,
            PipelineError::Output(_) => Stage::Output,
            PipelineError::Dispatch(_) => Stage::Dispatch,
        }
    }
}

impl From<RenderError> for PipelineError {
    fn from(error: RenderError) -> Self {
        match error {
            RenderError::Decode(e) => PipelineError::Preprocessing(e),
            RenderError::Text(e) => PipelineError::Compositing(e),
        }
    }
}

/// What happened to one feed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Printed,
    Failed(Stage),
    /// Unknown job, or already claimed by an earlier delivery.
    Skipped,
    /// The claim was lost (requeued by the reaper) before the outcome could
    /// be written; the newer claim decides the job's status.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub canvas: CanvasSize,
    pub output_dir: PathBuf,
    pub default_printer: String,
    pub fallback_caption: String,
    pub acquisition_timeout: Duration,
    /// Claims not refreshed within this window are treated as abandoned.
    pub claim_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            canvas: config.canvas(),
            output_dir: config.output_dir.clone(),
            default_printer: config.printer_name.clone(),
            fallback_caption: config.booth_caption.clone(),
            acquisition_timeout: config.acquisition_timeout(),
            claim_timeout: config.claim_timeout(),
        }
    }

    /// How often a running job refreshes its claim.
    pub fn heartbeat_interval(&self) -> Duration {
        (self.claim_timeout / 3).max(Duration::from_millis(10))
    }

    /// Job-unique location of the rendered sticker.
    pub fn output_path(&self, job_id: Uuid) -> PathBuf {
        self.output_dir.join(format!("print_{job_id}.png"))
    }
}

/// Drives a single job from claim to terminal status.
pub struct PrintPipeline {
    store: Arc<dyn JobStore>,
    source: Arc<dyn ImageSource>,
    dispatcher: Arc<PrintDispatcher>,
    reconciler: Reconciler,
    settings: PipelineSettings,
}

impl PrintPipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        source: Arc<dyn ImageSource>,
        dispatcher: Arc<PrintDispatcher>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(store.clone()),
            store,
            source,
            dispatcher,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Claim the job and, if this delivery won the claim, print it.
    ///
    /// Stage failures are recorded on the job and reported as
    /// [`Outcome::Failed`]; only store errors are returned as `Err`.
    pub async fn process(&self, job_id: Uuid) -> Result<Outcome, PersistenceError> {
        let Some(job) = self.store.claim(job_id).await? else {
            debug!(%job_id, "Job not pending, skipping delivery");
            return Ok(Outcome::Skipped);
        };

        info!(
            job_id = %job.id,
            order_id = %job.order_id,
            image_path = %job.image_path,
            attempt = job.attempts,
            "Processing print job"
        );

        let output = self.settings.output_path(job.id);
        metrics::gauge!("sticker_jobs_in_flight").increment(1.0);
        let result = self.run_with_heartbeat(&job, &output).await;
        metrics::gauge!("sticker_jobs_in_flight").decrement(1.0);

        match result {
            Ok(()) => {
                if self.reconciler.printed(&job, &output).await? {
                    Ok(Outcome::Printed)
                } else {
                    Ok(Outcome::Superseded)
                }
            }
            Err(error) => {
                let stage = error.stage();
                let kept = match stage {
                    Stage::Dispatch => Some(output.as_path()),
                    Stage::Output => {
                        discard_partial(&job, &output).await;
                        None
                    }
                    _ => None,
                };
                if self.reconciler.failed(&job, &error, kept).await? {
                    Ok(Outcome::Failed(stage))
                } else {
                    Ok(Outcome::Superseded)
                }
            }
        }
    }

    /// Run the stages, refreshing `claimed_at` every heartbeat interval,
    /// including while waiting for the printer lane.
    async fn run_with_heartbeat(&self, job: &PrintJob, output: &Path) -> Result<(), PipelineError> {
        let run = self.run(job, output);
        tokio::pin!(run);
        let mut beat = tokio::time::interval(self.settings.heartbeat_interval());
        beat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        beat.tick().await;

        loop {
            tokio::select! {
                result = &mut run => return result,
                _ = beat.tick() => match self.store.heartbeat(job.id, job.attempts).await {
                    Ok(true) => {}
                    Ok(false) => warn!(job_id = %job.id, attempt = job.attempts, "Claim no longer held"),
                    Err(e) => warn!(job_id = %job.id, error = %e, "Failed to refresh claim"),
                },
            }
        }
    }

    async fn run(&self, job: &PrintJob, output: &Path) -> Result<(), PipelineError> {
        let bytes = fetch_with_timeout(
            self.source.as_ref(),
            &job.image_path,
            self.settings.acquisition_timeout,
        )
        .await?;
        debug!(job_id = %job.id, bytes = bytes.len(), "Image acquired");

        let text = StickerText::for_job(job, &self.settings.fallback_caption);
        let canvas = self.settings.canvas;
        let path = output.to_path_buf();
        let started = Instant::now();
        tokio::task::spawn_blocking(move || -> Result<(), PipelineError> {
            let sticker = imaging::render_sticker(&bytes, canvas, &text)?;
            imaging::write_png(&sticker, &path)?;
            Ok(())
        })
        .await??;
        metrics::histogram!("sticker_render_seconds").record(started.elapsed().as_secs_f64());
        debug!(
            job_id = %job.id,
            output = %output.display(),
            render_ms = started.elapsed().as_millis() as u64,
            "Sticker rendered"
        );

        let printer = job.printer(&self.settings.default_printer);
        self.dispatcher.dispatch(printer, output).await?;
        Ok(())
    }
}

/// Remove whatever a failed PNG write left behind.
async fn discard_partial(job: &PrintJob, output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => debug!(job_id = %job.id, "Removed partial sticker"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            job_id = %job.id,
            output = %output.display(),
            error = %e,
            "Failed to remove partial sticker"
        ),
    }
}
