use std::collections::HashMap;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

/// Hands a finished raster to the operating system's print spooler.
#[async_trait]
pub trait PrintSubmitter: Send + Sync {
    async fn submit(&self, printer: &str, file: &Path) -> Result<(), DispatchError>;
}

/// CUPS `lp` invocation: `lp -d <printer> -o fit-to-page <file>`.
#[derive(Debug, Clone)]
pub struct LpSubmitter {
    program: String,
}

impl LpSubmitter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for LpSubmitter {
    fn default() -> Self {
        Self::new("lp")
    }
}

#[async_trait]
impl PrintSubmitter for LpSubmitter {
    async fn submit(&self, printer: &str, file: &Path) -> Result<(), DispatchError> {
        let output = Command::new(&self.program)
            .arg("-d")
            .arg(printer)
            .arg("-o")
            .arg("fit-to-page")
            .arg(file)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DispatchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let diagnostics = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(DispatchError::Rejected {
                status: output.status,
                diagnostics: diagnostics.trim().to_string(),
            });
        }

        debug!(
            printer,
            spooler = %String::from_utf8_lossy(&output.stdout).trim(),
            "Spooler accepted job"
        );
        Ok(())
    }
}

/// Serializes submissions per printer.
///
/// A label printer takes one job at a time, so each printer name gets its own
/// FIFO lock; jobs for different printers are not held up by each other.
pub struct PrintDispatcher {
    submitter: Arc<dyn PrintSubmitter>,
    lanes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    timeout: Duration,
}

impl PrintDispatcher {
    pub fn new(submitter: Arc<dyn PrintSubmitter>, timeout: Duration) -> Self {
        Self {
            submitter,
            lanes: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn lane(&self, printer: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        lanes.entry(printer.to_string()).or_default().clone()
    }

    /// Wait for the printer to be free, then submit `file` to it.
    pub async fn dispatch(&self, printer: &str, file: &Path) -> Result<(), DispatchError> {
        let lane = self.lane(printer);
        let queued = Instant::now();
        let _turn = lane.lock().await;
        debug!(
            printer,
            waited_ms = queued.elapsed().as_millis() as u64,
            "Printer lane acquired"
        );

        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.submitter.submit(printer, file)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                printer: printer.to_string(),
                seconds: self.timeout.as_secs(),
            }),
        };
        metrics::histogram!("sticker_dispatch_seconds").record(started.elapsed().as_secs_f64());

        if result.is_ok() {
            info!(printer, file = %file.display(), "Sent to printer");
        }
        result
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to run print command `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Print command exited with {status}: {diagnostics}")]
    Rejected {
        status: ExitStatus,
        diagnostics: String,
    },

    #[error("Printer {printer} did not accept the job within {seconds}s")]
    Timeout { printer: String, seconds: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records how many submissions overlap per printer.
    #[derive(Default)]
    struct OverlapTracker {
        active: Mutex<HashMap<String, usize>>,
        max_same_printer: AtomicUsize,
        max_total: AtomicUsize,
        total_active: AtomicUsize,
    }

    #[async_trait]
    impl PrintSubmitter for OverlapTracker {
        async fn submit(&self, printer: &str, _file: &Path) -> Result<(), DispatchError> {
            {
                let mut active = self.active.lock().unwrap();
                let count = active.entry(printer.to_string()).or_default();
                *count += 1;
                self.max_same_printer.fetch_max(*count, Ordering::SeqCst);
            }
            let total = self.total_active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_total.fetch_max(total, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(40)).await;

            self.total_active.fetch_sub(1, Ordering::SeqCst);
            *self.active.lock().unwrap().get_mut(printer).unwrap() -= 1;
            Ok(())
        }
    }

    struct Hang;

    #[async_trait]
    impl PrintSubmitter for Hang {
        async fn submit(&self, _printer: &str, _file: &Path) -> Result<(), DispatchError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_printer_is_serialized() {
        let tracker = Arc::new(OverlapTracker::default());
        let dispatcher = Arc::new(PrintDispatcher::new(tracker.clone(), Duration::from_secs(5)));

        let jobs = (0..4).map(|i| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let file = PathBuf::from(format!("/tmp/print_{i}.png"));
                dispatcher.dispatch("Brother_QL_800", &file).await
            })
        });
        for handle in futures::future::join_all(jobs).await {
            handle.unwrap().unwrap();
        }

        assert_eq!(tracker.max_same_printer.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_printers_overlap() {
        let tracker = Arc::new(OverlapTracker::default());
        let dispatcher = Arc::new(PrintDispatcher::new(tracker.clone(), Duration::from_secs(5)));

        let a = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch("front", Path::new("/tmp/a.png")).await })
        };
        let b = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch("back", Path::new("/tmp/b.png")).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(tracker.max_same_printer.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.max_total.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dispatch_timeout() {
        let dispatcher = PrintDispatcher::new(Arc::new(Hang), Duration::from_millis(20));
        let result = dispatcher.dispatch("front", Path::new("/tmp/a.png")).await;
        assert!(matches!(result, Err(DispatchError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_timed_out_job_releases_lane() {
        let dispatcher = PrintDispatcher::new(Arc::new(Hang), Duration::from_millis(20));
        let _ = dispatcher.dispatch("front", Path::new("/tmp/a.png")).await;
        let second = tokio::time::timeout(
            Duration::from_secs(1),
            dispatcher.dispatch("front", Path::new("/tmp/b.png")),
        )
        .await;
        assert!(matches!(second, Ok(Err(DispatchError::Timeout { .. }))));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let submitter = LpSubmitter::new("definitely-not-a-print-command");
        let result = submitter.submit("front", Path::new("/tmp/a.png")).await;
        assert!(matches!(result, Err(DispatchError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_decides_success() {
        let ok = LpSubmitter::new("true");
        assert!(ok.submit("front", Path::new("/tmp/a.png")).await.is_ok());

        let rejected = LpSubmitter::new("false");
        let result = rejected.submit("front", Path::new("/tmp/a.png")).await;
        assert!(matches!(result, Err(DispatchError::Rejected { .. })));
    }
}
