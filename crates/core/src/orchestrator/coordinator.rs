//! Batch coordinator: validates a job, hands it to the engine and tracks it
//! to a terminal state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::binder::{extract_placeholders, validate_bindings, PlaceholderBinding};
use crate::engine::{BatchRequest, EngineError, ExecutionEngine, FileErrors};

use super::config::BatchConfig;
use super::review::{wait_stopped, ReviewGate, Reviewer};
use super::tracker::{JobTracker, JobUpdateCallback};
use super::types::{BatchError, BatchJob, BatchOutcome, JobState};

/// How many times a cancel request is repeated while the engine keeps
/// working on a cancelled batch.
const CANCEL_ATTEMPTS: usize = 5;

/// Drives a single batch job from configuration to a terminal state.
///
/// The coordinator owns the job record. Configuration calls are accepted
/// only while the job is `Configuring`; once [`submit`](Self::submit)
/// succeeds, a background driver takes over and the caller observes the
/// job through [`snapshot`](Self::snapshot), [`subscribe`](Self::subscribe)
/// or [`wait`](Self::wait).
pub struct BatchCoordinator {
    config: BatchConfig,
    engine: Arc<dyn ExecutionEngine>,
    placeholders: Vec<u32>,
    tracker: Arc<JobTracker>,
}

impl BatchCoordinator {
    /// Creates a coordinator for `script`, with one empty binding per
    /// placeholder it references.
    pub fn new(
        config: BatchConfig,
        engine: Arc<dyn ExecutionEngine>,
        script: impl Into<String>,
    ) -> Self {
        let script = script.into();
        let placeholders = extract_placeholders(&script);
        let bindings = placeholders
            .iter()
            .map(|&index| PlaceholderBinding::empty(index))
            .collect();

        Self {
            config,
            engine,
            placeholders,
            tracker: Arc::new(JobTracker::new(BatchJob::new(script, bindings), None)),
        }
    }

    /// Registers a callback invoked with a copy of the job after every
    /// change. Replaces the job record, so call it before anything else.
    pub fn with_update_callback(mut self, callback: JobUpdateCallback) -> Self {
        let job = self.tracker.snapshot();
        self.tracker = Arc::new(JobTracker::new(job, Some(callback)));
        self
    }

    /// Placeholder indices the script references, ascending.
    pub fn placeholders(&self) -> &[u32] {
        &self.placeholders
    }

    pub fn job_id(&self) -> String {
        self.tracker.snapshot().id
    }

    pub fn engine(&self) -> &Arc<dyn ExecutionEngine> {
        &self.engine
    }

    pub fn set_output_directory(&self, directory: impl Into<PathBuf>) -> Result<(), BatchError> {
        let directory = directory.into();
        self.tracker
            .configure(|job| job.output_directory = Some(directory))
            .map_err(not_configuring)
    }

    /// Binds an ordered list of input files to placeholder `$index`,
    /// replacing any earlier binding.
    pub fn bind(&self, index: u32, files: Vec<PathBuf>) -> Result<(), BatchError> {
        if !self.placeholders.contains(&index) {
            return Err(BatchError::UnknownPlaceholder(index));
        }
        self.tracker
            .configure(|job| {
                match job.bindings.iter_mut().find(|b| b.index == index) {
                    Some(binding) => binding.files = files,
                    None => job.bindings.push(PlaceholderBinding::new(index, files)),
                }
            })
            .map_err(not_configuring)
    }

    pub fn set_review_enabled(&self, enabled: bool) -> Result<(), BatchError> {
        self.tracker
            .configure(|job| job.review_enabled = enabled)
            .map_err(not_configuring)
    }

    /// Checks the current configuration without submitting it.
    pub fn validate(&self) -> Result<(), BatchError> {
        self.validate_job(&self.tracker.snapshot())
    }

    fn validate_job(&self, job: &BatchJob) -> Result<(), BatchError> {
        if job.script.trim().is_empty() {
            return Err(BatchError::EmptyScript);
        }
        match &job.output_directory {
            Some(dir) if !dir.as_os_str().is_empty() => {}
            _ => return Err(BatchError::MissingOutputDirectory),
        }
        validate_bindings(&self.placeholders, &job.bindings)?;
        Ok(())
    }

    /// Validates the job and starts it.
    ///
    /// Returns once the job is `Submitted`; the engine call and everything
    /// after it run in the background. `reviewer` is required when review
    /// is enabled and ignored otherwise.
    pub fn submit(&self, reviewer: Option<Arc<dyn Reviewer>>) -> Result<(), BatchError> {
        let job = self.tracker.snapshot();
        if job.state != JobState::Configuring {
            return Err(not_configuring(job.state));
        }

        self.validate_job(&job)?;
        let reviewer = if job.review_enabled {
            Some(reviewer.ok_or(BatchError::MissingReviewer)?)
        } else {
            None
        };

        self.tracker
            .transition(&[JobState::Configuring], JobState::Submitted)
            .map_err(not_configuring)?;

        let mut bindings = job.bindings.clone();
        bindings.sort_by_key(|b| b.index);
        let request = BatchRequest {
            job_id: job.id.clone(),
            script: job.script.clone(),
            output_directory: job.output_directory.clone().unwrap_or_default(),
            bindings,
            review_enabled: job.review_enabled,
        };

        info!(
            "Submitting batch {} ({} placeholders, review {})",
            job.id,
            self.placeholders.len(),
            if job.review_enabled { "on" } else { "off" }
        );

        tokio::spawn(drive(
            self.config.clone(),
            Arc::clone(&self.engine),
            Arc::clone(&self.tracker),
            request,
            reviewer,
        ));
        Ok(())
    }

    /// Cancels the job. Returns false if it had already ended.
    ///
    /// The job is `Cancelled` when this returns; the engine is asked to
    /// stop in the background and its eventual result is ignored.
    pub fn cancel(&self) -> bool {
        let cancelled = self.tracker.cancel(None);
        if cancelled {
            info!("Batch {} cancelled by caller", self.job_id());
        }
        cancelled
    }

    pub fn snapshot(&self) -> BatchJob {
        self.tracker.snapshot()
    }

    pub fn state(&self) -> JobState {
        self.tracker.state()
    }

    /// Receiver that sees every job change.
    pub fn subscribe(&self) -> watch::Receiver<BatchJob> {
        self.tracker.subscribe()
    }

    /// Waits for the job to end. Never returns for a job that is never
    /// submitted or cancelled.
    pub async fn wait(&self) -> BatchOutcome {
        let mut rx = self.tracker.subscribe();
        loop {
            let outcome = rx.borrow_and_update().outcome();
            if let Some(outcome) = outcome {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return self
                    .tracker
                    .snapshot()
                    .outcome()
                    .unwrap_or(BatchOutcome::Cancelled { reason: None });
            }
        }
    }

    /// Renders the item currently under review, if any.
    pub async fn preview_current(
        &self,
        width: u32,
        height: u32,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        let Some(item) = self.tracker.snapshot().current_review else {
            return Ok(None);
        };
        self.engine
            .render_preview(&item.artifact_path, width, height)
            .await
            .map(Some)
    }
}

fn not_configuring(state: JobState) -> BatchError {
    if state.is_in_flight() {
        BatchError::JobInFlight
    } else {
        BatchError::InvalidState {
            expected: JobState::Configuring.to_string(),
            actual: state.to_string(),
        }
    }
}

/// Runs a submitted job: the engine call, the progress poller and the
/// review gate, until the submission resolves or the job is stopped.
async fn drive(
    config: BatchConfig,
    engine: Arc<dyn ExecutionEngine>,
    tracker: Arc<JobTracker>,
    request: BatchRequest,
    reviewer: Option<Arc<dyn Reviewer>>,
) {
    let job_id = request.job_id.clone();
    let mut submission: JoinHandle<Result<FileErrors, EngineError>> = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.submit_batch(request).await })
    };

    // Fails only if the job was cancelled in the meantime, which the
    // select below picks up.
    let _ = tracker.transition(&[JobState::Submitted], JobState::Running);

    let poller = tokio::spawn(poll_progress(
        config.clone(),
        Arc::clone(&engine),
        Arc::clone(&tracker),
    ));

    let gate = reviewer.map(|reviewer| {
        tokio::spawn(
            ReviewGate::new(
                Arc::clone(&engine),
                reviewer,
                Arc::clone(&tracker),
                config.review_retry_interval(),
            )
            .run(),
        )
    });

    let mut stop = tracker.stop_signal();
    tokio::select! {
        result = &mut submission => match result {
            Ok(Ok(errors)) => {
                if !errors.is_empty() {
                    warn!("Batch {} finished with {} file errors", job_id, errors.len());
                }
                tracker.complete(errors);
            }
            Ok(Err(e)) => {
                error!("Batch {} submission failed: {}", job_id, e);
                tracker.fail(e.to_string());
            }
            Err(e) => {
                error!("Batch {} submission task failed: {}", job_id, e);
                tracker.fail(format!("submission task failed: {}", e));
            }
        },
        _ = wait_stopped(&mut stop) => {
            debug!("Batch {} stopped before the submission resolved", job_id);
            tokio::spawn(halt_engine(
                Arc::clone(&engine),
                submission,
                config.progress_poll_interval(),
            ));
        }
    }

    if let Err(e) = poller.await {
        warn!("Progress poller for batch {} failed: {}", job_id, e);
    }
    if let Some(gate) = gate {
        match gate.await {
            Ok(outcome) => debug!("Review gate for batch {} ended: {:?}", job_id, outcome),
            Err(e) => warn!("Review gate for batch {} failed: {}", job_id, e),
        }
    }
}

/// Asks the engine to stop until the abandoned submission resolves.
async fn halt_engine(
    engine: Arc<dyn ExecutionEngine>,
    mut submission: JoinHandle<Result<FileErrors, EngineError>>,
    retry_interval: Duration,
) {
    for _ in 0..CANCEL_ATTEMPTS {
        engine.request_cancel().await;
        tokio::select! {
            result = &mut submission => {
                if let Ok(Err(e)) = result {
                    debug!("Cancelled submission ended with: {}", e);
                }
                return;
            }
            _ = tokio::time::sleep(retry_interval) => {}
        }
    }
    warn!(
        "Engine {} kept running after {} cancel requests; detaching",
        engine.name(),
        CANCEL_ATTEMPTS
    );
}

/// Samples engine progress until the job stops, and cancels the job if
/// the engine goes quiet for too long.
async fn poll_progress(
    config: BatchConfig,
    engine: Arc<dyn ExecutionEngine>,
    tracker: Arc<JobTracker>,
) {
    let interval = config.progress_poll_interval();
    let max_silence = config.max_silence();
    let mut stop = tracker.stop_signal();

    loop {
        tokio::select! {
            biased;
            _ = wait_stopped(&mut stop) => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let sample = tokio::select! {
            biased;
            _ = wait_stopped(&mut stop) => break,
            sample = engine.progress() => sample,
        };
        match sample {
            Ok(progress) => tracker.record_progress(progress),
            Err(e) => warn!("Progress query failed: {}", e),
        }

        if let Some(limit) = max_silence {
            if !tracker.is_presenting() && tracker.silent_for() >= limit {
                warn!("No batch activity for {}s, cancelling", limit.as_secs());
                tracker.cancel(Some(format!(
                    "no activity for {} seconds",
                    limit.as_secs()
                )));
                break;
            }
        }
    }
}
