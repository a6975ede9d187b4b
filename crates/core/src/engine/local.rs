//! In-process execution engine.
//!
//! Renders every combination of the bound input files through a
//! [`ScriptRunner`], stages the results in a private temp directory and
//! publishes them to the output directory, either straight away or one by
//! one as a reviewer approves them.

use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use image::ImageFormat;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tempfile::TempDir;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::renderer::ScriptRunner;

use super::error::EngineError;
use super::traits::ExecutionEngine;
use super::types::{BatchRequest, FileErrors, ReviewPull};

static IMAGE_EXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+?)\.(?:png|jpg|jpeg|heic)$").expect("extension pattern is valid")
});

/// Separator between input stems in an output file name.
const NAME_SEPARATOR: &str = "_-_";

/// Output name used when the script takes no inputs.
const SINGLE_OUTPUT_NAME: &str = "output.png";

/// A rendered output waiting for a decision.
#[derive(Debug, Clone)]
struct StagedOutput {
    name: String,
    path: PathBuf,
}

/// Book-keeping for the batch currently being executed.
#[derive(Debug)]
struct ActiveBatch {
    job_id: String,
    output_directory: PathBuf,
    review_enabled: bool,
    total: usize,
    finished: usize,
    failed: usize,
    decided: usize,
    queue: VecDeque<StagedOutput>,
    errors: FileErrors,
    cancelled: bool,
}

impl ActiveBatch {
    /// Outputs that still need a decision, including ones not rendered yet.
    fn outstanding(&self) -> usize {
        self.total.saturating_sub(self.failed + self.decided)
    }

    fn progress(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.finished as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    active: Option<ActiveBatch>,
    last_progress: f64,
}

/// Execution engine that runs batches inside this process.
pub struct LocalEngine<R: ScriptRunner> {
    runner: Arc<R>,
    staging_root: Option<PathBuf>,
    state: Arc<Mutex<EngineState>>,
    changed: Arc<Notify>,
}

/// Clears the active batch when a submission ends, however it ends.
struct ActiveGuard {
    state: Arc<Mutex<EngineState>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(batch) = state.active.take() {
            state.last_progress = batch.progress();
        }
    }
}

impl<R: ScriptRunner + 'static> LocalEngine<R> {
    /// Creates an engine that stages outputs under the system temp dir.
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
            staging_root: None,
            state: Arc::new(Mutex::new(EngineState::default())),
            changed: Arc::new(Notify::new()),
        }
    }

    /// Stages outputs under `root` instead of the system temp dir.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_cancelled(&self) -> bool {
        self.state()
            .active
            .as_ref()
            .map(|batch| batch.cancelled)
            .unwrap_or(true)
    }

    fn create_staging_dir(&self) -> Result<TempDir, EngineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pixbatch-");
        let dir = match &self.staging_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    /// Waits until every rendered output has been decided or the batch is
    /// cancelled.
    async fn wait_for_review(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state();
                match state.active.as_ref() {
                    Some(batch) if !batch.cancelled && batch.outstanding() > 0 => {}
                    _ => return,
                }
            }

            notified.await;
        }
    }

    /// Copies staged outputs into the output directory.
    async fn publish_all(&self, staged: &[StagedOutput], output_directory: &Path) {
        for output in staged {
            if self.is_cancelled() {
                break;
            }
            let dest = output_directory.join(&output.name);
            if let Err(e) = tokio::fs::copy(&output.path, &dest).await {
                warn!("Failed to publish {}: {}", output.name, e);
                if let Some(batch) = self.state().active.as_mut() {
                    batch
                        .errors
                        .insert(output.name.clone(), format!("failed to store output: {}", e));
                }
            }
        }
    }

    /// Removes the front of the review queue, optionally publishing it.
    async fn decide_current(&self, approve: bool) -> Result<bool, EngineError> {
        let (item, output_directory) = {
            let mut state = self.state();
            let batch = state.active.as_mut().ok_or(EngineError::NoActiveBatch)?;
            let item = batch.queue.pop_front().ok_or(EngineError::NoPendingItem)?;
            (item, batch.output_directory.clone())
        };

        // Publish before counting the decision so the staging directory
        // outlives the copy.
        let copy_error = if approve {
            let dest = output_directory.join(&item.name);
            tokio::fs::copy(&item.path, &dest).await.err()
        } else {
            None
        };

        let more = {
            let mut state = self.state();
            let batch = state.active.as_mut().ok_or(EngineError::NoActiveBatch)?;
            batch.decided += 1;
            if let Some(e) = copy_error {
                warn!("Failed to publish approved output {}: {}", item.name, e);
                batch
                    .errors
                    .insert(item.name.clone(), format!("failed to store output: {}", e));
            }
            debug!(
                "Batch {}: {} {} ({} outstanding)",
                batch.job_id,
                if approve { "approved" } else { "rejected" },
                item.name,
                batch.outstanding()
            );
            !batch.cancelled && batch.outstanding() > 0
        };

        self.changed.notify_waiters();
        Ok(more)
    }
}

#[async_trait]
impl<R: ScriptRunner + 'static> ExecutionEngine for LocalEngine<R> {
    fn name(&self) -> &str {
        "local"
    }

    async fn submit_batch(&self, request: BatchRequest) -> Result<FileErrors, EngineError> {
        let file_lists = request.file_lists();
        let combos = combinations(&file_lists);

        {
            let mut state = self.state();
            if state.active.is_some() {
                return Err(EngineError::Busy);
            }
            state.last_progress = 0.0;
            state.active = Some(ActiveBatch {
                job_id: request.job_id.clone(),
                output_directory: request.output_directory.clone(),
                review_enabled: request.review_enabled,
                total: combos.len(),
                finished: 0,
                failed: 0,
                decided: 0,
                queue: VecDeque::new(),
                errors: FileErrors::new(),
                cancelled: false,
            });
        }
        let _guard = ActiveGuard {
            state: Arc::clone(&self.state),
        };

        let staging = self.create_staging_dir()?;
        tokio::fs::create_dir_all(&request.output_directory).await?;

        info!(
            "Batch {}: rendering {} combinations with {} (review: {})",
            request.job_id,
            combos.len(),
            self.runner.name(),
            request.review_enabled
        );

        let started = Instant::now();
        let mut rendered: Vec<StagedOutput> = Vec::new();
        let mut names = UniqueNames::default();

        for combo in &combos {
            if self.is_cancelled() {
                info!("Batch {}: cancelled, not starting further renders", request.job_id);
                break;
            }

            let name = names.claim(output_name(combo));
            let staged_path = staging.path().join(&name);
            let result = self
                .runner
                .render(&request.script, combo, &staged_path, staging.path())
                .await;

            {
                let mut state = self.state();
                let Some(batch) = state.active.as_mut() else {
                    break;
                };
                batch.finished += 1;
                match result {
                    Ok(()) => {
                        metrics::RENDERS_TOTAL.with_label_values(&["success"]).inc();
                        let output = StagedOutput {
                            name,
                            path: staged_path,
                        };
                        if batch.review_enabled && !batch.cancelled {
                            batch.queue.push_back(output);
                        } else {
                            rendered.push(output);
                        }
                    }
                    Err(e) => {
                        metrics::RENDERS_TOTAL.with_label_values(&["failed"]).inc();
                        debug!("Batch {}: {} failed: {}", batch.job_id, name, e);
                        batch.failed += 1;
                        batch.errors.insert(name, e.report_message());
                    }
                }
            }
            self.changed.notify_waiters();
        }

        if request.review_enabled {
            self.wait_for_review().await;
        } else if !self.is_cancelled() {
            self.publish_all(&rendered, &request.output_directory).await;
        }

        let (errors, cancelled) = {
            let state = self.state();
            match state.active.as_ref() {
                Some(batch) => (batch.errors.clone(), batch.cancelled),
                None => (FileErrors::new(), true),
            }
        };

        info!(
            "Batch {} finished in {:.1}s ({} errors{})",
            request.job_id,
            started.elapsed().as_secs_f64(),
            errors.len(),
            if cancelled { ", cancelled" } else { "" }
        );

        Ok(errors)
    }

    async fn progress(&self) -> Result<f64, EngineError> {
        let state = self.state();
        Ok(match state.active.as_ref() {
            Some(batch) => batch.progress(),
            None => state.last_progress,
        })
    }

    async fn request_cancel(&self) {
        {
            let mut state = self.state();
            if let Some(batch) = state.active.as_mut() {
                if !batch.cancelled {
                    info!("Batch {}: cancellation requested", batch.job_id);
                }
                batch.cancelled = true;
                batch.queue.clear();
            }
        }
        self.changed.notify_waiters();
    }

    async fn pull_next_review_item(&self) -> Result<ReviewPull, EngineError> {
        let state = self.state();
        // The submission may not have registered yet.
        let Some(batch) = state.active.as_ref() else {
            return Ok(ReviewPull::NotReady);
        };

        if batch.cancelled || !batch.review_enabled || batch.outstanding() == 0 {
            return Ok(ReviewPull::Exhausted);
        }

        Ok(match batch.queue.front() {
            Some(item) => ReviewPull::Item(item.path.clone()),
            None => ReviewPull::NotReady,
        })
    }

    async fn approve_current(&self) -> Result<bool, EngineError> {
        self.decide_current(true).await
    }

    async fn reject_current(&self) -> Result<bool, EngineError> {
        self.decide_current(false).await
    }

    async fn render_preview(
        &self,
        artifact: &Path,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::invalid_request(
                "preview viewport must be non-empty",
            ));
        }
        if !tokio::fs::try_exists(artifact).await? {
            return Err(EngineError::ArtifactNotFound {
                path: artifact.to_path_buf(),
            });
        }

        let path = artifact.to_path_buf();
        tokio::task::spawn_blocking(move || encode_preview(&path, width, height))
            .await
            .map_err(|e| EngineError::preview_failed(e.to_string()))?
    }
}

/// Decodes `path`, fits it into the viewport and encodes it as PNG.
fn encode_preview(path: &Path, width: u32, height: u32) -> Result<Vec<u8>, EngineError> {
    let img = image::open(path).map_err(|e| EngineError::preview_failed(e.to_string()))?;
    let fitted = img.resize(width, height, image::imageops::FilterType::Triangle);

    let mut buffer = Vec::new();
    fitted
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| EngineError::preview_failed(e.to_string()))?;
    Ok(buffer)
}

/// Every combination of one file per list, first list varying slowest.
///
/// No lists yields a single empty combination; an empty list yields none.
pub fn combinations(lists: &[&[PathBuf]]) -> Vec<Vec<PathBuf>> {
    let mut combos: Vec<Vec<PathBuf>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(combos.len() * list.len());
        for prefix in &combos {
            for file in list.iter() {
                let mut combo = prefix.clone();
                combo.push(file.clone());
                next.push(combo);
            }
        }
        combos = next;
    }
    combos
}

/// Output file name for one combination: input stems joined by `_-_`.
pub fn output_name(inputs: &[PathBuf]) -> String {
    if inputs.is_empty() {
        return SINGLE_OUTPUT_NAME.to_string();
    }

    let stems: Vec<String> = inputs
        .iter()
        .map(|input| {
            let base = input
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            IMAGE_EXT_RE.replace(&base, "$1").into_owned()
        })
        .collect();

    format!("{}.png", stems.join(NAME_SEPARATOR))
}

/// Hands out output names that are unique within one batch.
///
/// A repeated name gets a ` (n)` suffix before its extension, starting at 2.
#[derive(Debug, Default)]
struct UniqueNames {
    used: HashSet<String>,
}

impl UniqueNames {
    fn claim(&mut self, name: String) -> String {
        if self.used.insert(name.clone()) {
            return name;
        }

        let (stem, ext) = match name.rfind('.') {
            Some(dot) if dot > 0 => name.split_at(dot),
            _ => (name.as_str(), ""),
        };
        let mut n = 2;
        loop {
            let candidate = format!("{} ({}){}", stem, n, ext);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_combinations_cartesian_order() {
        let first = paths(&["a.png", "b.png"]);
        let second = paths(&["x.jpg", "y.jpg", "z.jpg"]);
        let combos = combinations(&[&first, &second]);

        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], paths(&["a.png", "x.jpg"]));
        assert_eq!(combos[1], paths(&["a.png", "y.jpg"]));
        assert_eq!(combos[3], paths(&["b.png", "x.jpg"]));
        assert_eq!(combos[5], paths(&["b.png", "z.jpg"]));
    }

    #[test]
    fn test_combinations_without_lists() {
        let combos = combinations(&[]);
        assert_eq!(combos, vec![Vec::<PathBuf>::new()]);
    }

    #[test]
    fn test_combinations_with_empty_list() {
        let first = paths(&["a.png"]);
        let empty: Vec<PathBuf> = Vec::new();
        assert!(combinations(&[&first, &empty]).is_empty());
    }

    #[test]
    fn test_output_name_strips_image_extensions() {
        let name = output_name(&paths(&["/photos/Beach.JPG", "/masks/vignette.png"]));
        assert_eq!(name, "Beach_-_vignette.png");
    }

    #[test]
    fn test_output_name_keeps_unknown_extensions() {
        assert_eq!(output_name(&paths(&["/data/points.csv"])), "points.csv.png");
        assert_eq!(output_name(&paths(&["scan.heic"])), "scan.png");
    }

    #[test]
    fn test_output_name_without_inputs() {
        assert_eq!(output_name(&[]), "output.png");
    }

    #[test]
    fn test_repeated_output_names_get_suffixes() {
        let mut names = UniqueNames::default();
        assert_eq!(names.claim("a.png".to_string()), "a.png");
        assert_eq!(names.claim("a.png".to_string()), "a (2).png");
        assert_eq!(names.claim("a (2).png".to_string()), "a (2) (2).png");
        assert_eq!(names.claim("a.png".to_string()), "a (3).png");
        assert_eq!(names.claim("b.png".to_string()), "b.png");
    }

    #[test]
    fn test_same_stem_with_different_extensions_do_not_collide() {
        let mut names = UniqueNames::default();
        let first = names.claim(output_name(&paths(&["in/a.png"])));
        let second = names.claim(output_name(&paths(&["in/a.jpg"])));
        assert_eq!(first, "a.png");
        assert_eq!(second, "a (2).png");
    }

    #[test]
    fn test_outstanding_counts_unrendered_items() {
        let batch = ActiveBatch {
            job_id: "job".to_string(),
            output_directory: PathBuf::from("/out"),
            review_enabled: true,
            total: 5,
            finished: 3,
            failed: 1,
            decided: 1,
            queue: VecDeque::new(),
            errors: FileErrors::new(),
            cancelled: false,
        };
        assert_eq!(batch.outstanding(), 3);
        assert!((batch.progress() - 0.6).abs() < f64::EPSILON);
    }
}
