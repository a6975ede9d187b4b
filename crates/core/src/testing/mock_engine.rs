//! Mock execution engine for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use crate::engine::{BatchRequest, EngineError, ExecutionEngine, FileErrors, ReviewPull};

/// Bytes returned by [`MockEngine::render_preview`].
pub const MOCK_PREVIEW: &[u8] = b"\x89PNG mock preview";

/// A call made against the mock, for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Submit { job_id: String },
    Progress,
    Cancel,
    Pull,
    Approve(PathBuf),
    Reject(PathBuf),
    Preview { path: PathBuf, width: u32, height: u32 },
}

#[derive(Debug)]
struct MockEngineState {
    progress: f64,
    review_queue: VecDeque<PathBuf>,
    when_empty: ReviewPull,
    submit_result: FileErrors,
    submit_error: Option<EngineError>,
    next_error: Option<EngineError>,
    release_when_reviewed: bool,
    cancelled: bool,
}

/// Mock implementation of the ExecutionEngine trait.
///
/// Provides controllable behavior for testing:
/// - Track every call for assertions
/// - Control progress and the review queue
/// - Hold a submission open until released or cancelled
/// - Simulate failures
///
/// # Example
///
/// ```rust,ignore
/// let engine = MockEngine::new();
/// engine.hold_submission().await;
/// engine.queue_review_items(vec!["/s/a.png".into(), "/s/b.png".into()]).await;
/// engine.release_when_reviewed().await;
///
/// // Submit through a coordinator, then:
/// engine.set_progress(0.5).await;
/// assert_eq!(engine.pull_count().await, 1);
/// ```
#[derive(Debug)]
pub struct MockEngine {
    calls: Arc<RwLock<Vec<EngineCall>>>,
    submissions: Arc<RwLock<Vec<BatchRequest>>>,
    state: Arc<RwLock<MockEngineState>>,
    /// `true` while submissions are held open.
    hold: watch::Sender<bool>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a mock engine whose submissions resolve at once with no
    /// errors and whose review queue is exhausted.
    pub fn new() -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            submissions: Arc::new(RwLock::new(Vec::new())),
            state: Arc::new(RwLock::new(MockEngineState {
                progress: 0.0,
                review_queue: VecDeque::new(),
                when_empty: ReviewPull::Exhausted,
                submit_result: FileErrors::new(),
                submit_error: None,
                next_error: None,
                release_when_reviewed: false,
                cancelled: false,
            })),
            hold,
        }
    }

    /// Get all recorded calls.
    pub async fn calls(&self) -> Vec<EngineCall> {
        self.calls.read().await.clone()
    }

    /// Get all submitted batch requests.
    pub async fn submissions(&self) -> Vec<BatchRequest> {
        self.submissions.read().await.clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub async fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.read().await.iter().filter(|c| predicate(c)).count()
    }

    pub async fn pull_count(&self) -> usize {
        self.count_calls(|c| matches!(c, EngineCall::Pull)).await
    }

    pub async fn progress_count(&self) -> usize {
        self.count_calls(|c| matches!(c, EngineCall::Progress)).await
    }

    pub async fn cancel_requests(&self) -> usize {
        self.count_calls(|c| matches!(c, EngineCall::Cancel)).await
    }

    /// Paths approved so far, in order.
    pub async fn approved(&self) -> Vec<PathBuf> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|c| match c {
                EngineCall::Approve(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Paths rejected so far, in order.
    pub async fn rejected(&self) -> Vec<PathBuf> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|c| match c {
                EngineCall::Reject(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Set the progress reported by the engine.
    pub async fn set_progress(&self, progress: f64) {
        self.state.write().await.progress = progress;
    }

    /// Append outputs to the review queue.
    pub async fn queue_review_items(&self, items: Vec<PathBuf>) {
        self.state.write().await.review_queue.extend(items);
    }

    /// What a pull returns while the review queue is empty.
    pub async fn set_pull_when_empty(&self, pull: ReviewPull) {
        self.state.write().await.when_empty = pull;
    }

    /// Per-file errors returned by the next successful submission.
    pub async fn set_submit_result(&self, errors: FileErrors) {
        self.state.write().await.submit_result = errors;
    }

    /// Make the next submission fail outright.
    pub async fn set_submit_error(&self, error: EngineError) {
        self.state.write().await.submit_error = Some(error);
    }

    /// Make the next review call (pull, approve or reject) fail.
    pub async fn set_next_error(&self, error: EngineError) {
        self.state.write().await.next_error = Some(error);
    }

    /// Keep submissions open until released or cancelled.
    pub async fn hold_submission(&self) {
        self.hold.send_replace(true);
    }

    /// Let held submissions resolve.
    pub async fn release_submission(&self) {
        self.hold.send_replace(false);
    }

    /// Release held submissions once the review queue has been drained by
    /// decisions.
    pub async fn release_when_reviewed(&self) {
        self.state.write().await.release_when_reviewed = true;
    }

    async fn take_next_error(&self) -> Result<(), EngineError> {
        match self.state.write().await.next_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn decide(&self, approve: bool) -> Result<bool, EngineError> {
        self.take_next_error().await?;

        let mut state = self.state.write().await;
        let path = state
            .review_queue
            .pop_front()
            .ok_or(EngineError::NoPendingItem)?;

        let call = if approve {
            EngineCall::Approve(path)
        } else {
            EngineCall::Reject(path)
        };
        self.calls.write().await.push(call);

        let more = !state.review_queue.is_empty() && !state.cancelled;
        if !more && state.release_when_reviewed {
            self.hold.send_replace(false);
        }
        Ok(more)
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit_batch(&self, request: BatchRequest) -> Result<FileErrors, EngineError> {
        self.calls.write().await.push(EngineCall::Submit {
            job_id: request.job_id.clone(),
        });
        self.submissions.write().await.push(request);

        {
            let mut state = self.state.write().await;
            state.cancelled = false;
            if let Some(error) = state.submit_error.take() {
                return Err(error);
            }
        }

        let mut hold = self.hold.subscribe();
        let _ = hold.wait_for(|held| !*held).await;

        let state = self.state.read().await;
        if state.cancelled {
            return Ok(FileErrors::new());
        }
        Ok(state.submit_result.clone())
    }

    async fn progress(&self) -> Result<f64, EngineError> {
        self.calls.write().await.push(EngineCall::Progress);
        Ok(self.state.read().await.progress)
    }

    async fn request_cancel(&self) {
        self.calls.write().await.push(EngineCall::Cancel);
        let mut state = self.state.write().await;
        state.cancelled = true;
        state.review_queue.clear();
        self.hold.send_replace(false);
    }

    async fn pull_next_review_item(&self) -> Result<ReviewPull, EngineError> {
        self.calls.write().await.push(EngineCall::Pull);
        self.take_next_error().await?;

        let state = self.state.read().await;
        if state.cancelled {
            return Ok(ReviewPull::Exhausted);
        }
        Ok(match state.review_queue.front() {
            Some(path) => ReviewPull::Item(path.clone()),
            None => state.when_empty.clone(),
        })
    }

    async fn approve_current(&self) -> Result<bool, EngineError> {
        self.decide(true).await
    }

    async fn reject_current(&self) -> Result<bool, EngineError> {
        self.decide(false).await
    }

    async fn render_preview(
        &self,
        artifact: &Path,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, EngineError> {
        self.calls.write().await.push(EngineCall::Preview {
            path: artifact.to_path_buf(),
            width,
            height,
        });
        if width == 0 || height == 0 {
            return Err(EngineError::invalid_request(
                "preview viewport must be non-empty",
            ));
        }
        Ok(MOCK_PREVIEW.to_vec())
    }
}
