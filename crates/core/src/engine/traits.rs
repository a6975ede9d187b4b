//! Trait definition for execution engines.

use async_trait::async_trait;
use std::path::Path;

use super::error::EngineError;
use super::types::{BatchRequest, FileErrors, ReviewPull};

/// Something that executes a batch of script runs out of band.
///
/// An engine serves one batch at a time; the review and progress calls
/// always refer to the batch currently submitted.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Runs the whole batch.
    ///
    /// Resolves only when every input combination has been processed and,
    /// with review enabled, every output decided, or when the batch is
    /// cancelled. Per-file failures are returned in the map; `Err` is
    /// reserved for faults of the submission itself.
    async fn submit_batch(&self, request: BatchRequest) -> Result<FileErrors, EngineError>;

    /// Fraction of the batch processed so far, in `[0, 1]`.
    async fn progress(&self) -> Result<f64, EngineError>;

    /// Asks the engine to stop starting new work. Idempotent.
    async fn request_cancel(&self);

    /// Returns the output awaiting review, without removing it.
    async fn pull_next_review_item(&self) -> Result<ReviewPull, EngineError>;

    /// Approves the output at the front of the review queue.
    ///
    /// Returns whether more outputs remain to be reviewed.
    async fn approve_current(&self) -> Result<bool, EngineError>;

    /// Rejects the output at the front of the review queue.
    ///
    /// Returns whether more outputs remain to be reviewed.
    async fn reject_current(&self) -> Result<bool, EngineError>;

    /// Renders `artifact` scaled to fit the viewport, encoded as PNG.
    async fn render_preview(
        &self,
        artifact: &Path,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, EngineError>;
}
