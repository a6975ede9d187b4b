//! Testing utilities and mock implementations.
//!
//! This module provides mocks for the engine, renderer and reviewer seams,
//! so batches can be driven end to end without a renderer executable or a
//! human in the loop.
//!
//! # Example
//!
//! ```rust,ignore
//! use pixbatch_core::testing::{MockEngine, ScriptedReviewer};
//! use pixbatch_core::ReviewDecision;
//!
//! let engine = MockEngine::new();
//! engine.queue_review_items(vec!["/s/a.png".into()]).await;
//!
//! let reviewer = ScriptedReviewer::new(vec![ReviewDecision::Approve]);
//! // Hand both to a BatchCoordinator...
//! ```

mod mock_engine;
mod mock_runner;
mod scripted_reviewer;

pub use mock_engine::{EngineCall, MockEngine, MOCK_PREVIEW};
pub use mock_runner::{MockScriptRunner, RecordedRender};
pub use scripted_reviewer::ScriptedReviewer;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::orchestrator::BatchConfig;

    /// Batch timings short enough for tests. The silence watchdog is off.
    pub fn fast_batch_config() -> BatchConfig {
        BatchConfig {
            progress_poll_interval_ms: 10,
            review_retry_interval_ms: 10,
            max_silence_secs: 0,
        }
    }

    /// Creates empty files named `names` under `dir` and returns their
    /// paths in the same order.
    pub fn input_files(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                if let Err(e) = std::fs::write(&path, b"") {
                    panic!("failed to create fixture {}: {}", path.display(), e);
                }
                path
            })
            .collect()
    }

    /// Paths under a fake staging directory.
    pub fn staged(names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| PathBuf::from("/staging").join(name))
            .collect()
    }
}
