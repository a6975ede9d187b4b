//! Types exchanged with an execution engine.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::binder::PlaceholderBinding;

/// Per-file errors of a finished batch, keyed by output file name.
pub type FileErrors = BTreeMap<String, String>;

/// One batch submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Identifier the coordinator assigned to the job, used for logging.
    pub job_id: String,
    /// Script text executed for every input combination.
    pub script: String,
    /// Directory that receives the published outputs.
    pub output_directory: PathBuf,
    /// Input file lists in ascending placeholder order.
    pub bindings: Vec<PlaceholderBinding>,
    /// Whether every output waits for a human decision before publishing.
    pub review_enabled: bool,
}

impl BatchRequest {
    /// File lists ordered by placeholder index.
    pub fn file_lists(&self) -> Vec<&[PathBuf]> {
        let mut bindings: Vec<&PlaceholderBinding> = self.bindings.iter().collect();
        bindings.sort_by_key(|binding| binding.index);
        bindings.iter().map(|binding| binding.files.as_slice()).collect()
    }
}

/// Result of asking the engine for the next output to review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "path", rename_all = "snake_case")]
pub enum ReviewPull {
    /// An output is waiting for a decision.
    Item(PathBuf),
    /// Outputs are still being produced; ask again later.
    NotReady,
    /// Every output has been decided; review is over.
    Exhausted,
}

impl ReviewPull {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Item(_) => "item",
            Self::NotReady => "not_ready",
            Self::Exhausted => "exhausted",
        }
    }
}
