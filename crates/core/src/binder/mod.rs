//! Placeholder discovery and binding validation.
//!
//! Scripts reference their batch inputs positionally with `$1`, `$2`, ...
//! Before a batch can be submitted, every referenced index needs at least
//! one bound input file.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d+)").expect("placeholder pattern is valid"));

/// Errors raised when checking bindings against a script's placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    /// A referenced placeholder has no bound files.
    #[error("no input files bound to placeholder ${0}")]
    MissingBinding(u32),

    /// A binding targets an index the script never references.
    #[error("placeholder ${0} is not referenced by the script")]
    OrphanBinding(u32),
}

/// The ordered list of input files bound to one placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderBinding {
    /// Placeholder index as written in the script (`$index`).
    pub index: u32,
    /// Input files, in the order the user selected them.
    pub files: Vec<PathBuf>,
}

impl PlaceholderBinding {
    pub fn new(index: u32, files: Vec<PathBuf>) -> Self {
        Self { index, files }
    }

    /// A binding with no files yet.
    pub fn empty(index: u32) -> Self {
        Self::new(index, Vec::new())
    }

    pub fn is_bound(&self) -> bool {
        !self.files.is_empty()
    }
}

/// Returns the distinct placeholder indices referenced by `script`,
/// sorted ascending.
///
/// `$0` and indices that do not fit in a `u32` are ignored.
pub fn extract_placeholders(script: &str) -> Vec<u32> {
    let mut indices: Vec<u32> = PLACEHOLDER_RE
        .captures_iter(script)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .filter(|&index| index > 0)
        .collect();

    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Checks that `bindings` covers exactly the given placeholders.
///
/// Fails on the lowest unbound placeholder first. A binding with an empty
/// file list counts as missing.
pub fn validate_bindings(
    placeholders: &[u32],
    bindings: &[PlaceholderBinding],
) -> Result<(), BindingError> {
    for &index in placeholders {
        let bound = bindings
            .iter()
            .any(|binding| binding.index == index && binding.is_bound());
        if !bound {
            return Err(BindingError::MissingBinding(index));
        }
    }

    if let Some(orphan) = bindings
        .iter()
        .find(|binding| !placeholders.contains(&binding.index))
    {
        return Err(BindingError::OrphanBinding(orphan.index));
    }

    Ok(())
}
