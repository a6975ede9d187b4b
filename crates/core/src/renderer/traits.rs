//! Trait definitions for the renderer module.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::error::RendererError;

/// Executes a script against one combination of input files.
///
/// The script language is opaque to the batch machinery: a runner only
/// has to turn `(script, inputs)` into an image file at `output`.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Renders `script` with `inputs` bound to `$1..$n` and writes a PNG
    /// image to `output`.
    ///
    /// `workdir` is a private scratch directory that lives for the whole
    /// batch.
    async fn render(
        &self,
        script: &str,
        inputs: &[PathBuf],
        output: &Path,
        workdir: &Path,
    ) -> Result<(), RendererError>;
}
