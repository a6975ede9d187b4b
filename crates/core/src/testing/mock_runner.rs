//! Mock script runner for testing.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::renderer::{RendererError, ScriptRunner};

/// A recorded render for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRender {
    pub script: String,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Mock implementation of the ScriptRunner trait.
///
/// Writes a small solid-colour PNG for every render, so outputs can be
/// previewed. Renders whose inputs include a file registered with
/// [`fail_on`](Self::fail_on) fail the way a crashing renderer would.
#[derive(Debug, Clone)]
pub struct MockScriptRunner {
    renders: Arc<RwLock<Vec<RecordedRender>>>,
    failures: Arc<RwLock<HashMap<String, String>>>,
    delay: Duration,
    size: (u32, u32),
}

impl Default for MockScriptRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScriptRunner {
    pub fn new() -> Self {
        Self {
            renders: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            delay: Duration::ZERO,
            size: (8, 6),
        }
    }

    /// Sleep this long in every render.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Dimensions of the images written.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    /// Fail every render that takes an input named `file_name`, reporting
    /// `stderr` as the renderer's diagnostics.
    pub async fn fail_on(&self, file_name: impl Into<String>, stderr: impl Into<String>) {
        self.failures
            .write()
            .await
            .insert(file_name.into(), stderr.into());
    }

    pub async fn renders(&self) -> Vec<RecordedRender> {
        self.renders.read().await.clone()
    }

    fn encode_image(&self) -> Result<Vec<u8>, RendererError> {
        let (width, height) = self.size;
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 80, 40])));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| RendererError::Io(std::io::Error::other(e.to_string())))?;
        Ok(buffer)
    }
}

#[async_trait]
impl ScriptRunner for MockScriptRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn render(
        &self,
        script: &str,
        inputs: &[PathBuf],
        output: &Path,
        _workdir: &Path,
    ) -> Result<(), RendererError> {
        self.renders.write().await.push(RecordedRender {
            script: script.to_string(),
            inputs: inputs.to_vec(),
            output: output.to_path_buf(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        {
            let failures = self.failures.read().await;
            for input in inputs {
                let name = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if let Some(stderr) = failures.get(&name) {
                    return Err(RendererError::script_failed(
                        "renderer exited with code 1",
                        Some(stderr.clone()),
                    ));
                }
            }
        }

        tokio::fs::write(output, self.encode_image()?).await?;
        Ok(())
    }
}
