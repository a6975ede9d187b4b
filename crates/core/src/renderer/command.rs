//! Renderer that shells out to an external script executable.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::config::RendererConfig;
use super::error::RendererError;
use super::traits::ScriptRunner;

/// File name the script text is written to inside the batch workdir.
const SCRIPT_FILE_NAME: &str = "batch.pxp";

/// Runs each combination through the configured renderer executable.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    config: RendererConfig,
}

impl CommandRunner {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(RendererConfig::default())
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Expands the argument template for one render.
    fn build_args(&self, script_path: &Path, inputs: &[PathBuf], output: &Path) -> Vec<String> {
        let mut args = Vec::with_capacity(self.config.args.len() + inputs.len());
        for arg in &self.config.args {
            match arg.as_str() {
                "{inputs}" => {
                    args.extend(inputs.iter().map(|p| p.to_string_lossy().into_owned()));
                }
                _ => args.push(
                    arg.replace("{script}", &script_path.to_string_lossy())
                        .replace("{output}", &output.to_string_lossy()),
                ),
            }
        }
        args
    }

    /// Writes the script into the workdir unless an earlier render of the
    /// same batch already did.
    async fn ensure_script_file(
        &self,
        script: &str,
        workdir: &Path,
    ) -> Result<PathBuf, RendererError> {
        let path = workdir.join(SCRIPT_FILE_NAME);
        if !tokio::fs::try_exists(&path).await? {
            tokio::fs::write(&path, script).await?;
        }
        Ok(path)
    }
}

#[async_trait]
impl ScriptRunner for CommandRunner {
    fn name(&self) -> &str {
        "command"
    }

    async fn render(
        &self,
        script: &str,
        inputs: &[PathBuf],
        output: &Path,
        workdir: &Path,
    ) -> Result<(), RendererError> {
        for input in inputs {
            if !tokio::fs::try_exists(input).await? {
                return Err(RendererError::InputNotFound {
                    path: input.clone(),
                });
            }
        }

        let script_path = self.ensure_script_file(script, workdir).await?;
        let args = self.build_args(&script_path, inputs, output);

        debug!(
            "Rendering {} with {:?} {:?}",
            output.display(),
            self.config.program,
            args
        );

        let child = Command::new(&self.config.program)
            .args(&args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RendererError::ProgramNotFound {
                        path: self.config.program.clone(),
                    }
                } else {
                    RendererError::Io(e)
                }
            })?;

        // Dropping the child on timeout kills it.
        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = timeout(timeout_duration, child.wait_with_output()).await;

        let process_output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(RendererError::Io(e)),
            Err(_) => {
                return Err(RendererError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        };

        if !process_output.status.success() {
            let stderr = String::from_utf8_lossy(&process_output.stderr).into_owned();
            let reason = match process_output.status.code() {
                Some(code) => format!("renderer exited with code {}", code),
                None => "renderer terminated by signal".to_string(),
            };
            return Err(RendererError::script_failed(
                reason,
                if stderr.is_empty() { None } else { Some(stderr) },
            ));
        }

        if !tokio::fs::try_exists(output).await? {
            return Err(RendererError::MissingOutput {
                path: output.to_path_buf(),
            });
        }

        Ok(())
    }
}
