//! Configuration for the command-based script renderer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for [`CommandRunner`](super::CommandRunner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Renderer executable.
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Argument template. `{script}` expands to the script file, `{output}`
    /// to the output image and `{inputs}` to one argument per input file.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Timeout for a single render in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Parent directory for per-batch staging directories.
    /// Defaults to the system temp directory.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

fn default_program() -> PathBuf {
    PathBuf::from("pxp-cli")
}

fn default_args() -> Vec<String> {
    vec![
        "-i".to_string(),
        "{script}".to_string(),
        "-o".to_string(),
        "{output}".to_string(),
        "{inputs}".to_string(),
    ]
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            timeout_secs: default_timeout(),
            staging_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RendererConfig::default();
        assert_eq!(config.program, PathBuf::from("pxp-cli"));
        assert_eq!(config.timeout_secs, 300);
        assert!(config.args.contains(&"{output}".to_string()));
        assert!(config.staging_dir.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            program = "/usr/local/bin/pxp"
            timeout_secs = 30
        "#;
        let config: RendererConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.program, PathBuf::from("/usr/local/bin/pxp"));
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.args, default_args());
    }
}
