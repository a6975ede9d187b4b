use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Batch intervals are positive
/// - Renderer program is set and its arguments name the output
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.batch.progress_poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "batch.progress_poll_interval_ms must be greater than 0".to_string(),
        ));
    }
    if config.batch.review_retry_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "batch.review_retry_interval_ms must be greater than 0".to_string(),
        ));
    }

    if config.renderer.program.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "renderer.program cannot be empty".to_string(),
        ));
    }
    if !config.renderer.args.iter().any(|arg| arg.contains("{output}")) {
        return Err(ConfigError::ValidationError(
            "renderer.args must contain {output}".to_string(),
        ));
    }

    Ok(())
}
