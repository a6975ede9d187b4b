//! Batch orchestration configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the batch coordinator and review gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// How often to sample engine progress (milliseconds).
    #[serde(default = "default_progress_interval")]
    pub progress_poll_interval_ms: u64,

    /// How long the review gate waits before pulling again when the engine
    /// reports that no output is ready yet (milliseconds).
    #[serde(default = "default_review_retry_interval")]
    pub review_retry_interval_ms: u64,

    /// Cancel the job when neither progress nor review activity has been
    /// observed for this long (seconds). Time spent waiting on a human
    /// decision does not count. 0 disables the watchdog.
    #[serde(default = "default_max_silence")]
    pub max_silence_secs: u64,
}

fn default_progress_interval() -> u64 {
    1000 // 1 second
}

fn default_review_retry_interval() -> u64 {
    1000 // 1 second
}

fn default_max_silence() -> u64 {
    600 // 10 minutes
}

impl BatchConfig {
    pub fn progress_poll_interval(&self) -> Duration {
        Duration::from_millis(self.progress_poll_interval_ms)
    }

    pub fn review_retry_interval(&self) -> Duration {
        Duration::from_millis(self.review_retry_interval_ms)
    }

    /// The silence watchdog limit, if enabled.
    pub fn max_silence(&self) -> Option<Duration> {
        (self.max_silence_secs > 0).then(|| Duration::from_secs(self.max_silence_secs))
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            progress_poll_interval_ms: default_progress_interval(),
            review_retry_interval_ms: default_review_retry_interval(),
            max_silence_secs: default_max_silence(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BatchConfig::default();
        assert_eq!(config.progress_poll_interval_ms, 1000);
        assert_eq!(config.review_retry_interval_ms, 1000);
        assert_eq!(config.max_silence(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: BatchConfig = toml::from_str("").unwrap();
        assert_eq!(config.progress_poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            progress_poll_interval_ms = 250
            review_retry_interval_ms = 500
            max_silence_secs = 0
        "#;
        let config: BatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.progress_poll_interval(), Duration::from_millis(250));
        assert_eq!(config.review_retry_interval(), Duration::from_millis(500));
        assert!(config.max_silence().is_none());
    }
}
