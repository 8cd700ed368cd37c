//! Manager configuration, built with `derive_builder` using an owned
//! pattern and a `build_fn` validation hook (mirrors
//! `nvisy_runtime::engine::config::EngineConfig`).

use std::time::Duration;

use derive_builder::Builder;

use crate::job::DEFAULT_JOB_TIMEOUT;

/// Configuration accepted by [`crate::manager::Flow4AiManager`].
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned", setter(into), build_fn(validate = "Self::validate"))]
pub struct ManagerConfig {
    /// Bounded in-flight task count. `None` means unbounded.
    #[builder(setter(strip_option), default)]
    pub max_concurrent_tasks: Option<usize>,

    /// Per-job default for `expected_inputs` wait, used whenever a job
    /// doesn't declare its own timeout.
    #[builder(default = "DEFAULT_JOB_TIMEOUT")]
    pub default_job_input_timeout: Duration,
}

impl ManagerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(Some(0)) = self.max_concurrent_tasks {
            return Err("max_concurrent_tasks must be at least 1 when set".to_string());
        }
        Ok(())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: None,
            default_job_input_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

impl ManagerConfig {
    /// Returns a builder seeded with the default configuration.
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_unbounded() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_concurrent_tasks, None);
        assert_eq!(config.default_job_input_timeout, DEFAULT_JOB_TIMEOUT);
    }

    #[test]
    fn test_builder_overrides_and_validates() {
        let config = ManagerConfig::builder()
            .max_concurrent_tasks(4usize)
            .default_job_input_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(config.max_concurrent_tasks, Some(4));
        assert_eq!(config.default_job_input_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        let err = ManagerConfig::builder().max_concurrent_tasks(0usize).build();
        assert!(err.is_err());
    }
}
