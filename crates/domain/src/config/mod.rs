mod llm;
mod observability;
mod pipeline;
mod platform;
mod server;
mod storage;

pub use llm::*;
pub use observability::*;
pub use pipeline::*;
pub use platform::*;
pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.public_base_url.is_empty() {
            errors.push(ConfigError::error(
                "server.public_base_url",
                "public_base_url must not be empty (signed media URLs are built from it)",
            ));
        }

        if self.platform.api_base_url.is_empty() {
            errors.push(ConfigError::error(
                "platform.api_base_url",
                "api_base_url must not be empty",
            ));
        }
        if self.platform.data_api_base_url.is_empty() {
            errors.push(ConfigError::error(
                "platform.data_api_base_url",
                "data_api_base_url must not be empty",
            ));
        }

        if self.llm.base_url.is_empty() {
            errors.push(ConfigError::error("llm.base_url", "base_url must not be empty"));
        }
        if self.llm.model.is_empty() {
            errors.push(ConfigError::error("llm.model", "model must not be empty"));
        }

        if self.storage.signed_url_ttl_secs == 0 {
            errors.push(ConfigError::error(
                "storage.signed_url_ttl_secs",
                "signed URLs must live for at least one second",
            ));
        }

        if self.pipeline.timezone().is_err() {
            errors.push(ConfigError::error(
                "pipeline.timezone",
                format!("unknown IANA timezone {:?}", self.pipeline.timezone),
            ));
        }
        if self.pipeline.turn_timeout_secs == 0 {
            errors.push(ConfigError::warning(
                "pipeline.turn_timeout_secs",
                "0 disables the per-turn deadline",
            ));
        }
        if self.pipeline.persist_reply && !self.pipeline.deliver_reply {
            errors.push(ConfigError::warning(
                "pipeline.persist_reply",
                "replies are persisted but never delivered to the chat",
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "sample_rate must be between 0.0 and 1.0",
            ));
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let issues = Config::default().validate();
        assert!(
            issues.iter().all(|i| i.severity != ConfigSeverity::Error),
            "unexpected errors: {issues:?}"
        );
    }

    #[test]
    fn bad_timezone_is_an_error() {
        let mut config = Config::default();
        config.pipeline.timezone = "Mars/Olympus_Mons".into();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "pipeline.timezone" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn persist_without_delivery_warns() {
        let mut config = Config::default();
        config.pipeline.persist_reply = true;
        config.pipeline.deliver_reply = false;
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "pipeline.persist_reply" && i.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn sample_rate_out_of_range_is_an_error() {
        let mut config = Config::default();
        config.observability.sample_rate = 1.5;
        assert!(config
            .validate()
            .iter()
            .any(|i| i.field == "observability.sample_rate"));
    }

    #[test]
    fn display_includes_severity_tag() {
        let e = ConfigError::error("llm.model", "model must not be empty");
        assert_eq!(e.to_string(), "[ERROR] llm.model: model must not be empty");
    }
}
