//! Loads the enumerated configuration surface from an optional
//! `config.toml` plus `MCP_SENTINEL_*` environment overrides.
//!
//! Unknown keys anywhere in the TOML document are a hard startup error:
//! every section below is `deny_unknown_fields`, so a typo in a config file
//! fails loudly at boot instead of being silently ignored.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Stdio,
    Sse,
    WebSocket,
}

impl Default for TransportMode {
    fn default() -> Self {
        TransportMode::Stdio
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    pub listen_host: String,
    pub listen_port: u16,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            listen_host: "127.0.0.1".to_string(),
            listen_port: 8765,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct UpstreamConfig {
    pub host: String,
    pub port: u16,
    /// Argv used to spawn the upstream tool server as a child process when
    /// the stdio transport is in use. Empty means "no upstream configured"
    /// (useful for tests that only exercise the pipeline in isolation).
    pub command: Vec<String>,
    pub forward_timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            command: Vec::new(),
            forward_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct L1Config {
    pub enabled: bool,
    pub blocked_patterns: Vec<String>,
    pub oversize_payload_bytes: usize,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            enabled: true,
            blocked_patterns: Vec::new(),
            oversize_payload_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct L2Config {
    pub enabled: bool,
    pub endpoint_url: String,
    pub api_key: String,
    pub model_id: String,
    pub timeout_seconds: u64,
    pub context_envelopes: usize,
}

impl Default for L2Config {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint_url: String::new(),
            api_key: String::new(),
            model_id: "gpt-4o-mini".to_string(),
            timeout_seconds: 10,
            context_envelopes: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionConfig {
    pub ring_size: usize,
    pub ttl_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ring_size: 64,
            ttl_seconds: 1800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateLimitConfig {
    pub rps: f64,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rps: 100.0,
            burst: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AuditConfig {
    pub log_path: String,
    pub flush_interval_seconds: u64,
    pub high_watermark: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: "sentinel-audit.jsonl".to_string(),
            flush_interval_seconds: 1,
            high_watermark: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EscalationConfig {
    pub deadline_seconds: u64,
    pub operator_queue_capacity: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: 30,
            operator_queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub transport: TransportConfig,
    pub upstream: UpstreamConfig,
    pub l1: L1Config,
    pub l2: L2Config,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub audit: AuditConfig,
    pub escalation: EscalationConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads config from `path` if it exists, falling back to defaults when
    /// `path` is `None`. `deny_unknown_fields` on every section means a
    /// malformed key surfaces as a `ConfigError::Parse`, not a silent skip.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.display().to_string(),
                        source,
                    })?;
                toml::from_str::<Config>(&text).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => Config::default(),
        };

        config.apply_env_overrides(&std::env::vars().collect());
        config.validate()?;
        Ok(config)
    }

    /// Applies `MCP_SENTINEL_*` environment overrides for the handful of
    /// settings most often tweaked outside a checked-in config file.
    fn apply_env_overrides(&mut self, env: &HashMap<String, String>) {
        if let Some(v) = env.get("MCP_SENTINEL_L2_API_KEY") {
            self.l2.api_key = v.clone();
        }
        if let Some(v) = env.get("MCP_SENTINEL_L2_ENDPOINT_URL") {
            self.l2.endpoint_url = v.clone();
        }
        if let Some(v) = env.get("MCP_SENTINEL_AUDIT_LOG_PATH") {
            self.audit.log_path = v.clone();
        }
        if let Some(v) = env.get("MCP_SENTINEL_LOG_FILTER") {
            self.logging.filter = v.clone();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.l2.enabled && self.l2.endpoint_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "l2.endpoint_url".to_string(),
                reason: "must be set when l2.enabled = true".to_string(),
            });
        }
        if self.rate_limit.rps <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.rps".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.session.ring_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.ring_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = Config::default();
        assert_eq!(config.session.ring_size, 64);
        assert_eq!(config.rate_limit.burst, 200);
        assert_eq!(config.l1.oversize_payload_bytes, 64 * 1024);
        assert_eq!(config.escalation.deadline_seconds, 30);
    }

    #[test]
    fn unknown_top_level_key_is_a_hard_error() {
        let toml = "nonsense_key = 1\n";
        let err = toml::from_str::<Config>(toml).unwrap_err();
        assert!(err.to_string().contains("nonsense_key") || err.to_string().contains("unknown field"));
    }

    #[test]
    fn unknown_nested_key_is_a_hard_error() {
        let toml = "[rate_limit]\nrpss = 1.0\n";
        let err = toml::from_str::<Config>(toml).unwrap_err();
        assert!(err.to_string().contains("rpss") || err.to_string().contains("unknown field"));
    }

    #[test]
    fn l2_enabled_without_endpoint_fails_validation() {
        let mut config = Config::default();
        config.l2.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_with_missing_path_falls_back_to_defaults() {
        let config = Config::load(None).expect("defaults should validate");
        assert_eq!(config.transport.mode, TransportMode::Stdio);
    }

    #[test]
    fn load_from_file_parses_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[session]\nring_size = 32\nttl_seconds = 60\n[rate_limit]\nrps = 50.0\nburst = 10\n",
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.session.ring_size, 32);
        assert_eq!(config.rate_limit.burst, 10);
    }
}
