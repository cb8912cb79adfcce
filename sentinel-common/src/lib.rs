//! Ambient stack shared across the gateway's crates: the config loader and
//! the config-loading error taxonomy.

mod config;
mod error;

pub use config::AuditConfig;
pub use config::Config;
pub use config::EscalationConfig;
pub use config::L1Config;
pub use config::L2Config;
pub use config::LoggingConfig;
pub use config::RateLimitConfig;
pub use config::SessionConfig;
pub use config::TransportConfig;
pub use config::TransportMode;
pub use config::UpstreamConfig;
pub use error::ConfigError;
