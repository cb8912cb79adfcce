//! The request envelope and its method classification.
//!
//! Every message the Dispatcher ever sees is reconstructed into a
//! [`RequestEnvelope`] before anything else happens to it: the envelope is
//! what flows through the session ring, both analyzers, and the audit log.

use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Which of the three named transports delivered this envelope.
///
/// Only `Stdio` has a concrete adapter in this crate; `Sse` and `WebSocket`
/// exist so the dispatcher and audit trail can name the transport without
/// depending on an adapter that lives outside this pipeline's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    Sse,
    WebSocket,
}

/// The classification of a JSON-RPC method name, per the method table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodClass {
    /// Bypasses all analysis; always ALLOW.
    Safe,
    /// Always undergoes full L1+L2, even if L1 finds nothing.
    HighRisk,
    /// L1 always; L2 only if L1 is at or above MEDIUM, or L1 is disabled.
    Other,
}

const SAFE_METHODS: &[&str] = &[
    "initialize",
    "initialized",
    "ping",
    "tools/list",
    "resources/list",
    "resources/templates/list",
    "prompts/list",
    "logging/setLevel",
];

const HIGH_RISK_METHODS: &[&str] = &["tools/call", "completion/complete", "sampling/createMessage"];

impl MethodClass {
    pub fn classify(method: &str) -> Self {
        if SAFE_METHODS.contains(&method) {
            MethodClass::Safe
        } else if HIGH_RISK_METHODS.contains(&method) {
            MethodClass::HighRisk
        } else {
            MethodClass::Other
        }
    }
}

/// A single JSON-RPC message, reconstructed with the session/agent context
/// the Dispatcher needs to reason about it.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub request_id: String,
    pub session_id: String,
    pub agent_id: String,
    pub method: String,
    pub params: Option<Value>,
    /// The exact bytes this envelope was parsed from, retained for content
    /// hashing and L1 scanning. Never persisted verbatim in the audit log.
    pub raw: Vec<u8>,
    pub arrival_instant: Instant,
    pub arrival_wall_clock: chrono::DateTime<chrono::Utc>,
    pub transport: TransportKind,
}

impl RequestEnvelope {
    pub fn method_class(&self) -> MethodClass {
        MethodClass::classify(&self.method)
    }

    /// Lowercased UTF-8 view of the raw payload, used by L1. Falls back to
    /// the empty string for non-UTF-8 input rather than failing analysis.
    pub fn raw_as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_safe_methods() {
        assert_eq!(MethodClass::classify("ping"), MethodClass::Safe);
        assert_eq!(MethodClass::classify("tools/list"), MethodClass::Safe);
        assert_eq!(MethodClass::classify("logging/setLevel"), MethodClass::Safe);
    }

    #[test]
    fn classifies_high_risk_methods() {
        assert_eq!(MethodClass::classify("tools/call"), MethodClass::HighRisk);
        assert_eq!(
            MethodClass::classify("sampling/createMessage"),
            MethodClass::HighRisk
        );
    }

    #[test]
    fn classifies_everything_else_as_other() {
        assert_eq!(
            MethodClass::classify("experimental/frobnicate"),
            MethodClass::Other
        );
    }
}
