//! The verdict the Policy Engine renders, and the reason attached to it.

use serde::Deserialize;
use serde::Serialize;

use crate::finding::ThreatLevel;

/// Structured reason attached to a BLOCK verdict (and, informationally, to
/// ESCALATE and rate-limit denials).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockReason {
    pub matched_patterns: Vec<String>,
    pub threat_level: ThreatLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_confidence: Option<f64>,
    pub message: String,
}

impl BlockReason {
    pub fn rate_limited() -> Self {
        Self {
            matched_patterns: Vec::new(),
            threat_level: ThreatLevel::None,
            l2_confidence: None,
            message: "rate_limited".to_string(),
        }
    }

    pub fn escalation_timeout() -> Self {
        Self {
            matched_patterns: Vec::new(),
            threat_level: ThreatLevel::None,
            l2_confidence: None,
            message: "escalation_timeout".to_string(),
        }
    }

    pub fn malformed_input(reason: &str) -> Self {
        Self {
            matched_patterns: Vec::new(),
            threat_level: ThreatLevel::None,
            l2_confidence: None,
            message: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Allow,
    Block(BlockReason),
    Escalate,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Allow => "ALLOW",
            Verdict::Block(_) => "BLOCK",
            Verdict::Escalate => "ESCALATE",
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Verdict::Block(_))
    }
}
