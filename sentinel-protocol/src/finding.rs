//! L1/L2 finding types: what each analyzer concluded about one envelope.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

/// Threat level, ordered so `max()` over a set of matches is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// The result of running the L1 static analyzer over one envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct L1Finding {
    /// Unique pattern names that matched, across the automaton, the regex
    /// battery, and any Base64 re-scans.
    pub matched_patterns: BTreeSet<String>,
    pub level: ThreatLevel,
    /// How many levels of Base64 decoding were followed (0 if none).
    pub base64_depth: u8,
}

impl L1Finding {
    pub fn clean() -> Self {
        Self::default()
    }

    /// Merge another finding's matches and level into this one (used when
    /// folding a Base64 re-scan's result back into the outer finding).
    pub fn merge(&mut self, other: L1Finding) {
        self.matched_patterns.extend(other.matched_patterns);
        if other.level > self.level {
            self.level = other.level;
        }
        self.base64_depth = self.base64_depth.max(other.base64_depth);
    }

    pub fn add_match(&mut self, pattern: impl Into<String>, level: ThreatLevel) {
        self.matched_patterns.insert(pattern.into());
        if level > self.level {
            self.level = level;
        }
    }
}

/// Tri-state outcome of the L2 semantic classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum L2Outcome {
    Yes,
    No,
    /// The fail-open result: network error, timeout, non-2xx, or unparsable
    /// response. Carries no opinion and must never by itself justify BLOCK.
    Unknown,
}

/// The result of running the L2 semantic classifier over one envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L2Finding {
    pub outcome: L2Outcome,
    /// Meaningful only when `outcome != Unknown`; otherwise 0.0.
    pub confidence: f64,
    /// Bounded to 280 characters (truncated if the backend sends more).
    pub reasoning: String,
    pub backend: String,
}

impl L2Finding {
    pub fn unknown(backend: impl Into<String>) -> Self {
        Self {
            outcome: L2Outcome::Unknown,
            confidence: 0.0,
            reasoning: String::new(),
            backend: backend.into(),
        }
    }

    pub fn is_injection(&self) -> bool {
        self.outcome == L2Outcome::Yes
    }
}
