//! The audit record: the immutable, hash-only record of one verdict.

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::envelope::TransportKind;
use crate::finding::L1Finding;
use crate::finding::L2Finding;
use crate::verdict::Verdict;

/// Who (if anyone) supplied the final verdict when it came from HITL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanActor {
    pub operator_id: String,
    pub action: String,
}

/// One line of the append-only audit log. Immutable once constructed;
/// never carries the raw payload, only its hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: String,
    pub arrival_wall_clock: chrono::DateTime<chrono::Utc>,
    pub finalized_wall_clock: chrono::DateTime<chrono::Utc>,
    pub session_id: String,
    pub agent_id: String,
    pub method: String,
    pub transport: TransportKind,
    /// Lowercase hex-encoded SHA-256 of the raw request bytes.
    pub payload_sha256: String,
    pub l1_finding: L1Finding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_finding: Option<L2Finding>,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_actor: Option<HumanActor>,
    /// Set when the sink has been in a degraded state (sustained write
    /// failure) at the time this record was produced.
    #[serde(default)]
    pub degraded: bool,
    /// Populated when an ALLOW verdict's upstream forward attempt failed
    /// (§7: "audited as `forward_failed`"). `None` for every other
    /// outcome, including blocks and successfully forwarded allows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
}

pub fn sha256_hex(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex(b"hello"), sha256_hex(b"hello"));
        assert_ne!(sha256_hex(b"hello"), sha256_hex(b"world"));
    }
}
