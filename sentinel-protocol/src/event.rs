//! Dashboard events: what gets pushed to connected operators.

use serde::Deserialize;
use serde::Serialize;

use crate::audit::AuditRecord;
use crate::finding::ThreatLevel;
use crate::verdict::Verdict;

const PAYLOAD_PREVIEW_MAX_BYTES: usize = 2 * 1024;

/// Mirrors [`AuditRecord`] but adds a truncated payload preview and an
/// `is_alert` flag, the only place a fragment of the raw payload is ever
/// surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardEvent {
    pub event_type: &'static str,
    pub timestamp: f64,
    pub request_id: String,
    pub session_id: String,
    pub agent_id: String,
    pub method: String,
    pub payload_preview: String,
    #[serde(rename = "analysis")]
    pub record: AuditRecord,
    pub is_alert: bool,
}

impl DashboardEvent {
    pub fn new(record: AuditRecord, raw: &[u8]) -> Self {
        let is_alert = record.verdict.is_block()
            || matches!(record.verdict, Verdict::Escalate)
            || record.l1_finding.level >= ThreatLevel::High;

        let payload_preview = truncate_preview(raw);

        Self {
            event_type: "request_analyzed",
            timestamp: record.finalized_wall_clock.timestamp_millis() as f64 / 1000.0,
            request_id: record.request_id.clone(),
            session_id: record.session_id.clone(),
            agent_id: record.agent_id.clone(),
            method: record.method.clone(),
            payload_preview,
            is_alert,
            record,
        }
    }
}

fn truncate_preview(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.len() <= PAYLOAD_PREVIEW_MAX_BYTES {
        text.into_owned()
    } else {
        let mut end = PAYLOAD_PREVIEW_MAX_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::HumanActor;
    use crate::envelope::TransportKind;
    use crate::finding::L1Finding;
    use crate::verdict::Verdict;

    fn sample_record(verdict: Verdict) -> AuditRecord {
        AuditRecord {
            request_id: "r1".to_string(),
            arrival_wall_clock: chrono::Utc::now(),
            finalized_wall_clock: chrono::Utc::now(),
            session_id: "s1".to_string(),
            agent_id: "a1".to_string(),
            method: "tools/call".to_string(),
            transport: TransportKind::Stdio,
            payload_sha256: "deadbeef".to_string(),
            l1_finding: L1Finding::clean(),
            l2_finding: None,
            verdict,
            human_actor: None::<HumanActor>,
            degraded: false,
            delivery_error: None,
        }
    }

    #[test]
    fn allow_is_not_an_alert_by_default() {
        let event = DashboardEvent::new(sample_record(Verdict::Allow), b"{}");
        assert!(!event.is_alert);
    }

    #[test]
    fn block_is_always_an_alert() {
        let event = DashboardEvent::new(
            sample_record(Verdict::Block(crate::verdict::BlockReason::rate_limited())),
            b"{}",
        );
        assert!(event.is_alert);
    }

    #[test]
    fn preview_truncates_oversized_payloads() {
        let raw = vec![b'a'; PAYLOAD_PREVIEW_MAX_BYTES + 100];
        let event = DashboardEvent::new(sample_record(Verdict::Allow), &raw);
        assert!(event.payload_preview.len() <= PAYLOAD_PREVIEW_MAX_BYTES + "…".len());
    }

    #[test]
    fn wire_shape_nests_the_analysis_under_its_own_key() {
        let event = DashboardEvent::new(sample_record(Verdict::Allow), b"{}");
        let value = serde_json::to_value(&event).unwrap();
        let object = value.as_object().unwrap();

        for top_level in ["event_type", "timestamp", "session_id", "agent_id", "method", "payload_preview", "is_alert", "request_id", "analysis"] {
            assert!(object.contains_key(top_level), "missing top-level key {top_level}");
        }
        assert!(object["analysis"].is_object(), "analysis must be a nested object, not flattened");
        assert!(object["analysis"].get("verdict").is_some());
    }
}
