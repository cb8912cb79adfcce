//! The Policy Engine: a pure function merging an L1 finding and an
//! optional L2 finding into a verdict, per the decision table. No I/O, no
//! clock, no mutable state — the same inputs always produce the same
//! verdict, which is what makes §8's round-trip property ("re-running
//! the Policy Engine on stored findings reproduces the recorded verdict")
//! true by construction.

use sentinel_protocol::BlockReason;
use sentinel_protocol::L1Finding;
use sentinel_protocol::L2Finding;
use sentinel_protocol::L2Outcome;
use sentinel_protocol::MethodClass;
use sentinel_protocol::ThreatLevel;
use sentinel_protocol::Verdict;

/// `(method_class, l1_finding, l2_finding) → verdict`, per §4.5.
///
/// `l2` is `None` when the method class never warranted running L2 at
/// all (safe methods, or "other" methods where L1 stayed below MEDIUM);
/// it is treated identically to an `Unknown` outcome.
pub fn decide(method_class: MethodClass, l1: &L1Finding, l2: Option<&L2Finding>) -> Verdict {
    if method_class == MethodClass::Safe {
        return Verdict::Allow;
    }

    let (outcome, confidence) = match l2 {
        Some(finding) => (finding.outcome, finding.confidence),
        None => (L2Outcome::Unknown, 0.0),
    };
    let is_injection = outcome == L2Outcome::Yes;

    let verdict = match l1.level {
        ThreatLevel::Critical => Decision::Block,
        ThreatLevel::High => {
            if is_injection && confidence >= 0.7 {
                Decision::Block
            } else {
                Decision::Escalate
            }
        }
        ThreatLevel::Medium => {
            if is_injection && confidence >= 0.8 {
                Decision::Block
            } else if is_injection {
                Decision::Escalate
            } else {
                Decision::Allow
            }
        }
        ThreatLevel::Low | ThreatLevel::None => {
            if is_injection && confidence >= 0.9 {
                Decision::Block
            } else if is_injection && confidence >= 0.7 {
                Decision::Escalate
            } else {
                Decision::Allow
            }
        }
    };

    match verdict {
        Decision::Allow => Verdict::Allow,
        Decision::Escalate => Verdict::Escalate,
        Decision::Block => Verdict::Block(block_reason(l1, l2)),
    }
}

enum Decision {
    Allow,
    Block,
    Escalate,
}

fn block_reason(l1: &L1Finding, l2: Option<&L2Finding>) -> BlockReason {
    let (l2_confidence, message) = match l2 {
        Some(finding) if finding.outcome != L2Outcome::Unknown => {
            (Some(finding.confidence), finding.reasoning.clone())
        }
        _ => (None, String::new()),
    };

    BlockReason {
        matched_patterns: l1.matched_patterns.iter().cloned().collect(),
        threat_level: l1.level,
        l2_confidence,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l1_at(level: ThreatLevel) -> L1Finding {
        let mut finding = L1Finding::clean();
        if level != ThreatLevel::None {
            finding.add_match("test_pattern", level);
        }
        finding
    }

    fn l2(outcome: L2Outcome, confidence: f64) -> L2Finding {
        L2Finding {
            outcome,
            confidence,
            reasoning: "test".to_string(),
            backend: "mock".to_string(),
        }
    }

    #[test]
    fn safe_methods_allow_without_consulting_analyses() {
        let verdict = decide(MethodClass::Safe, &l1_at(ThreatLevel::Critical), None);
        assert!(matches!(verdict, Verdict::Allow));
    }

    #[test]
    fn critical_l1_always_blocks() {
        let verdict = decide(MethodClass::HighRisk, &l1_at(ThreatLevel::Critical), None);
        assert!(verdict.is_block());

        let verdict = decide(
            MethodClass::HighRisk,
            &l1_at(ThreatLevel::Critical),
            Some(&l2(L2Outcome::No, 0.0)),
        );
        assert!(verdict.is_block());
    }

    #[test]
    fn high_l1_with_confident_injection_blocks() {
        let verdict = decide(
            MethodClass::HighRisk,
            &l1_at(ThreatLevel::High),
            Some(&l2(L2Outcome::Yes, 0.7)),
        );
        assert!(verdict.is_block(), "0.7 is inclusive at the lower bound");
    }

    #[test]
    fn high_l1_with_unconfident_injection_escalates() {
        let verdict = decide(
            MethodClass::HighRisk,
            &l1_at(ThreatLevel::High),
            Some(&l2(L2Outcome::Yes, 0.69)),
        );
        assert!(matches!(verdict, Verdict::Escalate));
    }

    #[test]
    fn high_l1_with_unknown_l2_escalates() {
        let verdict = decide(
            MethodClass::HighRisk,
            &l1_at(ThreatLevel::High),
            Some(&l2(L2Outcome::Unknown, 0.0)),
        );
        assert!(matches!(verdict, Verdict::Escalate));
    }

    #[test]
    fn medium_l1_with_no_opinion_allows() {
        let verdict = decide(MethodClass::HighRisk, &l1_at(ThreatLevel::Medium), None);
        assert!(matches!(verdict, Verdict::Allow));
    }

    #[test]
    fn medium_l1_confident_injection_blocks_at_point_eight() {
        let verdict = decide(
            MethodClass::HighRisk,
            &l1_at(ThreatLevel::Medium),
            Some(&l2(L2Outcome::Yes, 0.8)),
        );
        assert!(verdict.is_block());
    }

    #[test]
    fn low_or_none_l1_requires_very_high_confidence_to_block() {
        let verdict = decide(
            MethodClass::HighRisk,
            &l1_at(ThreatLevel::None),
            Some(&l2(L2Outcome::Yes, 0.9)),
        );
        assert!(verdict.is_block());

        let verdict = decide(
            MethodClass::HighRisk,
            &l1_at(ThreatLevel::None),
            Some(&l2(L2Outcome::Yes, 0.8)),
        );
        assert!(matches!(verdict, Verdict::Escalate));
    }

    #[test]
    fn unknown_l2_never_blocks_on_its_own() {
        for level in [ThreatLevel::None, ThreatLevel::Low, ThreatLevel::Medium, ThreatLevel::High] {
            let verdict = decide(MethodClass::HighRisk, &l1_at(level), Some(&l2(L2Outcome::Unknown, 0.0)));
            assert!(!verdict.is_block(), "level {level:?} should not block on unknown alone");
        }
    }

    #[test]
    fn policy_is_a_pure_function_of_its_inputs() {
        let l1 = l1_at(ThreatLevel::High);
        let l2_finding = l2(L2Outcome::Yes, 0.75);
        let first = decide(MethodClass::HighRisk, &l1, Some(&l2_finding));
        let second = decide(MethodClass::HighRisk, &l1, Some(&l2_finding));
        assert_eq!(first.label(), second.label());
    }
}
