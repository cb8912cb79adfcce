//! The Escalation Hub: broadcasts ESCALATE verdicts to connected
//! operators and waits for a human decision with a hard deadline. First
//! operator response wins; a disconnected or timed-out request is reaped
//! without blocking anyone else.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use sentinel_protocol::DashboardEvent;
use tokio::sync::broadcast;
use tokio::sync::oneshot;
use tracing::info;
use tracing::warn;

/// The human decision that resolves a pending escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitlAction {
    Allow,
    Block,
}

#[derive(Debug, Clone)]
pub struct HitlResponse {
    pub request_id: String,
    pub action: HitlAction,
    pub operator_id: String,
}

/// What `escalate` resolved to: an operator's decision, or the hub giving
/// up once the deadline passed.
#[derive(Debug, Clone)]
pub enum EscalationOutcome {
    Resolved(HitlAction, String),
    TimedOut,
}

struct Pending {
    responder: oneshot::Sender<(HitlAction, String)>,
}

pub struct EscalationHub {
    pending: Mutex<HashMap<String, Pending>>,
    alerts: broadcast::Sender<DashboardEvent>,
}

impl EscalationHub {
    pub fn new(operator_queue_capacity: usize) -> Self {
        let (alerts, _rx) = broadcast::channel(operator_queue_capacity.max(1));
        Self {
            pending: Mutex::new(HashMap::new()),
            alerts,
        }
    }

    /// Registers `request_id` as pending, broadcasts `alert` to every
    /// connected operator, and waits up to `deadline` for a decision.
    ///
    /// If this future is dropped before resolving (the originating
    /// transport disconnected and the Dispatcher cancelled the wait), the
    /// `Reap` guard still removes the pending entry on unwind, so a
    /// disconnected request is never left dangling in the registry.
    pub async fn escalate(&self, request_id: String, alert: DashboardEvent, deadline: Duration) -> EscalationOutcome {
        let (responder, receiver) = oneshot::channel();
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).insert(
            request_id.clone(),
            Pending { responder },
        );

        // Broadcasting is best-effort: no connected operators is not an
        // error, it just means the escalation will resolve by timeout.
        let _ = self.alerts.send(alert);

        struct Reap<'a> {
            hub: &'a EscalationHub,
            request_id: &'a str,
        }
        impl Drop for Reap<'_> {
            fn drop(&mut self) {
                self.hub
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(self.request_id);
            }
        }
        let _reap = Reap {
            hub: self,
            request_id: &request_id,
        };

        match tokio::time::timeout(deadline, receiver).await {
            Ok(Ok((action, operator_id))) => EscalationOutcome::Resolved(action, operator_id),
            Ok(Err(_sender_dropped)) => EscalationOutcome::TimedOut,
            Err(_elapsed) => {
                warn!(request_id, "escalation deadline expired; resolving to escalation_timeout");
                EscalationOutcome::TimedOut
            }
        }
    }

    /// Resolves a pending escalation with an operator's decision. Unknown
    /// or already-resolved request ids are acknowledged (`false`) and
    /// otherwise ignored — the first responder always wins.
    pub fn resolve(&self, response: HitlResponse) -> bool {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&response.request_id);

        match pending {
            Some(entry) => {
                info!(request_id = %response.request_id, operator_id = %response.operator_id, "escalation resolved by operator");
                let _ = entry.responder.send((response.action, response.operator_id));
                true
            }
            None => false,
        }
    }

    /// Subscribes a newly connected operator to the alert broadcast. A
    /// subscriber that falls more than `operator_queue_capacity` events
    /// behind sees dropped events surfaced via `dropped_n` on its next
    /// `recv`, never a blocked pipeline.
    pub fn subscribe(&self) -> OperatorSubscription {
        OperatorSubscription {
            receiver: self.alerts.subscribe(),
            dropped_n: 0,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub struct OperatorSubscription {
    receiver: broadcast::Receiver<DashboardEvent>,
    dropped_n: u64,
}

impl OperatorSubscription {
    /// Returns the next alert, or `None` once the hub itself is gone.
    /// Lag (the bounded queue filling while this operator was slow) is
    /// absorbed transparently; `dropped_n` accumulates how much was lost.
    pub async fn recv(&mut self) -> Option<DashboardEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.dropped_n += skipped;
                    warn!(skipped, total_dropped = self.dropped_n, "operator subscription lagged; events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn dropped_n(&self) -> u64 {
        self.dropped_n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_protocol::AuditRecord;
    use sentinel_protocol::L1Finding;
    use sentinel_protocol::TransportKind;
    use sentinel_protocol::Verdict;

    fn sample_event(request_id: &str) -> DashboardEvent {
        let record = AuditRecord {
            request_id: request_id.to_string(),
            arrival_wall_clock: chrono::Utc::now(),
            finalized_wall_clock: chrono::Utc::now(),
            session_id: "s1".to_string(),
            agent_id: "a1".to_string(),
            method: "tools/call".to_string(),
            transport: TransportKind::Stdio,
            payload_sha256: "deadbeef".to_string(),
            l1_finding: L1Finding::clean(),
            l2_finding: None,
            verdict: Verdict::Escalate,
            human_actor: None,
            degraded: false,
            delivery_error: None,
        };
        DashboardEvent::new(record, b"{}")
    }

    #[tokio::test]
    async fn first_operator_response_wins() {
        let hub = EscalationHub::new(256);
        let escalate = hub.escalate("r1".to_string(), sample_event("r1"), Duration::from_secs(5));

        let resolved = tokio::join!(escalate, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(hub.resolve(HitlResponse {
                request_id: "r1".to_string(),
                action: HitlAction::Allow,
                operator_id: "op1".to_string(),
            }));
            assert!(!hub.resolve(HitlResponse {
                request_id: "r1".to_string(),
                action: HitlAction::Block,
                operator_id: "op2".to_string(),
            }));
        })
        .0;

        assert!(matches!(resolved, EscalationOutcome::Resolved(HitlAction::Allow, _)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_resolves_to_timed_out() {
        let hub = EscalationHub::new(256);
        let outcome = hub.escalate("r1".to_string(), sample_event("r1"), Duration::from_millis(10)).await;
        assert!(matches!(outcome, EscalationOutcome::TimedOut));
        assert_eq!(hub.pending_count(), 0);
    }

    #[tokio::test]
    async fn unknown_request_id_resolve_is_ignored() {
        let hub = EscalationHub::new(256);
        assert!(!hub.resolve(HitlResponse {
            request_id: "ghost".to_string(),
            action: HitlAction::Allow,
            operator_id: "op1".to_string(),
        }));
    }

    #[tokio::test]
    async fn dropping_the_escalate_future_reaps_the_pending_entry() {
        let hub = EscalationHub::new(256);
        {
            let fut = hub.escalate("r1".to_string(), sample_event("r1"), Duration::from_secs(30));
            tokio::pin!(fut);
            // Poll once so the entry is registered, then drop (simulating
            // the originating transport disconnecting).
            let _ = futures_lite_poll_once(&mut fut).await;
        }
        assert_eq!(hub.pending_count(), 0);
    }

    async fn futures_lite_poll_once<F: std::future::Future + Unpin>(fut: &mut F) -> Option<F::Output> {
        std::future::poll_fn(|cx| match std::pin::Pin::new(&mut *fut).poll(cx) {
            std::task::Poll::Ready(v) => std::task::Poll::Ready(Some(v)),
            std::task::Poll::Pending => std::task::Poll::Ready(None),
        })
        .await
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let hub = EscalationHub::new(256);
        let mut sub1 = hub.subscribe();
        let mut sub2 = hub.subscribe();

        let escalate = hub.escalate("r1".to_string(), sample_event("r1"), Duration::from_millis(50));
        tokio::pin!(escalate);

        let event1 = sub1.recv().await.unwrap();
        let event2 = sub2.recv().await.unwrap();
        assert_eq!(event1.request_id, "r1");
        assert_eq!(event2.request_id, "r1");

        let _ = escalate.await;
    }
}
