//! The Dispatcher: the central orchestrator that owns one request from
//! ingress to forwarding or rejection. Every transport adapter funnels
//! its inbound messages through [`Dispatcher::dispatch`]; everything
//! else in this workspace exists to be composed here.

mod block;
mod upstream;

pub use block::invalid_request_error;
pub use block::parse_error;
pub use upstream::UpstreamError;
pub use upstream::UpstreamForwarder;

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use mcp_types::JSONRPCMessage;
use mcp_types::JSONRPCNotification;
use mcp_types::JSONRPCRequest;
#[cfg(test)]
use mcp_types::RequestId;
use sentinel_audit::AuditSink;
use sentinel_escalation::EscalationHub;
use sentinel_escalation::EscalationOutcome;
use sentinel_escalation::HitlAction;
use sentinel_l1::L1Analyzer;
use sentinel_l2::ClassificationRequest;
use sentinel_l2::ContextEnvelope;
use sentinel_l2::L2Classifier;
use sentinel_protocol::AuditRecord;
use sentinel_protocol::DashboardEvent;
use sentinel_protocol::HumanActor;
use sentinel_protocol::L1Finding;
use sentinel_protocol::L2Finding;
use sentinel_protocol::MethodClass;
use sentinel_protocol::RequestEnvelope;
use sentinel_protocol::ThreatLevel;
use sentinel_protocol::TransportKind;
use sentinel_protocol::Verdict;
use sentinel_protocol::sha256_hex;
use sentinel_ratelimit::RateLimiter;
use sentinel_session::SessionStore;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// A whole JSON-RPC message the Dispatcher was asked to act on. Requests
/// expect a reply; notifications never do.
pub enum InboundMessage {
    Request(JSONRPCRequest),
    Notification(JSONRPCNotification),
}

impl InboundMessage {
    fn method(&self) -> &str {
        match self {
            InboundMessage::Request(r) => &r.method,
            InboundMessage::Notification(n) => &n.method,
        }
    }

    fn params(&self) -> Option<&Value> {
        match self {
            InboundMessage::Request(r) => r.params.as_ref(),
            InboundMessage::Notification(n) => n.params.as_ref(),
        }
    }

    fn wire_message(&self) -> JSONRPCMessage {
        match self {
            InboundMessage::Request(r) => JSONRPCMessage::Request(r.clone()),
            InboundMessage::Notification(n) => JSONRPCMessage::Notification(n.clone()),
        }
    }
}

/// What the Dispatcher wants the transport adapter to do once it has
/// finished with an inbound message.
pub enum DispatchOutcome {
    /// Send this message back over the channel the request arrived on.
    Reply(JSONRPCMessage),
    /// Nothing to send — an allowed or blocked notification.
    NoReply,
}

pub struct Dispatcher {
    rate_limiter: Arc<RateLimiter>,
    sessions: Arc<SessionStore>,
    l1: Arc<L1Analyzer>,
    l1_enabled: bool,
    l2: Option<Arc<L2Classifier>>,
    l2_context_envelopes: usize,
    audit: AuditSink,
    escalation: Arc<EscalationHub>,
    escalation_deadline: Duration,
    upstream: Arc<UpstreamForwarder>,
}

pub struct DispatcherConfig {
    pub rate_limiter: Arc<RateLimiter>,
    pub sessions: Arc<SessionStore>,
    pub l1: Arc<L1Analyzer>,
    pub l1_enabled: bool,
    pub l2: Option<Arc<L2Classifier>>,
    pub l2_context_envelopes: usize,
    pub audit: AuditSink,
    pub escalation: Arc<EscalationHub>,
    pub escalation_deadline: Duration,
    pub upstream: Arc<UpstreamForwarder>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            rate_limiter: config.rate_limiter,
            sessions: config.sessions,
            l1: config.l1,
            l1_enabled: config.l1_enabled,
            l2: config.l2,
            l2_context_envelopes: config.l2_context_envelopes,
            audit: config.audit,
            escalation: config.escalation,
            escalation_deadline: config.escalation_deadline,
            upstream: config.upstream,
        }
    }

    /// Runs the full interception pipeline for one inbound message and
    /// returns what the transport adapter should do with it.
    pub async fn dispatch(
        &self,
        session_id: &str,
        agent_id: &str,
        transport: TransportKind,
        inbound: InboundMessage,
    ) -> DispatchOutcome {
        let envelope = self.build_envelope(session_id, agent_id, transport, &inbound);
        let method_class = envelope.method_class();

        if method_class == MethodClass::Safe {
            self.sessions.observe(session_id, envelope.clone()).await;
            let (outcome, delivery_error) = self.act(inbound, Verdict::Allow).await;
            self.finalize(&envelope, L1Finding::clean(), None, Verdict::Allow, None, delivery_error).await;
            return outcome;
        }

        if !self.rate_limiter.admit(session_id).await {
            let verdict = Verdict::Block(sentinel_protocol::BlockReason::rate_limited());
            warn!(session_id, method = envelope.method, "request denied by rate limiter");
            let (outcome, _delivery_error) = self.act(inbound, verdict.clone()).await;
            self.finalize(&envelope, L1Finding::clean(), None, verdict, None, None).await;
            return outcome;
        }

        let session = self.sessions.observe(session_id, envelope.clone()).await;

        let l1_finding = if self.l1_enabled {
            self.l1.analyze(&envelope)
        } else {
            L1Finding::clean()
        };

        let l2_finding = self.run_l2(method_class, &envelope, &l1_finding, &session.envelopes).await;

        let mut verdict = sentinel_policy::decide(method_class, &l1_finding, l2_finding.as_ref());
        let mut human_actor: Option<HumanActor> = None;

        if matches!(verdict, Verdict::Escalate) {
            let (resolved, actor) = self.escalate(&envelope, &l1_finding, l2_finding.as_ref()).await;
            verdict = resolved;
            human_actor = actor;
        }

        let (outcome, delivery_error) = self.act(inbound, verdict.clone()).await;
        self.finalize(&envelope, l1_finding, l2_finding, verdict, human_actor, delivery_error).await;
        outcome
    }

    /// Records and replies to an inbound message that never became an
    /// envelope at all: either the bytes weren't valid JSON (`-32700`) or
    /// they were valid JSON but not a well-formed JSON-RPC 2.0 message
    /// (`-32600`). No L1/L2 runs; the audit record still gets written,
    /// per §7's "no analysis, still audited" contract.
    pub async fn reject_malformed(
        &self,
        session_id: &str,
        agent_id: &str,
        transport: TransportKind,
        raw: &[u8],
        error: mcp_types::JSONRPCError,
    ) -> JSONRPCMessage {
        let now = chrono::Utc::now();
        let record = AuditRecord {
            request_id: error.id.to_string(),
            arrival_wall_clock: now,
            finalized_wall_clock: now,
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            method: "<malformed>".to_string(),
            transport,
            payload_sha256: sha256_hex(raw),
            l1_finding: L1Finding::clean(),
            l2_finding: None,
            verdict: Verdict::Block(sentinel_protocol::BlockReason::malformed_input(&error.error.message)),
            human_actor: None,
            degraded: !self.audit.health(),
            delivery_error: None,
        };
        self.audit.submit(record).await;
        JSONRPCMessage::Error(error)
    }

    fn build_envelope(
        &self,
        session_id: &str,
        agent_id: &str,
        transport: TransportKind,
        inbound: &InboundMessage,
    ) -> RequestEnvelope {
        let request_id = match inbound {
            InboundMessage::Request(r) => r.id.to_string(),
            InboundMessage::Notification(_) => format!("notif-{}", uuid::Uuid::new_v4()),
        };
        let raw = serde_json::to_vec(&inbound.wire_message()).unwrap_or_default();

        RequestEnvelope {
            request_id,
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            method: inbound.method().to_string(),
            params: inbound.params().cloned(),
            raw,
            arrival_instant: Instant::now(),
            arrival_wall_clock: chrono::Utc::now(),
            transport,
        }
    }

    /// Runs L2 when the method class calls for it, cancelling the
    /// in-flight call if L1 already settled the verdict at CRITICAL.
    async fn run_l2(
        &self,
        method_class: MethodClass,
        envelope: &RequestEnvelope,
        l1_finding: &L1Finding,
        session_history: &[RequestEnvelope],
    ) -> Option<L2Finding> {
        let l2 = self.l2.as_ref()?;

        let should_run = match method_class {
            MethodClass::Safe => false,
            MethodClass::HighRisk => true,
            MethodClass::Other => !self.l1_enabled || l1_finding.level >= ThreatLevel::Medium,
        };
        if !should_run {
            return None;
        }

        let context = session_history
            .iter()
            .rev()
            .skip(1)
            .take(self.l2_context_envelopes)
            .map(|e| ContextEnvelope {
                method: e.method.clone(),
                params_json: e.params.as_ref().map(|p| p.to_string()).unwrap_or_default(),
            })
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let request = ClassificationRequest::new(envelope.method.clone(), envelope.params.as_ref()).with_context(context);

        let l2 = Arc::clone(l2);
        let handle = tokio::spawn(async move { l2.classify(&request).await });

        if l1_finding.level == ThreatLevel::Critical {
            debug!("L1 already settled at CRITICAL; cancelling in-flight L2 call");
            handle.abort();
            return None;
        }

        match handle.await {
            Ok(finding) => Some(finding),
            Err(_join_error) => {
                warn!("L2 task did not complete normally; treating as unknown");
                Some(L2Finding::unknown("l2_task_error"))
            }
        }
    }

    async fn escalate(
        &self,
        envelope: &RequestEnvelope,
        l1_finding: &L1Finding,
        l2_finding: Option<&L2Finding>,
    ) -> (Verdict, Option<HumanActor>) {
        let record = AuditRecord {
            request_id: envelope.request_id.clone(),
            arrival_wall_clock: envelope.arrival_wall_clock,
            finalized_wall_clock: chrono::Utc::now(),
            session_id: envelope.session_id.clone(),
            agent_id: envelope.agent_id.clone(),
            method: envelope.method.clone(),
            transport: envelope.transport,
            payload_sha256: sha256_hex(&envelope.raw),
            l1_finding: l1_finding.clone(),
            l2_finding: l2_finding.cloned(),
            verdict: Verdict::Escalate,
            human_actor: None,
            degraded: !self.audit.health(),
            delivery_error: None,
        };
        let alert = DashboardEvent::new(record, &envelope.raw);

        match self.escalation.escalate(envelope.request_id.clone(), alert, self.escalation_deadline).await {
            EscalationOutcome::Resolved(HitlAction::Allow, operator_id) => (
                Verdict::Allow,
                Some(HumanActor {
                    operator_id,
                    action: "allow".to_string(),
                }),
            ),
            EscalationOutcome::Resolved(HitlAction::Block, operator_id) => (
                Verdict::Block(sentinel_protocol::BlockReason {
                    matched_patterns: l1_finding.matched_patterns.iter().cloned().collect(),
                    threat_level: l1_finding.level,
                    l2_confidence: l2_finding.map(|f| f.confidence),
                    message: "blocked by operator".to_string(),
                }),
                Some(HumanActor {
                    operator_id,
                    action: "block".to_string(),
                }),
            ),
            EscalationOutcome::TimedOut => {
                info!(request_id = %envelope.request_id, "escalation deadline passed with no operator response");
                (Verdict::Block(sentinel_protocol::BlockReason::escalation_timeout()), None)
            }
        }
    }

    async fn finalize(
        &self,
        envelope: &RequestEnvelope,
        l1_finding: L1Finding,
        l2_finding: Option<L2Finding>,
        verdict: Verdict,
        human_actor: Option<HumanActor>,
        delivery_error: Option<String>,
    ) {
        let record = AuditRecord {
            request_id: envelope.request_id.clone(),
            arrival_wall_clock: envelope.arrival_wall_clock,
            finalized_wall_clock: chrono::Utc::now(),
            session_id: envelope.session_id.clone(),
            agent_id: envelope.agent_id.clone(),
            method: envelope.method.clone(),
            transport: envelope.transport,
            payload_sha256: sha256_hex(&envelope.raw),
            l1_finding,
            l2_finding,
            verdict,
            human_actor,
            degraded: !self.audit.health(),
            delivery_error,
        };
        let event = DashboardEvent::new(record.clone(), &envelope.raw);
        if event.is_alert {
            warn!(request_id = %record.request_id, verdict = record.verdict.label(), "verdict finalized");
        } else {
            debug!(request_id = %record.request_id, verdict = record.verdict.label(), "verdict finalized");
        }
        self.audit.submit(record).await;
    }

    /// The terminal action: forward on ALLOW, synthesize a block error
    /// otherwise. Notifications never produce a reply either way. The
    /// second element is `Some("forward_failed")` when an ALLOW verdict's
    /// upstream forward attempt failed, per §7 — folded into the same
    /// audit record `finalize` writes rather than a second record, to
    /// keep the "exactly one audit record per request id" property (§8).
    async fn act(&self, inbound: InboundMessage, verdict: Verdict) -> (DispatchOutcome, Option<String>) {
        match (inbound, verdict) {
            (InboundMessage::Request(request), Verdict::Allow) => {
                let id = request.id.clone();
                match self.upstream.forward_request(request).await {
                    Ok(message) => (DispatchOutcome::Reply(message), None),
                    Err(error) => {
                        warn!(%error, "upstream forward failed");
                        let reply = DispatchOutcome::Reply(JSONRPCMessage::Error(block::upstream_failure_error(id, &error.to_string())));
                        (reply, Some("forward_failed".to_string()))
                    }
                }
            }
            (InboundMessage::Notification(notification), Verdict::Allow) => {
                let delivery_error = match self.upstream.forward_notification(notification).await {
                    Ok(()) => None,
                    Err(error) => {
                        debug!(%error, "upstream notification forward failed");
                        Some("forward_failed".to_string())
                    }
                };
                (DispatchOutcome::NoReply, delivery_error)
            }
            (InboundMessage::Request(request), Verdict::Block(reason)) => {
                (DispatchOutcome::Reply(JSONRPCMessage::Error(block::policy_block_error(request.id, &reason))), None)
            }
            (InboundMessage::Notification(_), Verdict::Block(_)) => {
                // Notifications have no reply channel by protocol; the
                // block is already recorded in the audit log.
                (DispatchOutcome::NoReply, None)
            }
            (_, Verdict::Escalate) => {
                unreachable!("escalation is always resolved to Allow or Block before act() runs")
            }
        }
    }

}
