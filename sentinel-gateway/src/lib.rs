//! Wires the enumerated configuration surface into a running gateway and
//! drives the reference stdio transport adapter: newline-delimited
//! JSON-RPC frames on stdin/stdout, the agent-facing mirror of the
//! upstream forwarder's own stdio connection to the real tool server.

mod cli;

pub use cli::Cli;

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use mcp_types::JSONRPCMessage;
use sentinel_audit::AuditSink;
use sentinel_common::Config;
use sentinel_dispatcher::Dispatcher;
use sentinel_dispatcher::DispatchOutcome;
use sentinel_dispatcher::DispatcherConfig;
use sentinel_dispatcher::InboundMessage;
use sentinel_dispatcher::UpstreamForwarder;
use sentinel_escalation::EscalationHub;
use sentinel_l1::L1Analyzer;
use sentinel_l2::L2Classifier;
use sentinel_l2::LiveBackend;
use sentinel_protocol::TransportKind;
use sentinel_ratelimit::RateLimiter;
use sentinel_session::SessionStore;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::io::{self};
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Size of the bounded channel between the stdin reader and the
/// per-request dispatch tasks; generous enough for bursty agent traffic
/// without letting an unbounded backlog accumulate in memory.
const CHANNEL_CAPACITY: usize = 256;

/// Every component the gateway wires up, alongside the dispatcher that
/// orchestrates them. Kept together because the stdio adapter needs
/// `sessions` directly for its periodic sweep, not just via the
/// dispatcher.
struct Gateway {
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<SessionStore>,
    upstream_push: mpsc::Receiver<JSONRPCMessage>,
}

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let gateway = build_gateway(&config)?;
    spawn_session_sweeper(Arc::clone(&gateway.sessions));

    let session_id = uuid::Uuid::new_v4().to_string();
    run_stdio_adapter(gateway.dispatcher, gateway.upstream_push, session_id, cli.agent_id).await
}

fn build_gateway(config: &Config) -> anyhow::Result<Gateway> {
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.rps, config.rate_limit.burst));
    let sessions = Arc::new(SessionStore::new(config.session.ring_size, Duration::from_secs(config.session.ttl_seconds)));
    let l1 = Arc::new(L1Analyzer::new(
        &config.l1.blocked_patterns,
        &[],
        config.l1.oversize_payload_bytes,
    ));

    let l2 = if config.l2.enabled {
        let backend = LiveBackend::new(
            reqwest::Client::new(),
            config.l2.endpoint_url.clone(),
            config.l2.api_key.clone(),
            config.l2.model_id.clone(),
        );
        Some(Arc::new(L2Classifier::new(Box::new(backend), Duration::from_secs(config.l2.timeout_seconds))))
    } else {
        None
    };

    let audit_handle = AuditSink::spawn(
        config.audit.log_path.clone().into(),
        Duration::from_secs(config.audit.flush_interval_seconds),
        config.audit.high_watermark,
    );
    // The writer task's `JoinHandle` detaches harmlessly on drop; the task
    // itself keeps running for the process lifetime, which is what a
    // process-wide audit log singleton requires.
    let audit_sink = audit_handle.sink;

    let escalation = Arc::new(EscalationHub::new(config.escalation.operator_queue_capacity));
    let (upstream, upstream_push) = UpstreamForwarder::spawn(
        &config.upstream.command,
        Duration::from_secs(config.upstream.forward_timeout_seconds),
    )?;

    let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig {
        rate_limiter,
        sessions: Arc::clone(&sessions),
        l1,
        l1_enabled: config.l1.enabled,
        l2,
        l2_context_envelopes: config.l2.context_envelopes,
        audit: audit_sink,
        escalation,
        escalation_deadline: Duration::from_secs(config.escalation.deadline_seconds),
        upstream: Arc::new(upstream),
    }));

    Ok(Gateway { dispatcher, sessions, upstream_push })
}

fn spawn_session_sweeper(sessions: Arc<SessionStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let evicted = sessions.sweep(Instant::now()).await;
            if evicted > 0 {
                debug!(evicted, "swept idle sessions");
            }
        }
    });
}

/// Distinguishes "not JSON at all" (`-32700`) from "valid JSON, wrong
/// shape" (`-32600`), recovering the original id in the latter case so the
/// agent can correlate the reply.
fn classify_parse_failure(line: &str, error: &serde_json::Error) -> mcp_types::JSONRPCError {
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(value) => {
            let id = value
                .get("id")
                .and_then(|id| serde_json::from_value::<mcp_types::RequestId>(id.clone()).ok())
                .unwrap_or(mcp_types::RequestId::Null);
            sentinel_dispatcher::invalid_request_error(id, &error.to_string())
        }
        Err(_) => sentinel_dispatcher::parse_error(&error.to_string()),
    }
}

async fn run_stdio_adapter(
    dispatcher: Arc<Dispatcher>,
    mut upstream_push: mpsc::Receiver<JSONRPCMessage>,
    session_id: String,
    agent_id: String,
) -> anyhow::Result<()> {
    let (incoming_tx, mut incoming_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<JSONRPCMessage>(CHANNEL_CAPACITY);

    // Unsolicited upstream traffic (server-initiated requests/notifications,
    // e.g. progress updates) is relayed to the agent unanalyzed; the
    // upstream is an opaque collaborator here, not a subject of this
    // pipeline's L1/L2 analysis.
    let upstream_relay_handle = tokio::spawn({
        let outgoing_tx = outgoing_tx.clone();
        async move {
            while let Some(message) = upstream_push.recv().await {
                if outgoing_tx.send(message).await.is_err() {
                    break;
                }
            }
        }
    });

    let stdin_reader_handle = tokio::spawn({
        let incoming_tx = incoming_tx.clone();
        async move {
            let stdin = io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            while let Some(line) = lines.next_line().await.unwrap_or_default() {
                if line.trim().is_empty() {
                    continue;
                }
                if incoming_tx.send(line).await.is_err() {
                    break;
                }
            }

            debug!("stdin reader finished (EOF)");
        }
    });

    let dispatch_handle = tokio::spawn(async move {
        while let Some(line) = incoming_rx.recv().await {
            let raw = line.as_bytes().to_vec();
            let inbound = match serde_json::from_str::<JSONRPCMessage>(&line) {
                Ok(JSONRPCMessage::Request(request)) => InboundMessage::Request(request),
                Ok(JSONRPCMessage::Notification(notification)) => InboundMessage::Notification(notification),
                Ok(other) => {
                    warn!(message = ?other, "received a response-shaped message from the agent side; this adapter never originates server requests, rejecting");
                    let error = sentinel_dispatcher::invalid_request_error(
                        mcp_types::RequestId::Null,
                        "expected a JSON-RPC request or notification",
                    );
                    let dispatcher = Arc::clone(&dispatcher);
                    let outgoing_tx = outgoing_tx.clone();
                    let session_id = session_id.clone();
                    let agent_id = agent_id.clone();
                    tokio::spawn(async move {
                        let reply = dispatcher.reject_malformed(&session_id, &agent_id, TransportKind::Stdio, &raw, error).await;
                        let _ = outgoing_tx.send(reply).await;
                    });
                    continue;
                }
                Err(error) => {
                    let malformed = classify_parse_failure(&line, &error);
                    let dispatcher = Arc::clone(&dispatcher);
                    let outgoing_tx = outgoing_tx.clone();
                    let session_id = session_id.clone();
                    let agent_id = agent_id.clone();
                    tokio::spawn(async move {
                        let reply = dispatcher.reject_malformed(&session_id, &agent_id, TransportKind::Stdio, &raw, malformed).await;
                        let _ = outgoing_tx.send(reply).await;
                    });
                    continue;
                }
            };

            let dispatcher = Arc::clone(&dispatcher);
            let outgoing_tx = outgoing_tx.clone();
            let session_id = session_id.clone();
            let agent_id = agent_id.clone();
            tokio::spawn(async move {
                let outcome = dispatcher.dispatch(&session_id, &agent_id, TransportKind::Stdio, inbound).await;
                if let DispatchOutcome::Reply(reply) = outcome {
                    let _ = outgoing_tx.send(reply).await;
                }
            });
        }

        info!("dispatch loop exited (channel closed)");
    });

    let stdout_writer_handle = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(message) = outgoing_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if let Err(error) = stdout.write_all(json.as_bytes()).await {
                        error!(%error, "failed to write to stdout");
                        break;
                    }
                    if let Err(error) = stdout.write_all(b"\n").await {
                        error!(%error, "failed to write newline to stdout");
                        break;
                    }
                    if let Err(error) = stdout.flush().await {
                        error!(%error, "failed to flush stdout");
                        break;
                    }
                }
                Err(error) => error!(%error, "failed to serialize outgoing JSON-RPC message"),
            }
        }

        info!("stdout writer exited (channel closed)");
    });

    let _ = tokio::join!(stdin_reader_handle, dispatch_handle, stdout_writer_handle, upstream_relay_handle);
    Ok(())
}
