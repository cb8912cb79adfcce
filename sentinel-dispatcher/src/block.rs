//! Synthesizes the JSON-RPC error shape the dispatcher returns in place
//! of forwarding, for both policy blocks and upstream failures.

use mcp_types::JSONRPCError;
use mcp_types::JSONRPCErrorError;
use mcp_types::RequestId;
use sentinel_protocol::BlockReason;
use serde_json::json;

/// `-32001`: the request was blocked by security policy.
pub const BLOCKED_BY_POLICY: i64 = -32001;
/// `-32002`: forwarding to the upstream tool server failed.
pub const UPSTREAM_FORWARD_FAILED: i64 = -32002;
/// `-32700`: the inbound bytes were not even parseable JSON.
pub const PARSE_ERROR: i64 = -32700;
/// `-32600`: valid JSON, but not a valid JSON-RPC request/notification.
pub const INVALID_REQUEST: i64 = -32600;

pub fn policy_block_error(id: RequestId, reason: &BlockReason) -> JSONRPCError {
    JSONRPCError {
        jsonrpc: "2.0".to_string(),
        id,
        error: JSONRPCErrorError {
            code: BLOCKED_BY_POLICY,
            message: "Request blocked by security policy".to_string(),
            data: Some(json!({
                "threat_level": reason.threat_level,
                "matched_patterns": reason.matched_patterns,
                "l2_confidence": reason.l2_confidence,
                "reasoning": reason.message,
            })),
        },
    }
}

pub fn upstream_failure_error(id: RequestId, detail: &str) -> JSONRPCError {
    JSONRPCError {
        jsonrpc: "2.0".to_string(),
        id,
        error: JSONRPCErrorError {
            code: UPSTREAM_FORWARD_FAILED,
            message: "Failed to forward request to upstream tool server".to_string(),
            data: Some(json!({ "detail": detail })),
        },
    }
}

/// The id could not be recovered at all (the bytes were not valid JSON);
/// per JSON-RPC 2.0 the reply carries `id: null`.
pub fn parse_error(detail: &str) -> JSONRPCError {
    JSONRPCError {
        jsonrpc: "2.0".to_string(),
        id: RequestId::Null,
        error: JSONRPCErrorError {
            code: PARSE_ERROR,
            message: "Parse error".to_string(),
            data: Some(json!({ "detail": detail })),
        },
    }
}

/// The bytes were valid JSON but not a well-formed JSON-RPC 2.0 request
/// or notification (missing `method`, wrong `jsonrpc` version, etc.).
pub fn invalid_request_error(id: RequestId, detail: &str) -> JSONRPCError {
    JSONRPCError {
        jsonrpc: "2.0".to_string(),
        id,
        error: JSONRPCErrorError {
            code: INVALID_REQUEST,
            message: "Invalid Request".to_string(),
            data: Some(json!({ "detail": detail })),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_block_carries_the_structured_reason() {
        let reason = BlockReason {
            matched_patterns: vec!["destructive_shell".to_string()],
            threat_level: sentinel_protocol::ThreatLevel::Critical,
            l2_confidence: Some(0.95),
            message: "looks destructive".to_string(),
        };
        let error = policy_block_error(RequestId::Integer(7), &reason);
        assert_eq!(error.error.code, BLOCKED_BY_POLICY);
        let data = error.error.data.unwrap();
        assert_eq!(data["threat_level"], "CRITICAL");
    }
}
