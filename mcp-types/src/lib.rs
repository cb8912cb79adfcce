//! Wire types for the Model Context Protocol (MCP), a JSON-RPC 2.0 dialect.
//!
//! This crate only models the slice of the protocol the gateway needs to
//! observe: request/response/notification framing, the method surface named
//! in the method-classification table, and the handful of result shapes the
//! gateway itself has to construct (an `initialize` response, a blocked-call
//! error). It does not attempt to be a complete MCP schema.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

pub const JSONRPC_VERSION: &str = "2.0";
pub const MCP_SCHEMA_VERSION: &str = "2025-03-26";

/// JSON-RPC request/response id: either a string or an integer, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Integer(i64),
    /// Only ever sent, never received: JSON-RPC replies with `id: null`
    /// when the original id could not be recovered (parse errors).
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Integer(n) => write!(f, "{n}"),
            RequestId::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCErrorError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCError {
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: JSONRPCErrorError,
}

pub type JSONRPCBatchRequest = Vec<JSONRPCBatchRequestItem>;
pub type JSONRPCBatchResponse = Vec<JSONRPCBatchResponseItem>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCBatchRequestItem {
    JSONRPCRequest(JSONRPCRequest),
    JSONRPCNotification(JSONRPCNotification),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCBatchResponseItem {
    JSONRPCResponse(JSONRPCResponse),
    JSONRPCError(JSONRPCError),
}

/// Any single frame that can cross the wire. `serde(untagged)` mirrors the
/// way the spec itself distinguishes variants structurally (presence of
/// `method`, `id`, `result`/`error`) rather than via an explicit tag field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCMessage {
    Request(JSONRPCRequest),
    Notification(JSONRPCNotification),
    Response(JSONRPCResponse),
    Error(JSONRPCError),
    BatchRequest(JSONRPCBatchRequest),
    BatchResponse(JSONRPCBatchResponse),
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("missing params for method: {0}")]
    MissingParams(String),
    #[error("invalid params for method {method}: {source}")]
    InvalidParams {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Binds a concrete MCP method to its params/result wire types.
pub trait ModelContextProtocolRequest {
    const METHOD: &'static str;
    type Params: Serialize + for<'de> Deserialize<'de>;
    type Result: Serialize + for<'de> Deserialize<'de>;
}

pub trait ModelContextProtocolNotification {
    const METHOD: &'static str;
    type Params: Serialize + for<'de> Deserialize<'de>;
}

macro_rules! request_type {
    ($name:ident, $method:expr, $params:ty, $result:ty) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl ModelContextProtocolRequest for $name {
            const METHOD: &'static str = $method;
            type Params = $params;
            type Result = $result;
        }
    };
}

macro_rules! notification_type {
    ($name:ident, $method:expr, $params:ty) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl ModelContextProtocolNotification for $name {
            const METHOD: &'static str = $method;
            type Params = $params;
        }
    };
}

// ---------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequestParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    pub client_info: Implementation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilitiesTools {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ServerCapabilitiesTools>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    pub capabilities: ServerCapabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub protocol_version: String,
    pub server_info: Implementation,
}

request_type!(
    InitializeRequest,
    "initialize",
    InitializeRequestParams,
    InitializeResult
);

notification_type!(InitializedNotification, "initialized", Option<Value>);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingRequestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<Value>,
}

request_type!(PingRequest, "ping", Option<PingRequestParams>, Value);

// ---------------------------------------------------------------------
// Resources / prompts (safe-class list methods; the gateway never needs to
// do more than classify and forward these, so params/results are modeled
// loosely as JSON values with the one concrete result the dispatcher
// itself may need to shape, `ListToolsResult`).
// ---------------------------------------------------------------------

request_type!(
    ListResourcesRequest,
    "resources/list",
    Option<Value>,
    Value
);
request_type!(
    ListResourceTemplatesRequest,
    "resources/templates/list",
    Option<Value>,
    Value
);
request_type!(ReadResourceRequest, "resources/read", Value, Value);
request_type!(SubscribeRequest, "resources/subscribe", Value, Value);
request_type!(UnsubscribeRequest, "resources/unsubscribe", Value, Value);
request_type!(ListPromptsRequest, "prompts/list", Option<Value>, Value);
request_type!(GetPromptRequest, "prompts/get", Value, Value);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: ToolInputSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

request_type!(
    ListToolsRequest,
    "tools/list",
    Option<Value>,
    ListToolsResult
);

// ---------------------------------------------------------------------
// High-risk: tools/call
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequestParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub r#type: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    TextContent(TextContent),
}

pub type CallToolResultContent = ContentBlock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

request_type!(
    CallToolRequest,
    "tools/call",
    CallToolRequestParams,
    CallToolResult
);

// ---------------------------------------------------------------------
// High-risk: sampling/createMessage, completion/complete
// ---------------------------------------------------------------------

request_type!(
    CreateMessageRequest,
    "sampling/createMessage",
    Value,
    Value
);
request_type!(CompleteRequest, "completion/complete", Value, Value);

// ---------------------------------------------------------------------
// logging/setLevel (safe-class)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelRequestParams {
    pub level: String,
}

request_type!(SetLevelRequest, "logging/setLevel", SetLevelRequestParams, Value);

// ---------------------------------------------------------------------
// Notifications the gateway may observe in either direction.
// ---------------------------------------------------------------------

notification_type!(CancelledNotification, "notifications/cancelled", Value);
notification_type!(ProgressNotification, "notifications/progress", Value);
notification_type!(
    ResourceListChangedNotification,
    "notifications/resources/list_changed",
    Option<Value>
);
notification_type!(
    ResourceUpdatedNotification,
    "notifications/resources/updated",
    Value
);
notification_type!(
    PromptListChangedNotification,
    "notifications/prompts/list_changed",
    Option<Value>
);
notification_type!(
    ToolListChangedNotification,
    "notifications/tools/list_changed",
    Option<Value>
);
notification_type!(LoggingMessageNotification, "notifications/message", Value);

// ---------------------------------------------------------------------
// Dispatch enums
// ---------------------------------------------------------------------

/// Every request kind a client may send to the gateway, with its params
/// already decoded. `process_request` routes to a dedicated handler per
/// variant rather than switching on the raw method string more than once.
#[derive(Debug, Clone)]
pub enum ClientRequest {
    Initialize {
        id: RequestId,
        params: <InitializeRequest as ModelContextProtocolRequest>::Params,
    },
    Ping {
        id: RequestId,
        params: <PingRequest as ModelContextProtocolRequest>::Params,
    },
    ListResources {
        id: RequestId,
        params: <ListResourcesRequest as ModelContextProtocolRequest>::Params,
    },
    ListResourceTemplates {
        id: RequestId,
        params: <ListResourceTemplatesRequest as ModelContextProtocolRequest>::Params,
    },
    ReadResource {
        id: RequestId,
        params: <ReadResourceRequest as ModelContextProtocolRequest>::Params,
    },
    Subscribe {
        id: RequestId,
        params: <SubscribeRequest as ModelContextProtocolRequest>::Params,
    },
    Unsubscribe {
        id: RequestId,
        params: <UnsubscribeRequest as ModelContextProtocolRequest>::Params,
    },
    ListPrompts {
        id: RequestId,
        params: <ListPromptsRequest as ModelContextProtocolRequest>::Params,
    },
    GetPrompt {
        id: RequestId,
        params: <GetPromptRequest as ModelContextProtocolRequest>::Params,
    },
    ListTools {
        id: RequestId,
        params: <ListToolsRequest as ModelContextProtocolRequest>::Params,
    },
    CallTool {
        id: RequestId,
        params: <CallToolRequest as ModelContextProtocolRequest>::Params,
    },
    SetLevel {
        id: RequestId,
        params: <SetLevelRequest as ModelContextProtocolRequest>::Params,
    },
    Complete {
        id: RequestId,
        params: <CompleteRequest as ModelContextProtocolRequest>::Params,
    },
    CreateMessage {
        id: RequestId,
        params: <CreateMessageRequest as ModelContextProtocolRequest>::Params,
    },
    /// Any method not named above. Still dispatched (the "other" method
    /// class), just without a typed params shape.
    Other {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
}

impl ClientRequest {
    pub fn id(&self) -> &RequestId {
        match self {
            ClientRequest::Initialize { id, .. }
            | ClientRequest::Ping { id, .. }
            | ClientRequest::ListResources { id, .. }
            | ClientRequest::ListResourceTemplates { id, .. }
            | ClientRequest::ReadResource { id, .. }
            | ClientRequest::Subscribe { id, .. }
            | ClientRequest::Unsubscribe { id, .. }
            | ClientRequest::ListPrompts { id, .. }
            | ClientRequest::GetPrompt { id, .. }
            | ClientRequest::ListTools { id, .. }
            | ClientRequest::CallTool { id, .. }
            | ClientRequest::SetLevel { id, .. }
            | ClientRequest::Complete { id, .. }
            | ClientRequest::CreateMessage { id, .. }
            | ClientRequest::Other { id, .. } => id,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            ClientRequest::Initialize { .. } => InitializeRequest::METHOD,
            ClientRequest::Ping { .. } => PingRequest::METHOD,
            ClientRequest::ListResources { .. } => ListResourcesRequest::METHOD,
            ClientRequest::ListResourceTemplates { .. } => ListResourceTemplatesRequest::METHOD,
            ClientRequest::ReadResource { .. } => ReadResourceRequest::METHOD,
            ClientRequest::Subscribe { .. } => SubscribeRequest::METHOD,
            ClientRequest::Unsubscribe { .. } => UnsubscribeRequest::METHOD,
            ClientRequest::ListPrompts { .. } => ListPromptsRequest::METHOD,
            ClientRequest::GetPrompt { .. } => GetPromptRequest::METHOD,
            ClientRequest::ListTools { .. } => ListToolsRequest::METHOD,
            ClientRequest::CallTool { .. } => CallToolRequest::METHOD,
            ClientRequest::SetLevel { .. } => SetLevelRequest::METHOD,
            ClientRequest::Complete { .. } => CompleteRequest::METHOD,
            ClientRequest::CreateMessage { .. } => CreateMessageRequest::METHOD,
            ClientRequest::Other { method, .. } => method,
        }
    }
}

impl TryFrom<JSONRPCRequest> for ClientRequest {
    type Error = ConversionError;

    fn try_from(request: JSONRPCRequest) -> Result<Self, Self::Error> {
        let JSONRPCRequest {
            id, method, params, ..
        } = request;

        macro_rules! decode {
            ($variant:ident, $ty:ty) => {{
                let value = params.unwrap_or(Value::Null);
                let parsed: $ty = serde_json::from_value(value).map_err(|source| {
                    ConversionError::InvalidParams {
                        method: method.clone(),
                        source,
                    }
                })?;
                Ok(ClientRequest::$variant { id, params: parsed })
            }};
        }

        match method.as_str() {
            InitializeRequest::METHOD => decode!(Initialize, InitializeRequestParams),
            PingRequest::METHOD => decode!(Ping, Option<PingRequestParams>),
            ListResourcesRequest::METHOD => decode!(ListResources, Option<Value>),
            ListResourceTemplatesRequest::METHOD => {
                decode!(ListResourceTemplates, Option<Value>)
            }
            ReadResourceRequest::METHOD => decode!(ReadResource, Value),
            SubscribeRequest::METHOD => decode!(Subscribe, Value),
            UnsubscribeRequest::METHOD => decode!(Unsubscribe, Value),
            ListPromptsRequest::METHOD => decode!(ListPrompts, Option<Value>),
            GetPromptRequest::METHOD => decode!(GetPrompt, Value),
            ListToolsRequest::METHOD => decode!(ListTools, Option<Value>),
            CallToolRequest::METHOD => decode!(CallTool, CallToolRequestParams),
            SetLevelRequest::METHOD => decode!(SetLevel, SetLevelRequestParams),
            CompleteRequest::METHOD => decode!(Complete, Value),
            CreateMessageRequest::METHOD => decode!(CreateMessage, Value),
            other => Ok(ClientRequest::Other {
                id,
                method: other.to_string(),
                params,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ServerNotification {
    Initialized(<InitializedNotification as ModelContextProtocolNotification>::Params),
    Cancelled(<CancelledNotification as ModelContextProtocolNotification>::Params),
    Progress(<ProgressNotification as ModelContextProtocolNotification>::Params),
    ResourceListChanged(
        <ResourceListChangedNotification as ModelContextProtocolNotification>::Params,
    ),
    ResourceUpdated(<ResourceUpdatedNotification as ModelContextProtocolNotification>::Params),
    PromptListChanged(<PromptListChangedNotification as ModelContextProtocolNotification>::Params),
    ToolListChanged(<ToolListChangedNotification as ModelContextProtocolNotification>::Params),
    LoggingMessage(<LoggingMessageNotification as ModelContextProtocolNotification>::Params),
    Other {
        method: String,
        params: Option<Value>,
    },
}

impl TryFrom<JSONRPCNotification> for ServerNotification {
    type Error = ConversionError;

    fn try_from(notification: JSONRPCNotification) -> Result<Self, Self::Error> {
        let JSONRPCNotification { method, params, .. } = notification;

        macro_rules! decode {
            ($variant:ident, $ty:ty) => {{
                let value = params.unwrap_or(Value::Null);
                let parsed: $ty = serde_json::from_value(value).map_err(|source| {
                    ConversionError::InvalidParams {
                        method: method.clone(),
                        source,
                    }
                })?;
                Ok(ServerNotification::$variant(parsed))
            }};
        }

        match method.as_str() {
            InitializedNotification::METHOD => decode!(Initialized, Option<Value>),
            CancelledNotification::METHOD => decode!(Cancelled, Value),
            ProgressNotification::METHOD => decode!(Progress, Value),
            ResourceListChangedNotification::METHOD => {
                decode!(ResourceListChanged, Option<Value>)
            }
            ResourceUpdatedNotification::METHOD => decode!(ResourceUpdated, Value),
            PromptListChangedNotification::METHOD => decode!(PromptListChanged, Option<Value>),
            ToolListChangedNotification::METHOD => decode!(ToolListChanged, Option<Value>),
            LoggingMessageNotification::METHOD => decode!(LoggingMessage, Value),
            other => Ok(ServerNotification::Other {
                method: other.to_string(),
                params,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_id_round_trips_through_json() {
        let id = RequestId::Integer(7);
        let value = serde_json::to_value(&id).unwrap();
        assert_eq!(value, serde_json::json!(7));
        let back: RequestId = serde_json::from_value(value).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn request_id_null_serializes_to_json_null() {
        let value = serde_json::to_value(&RequestId::Null).unwrap();
        assert_eq!(value, serde_json::Value::Null);
        let back: RequestId = serde_json::from_value(value).unwrap();
        assert_eq!(back, RequestId::Null);
    }

    #[test]
    fn client_request_classifies_known_method() {
        let request = JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Integer(1),
            method: "tools/call".to_string(),
            params: Some(serde_json::json!({"name": "shell", "arguments": {}})),
        };
        let parsed = ClientRequest::try_from(request).unwrap();
        assert_eq!(parsed.method(), "tools/call");
        assert!(matches!(parsed, ClientRequest::CallTool { .. }));
    }

    #[test]
    fn client_request_falls_back_to_other_for_unknown_method() {
        let request = JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::String("x".to_string()),
            method: "experimental/frobnicate".to_string(),
            params: None,
        };
        let parsed = ClientRequest::try_from(request).unwrap();
        assert!(matches!(parsed, ClientRequest::Other { .. }));
    }
}
