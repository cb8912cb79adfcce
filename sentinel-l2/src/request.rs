//! The shape of one classification request: the method under analysis,
//! its params rendered compactly, and a bounded slice of recent session
//! context.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ContextEnvelope {
    pub method: String,
    pub params_json: String,
}

#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub method: String,
    pub params_json: String,
    /// The last `k` envelopes from the session snapshot, oldest first,
    /// excluding the request currently under analysis.
    pub context: Vec<ContextEnvelope>,
}

impl ClassificationRequest {
    pub fn new(method: impl Into<String>, params: Option<&Value>) -> Self {
        let params_json = params
            .map(|p| serde_json::to_string(p).unwrap_or_default())
            .unwrap_or_default();
        Self {
            method: method.into(),
            params_json,
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: Vec<ContextEnvelope>) -> Self {
        self.context = context;
        self
    }
}
