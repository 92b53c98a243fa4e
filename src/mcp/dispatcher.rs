//! JSON-RPC 2.0 dispatcher.
//!
//! Turns raw payloads into replies:
//!
//! - text that is not JSON, or JSON that is neither an object nor an array,
//!   is a parse error
//! - an empty batch is an invalid request, never an empty array
//! - batch elements are handled one after another, and only requests with an
//!   `id` contribute to the reply array
//! - a batch made only of notifications produces no output at all
//!
//! Every handler runs on its own task, so a panic inside a handler is
//! reported as an internal error instead of unwinding through the server.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::mcp::protocol::{
    classify_payload, parse_payload, parse_request, ErrorCode, JsonRpcError, JsonRpcErrorData,
    JsonRpcReply, JsonRpcRequest, JsonRpcResponse, Payload,
};

/// Boxed future returned by a method handler.
pub type MethodFuture = Pin<Box<dyn Future<Output = Result<Value, JsonRpcErrorData>> + Send>>;

type Handler = Arc<dyn Fn(Option<Value>) -> MethodFuture + Send + Sync>;
type Guard = Arc<dyn Fn(&str) -> Result<(), JsonRpcErrorData> + Send + Sync>;

/// Output of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DispatchOutput {
    /// Reply to a single request.
    Single(JsonRpcReply),
    /// Replies to the non-notification elements of a batch.
    Batch(Vec<JsonRpcReply>),
}

impl DispatchOutput {
    /// Serialises the output as one line of JSON.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialise reply");
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#
                .to_string()
        })
    }

    /// The single reply, if this is not a batch.
    #[must_use]
    pub const fn single(&self) -> Option<&JsonRpcReply> {
        match self {
            Self::Single(reply) => Some(reply),
            Self::Batch(_) => None,
        }
    }

    /// The batch replies, if this is a batch.
    #[must_use]
    pub fn batch(&self) -> Option<&[JsonRpcReply]> {
        match self {
            Self::Single(_) => None,
            Self::Batch(replies) => Some(replies),
        }
    }
}

/// Method table plus JSON-RPC envelope handling.
#[derive(Default)]
pub struct Dispatcher {
    methods: HashMap<String, Handler>,
    guard: Option<Guard>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("Dispatcher")
            .field("methods", &methods)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `method`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, JsonRpcErrorData>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |params| Box::pin(handler(params)));
        self.methods.insert(method.into(), handler);
    }

    /// Installs a check that runs before every handler.
    pub fn set_guard<G>(&mut self, guard: G)
    where
        G: Fn(&str) -> Result<(), JsonRpcErrorData> + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
    }

    /// Returns `true` if a handler is registered for `method`.
    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Dispatches raw text.
    ///
    /// Returns `None` when nothing should be written back.
    pub async fn dispatch_str(&self, raw: &str) -> Option<DispatchOutput> {
        match parse_payload(raw) {
            Ok(payload) => self.dispatch_payload(payload).await,
            Err(error) => Some(DispatchOutput::Single(error.into())),
        }
    }

    /// Dispatches an already-decoded JSON value.
    pub async fn dispatch_value(&self, value: Value) -> Option<DispatchOutput> {
        match classify_payload(value) {
            Ok(payload) => self.dispatch_payload(payload).await,
            Err(error) => Some(DispatchOutput::Single(error.into())),
        }
    }

    async fn dispatch_payload(&self, payload: Payload) -> Option<DispatchOutput> {
        match payload {
            Payload::Single(value) => self.dispatch_element(value).await.map(DispatchOutput::Single),
            Payload::Batch(items) if items.is_empty() => Some(DispatchOutput::Single(
                JsonRpcError::invalid_request(None, "batch must not be empty").into(),
            )),
            Payload::Batch(items) => {
                tracing::debug!(size = items.len(), "Dispatching batch");
                let mut replies = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(reply) = self.dispatch_element(item).await {
                        replies.push(reply);
                    }
                }
                if replies.is_empty() {
                    None
                } else {
                    Some(DispatchOutput::Batch(replies))
                }
            }
        }
    }

    async fn dispatch_element(&self, value: Value) -> Option<JsonRpcReply> {
        match parse_request(value) {
            Ok(request) => self.handle(request).await,
            Err(error) => Some(error.into()),
        }
    }

    /// Runs one validated request. Returns `None` for notifications.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcReply> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        tracing::debug!(%method, notification = id.is_none(), "Dispatching");

        let outcome = self.invoke(&method, params).await;

        let Some(id) = id else {
            if let Err(error) = outcome {
                tracing::debug!(%method, code = error.code, "Notification failed");
            }
            return None;
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result).into(),
            Err(error) => JsonRpcError::new(Some(id), error).into(),
        })
    }

    async fn invoke(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcErrorData> {
        let Some(handler) = self.methods.get(method).cloned() else {
            return Err(JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ));
        };

        if let Some(guard) = &self.guard {
            guard(method)?;
        }

        match tokio::spawn(async move { handler(params).await }).await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                tracing::error!(%method, error = %join_error, "Handler panicked");
                Err(JsonRpcErrorData::with_message(
                    ErrorCode::InternalError,
                    format!("Internal error while handling {method}"),
                ))
            }
        }
    }
}
