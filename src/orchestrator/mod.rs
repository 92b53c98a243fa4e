//! Function-call orchestration for LLM tool use.
//!
//! The orchestrator sits between a model provider and the [`ToolRouter`]. It
//! publishes the registry's tools in the provider's schema dialect, validates
//! and executes the calls a model emits, and keeps per-conversation history.
//!
//! Failures never escape as errors: every call produces a
//! [`FunctionCallResult`], so a failing tool does not end a conversation.

pub mod conversation;
pub mod dialect;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use conversation::{
    CallTally, ConversationMessage, ConversationState, ConversationStore, ToolCallRecord,
};
pub use dialect::{render_documentation, Dialect};

use crate::config::OrchestratorConfig;
use crate::error::{ConversationError, ToolError};
use crate::mcp::router::{CallControls, ToolRouter};
use crate::registry::{validate_arguments, CapabilityKind, ValidationReport};

/// Why a function call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Arguments or control fields were rejected.
    Validation,
    /// No tool with that name.
    NotFound,
    /// The call exceeded the per-call timeout.
    Timeout,
    /// The tool ran and failed, or panicked.
    Execution,
    /// The conversation used all of its turns.
    ConversationEnded,
}

/// A call as emitted by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Tool name.
    pub name: String,
    /// Raw arguments.
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    /// Creates a call.
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one function call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCallResult {
    /// Whether the tool ran and succeeded.
    pub success: bool,
    /// Rendered payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    /// Tool that was called.
    pub tool_name: String,
    /// When the call finished.
    pub timestamp: DateTime<Utc>,
}

impl FunctionCallResult {
    fn success(tool_name: &str, result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            kind: None,
            tool_name: tool_name.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn failure(tool_name: &str, kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            kind: Some(kind),
            tool_name: tool_name.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn from_tool_error(tool_name: &str, error: &ToolError) -> Self {
        let kind = match error {
            ToolError::NotFound { .. } => FailureKind::NotFound,
            ToolError::InvalidArguments(_) | ToolError::InvalidParams(_) => FailureKind::Validation,
            ToolError::NotImplemented { .. }
            | ToolError::Operation(_)
            | ToolError::Execution(_) => FailureKind::Execution,
        };
        Self::failure(tool_name, kind, error.to_string())
    }
}

/// Aggregate call statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    /// Live conversations.
    pub total_conversations: usize,
    /// Calls recorded across live conversations.
    pub total_calls: usize,
    /// Calls that succeeded.
    pub successful_calls: usize,
    /// Calls that failed.
    pub failed_calls: usize,
    /// `successful_calls / total_calls`, or 0 with no calls.
    pub success_rate: f64,
    /// Calls per tool name.
    pub calls_per_tool: BTreeMap<String, usize>,
    /// Tools currently registered.
    pub available_tools: usize,
}

type DialectCache = HashMap<Dialect, (u64, Arc<Vec<Value>>)>;

/// Routes model-emitted function calls to registered tools.
#[derive(Debug)]
pub struct FunctionCallOrchestrator {
    router: Arc<ToolRouter>,
    config: OrchestratorConfig,
    conversations: ConversationStore,
    schemas: Mutex<DialectCache>,
}

impl FunctionCallOrchestrator {
    /// Creates an orchestrator over `router`.
    #[must_use]
    pub fn new(router: Arc<ToolRouter>, config: OrchestratorConfig) -> Self {
        let conversations = ConversationStore::new(config.max_conversations, config.max_turns);
        Self {
            router,
            config,
            conversations,
            schemas: Mutex::new(HashMap::new()),
        }
    }

    /// The conversation store.
    #[must_use]
    pub const fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Registered tools in `dialect`'s shape.
    ///
    /// Results are cached until the registry changes.
    #[must_use]
    pub fn tools_for(&self, dialect: Dialect) -> Arc<Vec<Value>> {
        let registry = self.router.registry();
        let generation = registry.generation();

        let mut cache = self.schemas.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_at, tools)) = cache.get(&dialect) {
            if *cached_at == generation {
                return Arc::clone(tools);
            }
        }

        let tools: Arc<Vec<Value>> = Arc::new(
            registry
                .list(CapabilityKind::Tool)
                .iter()
                .map(|tool| dialect.convert(tool))
                .collect(),
        );
        tracing::debug!(dialect = %dialect, generation, count = tools.len(), "Converted tool schemas");
        cache.insert(dialect, (generation, Arc::clone(&tools)));
        tools
    }

    /// Validates arguments for `tool_name` without running it.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] for unknown tools.
    pub fn validate(&self, tool_name: &str, raw: &Value) -> Result<ValidationReport, ToolError> {
        let descriptor = self.router.descriptor(tool_name)?;
        Ok(validate_arguments(tool_name, &descriptor.input_schema, raw))
    }

    /// Validates and runs one call under the per-call timeout.
    ///
    /// With a `conversation_id` the call is recorded in that conversation,
    /// which is created on first use. Calls bound to an ended conversation
    /// are refused without running.
    ///
    /// The tool runs on its own task, so a panic is reported as an
    /// [`FailureKind::Execution`] failure. Calls always run synchronously;
    /// `async_mode: true` is rejected as a validation failure.
    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: Value,
        conversation_id: Option<&str>,
    ) -> FunctionCallResult {
        if let Some(id) = conversation_id {
            if let Err(e) = self.conversations.ensure_open(id) {
                tracing::debug!(conversation_id = %id, tool = %tool_name, "Call refused: {e}");
                let kind = match e {
                    ConversationError::Ended { .. } => FailureKind::ConversationEnded,
                    ConversationError::NotFound(_) => FailureKind::Validation,
                };
                return FunctionCallResult::failure(tool_name, kind, e.to_string());
            }
        }

        let result = self.run(tool_name, arguments.clone()).await;

        if let Some(id) = conversation_id {
            self.conversations.record_call(
                id,
                ToolCallRecord {
                    tool_name: tool_name.to_string(),
                    arguments,
                    success: result.success,
                    error: result.error.clone(),
                    timestamp: result.timestamp,
                },
            );
        }
        result
    }

    async fn run(&self, tool_name: &str, arguments: Value) -> FunctionCallResult {
        let mut arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return FunctionCallResult::failure(
                    tool_name,
                    FailureKind::Validation,
                    format!("arguments must be an object (got {other})"),
                )
            }
        };

        let controls =
            match CallControls::extract(&mut arguments, self.config.default_response_format) {
                Ok(controls) => controls,
                Err(e) => return FunctionCallResult::from_tool_error(tool_name, &e),
            };

        if controls.async_mode {
            return FunctionCallResult::failure(
                tool_name,
                FailureKind::Validation,
                "async_mode is not supported for function calls",
            );
        }

        let timeout = self.config.call_timeout();
        let router = Arc::clone(&self.router);
        let name = tool_name.to_string();
        let raw = Value::Object(arguments);
        let task = tokio::spawn(async move { router.call(&name, &raw).await });
        let abort = task.abort_handle();

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(payload))) => {
                FunctionCallResult::success(tool_name, controls.format.render(&payload))
            }
            Ok(Err(join_error)) => {
                tracing::error!(tool = %tool_name, error = %join_error, "Function call panicked");
                FunctionCallResult::failure(
                    tool_name,
                    FailureKind::Execution,
                    format!("tool panicked: {join_error}"),
                )
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(tool = %tool_name, "Function call failed: {e}");
                FunctionCallResult::from_tool_error(tool_name, &e)
            }
            Err(_) => {
                abort.abort();
                tracing::warn!(tool = %tool_name, timeout_secs = timeout.as_secs(), "Function call timed out");
                FunctionCallResult::failure(
                    tool_name,
                    FailureKind::Timeout,
                    format!("tool call timed out after {}s", timeout.as_secs()),
                )
            }
        }
    }

    /// Runs several calls concurrently and returns results in input order.
    ///
    /// Calls beyond `max_parallel_calls` are dropped. Each call is isolated:
    /// a failure or panic in one only affects its own result.
    pub async fn invoke_many(
        self: &Arc<Self>,
        mut calls: Vec<FunctionCall>,
        conversation_id: Option<&str>,
    ) -> Vec<FunctionCallResult> {
        let cap = self.config.max_parallel_calls;
        if calls.len() > cap {
            tracing::warn!(requested = calls.len(), cap, "Too many function calls, truncating");
            calls.truncate(cap);
        }

        let handles: Vec<_> = calls
            .into_iter()
            .map(|call| {
                let this = Arc::clone(self);
                let conversation = conversation_id.map(str::to_string);
                let name = call.name.clone();
                let handle = tokio::spawn(async move {
                    this.invoke(&call.name, call.arguments, conversation.as_deref())
                        .await
                });
                (name, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(tool = %name, "Function call task failed: {e}");
                    FunctionCallResult::failure(&name, FailureKind::Execution, format!("call aborted: {e}"))
                }
            };
            results.push(result);
        }
        results
    }

    /// Aggregates call counts across live conversations.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn statistics(&self) -> Statistics {
        let tally = self.conversations.tally();
        let success_rate = if tally.total == 0 {
            0.0
        } else {
            tally.successful as f64 / tally.total as f64
        };
        Statistics {
            total_conversations: tally.conversations,
            total_calls: tally.total,
            successful_calls: tally.successful,
            failed_calls: tally.total - tally.successful,
            success_rate,
            calls_per_tool: tally.per_tool,
            available_tools: self.router.registry().count(CapabilityKind::Tool),
        }
    }

    /// Human-readable listing of the registered tools.
    #[must_use]
    pub fn documentation(&self) -> String {
        render_documentation(&self.router.registry().list(CapabilityKind::Tool))
    }
}
