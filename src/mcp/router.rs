//! Tool execution router and response formatting.
//!
//! The router owns the handler behind every registry entry. Handlers are
//! registered together with their descriptor, so the registry and the
//! handler tables stay 1:1. A descriptor placed in the registry without a
//! handler is reported as not implemented rather than not found.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::mcp::operations::OperationFuture;
use crate::registry::{validate_arguments, CapabilityDescriptor, CapabilityKind, Registry};

/// An invocable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Describes the tool and its argument schema.
    fn descriptor(&self) -> CapabilityDescriptor;

    /// Runs the tool with already-validated arguments.
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError>;
}

/// A readable resource.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Describes the resource. The descriptor name is the URI.
    fn descriptor(&self) -> CapabilityDescriptor;

    /// Produces the current text of the resource.
    async fn read(&self) -> Result<String, ToolError>;
}

/// A parameterised prompt template.
#[async_trait]
pub trait PromptProvider: Send + Sync {
    /// Describes the template and its arguments.
    fn descriptor(&self) -> CapabilityDescriptor;

    /// Renders the template with validated arguments.
    async fn render(&self, arguments: Map<String, Value>) -> Result<Vec<PromptMessage>, ToolError>;
}

/// One message of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    /// Speaker role, usually `user`.
    pub role: String,
    /// Message body.
    pub content: ToolContent,
}

impl PromptMessage {
    /// A user message with text content.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: ToolContent::Text { text: text.into() },
        }
    }
}

/// Wraps a synchronous closure as a [`Tool`].
pub struct FnTool<F>
where
    F: Fn(Map<String, Value>) -> Result<Value, ToolError> + Send + Sync,
{
    descriptor: CapabilityDescriptor,
    handler: F,
}

impl<F> FnTool<F>
where
    F: Fn(Map<String, Value>) -> Result<Value, ToolError> + Send + Sync,
{
    /// Creates a closure-backed tool.
    pub const fn new(descriptor: CapabilityDescriptor, handler: F) -> Self {
        Self {
            descriptor,
            handler,
        }
    }
}

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(Map<String, Value>) -> Result<Value, ToolError> + Send + Sync,
{
    fn descriptor(&self) -> CapabilityDescriptor {
        self.descriptor.clone()
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        (self.handler)(arguments)
    }
}

/// How a tool payload is encoded in the reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// The structured payload verbatim.
    Json,
    /// Text and structured payload side by side.
    Both,
}

impl ResponseFormat {
    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    /// Renders a payload as a single JSON value in this format.
    #[must_use]
    pub fn render(self, payload: &Value) -> Value {
        match self {
            Self::Text => Value::String(payload_text(payload)),
            Self::Json => payload.clone(),
            Self::Both => json!({"text": payload_text(payload), "json": payload}),
        }
    }
}

/// Text form of a payload. Strings are used as-is, everything else is
/// pretty-printed JSON.
#[must_use]
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Structured content.
    Json {
        /// The payload.
        json: Value,
    },
}

/// Result of a `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if takes fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Encodes a successful payload in the requested format.
    #[must_use]
    pub fn formatted(payload: &Value, format: ResponseFormat) -> Self {
        let content = match format {
            ResponseFormat::Text => vec![ToolContent::Text {
                text: payload_text(payload),
            }],
            ResponseFormat::Json => vec![ToolContent::Json {
                json: payload.clone(),
            }],
            ResponseFormat::Both => vec![
                ToolContent::Text {
                    text: payload_text(payload),
                },
                ToolContent::Json {
                    json: payload.clone(),
                },
            ],
        };
        Self {
            content,
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Serialises the result to JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Per-call control arguments carried inside `arguments`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallControls {
    /// Requested encoding.
    pub format: ResponseFormat,
    /// Run as a tracked background operation.
    pub async_mode: bool,
}

impl CallControls {
    /// Removes `response_format` and `async_mode` from `arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidParams`] for an unknown format name or a
    /// non-boolean `async_mode`.
    pub fn extract(arguments: &mut Map<String, Value>, default_format: ResponseFormat) -> Result<Self, ToolError> {
        let format = match arguments.remove("response_format") {
            None | Some(Value::Null) => default_format,
            Some(Value::String(name)) => ResponseFormat::parse(&name).ok_or_else(|| {
                ToolError::InvalidParams(format!(
                    "response_format must be one of text, json, both (got \"{name}\")"
                ))
            })?,
            Some(other) => {
                return Err(ToolError::InvalidParams(format!(
                    "response_format must be a string (got {other})"
                )))
            }
        };

        let async_mode = match arguments.remove("async_mode") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => b,
            Some(other) => {
                return Err(ToolError::InvalidParams(format!(
                    "async_mode must be a boolean (got {other})"
                )))
            }
        };

        Ok(Self { format, async_mode })
    }
}

/// Maps capability names to their handlers.
pub struct ToolRouter {
    registry: Arc<Registry>,
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    resources: RwLock<HashMap<String, Arc<dyn ResourceProvider>>>,
    prompts: RwLock<HashMap<String, Arc<dyn PromptProvider>>>,
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRouter")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ToolRouter {
    /// Creates a router over `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            tools: RwLock::new(HashMap::new()),
            resources: RwLock::new(HashMap::new()),
            prompts: RwLock::new(HashMap::new()),
        }
    }

    /// The registry this router serves.
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Registers a tool and its descriptor.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        let descriptor = tool.descriptor();
        let name = descriptor.name.clone();
        self.registry.register(descriptor);
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, tool);
    }

    /// Registers a resource and its descriptor.
    pub fn register_resource(&self, resource: Arc<dyn ResourceProvider>) {
        let descriptor = resource.descriptor();
        let uri = descriptor.name.clone();
        self.registry.register(descriptor);
        self.resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri, resource);
    }

    /// Registers a prompt template and its descriptor.
    pub fn register_prompt(&self, prompt: Arc<dyn PromptProvider>) {
        let descriptor = prompt.descriptor();
        let name = descriptor.name.clone();
        self.registry.register(descriptor);
        self.prompts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, prompt);
    }

    /// Looks up a tool descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] if no tool has this name.
    pub fn descriptor(&self, name: &str) -> Result<Arc<CapabilityDescriptor>, ToolError> {
        self.registry
            .get(CapabilityKind::Tool, name)
            .ok_or_else(|| ToolError::tool_not_found(name))
    }

    /// Validates and coerces arguments for a tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] for unknown tools and
    /// [`ToolError::InvalidArguments`] when validation fails.
    pub fn validate(&self, name: &str, raw: &Value) -> Result<Map<String, Value>, ToolError> {
        let descriptor = self.descriptor(name)?;
        let report = validate_arguments(name, &descriptor.input_schema, raw);
        if report.valid {
            Ok(report.cleaned_arguments)
        } else {
            tracing::warn!(tool = %name, errors = %report.summary(), "Argument validation failed");
            Err(ToolError::InvalidArguments(report))
        }
    }

    /// Validates then executes a tool.
    ///
    /// # Errors
    ///
    /// Propagates validation, lookup and handler errors.
    pub async fn call(&self, name: &str, raw: &Value) -> Result<Value, ToolError> {
        let arguments = self.validate(name, raw)?;
        self.execute(name, arguments).await
    }

    /// Executes a tool with arguments that were already validated.
    ///
    /// # Errors
    ///
    /// Propagates lookup and handler errors.
    pub async fn execute(&self, name: &str, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let tool = self.tool(name)?;
        tracing::info!(tool = %name, "Executing tool");
        tool.call(arguments).await
    }

    /// Packages a tool invocation as a detachable future.
    ///
    /// # Errors
    ///
    /// Propagates lookup errors.
    pub fn detached(&self, name: &str, arguments: Map<String, Value>) -> Result<OperationFuture, ToolError> {
        let tool = self.tool(name)?;
        Ok(Box::pin(async move { tool.call(arguments).await }))
    }

    /// Reads a resource by URI and wraps it in a `contents` list.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] for unknown URIs.
    pub async fn read_resource(&self, uri: &str) -> Result<Value, ToolError> {
        let descriptor = self
            .registry
            .get(CapabilityKind::Resource, uri)
            .ok_or_else(|| ToolError::NotFound {
                kind: CapabilityKind::Resource,
                name: uri.to_string(),
            })?;

        let provider = self
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
            .ok_or_else(|| ToolError::NotImplemented {
                kind: CapabilityKind::Resource,
                name: uri.to_string(),
            })?;

        let text = provider.read().await?;
        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": descriptor.mime_type,
                "text": text,
            }]
        }))
    }

    /// Renders a prompt template.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] for unknown prompts and
    /// [`ToolError::InvalidArguments`] when required arguments are missing.
    pub async fn get_prompt(&self, name: &str, raw: &Value) -> Result<Value, ToolError> {
        let descriptor = self
            .registry
            .get(CapabilityKind::Prompt, name)
            .ok_or_else(|| ToolError::NotFound {
                kind: CapabilityKind::Prompt,
                name: name.to_string(),
            })?;

        let report = validate_arguments(name, &descriptor.input_schema, raw);
        if !report.valid {
            return Err(ToolError::InvalidArguments(report));
        }

        let provider = self
            .prompts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotImplemented {
                kind: CapabilityKind::Prompt,
                name: name.to_string(),
            })?;

        let messages = provider.render(report.cleaned_arguments).await?;
        Ok(json!({
            "description": descriptor.description,
            "messages": messages,
        }))
    }

    fn tool(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.descriptor(name)?;
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotImplemented {
                kind: CapabilityKind::Tool,
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InputSchema, PropertySchema};

    fn echo_tool() -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            CapabilityDescriptor::tool(
                "echo",
                "Echoes its input",
                InputSchema::object().required_property("n", PropertySchema::integer("A number")),
            ),
            |args| Ok(json!({"n": args["n"]})),
        ))
    }

    fn router() -> ToolRouter {
        let router = ToolRouter::new(Arc::new(Registry::new()));
        router.register_tool(echo_tool());
        router
    }

    #[tokio::test]
    async fn call_validates_and_coerces() {
        let router = router();
        let out = router.call("echo", &json!({"n": "7"})).await.unwrap();
        assert_eq!(out, json!({"n": 7}));
    }

    #[tokio::test]
    async fn call_rejects_invalid_arguments() {
        let router = router();
        let err = router.call("echo", &json!({"n": "seven"})).await.unwrap_err();
        match err {
            ToolError::InvalidArguments(report) => assert_eq!(report.errors[0].field, "n"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let err = router().call("nope", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound { kind: CapabilityKind::Tool, .. }));
    }

    #[tokio::test]
    async fn descriptor_without_handler_is_not_implemented() {
        let router = router();
        router.registry().register(CapabilityDescriptor::tool(
            "ghost",
            "Registered without a handler",
            InputSchema::object(),
        ));
        let err = router.call("ghost", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotImplemented { .. }));
    }

    #[tokio::test]
    async fn detached_future_runs_tool() {
        let router = router();
        let mut args = Map::new();
        args.insert("n".to_string(), json!(3));
        let fut = router.detached("echo", args).unwrap();
        assert_eq!(fut.await.unwrap(), json!({"n": 3}));
    }

    #[test]
    fn formats_encode_payload() {
        let payload = json!({"result": 5});

        let text = ToolCallResult::formatted(&payload, ResponseFormat::Text).to_value();
        assert_eq!(text["content"][0]["type"], "text");
        assert!(text["content"][0]["text"].as_str().unwrap().contains("\"result\": 5"));
        assert!(text.get("isError").is_none());

        let structured = ToolCallResult::formatted(&payload, ResponseFormat::Json).to_value();
        assert_eq!(structured["content"][0]["type"], "json");
        assert_eq!(structured["content"][0]["json"], payload);

        let both = ToolCallResult::formatted(&payload, ResponseFormat::Both);
        assert_eq!(both.content.len(), 2);
    }

    #[test]
    fn render_matches_format() {
        let payload = json!({"a": 1});
        assert_eq!(ResponseFormat::Json.render(&payload), payload);
        assert!(ResponseFormat::Text.render(&payload).is_string());
        assert_eq!(ResponseFormat::Both.render(&payload)["json"], payload);
        assert_eq!(ResponseFormat::Text.render(&json!("plain")), json!("plain"));
    }

    #[test]
    fn controls_are_stripped() {
        let mut args = json!({"a": 1, "response_format": "both", "async_mode": true})
            .as_object()
            .cloned()
            .unwrap();
        let controls = CallControls::extract(&mut args, ResponseFormat::Text).unwrap();
        assert_eq!(controls.format, ResponseFormat::Both);
        assert!(controls.async_mode);
        assert_eq!(args.len(), 1);

        let mut bad = json!({"response_format": "xml"}).as_object().cloned().unwrap();
        assert!(CallControls::extract(&mut bad, ResponseFormat::Text).is_err());
    }

    #[test]
    fn controls_default_when_absent() {
        let mut args = Map::new();
        let controls = CallControls::extract(&mut args, ResponseFormat::Json).unwrap();
        assert_eq!(controls.format, ResponseFormat::Json);
        assert!(!controls.async_mode);
    }
}
