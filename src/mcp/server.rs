//! MCP method catalog and stdio server.
//!
//! [`McpService`] binds the session, the tool router and the operation
//! manager to the MCP methods:
//!
//! | Method                      | Handler                                   |
//! |-----------------------------|-------------------------------------------|
//! | `initialize`                | version negotiation                       |
//! | `notifications/initialized` | session moves to `Running`                |
//! | `ping`                      | empty result                              |
//! | `tools/list`, `tools/call`  | registry projection, router execution     |
//! | `resources/list`, `resources/read` | registry projection, resource read |
//! | `prompts/list`, `prompts/get`      | registry projection, prompt render |
//!
//! [`McpServer`] runs the service over stdio until EOF or a shutdown signal.

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader, Stdin, Stdout};

use crate::config::Config;
use crate::error::ToolError;
use crate::mcp::dispatcher::{DispatchOutput, Dispatcher};
use crate::mcp::operations::OperationManager;
use crate::mcp::protocol::{ErrorCode, JsonRpcError, JsonRpcErrorData};
use crate::mcp::router::{CallControls, ResponseFormat, ToolCallResult, ToolRouter};
use crate::mcp::session::{ServerInfo, Session, SessionState};
use crate::mcp::transport::{Inbound, LineTransport, StdioTransport};
use crate::registry::{CapabilityKind, Registry};
use crate::tools::{register_builtins, SystemContext};

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Parameters for resources/read request.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceReadParams {
    /// URI of the resource.
    pub uri: String,
}

/// Parameters for prompts/get request.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptGetParams {
    /// Name of the prompt template.
    pub name: String,
    /// Template arguments.
    #[serde(default)]
    pub arguments: Value,
}

fn parse_params<T: for<'de> Deserialize<'de>>(
    params: Option<Value>,
    method: &str,
) -> Result<T, JsonRpcErrorData> {
    let params = params.filter(|p| !p.is_null()).ok_or_else(|| {
        JsonRpcErrorData::with_message(ErrorCode::InvalidParams, format!("Missing {method} params"))
    })?;
    serde_json::from_value(params).map_err(|e| {
        JsonRpcErrorData::with_message(
            ErrorCode::InvalidParams,
            format!("Invalid {method} params: {e}"),
        )
    })
}

fn rpc_error(error: &ToolError) -> JsonRpcErrorData {
    JsonRpcErrorData::from(error)
}

/// The MCP method catalog for one connection.
#[derive(Debug)]
pub struct McpService {
    router: Arc<ToolRouter>,
    operations: Arc<OperationManager>,
    session: Session,
}

impl McpService {
    /// Creates a service over existing components.
    #[must_use]
    pub const fn new(
        router: Arc<ToolRouter>,
        operations: Arc<OperationManager>,
        session: Session,
    ) -> Self {
        Self {
            router,
            operations,
            session,
        }
    }

    /// Builds a registry, router and operation manager populated with the
    /// built-in capabilities.
    #[must_use]
    pub fn with_builtins(config: &Config) -> Self {
        let registry = Arc::new(Registry::new());
        let operations = Arc::new(OperationManager::new());
        let router = Arc::new(ToolRouter::new(Arc::clone(&registry)));
        let context = Arc::new(SystemContext::new(
            registry,
            Arc::clone(&operations),
            config.server.name.clone(),
        ));
        register_builtins(&router, &context);

        let session = Session::new(
            ServerInfo::named(config.server.name.clone()),
            config.session.require_initialize,
        );
        Self::new(router, operations, session)
    }

    /// The tool router.
    #[must_use]
    pub const fn router(&self) -> &Arc<ToolRouter> {
        &self.router
    }

    /// The async operation manager.
    #[must_use]
    pub const fn operations(&self) -> &Arc<OperationManager> {
        &self.operations
    }

    /// The protocol session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Builds a dispatcher serving this service's methods.
    #[must_use]
    pub fn dispatcher(self: &Arc<Self>) -> Dispatcher {
        let mut dispatcher = Dispatcher::new();

        self.route(&mut dispatcher, "initialize", |svc, params| async move {
            let result = svc.session.initialize(params.as_ref())?;
            serde_json::to_value(result).map_err(|e| {
                JsonRpcErrorData::with_message(ErrorCode::InternalError, e.to_string())
            })
        });
        self.route(&mut dispatcher, "notifications/initialized", |svc, _| async move {
            svc.session.initialized();
            Ok(Value::Null)
        });
        self.route(&mut dispatcher, "ping", |_, _| async { Ok(json!({})) });

        self.route(&mut dispatcher, "tools/list", |svc, _| async move {
            Ok(json!({"tools": svc.listing(CapabilityKind::Tool)}))
        });
        self.route(&mut dispatcher, "tools/call", |svc, params| async move {
            svc.tools_call(params).await
        });

        self.route(&mut dispatcher, "resources/list", |svc, _| async move {
            Ok(json!({"resources": svc.listing(CapabilityKind::Resource)}))
        });
        self.route(&mut dispatcher, "resources/read", |svc, params| async move {
            let params: ResourceReadParams = parse_params(params, "resources/read")?;
            svc.router
                .read_resource(&params.uri)
                .await
                .map_err(|e| rpc_error(&e))
        });

        self.route(&mut dispatcher, "prompts/list", |svc, _| async move {
            Ok(json!({"prompts": svc.listing(CapabilityKind::Prompt)}))
        });
        self.route(&mut dispatcher, "prompts/get", |svc, params| async move {
            let params: PromptGetParams = parse_params(params, "prompts/get")?;
            svc.router
                .get_prompt(&params.name, &params.arguments)
                .await
                .map_err(|e| rpc_error(&e))
        });

        let svc = Arc::clone(self);
        dispatcher.set_guard(move |method| svc.session.require_running(method));

        dispatcher
    }

    fn route<F, Fut>(self: &Arc<Self>, dispatcher: &mut Dispatcher, method: &str, handler: F)
    where
        F: Fn(Arc<Self>, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, JsonRpcErrorData>> + Send + 'static,
    {
        let svc = Arc::clone(self);
        dispatcher.register(method, move |params| handler(Arc::clone(&svc), params));
    }

    fn listing(&self, kind: CapabilityKind) -> Vec<Value> {
        self.router
            .registry()
            .list(kind)
            .iter()
            .map(|d| d.listing())
            .collect()
    }

    /// Handles `tools/call`.
    ///
    /// Protocol faults (unknown tool, bad arguments) become JSON-RPC errors.
    /// A handler that runs and fails yields a result with `isError: true`.
    async fn tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcErrorData> {
        let params: ToolCallParams = parse_params(params, "tools/call")?;
        let name = params.name.as_str();

        let mut arguments = match params.arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            _ => {
                return Err(JsonRpcErrorData::with_message(
                    ErrorCode::InvalidParams,
                    "arguments must be an object",
                ))
            }
        };

        let descriptor = self.router.descriptor(name).map_err(|e| rpc_error(&e))?;
        let controls =
            CallControls::extract(&mut arguments, ResponseFormat::Text).map_err(|e| rpc_error(&e))?;

        if controls.async_mode && !descriptor.supports_async {
            return Err(JsonRpcErrorData::with_message(
                ErrorCode::InvalidParams,
                format!("Tool {name} does not support async mode"),
            ));
        }

        let cleaned = self
            .router
            .validate(name, &Value::Object(arguments))
            .map_err(|e| rpc_error(&e))?;

        if controls.async_mode {
            let work = self
                .router
                .detached(name, cleaned.clone())
                .map_err(|e| rpc_error(&e))?;
            let operation_id = self
                .operations
                .start(name, Value::Object(cleaned), work)
                .await;
            let payload = json!({
                "operation_id": operation_id,
                "status": "pending",
                "tool_name": name,
            });
            return Ok(ToolCallResult::formatted(&payload, controls.format).to_value());
        }

        match self.router.execute(name, cleaned).await {
            Ok(payload) => Ok(ToolCallResult::formatted(&payload, controls.format).to_value()),
            Err(ToolError::Execution(message)) => {
                tracing::warn!(tool = %name, error = %message, "Tool execution failed");
                Ok(ToolCallResult::error(message).to_value())
            }
            Err(other) => Err(rpc_error(&other)),
        }
    }
}

/// The MCP server: an [`McpService`] driven over a line transport, stdio by
/// default.
pub struct McpServer<R = BufReader<Stdin>, W = Stdout> {
    service: Arc<McpService>,
    dispatcher: Dispatcher,
    transport: LineTransport<R, W>,
}

impl McpServer {
    /// Creates a server for `service` on stdin and stdout.
    #[must_use]
    pub fn new(service: Arc<McpService>) -> Self {
        Self::with_transport(service, StdioTransport::new())
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server for `service` on an arbitrary transport.
    pub fn with_transport(service: Arc<McpService>, transport: LineTransport<R, W>) -> Self {
        let dispatcher = service.dispatcher();
        Self {
            service,
            dispatcher,
            transport,
        }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.service.session().state()
    }

    /// Gives back the transport's writer.
    pub fn into_writer(self) -> W {
        self.transport.into_writer()
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        self.run_with_shutdown().await
    }

    /// Serves lines until end of input or shutdown, without signal handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve(&mut self) -> std::io::Result<()> {
        loop {
            let line_result = self.transport.read_line().await;
            if self.handle_transport_result(line_result).await? {
                return Ok(());
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    self.service.session().shutdown();
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    self.service.session().shutdown();
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    self.service.session().shutdown();
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        line_result: std::io::Result<Option<Inbound>>,
    ) -> std::io::Result<bool> {
        let output = match line_result? {
            None => {
                self.service.session().shutdown();
                return Ok(true);
            }
            Some(Inbound::NotUtf8) => {
                tracing::warn!("Discarding input line that is not valid UTF-8");
                Some(DispatchOutput::Single(JsonRpcError::parse_error().into()))
            }
            Some(Inbound::Line(line)) if line.trim().is_empty() => None,
            Some(Inbound::Line(line)) => self.handle_line(&line).await,
        };

        if let Some(output) = output {
            self.transport.write_output(&output).await?;
        }

        Ok(self.state() == SessionState::ShuttingDown)
    }

    /// Handles a single line of input.
    async fn handle_line(&self, line: &str) -> Option<DispatchOutput> {
        self.dispatcher.dispatch_str(line).await
    }
}
