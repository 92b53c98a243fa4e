//! Protocol session lifecycle.
//!
//! A session tracks one client connection through the MCP handshake:
//!
//! 1. **AwaitingInit**: nothing received yet
//! 2. **Initialising**: `initialize` answered, waiting for `notifications/initialized`
//! 3. **Running**: normal operation
//! 4. **ShuttingDown**: transport closed or signal received
//!
//! Gating is opt-in. With `require_initialize` unset, every method is
//! accepted in every state and the handshake only negotiates versions.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mcp::protocol::{
    ErrorCode, JsonRpcErrorData, MCP_PROTOCOL_VERSION, SERVER_NAME, SUPPORTED_PROTOCOL_VERSIONS,
};

/// Session state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListCapability>,
    /// Resource-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceCapabilities>,
    /// Prompt-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListCapability>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ListCapability::default()),
            resources: Some(ResourceCapabilities::default()),
            prompts: Some(ListCapability::default()),
        }
    }
}

/// Capability flags shared by tools and prompts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCapability {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Resource capability flags.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapabilities {
    /// Whether clients may subscribe to resource updates.
    #[serde(skip_serializing_if = "is_false")]
    pub subscribe: bool,
    /// Whether the list can change during the session.
    #[serde(skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self::named(SERVER_NAME)
    }
}

impl ServerInfo {
    /// Server info with a custom name and the crate version.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Result of a successful `initialize`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
    /// Server identity.
    pub server_info: ServerInfo,
}

/// Picks the protocol version to answer with.
///
/// A supported client version is echoed back. Anything else gets the newest
/// version this server speaks, leaving the client to decide whether to
/// continue.
#[must_use]
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|v| *v == requested)
        .unwrap_or(MCP_PROTOCOL_VERSION)
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    protocol_version: Option<String>,
    client_info: Option<ClientInfo>,
}

/// One client's view of the protocol handshake.
#[derive(Debug)]
pub struct Session {
    inner: Mutex<Inner>,
    server_info: ServerInfo,
    require_initialize: bool,
}

impl Session {
    /// Creates a session in the `AwaitingInit` state.
    #[must_use]
    pub fn new(server_info: ServerInfo, require_initialize: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::AwaitingInit,
                protocol_version: None,
                client_info: None,
            }),
            server_info,
            require_initialize,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Protocol version agreed during `initialize`.
    #[must_use]
    pub fn protocol_version(&self) -> Option<String> {
        self.lock().protocol_version.clone()
    }

    /// Client identity sent during `initialize`.
    #[must_use]
    pub fn client_info(&self) -> Option<ClientInfo> {
        self.lock().client_info.clone()
    }

    /// Handles the `initialize` request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the session was already initialised and
    /// `InvalidParams` if the params are missing or malformed.
    pub fn initialize(&self, params: Option<&Value>) -> Result<InitializeResult, JsonRpcErrorData> {
        let params: InitializeParams = params
            .filter(|p| !p.is_null())
            .ok_or_else(|| {
                JsonRpcErrorData::with_message(ErrorCode::InvalidParams, "Missing initialize params")
            })
            .and_then(|p| {
                serde_json::from_value(p.clone()).map_err(|e| {
                    JsonRpcErrorData::with_message(
                        ErrorCode::InvalidParams,
                        format!("Invalid initialize params: {e}"),
                    )
                })
            })?;

        let mut inner = self.lock();
        if inner.state != SessionState::AwaitingInit {
            return Err(JsonRpcErrorData::with_message(
                ErrorCode::InvalidRequest,
                "Server already initialised",
            ));
        }

        let negotiated = negotiate_version(&params.protocol_version);
        tracing::info!(
            requested = %params.protocol_version,
            negotiated,
            client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
            "Initialising session"
        );

        inner.protocol_version = Some(negotiated.to_string());
        inner.client_info = params.client_info;
        inner.state = SessionState::Initialising;
        drop(inner);

        Ok(InitializeResult {
            protocol_version: negotiated.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: self.server_info.clone(),
        })
    }

    /// Handles the `notifications/initialized` notification.
    pub fn initialized(&self) {
        let mut inner = self.lock();
        if inner.state == SessionState::Initialising {
            inner.state = SessionState::Running;
            tracing::debug!("Session running");
        }
    }

    /// Marks the session as shutting down.
    pub fn shutdown(&self) {
        self.lock().state = SessionState::ShuttingDown;
    }

    /// Ensures the session may serve `method`.
    ///
    /// Always succeeds unless handshake enforcement is enabled. The handshake
    /// methods and `ping` are accepted in every state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when enforcement is on and the session is not
    /// `Running`.
    pub fn require_running(&self, method: &str) -> Result<(), JsonRpcErrorData> {
        if !self.require_initialize || matches!(
            method,
            "initialize" | "notifications/initialized" | "ping"
        ) {
            return Ok(());
        }
        if self.state() != SessionState::Running {
            return Err(JsonRpcErrorData::with_message(
                ErrorCode::InvalidRequest,
                "Server not initialised",
            ));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn init_params(version: &str) -> Value {
        json!({
            "protocolVersion": version,
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0"}
        })
    }

    #[test]
    fn negotiation_echoes_supported_versions() {
        assert_eq!(negotiate_version("2024-11-05"), "2024-11-05");
        assert_eq!(negotiate_version("2025-03-26"), "2025-03-26");
        assert_eq!(negotiate_version("1999-01-01"), MCP_PROTOCOL_VERSION);
    }

    #[test]
    fn initialize_moves_to_initialising() {
        let session = Session::new(ServerInfo::default(), false);
        let result = session.initialize(Some(&init_params("2024-11-05"))).unwrap();
        assert_eq!(result.protocol_version, "2024-11-05");
        assert_eq!(session.state(), SessionState::Initialising);
        assert_eq!(session.client_info().unwrap().name, "test-client");

        session.initialized();
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn initialize_result_serialises_camel_case() {
        let session = Session::new(ServerInfo::named("custom"), false);
        let result = session.initialize(Some(&init_params("2025-06-18"))).unwrap();
        let value = serde_json::to_value(result).unwrap();
        assert_eq!(value["protocolVersion"], "2025-06-18");
        assert_eq!(value["serverInfo"]["name"], "custom");
        assert!(value["capabilities"]["tools"].is_object());
        assert!(value["capabilities"]["resources"].is_object());
        assert!(value["capabilities"]["prompts"].is_object());
    }

    #[test]
    fn double_initialize_rejected() {
        let session = Session::new(ServerInfo::default(), false);
        session.initialize(Some(&init_params("2024-11-05"))).unwrap();
        let err = session.initialize(Some(&init_params("2024-11-05"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn missing_params_rejected() {
        let session = Session::new(ServerInfo::default(), false);
        let err = session.initialize(None).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams.code());
        assert_eq!(session.state(), SessionState::AwaitingInit);
    }

    #[test]
    fn gating_is_off_by_default() {
        let session = Session::new(ServerInfo::default(), false);
        assert!(session.require_running("tools/list").is_ok());
    }

    #[test]
    fn gating_enforced_when_required() {
        let session = Session::new(ServerInfo::default(), true);
        assert!(session.require_running("tools/list").is_err());
        assert!(session.require_running("ping").is_ok());

        session.initialize(Some(&init_params("2024-11-05"))).unwrap();
        assert!(session.require_running("tools/list").is_err());
        assert!(session.require_running("notifications/initialized").is_ok());

        session.initialized();
        assert!(session.require_running("tools/list").is_ok());
    }
}
