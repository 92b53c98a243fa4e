//! System introspection tools.
//!
//! These report on the running server itself: registry contents, async
//! operation counts and uptime.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{now_rfc3339, optional_str, required_str, SystemContext};
use crate::error::ToolError;
use crate::mcp::operations::OperationStatus;
use crate::mcp::protocol::{MCP_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};
use crate::mcp::router::Tool;
use crate::registry::{CapabilityDescriptor, CapabilityKind, InputSchema, PropertySchema};

const COMPONENTS: [&str; 4] = ["server", "registry", "operations", "all"];

const CONFIG_KEYS: [&str; 7] = [
    "mcp.protocol_version",
    "mcp.supported_versions",
    "mcp.capabilities.tools",
    "mcp.capabilities.resources",
    "mcp.capabilities.prompts",
    "server.name",
    "server.version",
];

async fn operation_counts(context: &SystemContext) -> Map<String, Value> {
    let operations = context.operations.list(None).await;
    OperationStatus::ALL
        .into_iter()
        .map(|status| {
            let n = operations.iter().filter(|op| op.status == status).count();
            (status.to_string(), Value::from(n))
        })
        .collect()
}

fn capability_counts(context: &SystemContext) -> Value {
    let registry = &context.registry;
    json!({
        "tools_available": registry.count(CapabilityKind::Tool),
        "resources_available": registry.count(CapabilityKind::Resource),
        "prompts_available": registry.count(CapabilityKind::Prompt),
    })
}

/// `system_health`: health checks with configurable detail.
#[derive(Debug)]
pub struct SystemHealth {
    context: Arc<SystemContext>,
}

impl SystemHealth {
    /// Creates the tool.
    #[must_use]
    pub const fn new(context: Arc<SystemContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for SystemHealth {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::tool(
            "system_health",
            "Comprehensive system health analysis with configurable detail levels",
            InputSchema::object()
                .required_property(
                    "component",
                    PropertySchema::string("System component to analyse").one_of(COMPONENTS),
                )
                .optional_property(
                    "detail_level",
                    PropertySchema::string("Level of detail in the health report")
                        .one_of(["basic", "detailed", "diagnostic"])
                        .with_default("basic"),
                )
                .optional_property(
                    "include_logs",
                    PropertySchema::boolean("Include recent operation activity in the report")
                        .with_default(false),
                ),
        )
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let component = required_str(&arguments, "component")?;
        let detail_level = optional_str(&arguments, "detail_level").unwrap_or("basic");
        let include_logs = arguments
            .get("include_logs")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let ctx = &self.context;
        let counts = operation_counts(ctx).await;
        let tools = ctx.registry.count(CapabilityKind::Tool);
        let failed = counts.get("failed").and_then(Value::as_u64).unwrap_or(0);

        let mut report = json!({
            "timestamp": now_rfc3339(),
            "component": component,
            "detail_level": detail_level,
            "status": if tools == 0 { "degraded" } else { "healthy" },
            "checks": {
                "registry": if tools == 0 { "empty" } else { "loaded" },
                "operations": if failed == 0 { "clean" } else { "failures_recorded" },
            },
        });

        if matches!(detail_level, "detailed" | "diagnostic") {
            report["metrics"] = json!({
                "uptime_seconds": ctx.uptime_secs(),
                "capabilities": capability_counts(ctx),
                "operations": counts,
            });
        }

        if detail_level == "diagnostic" {
            report["diagnostics"] = json!({
                "protocol_version": MCP_PROTOCOL_VERSION,
                "supported_versions": SUPPORTED_PROTOCOL_VERSIONS,
                "registry_generation": ctx.registry.generation(),
            });
        }

        if include_logs {
            let recent: Vec<Value> = ctx
                .operations
                .list(None)
                .await
                .iter()
                .rev()
                .take(5)
                .map(|op| {
                    json!({
                        "operation_id": op.operation_id,
                        "tool_name": op.tool_name,
                        "status": op.status,
                        "created_at": op.created_at,
                    })
                })
                .collect();
            report["recent_activity"] = Value::Array(recent);
        }

        Ok(report)
    }
}

/// `system_status`: operational status of a component.
#[derive(Debug)]
pub struct SystemStatus {
    context: Arc<SystemContext>,
}

impl SystemStatus {
    /// Creates the tool.
    #[must_use]
    pub const fn new(context: Arc<SystemContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for SystemStatus {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::tool(
            "system_status",
            "Get current operational status of system components",
            InputSchema::object()
                .required_property(
                    "component",
                    PropertySchema::string("Component to check status for").one_of(COMPONENTS),
                )
                .optional_property(
                    "format",
                    PropertySchema::string("Status report format")
                        .one_of(["summary", "detailed", "json"])
                        .with_default("summary"),
                ),
        )
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let component = required_str(&arguments, "component")?;
        let format = optional_str(&arguments, "format").unwrap_or("summary");
        let ctx = &self.context;

        let mut status = json!({
            "timestamp": now_rfc3339(),
            "component": component,
            "status": "operational",
            "server": ctx.server_name,
            "version": env!("CARGO_PKG_VERSION"),
        });

        if format != "summary" {
            status["capabilities"] = capability_counts(ctx);
            status["operations"] = Value::Object(operation_counts(ctx).await);
            status["uptime_seconds"] = json!(ctx.uptime_secs());
        }

        Ok(status)
    }
}

/// `system_config`: read-only access to server configuration values.
#[derive(Debug)]
pub struct SystemConfig {
    context: Arc<SystemContext>,
}

impl SystemConfig {
    /// Creates the tool.
    #[must_use]
    pub const fn new(context: Arc<SystemContext>) -> Self {
        Self { context }
    }

    fn value_of(&self, key: &str) -> Option<Value> {
        let value = match key {
            "mcp.protocol_version" => json!(MCP_PROTOCOL_VERSION),
            "mcp.supported_versions" => json!(SUPPORTED_PROTOCOL_VERSIONS),
            "mcp.capabilities.tools" | "mcp.capabilities.resources" | "mcp.capabilities.prompts" => {
                json!(true)
            }
            "server.name" => json!(self.context.server_name),
            "server.version" => json!(env!("CARGO_PKG_VERSION")),
            _ => return None,
        };
        Some(value)
    }
}

#[async_trait]
impl Tool for SystemConfig {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::tool(
            "system_config",
            "Access system configuration",
            InputSchema::object()
                .required_property(
                    "action",
                    PropertySchema::string("Configuration action to perform")
                        .one_of(["get", "list", "validate"]),
                )
                .optional_property(
                    "config_key",
                    PropertySchema::string("Configuration key (for the get action)"),
                ),
        )
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let action = required_str(&arguments, "action")?;
        let mut out = json!({
            "action": action,
            "timestamp": now_rfc3339(),
        });

        match action {
            "list" => out["available_configs"] = json!(CONFIG_KEYS),
            "get" => {
                let key = optional_str(&arguments, "config_key").ok_or_else(|| {
                    ToolError::InvalidParams("config_key is required for the get action".to_string())
                })?;
                out["config"] = json!({ key: self.value_of(key) });
                out["found"] = json!(self.value_of(key).is_some());
            }
            "validate" => {
                let missing: Vec<&str> = CONFIG_KEYS
                    .iter()
                    .copied()
                    .filter(|k| self.value_of(k).is_none())
                    .collect();
                out["validation"] = json!({
                    "status": if missing.is_empty() { "valid" } else { "invalid" },
                    "checks_passed": CONFIG_KEYS.len() - missing.len(),
                    "missing": missing,
                });
            }
            other => {
                return Err(ToolError::InvalidParams(format!("unknown action: {other}")));
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::operations::OperationManager;
    use crate::registry::Registry;

    fn context() -> Arc<SystemContext> {
        let registry = Arc::new(Registry::new());
        registry.register(CapabilityDescriptor::tool("t", "t", InputSchema::object()));
        Arc::new(SystemContext::new(
            registry,
            Arc::new(OperationManager::new()),
            "test-server",
        ))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn health_basic_omits_metrics() {
        let tool = SystemHealth::new(context());
        let out = tool
            .call(args(json!({"component": "all", "detail_level": "basic"})))
            .await
            .unwrap();
        assert_eq!(out["status"], "healthy");
        assert!(out.get("metrics").is_none());
        assert!(out.get("recent_activity").is_none());
    }

    #[tokio::test]
    async fn health_diagnostic_adds_sections() {
        let tool = SystemHealth::new(context());
        let out = tool
            .call(args(json!({
                "component": "server",
                "detail_level": "diagnostic",
                "include_logs": true
            })))
            .await
            .unwrap();
        assert_eq!(out["metrics"]["capabilities"]["tools_available"], 1);
        assert_eq!(out["diagnostics"]["protocol_version"], MCP_PROTOCOL_VERSION);
        assert!(out["recent_activity"].is_array());
    }

    #[tokio::test]
    async fn status_detailed_reports_counts() {
        let tool = SystemStatus::new(context());
        let out = tool
            .call(args(json!({"component": "all", "format": "detailed"})))
            .await
            .unwrap();
        assert_eq!(out["server"], "test-server");
        assert_eq!(out["operations"]["pending"], 0);
    }

    #[tokio::test]
    async fn config_get_known_and_unknown_keys() {
        let tool = SystemConfig::new(context());
        let out = tool
            .call(args(json!({"action": "get", "config_key": "server.name"})))
            .await
            .unwrap();
        assert_eq!(out["config"]["server.name"], "test-server");
        assert_eq!(out["found"], true);

        let out = tool
            .call(args(json!({"action": "get", "config_key": "nope"})))
            .await
            .unwrap();
        assert_eq!(out["found"], false);
    }

    #[tokio::test]
    async fn config_get_requires_key() {
        let tool = SystemConfig::new(context());
        let err = tool.call(args(json!({"action": "get"}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn config_list_and_validate() {
        let tool = SystemConfig::new(context());
        let out = tool.call(args(json!({"action": "list"}))).await.unwrap();
        assert_eq!(out["available_configs"].as_array().unwrap().len(), CONFIG_KEYS.len());

        let out = tool.call(args(json!({"action": "validate"}))).await.unwrap();
        assert_eq!(out["validation"]["status"], "valid");
    }
}
