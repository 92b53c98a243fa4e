//! Built-in resources.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{now_rfc3339, SystemContext};
use crate::error::ToolError;
use crate::mcp::protocol::{MCP_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};
use crate::mcp::router::ResourceProvider;
use crate::registry::{CapabilityDescriptor, CapabilityKind};

fn pretty(value: &serde_json::Value) -> Result<String, ToolError> {
    serde_json::to_string_pretty(value).map_err(|e| ToolError::execution(e.to_string()))
}

/// `system://status/runtime`
#[derive(Debug)]
pub struct RuntimeStatus {
    context: Arc<SystemContext>,
}

impl RuntimeStatus {
    /// Creates the resource.
    #[must_use]
    pub const fn new(context: Arc<SystemContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ResourceProvider for RuntimeStatus {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::resource(
            "system://status/runtime",
            "Runtime Status",
            "Current runtime status and metrics",
            "application/json",
        )
    }

    async fn read(&self) -> Result<String, ToolError> {
        let ctx = &self.context;
        let operations = ctx.operations.len().await;
        pretty(&json!({
            "server": {
                "name": ctx.server_name,
                "version": env!("CARGO_PKG_VERSION"),
                "status": "operational",
                "uptime_seconds": ctx.uptime_secs(),
            },
            "mcp": {
                "protocol_version": MCP_PROTOCOL_VERSION,
                "tools_loaded": ctx.registry.count(CapabilityKind::Tool),
                "resources_loaded": ctx.registry.count(CapabilityKind::Resource),
                "prompts_loaded": ctx.registry.count(CapabilityKind::Prompt),
                "operations_tracked": operations,
            },
            "timestamp": now_rfc3339(),
        }))
    }
}

/// `system://config/capabilities`
#[derive(Debug)]
pub struct Capabilities {
    context: Arc<SystemContext>,
}

impl Capabilities {
    /// Creates the resource.
    #[must_use]
    pub const fn new(context: Arc<SystemContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ResourceProvider for Capabilities {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::resource(
            "system://config/capabilities",
            "System Capabilities",
            "Available capabilities and protocol versions",
            "application/json",
        )
    }

    async fn read(&self) -> Result<String, ToolError> {
        let registry = &self.context.registry;
        let names = |kind| -> Vec<String> {
            registry.list(kind).iter().map(|d| d.name.clone()).collect()
        };
        pretty(&json!({
            "protocol_version": MCP_PROTOCOL_VERSION,
            "supported_versions": SUPPORTED_PROTOCOL_VERSIONS,
            "available_tools": names(CapabilityKind::Tool),
            "available_resources": names(CapabilityKind::Resource),
            "available_prompts": names(CapabilityKind::Prompt),
            "timestamp": now_rfc3339(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::operations::OperationManager;
    use crate::registry::Registry;

    fn context() -> Arc<SystemContext> {
        Arc::new(SystemContext::new(
            Arc::new(Registry::new()),
            Arc::new(OperationManager::new()),
            "test",
        ))
    }

    #[tokio::test]
    async fn runtime_status_is_json() {
        let text = RuntimeStatus::new(context()).read().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["server"]["name"], "test");
        assert_eq!(value["mcp"]["operations_tracked"], 0);
    }

    #[tokio::test]
    async fn capabilities_lists_registered_names() {
        let ctx = context();
        let resource = Capabilities::new(Arc::clone(&ctx));
        ctx.registry.register(resource.descriptor());

        let text = resource.read().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value["available_resources"],
            json!(["system://config/capabilities"])
        );
    }
}
