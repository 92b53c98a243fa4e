//! Built-in capabilities.
//!
//! - [`math`]: `add_numbers`
//! - [`system`]: `system_health`, `system_status`, `system_config`
//! - [`operations`]: tools that inspect and cancel async operations
//! - [`resources`]: `system://status/runtime`, `system://config/capabilities`
//! - [`prompts`]: `system_analysis`, `troubleshooting`

pub mod math;
pub mod operations;
pub mod prompts;
pub mod resources;
pub mod system;

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::mcp::operations::OperationManager;
use crate::mcp::router::ToolRouter;
use crate::registry::Registry;

/// Shared runtime facts the system tools report on.
#[derive(Debug)]
pub struct SystemContext {
    /// Capability table.
    pub registry: Arc<Registry>,
    /// Async operation table.
    pub operations: Arc<OperationManager>,
    /// Name reported by status tools.
    pub server_name: String,
    started: Instant,
}

impl SystemContext {
    /// Captures the start time now.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        operations: Arc<OperationManager>,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            operations,
            server_name: server_name.into(),
            started: Instant::now(),
        }
    }

    /// Whole seconds since construction.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Registers every built-in tool, resource and prompt with `router`.
pub fn register_builtins(router: &ToolRouter, context: &Arc<SystemContext>) {
    router.register_tool(Arc::new(math::AddNumbers));

    router.register_tool(Arc::new(system::SystemHealth::new(Arc::clone(context))));
    router.register_tool(Arc::new(system::SystemStatus::new(Arc::clone(context))));
    router.register_tool(Arc::new(system::SystemConfig::new(Arc::clone(context))));

    let ops = &context.operations;
    router.register_tool(Arc::new(operations::OperationStatusTool::new(Arc::clone(ops))));
    router.register_tool(Arc::new(operations::OperationResultTool::new(Arc::clone(ops))));
    router.register_tool(Arc::new(operations::ListOperationsTool::new(Arc::clone(ops))));
    router.register_tool(Arc::new(operations::CancelOperationTool::new(Arc::clone(ops))));

    router.register_resource(Arc::new(resources::RuntimeStatus::new(Arc::clone(context))));
    router.register_resource(Arc::new(resources::Capabilities::new(Arc::clone(context))));

    router.register_prompt(Arc::new(prompts::SystemAnalysis));
    router.register_prompt(Arc::new(prompts::Troubleshooting));

    tracing::debug!(
        tools = router.registry().count(crate::registry::CapabilityKind::Tool),
        "Registered built-in capabilities"
    );
}

fn required_i64(arguments: &Map<String, Value>, name: &str) -> Result<i64, ToolError> {
    arguments
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| ToolError::InvalidParams(format!("{name} must be a 64-bit integer")))
}

fn required_str<'a>(arguments: &'a Map<String, Value>, name: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidParams(format!("missing required argument: {name}")))
}

fn optional_str<'a>(arguments: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    arguments.get(name).and_then(Value::as_str)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CapabilityKind;

    #[test]
    fn builtins_populate_every_kind() {
        let registry = Arc::new(Registry::new());
        let router = ToolRouter::new(Arc::clone(&registry));
        let context = Arc::new(SystemContext::new(
            Arc::clone(&registry),
            Arc::new(OperationManager::new()),
            "test",
        ));
        register_builtins(&router, &context);

        assert_eq!(registry.count(CapabilityKind::Tool), 8);
        assert_eq!(registry.count(CapabilityKind::Resource), 2);
        assert_eq!(registry.count(CapabilityKind::Prompt), 2);

        let add = registry.get(CapabilityKind::Tool, "add_numbers").unwrap();
        assert!(add.supports_async);
        let status = registry.get(CapabilityKind::Tool, "operation_status").unwrap();
        assert!(!status.supports_async);
    }
}
