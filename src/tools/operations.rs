//! Tools for inspecting and cancelling async operations.
//!
//! None of these can themselves run in async mode.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{optional_str, required_str};
use crate::error::ToolError;
use crate::mcp::operations::{OperationManager, OperationStatus};
use crate::mcp::router::Tool;
use crate::registry::{CapabilityDescriptor, InputSchema, PropertySchema};

fn operation_id_schema() -> InputSchema {
    InputSchema::object().required_property(
        "operation_id",
        PropertySchema::string("Identifier returned when the operation was started"),
    )
}

/// `operation_status`: snapshot of one operation.
#[derive(Debug)]
pub struct OperationStatusTool {
    operations: Arc<OperationManager>,
}

impl OperationStatusTool {
    /// Creates the tool.
    #[must_use]
    pub const fn new(operations: Arc<OperationManager>) -> Self {
        Self { operations }
    }
}

#[async_trait]
impl Tool for OperationStatusTool {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::tool(
            "operation_status",
            "Get the status of an async operation",
            operation_id_schema(),
        )
        .synchronous_only()
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let id = required_str(&arguments, "operation_id")?;
        Ok(self.operations.status(id).await?.to_value())
    }
}

/// `operation_result`: payload of a completed operation.
#[derive(Debug)]
pub struct OperationResultTool {
    operations: Arc<OperationManager>,
}

impl OperationResultTool {
    /// Creates the tool.
    #[must_use]
    pub const fn new(operations: Arc<OperationManager>) -> Self {
        Self { operations }
    }
}

#[async_trait]
impl Tool for OperationResultTool {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::tool(
            "operation_result",
            "Get the result of a completed async operation",
            operation_id_schema(),
        )
        .synchronous_only()
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let id = required_str(&arguments, "operation_id")?;
        Ok(self.operations.result(id).await?)
    }
}

/// `list_operations`: every operation, optionally filtered by status.
#[derive(Debug)]
pub struct ListOperationsTool {
    operations: Arc<OperationManager>,
}

impl ListOperationsTool {
    /// Creates the tool.
    #[must_use]
    pub const fn new(operations: Arc<OperationManager>) -> Self {
        Self { operations }
    }
}

#[async_trait]
impl Tool for ListOperationsTool {
    fn descriptor(&self) -> CapabilityDescriptor {
        let mut filters = vec!["all"];
        filters.extend(OperationStatus::ALL.iter().map(|s| s.as_str()));
        CapabilityDescriptor::tool(
            "list_operations",
            "List async operations",
            InputSchema::object().optional_property(
                "status_filter",
                PropertySchema::string("Only list operations in this state")
                    .one_of(filters)
                    .with_default("all"),
            ),
        )
        .synchronous_only()
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let filter = match optional_str(&arguments, "status_filter").unwrap_or("all") {
            "all" => None,
            name => Some(OperationStatus::parse(name).ok_or_else(|| {
                ToolError::InvalidParams(format!("unknown status filter: {name}"))
            })?),
        };

        let operations: Vec<Value> = self
            .operations
            .list(filter)
            .await
            .iter()
            .map(|op| op.to_value())
            .collect();

        Ok(json!({
            "total": operations.len(),
            "operations": operations,
        }))
    }
}

/// `cancel_operation`: cancels a pending or running operation.
#[derive(Debug)]
pub struct CancelOperationTool {
    operations: Arc<OperationManager>,
}

impl CancelOperationTool {
    /// Creates the tool.
    #[must_use]
    pub const fn new(operations: Arc<OperationManager>) -> Self {
        Self { operations }
    }
}

#[async_trait]
impl Tool for CancelOperationTool {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::tool(
            "cancel_operation",
            "Cancel a pending or running async operation",
            operation_id_schema().optional_property(
                "reason",
                PropertySchema::string("Why the operation is being cancelled"),
            ),
        )
        .synchronous_only()
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let id = required_str(&arguments, "operation_id")?;
        let reason = optional_str(&arguments, "reason");
        let op = self.operations.cancel(id, reason).await?;
        Ok(json!({
            "operation_id": op.operation_id,
            "status": op.status,
            "cancellation_reason": op.cancellation_reason,
        }))
    }
}
