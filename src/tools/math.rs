//! Arithmetic tools.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::required_i64;
use crate::error::ToolError;
use crate::mcp::router::Tool;
use crate::registry::{CapabilityDescriptor, InputSchema, PropertySchema};

/// Adds two integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddNumbers;

#[async_trait]
impl Tool for AddNumbers {
    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::tool(
            "add_numbers",
            "Add two integers and return their sum",
            InputSchema::object()
                .required_property("a", PropertySchema::integer("First addend"))
                .required_property("b", PropertySchema::integer("Second addend")),
        )
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let a = required_i64(&arguments, "a")?;
        let b = required_i64(&arguments, "b")?;
        let sum = a
            .checked_add(b)
            .ok_or_else(|| ToolError::execution(format!("{a} + {b} overflows a 64-bit integer")))?;
        Ok(json!({"a": a, "b": b, "result": sum}))
    }
}
