//! Error types for mcp-conductor.
//!
//! Protocol faults live in [`crate::mcp::protocol`]. The enums here describe
//! failures inside the crate and are mapped onto the wire at the dispatcher
//! boundary.

use std::path::PathBuf;

use serde_json::json;
use thiserror::Error;

use crate::mcp::operations::OperationStatus;
use crate::mcp::protocol::{ErrorCode, JsonRpcErrorData};
use crate::registry::{CapabilityKind, ValidationReport};

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while routing or executing a capability.
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    /// No capability with this name is registered.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Capability family that was searched.
        kind: CapabilityKind,
        /// Requested name.
        name: String,
    },

    /// The arguments failed schema validation.
    #[error("invalid arguments: {}", .0.summary())]
    InvalidArguments(ValidationReport),

    /// The request parameters were malformed before validation could run.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The capability is registered but has no handler.
    #[error("{kind} handler not implemented: {name}")]
    NotImplemented {
        /// Capability family.
        kind: CapabilityKind,
        /// Capability name.
        name: String,
    },

    /// An operation-management request failed.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// The handler ran and failed.
    #[error("execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    /// Shorthand for an execution failure.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Shorthand for a missing tool.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: CapabilityKind::Tool,
            name: name.into(),
        }
    }
}

impl From<&ToolError> for JsonRpcErrorData {
    fn from(error: &ToolError) -> Self {
        let message = error.to_string();
        match error {
            ToolError::NotFound { kind, name } => {
                Self::with_message(ErrorCode::MethodNotFound, message)
                    .with_data(json!({"kind": kind, "name": name}))
            }
            ToolError::InvalidArguments(report) => {
                Self::with_message(ErrorCode::InvalidParams, message).with_data(json!({
                    "errors": report.errors,
                    "warnings": report.warnings,
                }))
            }
            ToolError::InvalidParams(_) => Self::with_message(ErrorCode::InvalidParams, message),
            ToolError::NotImplemented { .. } | ToolError::Execution(_) => {
                Self::with_message(ErrorCode::InternalError, message)
            }
            ToolError::Operation(op) => op.into(),
        }
    }
}

impl From<&OperationError> for JsonRpcErrorData {
    fn from(error: &OperationError) -> Self {
        let message = error.to_string();
        match error {
            OperationError::NotFound(id) => {
                Self::with_message(ErrorCode::OPERATION_NOT_FOUND, message)
                    .with_data(json!({"operation_id": id}))
            }
            OperationError::NotCompleted { id, status } => {
                Self::with_message(ErrorCode::OPERATION_NOT_COMPLETED, message)
                    .with_data(json!({"operation_id": id, "status": status}))
            }
            OperationError::AlreadyTerminal { id, status } => {
                Self::with_message(ErrorCode::OPERATION_TERMINAL, message)
                    .with_data(json!({"operation_id": id, "status": status}))
            }
        }
    }
}

/// Errors from the async operation manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// No operation with this identifier exists.
    #[error("operation not found: {0}")]
    NotFound(String),

    /// The operation has not completed, so it has no result.
    #[error("operation {id} is {status}, not completed")]
    NotCompleted {
        /// Operation identifier.
        id: String,
        /// Current status.
        status: OperationStatus,
    },

    /// The operation already reached a terminal state.
    #[error("operation {id} is already {status}")]
    AlreadyTerminal {
        /// Operation identifier.
        id: String,
        /// Terminal status.
        status: OperationStatus,
    },
}

/// Errors from conversation bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    /// No live conversation with this identifier.
    #[error("conversation not found: {0}")]
    NotFound(String),

    /// The conversation used all of its turns.
    #[error("conversation {id} reached its limit of {max_turns} turns")]
    Ended {
        /// Conversation identifier.
        id: String,
        /// Configured turn limit.
        max_turns: u32,
    },
}
