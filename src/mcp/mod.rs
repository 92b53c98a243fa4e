//! Model Context Protocol (MCP) server implementation.
//!
//! Exposes the capability registry to AI clients as tools, resources and
//! prompts. The server communicates over stdio transport using JSON-RPC 2.0
//! messages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │   ┌───────────┐   ┌────────────┐   ┌──────────┐   ┌───────┐  │
//! │   │ Transport │──▶│ Dispatcher │──▶│  Router  │──▶│ Tools │  │
//! │   │  (stdio)  │   │ (JSON-RPC) │   │ (format) │   │       │  │
//! │   └───────────┘   └────────────┘   └──────────┘   └───────┘  │
//! │                         │                │                   │
//! │                         ▼                ▼                   │
//! │                   ┌──────────┐   ┌──────────────┐            │
//! │                   │ Session  │   │  Operations  │            │
//! │                   │ (state)  │   │ (background) │            │
//! │                   └──────────┘   └──────────────┘            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! Targets MCP protocol version 2025-06-18 and negotiates down to
//! 2025-03-26 and 2024-11-05.

pub mod dispatcher;
pub mod operations;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;
pub mod transport;

pub use dispatcher::{DispatchOutput, Dispatcher};
pub use operations::{AsyncOperation, OperationManager, OperationStatus};
pub use protocol::{
    JsonRpcError, JsonRpcReply, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION,
};
pub use router::{ResponseFormat, Tool, ToolRouter};
pub use server::{McpServer, McpService};
pub use session::{Session, SessionState};
pub use transport::StdioTransport;
