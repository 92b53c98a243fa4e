//! mcp-conductor: JSON-RPC 2.0 capability server and function-call orchestrator
//!
//! This library exposes named, schema-described capabilities (tools,
//! resources and prompt templates) to LLM clients over the Model Context
//! Protocol, and routes function calls emitted by model providers to the same
//! capabilities.
//!
//! # Architecture
//!
//! - **Registry**: capability descriptors plus the argument validator/coercer
//! - **Dispatcher**: JSON-RPC 2.0 envelopes, batches and notifications
//! - **Router**: handler lookup and `text`/`json`/`both` response formatting
//! - **Operations**: tracked, cancellable background tool executions
//! - **Orchestrator**: provider schema dialects, bounded fan-out and
//!   conversation bookkeeping
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation
//! - [`orchestrator`]: Function-call orchestration
//! - [`registry`]: Capability registry and argument validation
//! - [`tools`]: Built-in capabilities

pub mod config;
pub mod error;
pub mod mcp;
pub mod orchestrator;
pub mod registry;
pub mod tools;
