//! Integration tests for MCP protocol handling.
//!
//! These tests drive the dispatcher built by `McpService` exactly as the stdio
//! loop does, covering request/response handling, batches, error responses,
//! async operations and lifecycle management.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use mcp_conductor::config::Config;
use mcp_conductor::mcp::dispatcher::Dispatcher;
use mcp_conductor::mcp::server::McpService;
use mcp_conductor::mcp::session::SessionState;

fn service_with(config: &Config) -> (Arc<McpService>, Dispatcher) {
    let service = Arc::new(McpService::with_builtins(config));
    let dispatcher = service.dispatcher();
    (service, dispatcher)
}

fn dispatcher() -> Dispatcher {
    service_with(&Config::default()).1
}

async fn send(dispatcher: &Dispatcher, message: Value) -> Option<Value> {
    let output = dispatcher.dispatch_value(message).await?;
    Some(serde_json::to_value(output).expect("reply serialises"))
}

async fn request(dispatcher: &Dispatcher, id: i64, method: &str, params: Value) -> Value {
    send(
        dispatcher,
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}),
    )
    .await
    .expect("request must be answered")
}

/// Calls a tool with `response_format: json` and returns the structured payload.
async fn call_tool_json(dispatcher: &Dispatcher, id: i64, name: &str, mut arguments: Value) -> Value {
    arguments["response_format"] = json!("json");
    let reply = request(
        dispatcher,
        id,
        "tools/call",
        json!({"name": name, "arguments": arguments}),
    )
    .await;
    assert!(reply.get("error").is_none(), "unexpected error: {reply}");
    assert!(reply["result"].get("isError").is_none(), "tool reported an error: {reply}");
    reply["result"]["content"][0]["json"].clone()
}

fn status_rank(status: &str) -> u8 {
    match status {
        "pending" => 0,
        "running" => 1,
        _ => 2,
    }
}

// =============================================================================
// End-to-end tool calls
// =============================================================================

#[tokio::test]
async fn test_add_numbers_sync() {
    let d = dispatcher();
    let payload = call_tool_json(&d, 1, "add_numbers", json!({"a": 2, "b": 3})).await;
    assert_eq!(payload["result"], 5);
}

#[tokio::test]
async fn test_add_numbers_default_text_format() {
    let d = dispatcher();
    let reply = request(
        &d,
        1,
        "tools/call",
        json!({"name": "add_numbers", "arguments": {"a": 2, "b": 3}}),
    )
    .await;
    let content = reply["result"]["content"].as_array().unwrap();
    assert_eq!(content.len(), 1);
    assert_eq!(content[0]["type"], "text");
    assert!(content[0]["text"].as_str().unwrap().contains("\"result\": 5"));
}

#[tokio::test]
async fn test_add_numbers_both_formats() {
    let d = dispatcher();
    let reply = request(
        &d,
        1,
        "tools/call",
        json!({"name": "add_numbers", "arguments": {"a": 2, "b": 3, "response_format": "both"}}),
    )
    .await;
    let content = reply["result"]["content"].as_array().unwrap();
    assert_eq!(content.len(), 2);
    assert_eq!(content[0]["type"], "text");
    assert_eq!(content[1]["json"]["result"], 5);
}

#[tokio::test]
async fn test_string_arguments_are_coerced() {
    let d = dispatcher();
    let payload = call_tool_json(&d, 1, "add_numbers", json!({"a": "40", "b": "2"})).await;
    assert_eq!(payload["result"], 42);
}

#[tokio::test]
async fn test_invalid_argument_lists_field() {
    let d = dispatcher();
    let reply = request(
        &d,
        7,
        "tools/call",
        json!({"name": "add_numbers", "arguments": {"a": "x", "b": 3}}),
    )
    .await;
    assert_eq!(reply["id"], 7);
    assert_eq!(reply["error"]["code"], -32602);
    let errors = reply["error"]["data"]["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e["field"] == "a"));
    assert!(errors.iter().all(|e| e["field"] != "b"));
}

#[tokio::test]
async fn test_oversized_integer_lists_field() {
    let d = dispatcher();
    let reply = request(
        &d,
        8,
        "tools/call",
        json!({"name": "add_numbers", "arguments": {"a": 9_223_372_036_854_775_808_u64, "b": 1}}),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32602);
    let errors = reply["error"]["data"]["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "a");
}

#[tokio::test]
async fn test_missing_required_argument() {
    let d = dispatcher();
    let reply = request(
        &d,
        1,
        "tools/call",
        json!({"name": "add_numbers", "arguments": {"a": 1}}),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32602);
    let errors = reply["error"]["data"]["errors"].as_array().unwrap();
    assert_eq!(errors[0]["field"], "b");
}

#[tokio::test]
async fn test_unknown_tool() {
    let d = dispatcher();
    let reply = request(&d, 1, "tools/call", json!({"name": "nope", "arguments": {}})).await;
    assert_eq!(reply["error"]["code"], -32601);
}

#[tokio::test]
async fn test_execution_failure_is_tool_error_result() {
    let d = dispatcher();
    let reply = request(
        &d,
        1,
        "tools/call",
        json!({"name": "add_numbers", "arguments": {"a": i64::MAX, "b": 1}}),
    )
    .await;
    assert!(reply.get("error").is_none());
    assert_eq!(reply["result"]["isError"], true);
}

// =============================================================================
// Async operations
// =============================================================================

#[tokio::test]
async fn test_async_mode_round_trip() {
    let d = dispatcher();

    let started = call_tool_json(
        &d,
        1,
        "add_numbers",
        json!({"a": 2, "b": 3, "async_mode": true}),
    )
    .await;
    assert_eq!(started["status"], "pending");
    assert_eq!(started["tool_name"], "add_numbers");
    let operation_id = started["operation_id"].as_str().unwrap().to_string();
    assert!(operation_id.starts_with("op_"));

    let mut seen = vec!["pending".to_string()];
    for attempt in 0..100 {
        let status = call_tool_json(
            &d,
            10 + attempt,
            "operation_status",
            json!({"operation_id": operation_id}),
        )
        .await;
        let current = status["status"].as_str().unwrap().to_string();
        seen.push(current.clone());
        if current == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(seen.last().map(String::as_str), Some("completed"));
    assert!(seen
        .windows(2)
        .all(|w| status_rank(&w[0]) <= status_rank(&w[1])));

    let result = call_tool_json(
        &d,
        500,
        "operation_result",
        json!({"operation_id": operation_id}),
    )
    .await;
    assert_eq!(result["result"], 5);

    let listing = call_tool_json(
        &d,
        501,
        "list_operations",
        json!({"status_filter": "completed"}),
    )
    .await;
    assert_eq!(listing["total"], 1);

    let reply = request(
        &d,
        502,
        "tools/call",
        json!({"name": "cancel_operation", "arguments": {"operation_id": operation_id}}),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32003);
}

#[tokio::test]
async fn test_async_mode_rejected_for_sync_only_tool() {
    let d = dispatcher();
    let reply = request(
        &d,
        1,
        "tools/call",
        json!({"name": "list_operations", "arguments": {"async_mode": true}}),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32602);
}

#[tokio::test]
async fn test_unknown_operation() {
    let d = dispatcher();
    let reply = request(
        &d,
        1,
        "tools/call",
        json!({"name": "operation_status", "arguments": {"operation_id": "op_missing"}}),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32001);
}

// =============================================================================
// Envelope and batch handling
// =============================================================================

#[tokio::test]
async fn test_notification_gets_no_reply() {
    let d = dispatcher();
    let reply = send(&d, json!({"jsonrpc": "2.0", "method": "ping"})).await;
    assert!(reply.is_none());

    let reply = send(&d, json!({"jsonrpc": "2.0", "method": "does/not/exist"})).await;
    assert!(reply.is_none());
}

#[tokio::test]
async fn test_unknown_method() {
    let d = dispatcher();
    let reply = request(&d, 3, "does/not/exist", json!({})).await;
    assert_eq!(reply["id"], 3);
    assert_eq!(reply["error"]["code"], -32601);
}

#[tokio::test]
async fn test_batch_mixed() {
    let d = dispatcher();
    let reply = send(
        &d,
        json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "method": "ping"},
            {"jsonrpc": "2.0", "id": "two", "method": "does/not/exist"},
            {"foo": "bar"}
        ]),
    )
    .await
    .unwrap();

    let replies = reply.as_array().unwrap();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[0]["result"], json!({}));
    assert_eq!(replies[1]["id"], "two");
    assert_eq!(replies[1]["error"]["code"], -32601);
    assert_eq!(replies[2]["id"], Value::Null);
    assert_eq!(replies[2]["error"]["code"], -32600);
}

#[tokio::test]
async fn test_empty_batch_is_invalid_request() {
    let d = dispatcher();
    let reply = send(&d, json!([])).await.unwrap();
    assert!(reply.is_object());
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn test_notification_only_batch_gets_no_reply() {
    let d = dispatcher();
    let reply = send(
        &d,
        json!([
            {"jsonrpc": "2.0", "method": "ping"},
            {"jsonrpc": "2.0", "method": "notifications/initialized"}
        ]),
    )
    .await;
    assert!(reply.is_none());
}

#[tokio::test]
async fn test_parse_error() {
    let d = dispatcher();
    let output = d.dispatch_str("not valid json").await.unwrap();
    let reply: Value = serde_json::from_str(&output.to_json_string()).unwrap();
    assert_eq!(reply["error"]["code"], -32700);
    assert_eq!(reply["id"], Value::Null);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_initialize_negotiates_version() {
    let (service, d) = service_with(&Config::default());
    let reply = request(
        &d,
        1,
        "initialize",
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        }),
    )
    .await;
    assert_eq!(reply["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(reply["result"]["serverInfo"]["name"], "mcp-conductor");
    assert!(reply["result"]["capabilities"]["tools"].is_object());
    assert_eq!(service.session().state(), SessionState::Initialising);

    let none = send(
        &d,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;
    assert!(none.is_none());
    assert_eq!(service.session().state(), SessionState::Running);

    let again = request(
        &d,
        2,
        "initialize",
        json!({"protocolVersion": "2024-11-05", "capabilities": {}}),
    )
    .await;
    assert_eq!(again["error"]["code"], -32600);
}

#[tokio::test]
async fn test_initialize_unknown_version_gets_latest() {
    let d = dispatcher();
    let reply = request(
        &d,
        1,
        "initialize",
        json!({"protocolVersion": "1999-01-01", "capabilities": {}}),
    )
    .await;
    assert_eq!(reply["result"]["protocolVersion"], "2025-06-18");
}

#[tokio::test]
async fn test_handshake_enforcement() {
    let mut config = Config::default();
    config.session.require_initialize = true;
    let (_service, d) = service_with(&config);

    let early = request(&d, 1, "tools/list", json!({})).await;
    assert_eq!(early["error"]["code"], -32600);

    let ping = request(&d, 2, "ping", json!({})).await;
    assert_eq!(ping["result"], json!({}));

    request(
        &d,
        3,
        "initialize",
        json!({"protocolVersion": "2025-06-18", "capabilities": {}}),
    )
    .await;
    send(
        &d,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await;

    let listed = request(&d, 4, "tools/list", json!({})).await;
    assert!(listed["result"]["tools"].is_array());
}

// =============================================================================
// Resources and prompts
// =============================================================================

#[tokio::test]
async fn test_resources_list_and_read() {
    let d = dispatcher();
    let listed = request(&d, 1, "resources/list", json!({})).await;
    let uris: Vec<&str> = listed["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["uri"].as_str())
        .collect();
    assert_eq!(
        uris,
        ["system://status/runtime", "system://config/capabilities"]
    );

    let read = request(
        &d,
        2,
        "resources/read",
        json!({"uri": "system://config/capabilities"}),
    )
    .await;
    let contents = &read["result"]["contents"][0];
    assert_eq!(contents["mimeType"], "application/json");
    let body: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert!(body["available_tools"]
        .as_array()
        .unwrap()
        .contains(&json!("add_numbers")));

    let missing = request(&d, 3, "resources/read", json!({"uri": "system://nope"})).await;
    assert!(missing.get("error").is_some());
}

#[tokio::test]
async fn test_prompts_list_and_get() {
    let d = dispatcher();
    let listed = request(&d, 1, "prompts/list", json!({})).await;
    let prompts = listed["result"]["prompts"].as_array().unwrap();
    assert!(prompts.iter().any(|p| p["name"] == "troubleshooting"));

    let got = request(
        &d,
        2,
        "prompts/get",
        json!({"name": "troubleshooting", "arguments": {"issue_description": "timeouts"}}),
    )
    .await;
    let messages = got["result"]["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "user");
    assert!(messages[0]["content"]["text"]
        .as_str()
        .unwrap()
        .contains("timeouts"));

    let invalid = request(
        &d,
        3,
        "prompts/get",
        json!({"name": "troubleshooting", "arguments": {}}),
    )
    .await;
    assert_eq!(invalid["error"]["code"], -32602);
}
