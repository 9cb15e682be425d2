//! Integration tests for MCP protocol handling.
//!
//! These tests verify the JSON-RPC 2.0 message parsing and drive a whole
//! session through the server over in-memory streams.

use csv_analyzer_mcp::analyzer::CsvAnalyzer;
use csv_analyzer_mcp::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use csv_analyzer_mcp::mcp::{McpServer, ServerState, Transport};
use serde_json::{json, Value};
use std::io::Cursor;
use tempfile::tempdir;

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_string_id() {
    let json = r#"{"jsonrpc": "2.0", "id": "abc", "method": "tools/list"}"#;

    if let IncomingMessage::Request(req) = parse_message(json).unwrap() {
        assert_eq!(req.id, RequestId::String("abc".to_string()));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;

    let result = parse_message(json).unwrap();
    assert!(matches!(result, IncomingMessage::Notification(_)));
    assert_eq!(result.method(), "notifications/initialized");
    assert!(result.id().is_none());
}

#[test]
fn test_parse_invalid_json() {
    let error = parse_message("{not json").unwrap_err();
    assert_eq!(error.error.code, -32700);
}

#[test]
fn test_parse_wrong_version() {
    let error = parse_message(r#"{"jsonrpc": "1.0", "id": 1, "method": "ping"}"#).unwrap_err();
    assert_eq!(error.error.code, -32600);
}

// =============================================================================
// Session Tests
// =============================================================================

/// Runs the server over `lines` and returns the parsed output messages.
async fn run_session(dir: &std::path::Path, lines: &[Value]) -> (Vec<Value>, ServerState) {
    let mut input = String::new();
    for line in lines {
        input.push_str(&line.to_string());
        input.push('\n');
    }

    let mut server = McpServer::with_transport(
        CsvAnalyzer::new(dir),
        Transport::new(Cursor::new(input.into_bytes()), Vec::new()),
    );
    server.serve().await.unwrap();

    let output = String::from_utf8(server.transport().writer().clone()).unwrap();
    let messages = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    (messages, server.state())
}

fn handshake() -> Vec<Value> {
    vec![
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }
        }),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    ]
}

fn call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

fn tool_payload(message: &Value) -> Value {
    let text = message["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn test_full_session() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("a.csv"),
        "id,name\n1,Alice\n2,Bob\n3,Carol\n",
    )
    .unwrap();

    let mut lines = handshake();
    lines.push(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}));
    lines.push(call(3, "read_csv", json!({"filename": "a.csv", "rows": 2})));
    lines.push(call(4, "query_csv", json!({"filename": "a.csv", "query": "name == 'Bob'"})));
    lines.push(call(5, "get_csv_statistics", json!({"filename": "a.csv", "column": "id"})));
    lines.push(call(6, "get_csv_info", json!({"filename": "a.csv"})));

    let (messages, state) = run_session(dir.path(), &lines).await;
    assert_eq!(state, ServerState::ShuttingDown);
    // The notification gets no response
    assert_eq!(messages.len(), 6);

    assert_eq!(messages[0]["id"], 1);
    assert_eq!(messages[0]["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(messages[0]["result"]["serverInfo"]["name"], "csv-analyzer-mcp");

    let tools = messages[1]["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 4);

    let read = tool_payload(&messages[2]);
    assert_eq!(read["total_rows"], 2);
    assert_eq!(read["data"][1], json!({"id": 2, "name": "Bob"}));

    let query = tool_payload(&messages[3]);
    assert_eq!(query["matched_rows"], 1);

    let stats = tool_payload(&messages[4]);
    assert_eq!(stats["statistics"]["mean"].as_f64(), Some(2.0));

    let info = tool_payload(&messages[5]);
    assert_eq!(info["shape"], json!({"rows": 3, "columns": 2}));
    assert_eq!(info["dtypes"], json!({"id": "int64", "name": "object"}));
}

#[tokio::test]
async fn test_tool_errors_keep_the_session_alive() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.csv"), "id\n1\n").unwrap();

    let mut lines = handshake();
    lines.push(call(2, "read_csv", json!({"filename": "missing.csv"})));
    lines.push(call(3, "query_csv", json!({"filename": "a.csv", "query": "bogus_col > 1"})));
    lines.push(call(4, "read_csv", json!({})));
    lines.push(json!({"jsonrpc": "2.0", "id": 5, "method": "ping"}));

    let (messages, _) = run_session(dir.path(), &lines).await;
    assert_eq!(messages.len(), 5);

    assert_eq!(messages[1]["result"]["isError"], true);
    assert_eq!(
        tool_payload(&messages[1])["error"],
        "File missing.csv not found"
    );

    let query_error = tool_payload(&messages[2])["error"].as_str().unwrap().to_string();
    assert!(query_error.starts_with("Query error: "));
    assert!(query_error.contains("bogus_col"));

    assert_eq!(
        tool_payload(&messages[3])["error"],
        "Missing required parameter: filename"
    );

    assert_eq!(messages[4]["id"], 5);
    assert_eq!(messages[4]["result"], json!({}));
}

#[tokio::test]
async fn test_resources() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.csv"), "id,name\n1,Alice\n").unwrap();

    let mut lines = handshake();
    lines.push(json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"}));
    lines.push(json!({"jsonrpc": "2.0", "id": 3, "method": "resources/templates/list"}));
    lines.push(json!({
        "jsonrpc": "2.0", "id": 4, "method": "resources/read",
        "params": {"uri": "csv://list"}
    }));
    lines.push(json!({
        "jsonrpc": "2.0", "id": 5, "method": "resources/read",
        "params": {"uri": "csv://a.csv"}
    }));
    lines.push(json!({
        "jsonrpc": "2.0", "id": 6, "method": "resources/read",
        "params": {"uri": "http://example.com/a.csv"}
    }));

    let (messages, _) = run_session(dir.path(), &lines).await;
    assert_eq!(messages.len(), 6);

    assert_eq!(messages[1]["result"]["resources"][0]["uri"], "csv://list");
    assert_eq!(
        messages[2]["result"]["resourceTemplates"][0]["uriTemplate"],
        "csv://{filename}"
    );

    let listing: Value =
        serde_json::from_str(messages[3]["result"]["contents"][0]["text"].as_str().unwrap())
            .unwrap();
    assert_eq!(listing[0]["name"], "a.csv");

    let preview = &messages[4]["result"]["contents"][0];
    assert_eq!(preview["uri"], "csv://a.csv");
    assert_eq!(preview["mimeType"], "application/json");
    let preview: Value = serde_json::from_str(preview["text"].as_str().unwrap()).unwrap();
    assert_eq!(preview["rows"], 1);
    assert_eq!(preview["columns"], json!(["id", "name"]));

    assert_eq!(messages[5]["error"]["code"], -32002);
}

#[tokio::test]
async fn test_requests_before_initialisation_are_rejected() {
    let dir = tempdir().unwrap();
    let lines = vec![json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})];

    let (messages, _) = run_session(dir.path(), &lines).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["error"]["code"], -32600);
}

#[tokio::test]
async fn test_malformed_line_gets_parse_error() {
    let dir = tempdir().unwrap();
    let (messages, _) = run_session(dir.path(), &[json!("not an object")]).await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0]["error"]["code"].is_i64());
}
