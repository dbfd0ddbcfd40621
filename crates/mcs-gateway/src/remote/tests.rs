// crates/mcs-gateway/src/remote/tests.rs
// ============================================================================
// Module: Remote Backend Tests
// Description: Session handshake, content translation, and failure handling.
// ============================================================================

//! ## Overview
//! Drives remote backend connections against a scripted MCP server over unix
//! socket pairs, plus a few real child processes for spawn and close behavior.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::collections::BTreeMap;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use mcs_config::BackendConfig;
use mcs_config::BackendFraming;
use mcs_core::OutputItem;
use mcs_core::ToolArguments;
use mcs_core::ToolSource;
use serde_json::Value;
use serde_json::json;

use super::BackendError;
use super::CallToolResult;
use super::RemoteBackendConnection;
use super::RemoteToolInfo;
use super::RemoteToolSource;
use super::translate_result;

// ============================================================================
// SECTION: Fake Backend
// ============================================================================

/// Scripted MCP server over a pair of unix sockets.
pub(crate) struct FakeBackend {
    /// Gateway side of the backend's stdout.
    pub(crate) reader: Box<dyn Read + Send>,
    /// Gateway side of the backend's stdin.
    pub(crate) writer: Box<dyn Write + Send>,
    /// Server thread; yields every request it read.
    pub(crate) handle: JoinHandle<Vec<Value>>,
}

/// Maps one request to the messages sent back.
pub(crate) type Responder = fn(&Value) -> Vec<Value>;

/// Starts a scripted backend that answers each request with `respond`.
pub(crate) fn fake_backend(framing: BackendFraming, respond: Responder) -> FakeBackend {
    let (gateway_out, server_in) = UnixStream::pair().unwrap();
    let (mut server_out, gateway_in) = UnixStream::pair().unwrap();
    let handle = thread::spawn(move || {
        let mut reader = BufReader::new(server_in);
        let mut seen = Vec::new();
        while let Some(message) = read_request(&mut reader, framing) {
            for reply in respond(&message) {
                let payload = serde_json::to_vec(&reply).unwrap();
                let sent = match framing {
                    BackendFraming::Ndjson => server_out
                        .write_all(&payload)
                        .and_then(|()| server_out.write_all(b"\n")),
                    BackendFraming::ContentLength => server_out
                        .write_all(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes())
                        .and_then(|()| server_out.write_all(&payload)),
                };
                if sent.is_err() {
                    return seen;
                }
            }
            seen.push(message);
        }
        seen
    });
    FakeBackend {
        reader: Box::new(gateway_in),
        writer: Box::new(gateway_out),
        handle,
    }
}

/// Reads one framed request, or `None` at end of input.
fn read_request(reader: &mut BufReader<UnixStream>, framing: BackendFraming) -> Option<Value> {
    match framing {
        BackendFraming::Ndjson => {
            let mut line = String::new();
            if reader.read_line(&mut line).ok()? == 0 {
                return None;
            }
            serde_json::from_str(line.trim()).ok()
        }
        BackendFraming::ContentLength => {
            let mut len = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).ok()? == 0 {
                    return None;
                }
                if line.trim().is_empty() {
                    break;
                }
                if let Some(value) = line.strip_prefix("Content-Length:") {
                    len = value.trim().parse().ok()?;
                }
            }
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf).ok()?;
            serde_json::from_slice(&buf).ok()
        }
    }
}

/// Successful response to `message`.
fn reply(message: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": message["id"], "result": result})
}

/// Well-behaved server with two pages of tools.
pub(crate) fn standard_server(message: &Value) -> Vec<Value> {
    let Some(method) = message["method"].as_str() else {
        return Vec::new();
    };
    if message.get("id").is_none() {
        return Vec::new();
    }
    match method {
        "initialize" => vec![reply(
            message,
            json!({"protocolVersion": "2024-11-05", "capabilities": {"tools": {}}, "serverInfo": {"name": "fake"}}),
        )],
        "tools/list" => {
            if message["params"]["cursor"] == "page-2" {
                vec![reply(message, json!({"tools": [{"name": "image"}, {"name": " "}]}))]
            } else {
                vec![reply(
                    message,
                    json!({"tools": [{"name": "echo", "description": "Echo text"}], "nextCursor": "page-2"}),
                )]
            }
        }
        "tools/call" => {
            let args = &message["params"]["arguments"];
            let result = match message["params"]["name"].as_str() {
                Some("echo") => json!({"content": [{"type": "text", "text": args["text"]}]}),
                Some("image") => json!({"content": [
                    {"type": "image", "data": "AQID", "mimeType": "image/png"},
                    {"type": "text", "text": "caption"}
                ]}),
                Some("fail") => json!({"isError": true, "content": [{"type": "text", "text": "boom"}]}),
                Some("bad64") => json!({"content": [
                    {"type": "text", "text": "before"},
                    {"type": "image", "data": "!!!", "mimeType": "image/png"},
                    {"type": "text", "text": "after"}
                ]}),
                _ => {
                    return vec![json!({
                        "jsonrpc": "2.0",
                        "id": message["id"],
                        "error": {"code": -32602, "message": "unknown tool"}
                    })];
                }
            };
            vec![
                json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}}),
                json!({"jsonrpc": "2.0", "id": 9_999, "result": {"content": []}}),
                reply(message, result),
            ]
        }
        _ => Vec::new(),
    }
}

/// Server that answers the handshake and then sends oversized responses.
fn oversized_server(message: &Value) -> Vec<Value> {
    match message["method"].as_str() {
        Some("initialize") => standard_server(message),
        Some(_) if message.get("id").is_some() => {
            vec![json!({"jsonrpc": "2.0", "id": message["id"], "result": "x".repeat(4_096)})]
        }
        _ => Vec::new(),
    }
}

/// Connects to a scripted backend with a 1 MiB response cap.
pub(crate) fn connect(
    framing: BackendFraming,
    respond: Responder,
) -> (Arc<RemoteBackendConnection>, JoinHandle<Vec<Value>>) {
    connect_with_limit(framing, respond, 1024 * 1024)
}

/// Connects to a scripted backend with the given response cap.
fn connect_with_limit(
    framing: BackendFraming,
    respond: Responder,
    max_bytes: usize,
) -> (Arc<RemoteBackendConnection>, JoinHandle<Vec<Value>>) {
    let backend = fake_backend(framing, respond);
    let connection = RemoteBackendConnection::from_streams(
        "files",
        framing,
        max_bytes,
        backend.reader,
        backend.writer,
    )
    .unwrap();
    (connection, backend.handle)
}

/// Tool source for `tool` on `connection`.
fn source(connection: &Arc<RemoteBackendConnection>, tool: &str) -> RemoteToolSource {
    RemoteToolSource::new(
        connection,
        RemoteToolInfo {
            name: tool.to_string(),
            description: None,
        },
    )
}

// ============================================================================
// SECTION: Handshake
// ============================================================================

/// Confirms the handshake runs before a paginated listing.
#[test]
fn handshake_then_paginated_listing() {
    let (connection, handle) = connect(BackendFraming::Ndjson, standard_server);
    let tools = connection.list_tools().unwrap();
    let names: Vec<_> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "image"]);
    assert_eq!(tools[0].description.as_deref(), Some("Echo text"));

    connection.close();
    let seen = handle.join().unwrap();
    let methods: Vec<_> = seen.iter().filter_map(|m| m["method"].as_str()).collect();
    assert_eq!(methods, vec!["initialize", "notifications/initialized", "tools/list", "tools/list"]);
    assert_eq!(seen[0]["params"]["protocolVersion"], "2024-11-05");
    assert_eq!(seen[0]["params"]["clientInfo"]["name"], "mcs-gateway");
}

/// Confirms content-length framing round trips.
#[test]
fn content_length_framing_round_trips() {
    let (connection, handle) = connect(BackendFraming::ContentLength, standard_server);
    assert_eq!(connection.list_tools().unwrap().len(), 2);
    let outputs: Vec<_> =
        source(&connection, "echo").invoke(ToolArguments::new().with("text", "hi")).collect();
    assert_eq!(outputs, vec![Ok(OutputItem::Text("hi".to_string()))]);
    connection.close();
    handle.join().unwrap();
}

/// Confirms spawning a missing program is reported.
#[test]
fn spawn_reports_missing_program() {
    let config = BackendConfig {
        name: "ghost".to_string(),
        command: vec!["/nonexistent/mcs-backend".to_string()],
        env: BTreeMap::new(),
        framing: BackendFraming::Ndjson,
        max_response_bytes: 1024,
    };
    let err = RemoteBackendConnection::spawn(&config).unwrap_err();
    assert!(matches!(err, BackendError::Spawn(_)));
}

// ============================================================================
// SECTION: Calls
// ============================================================================

/// Confirms calls skip notifications and responses for other ids.
#[test]
fn call_skips_notifications_and_foreign_ids() {
    let (connection, _handle) = connect(BackendFraming::Ndjson, standard_server);
    let remote = source(&connection, "echo");
    assert_eq!(remote.name(), "files:echo");
    assert_eq!(remote.describe().name, "files:echo");
    let outputs: Vec<_> = remote.invoke(ToolArguments::new().with("text", "hello")).collect();
    assert_eq!(outputs, vec![Ok(OutputItem::Text("hello".to_string()))]);
}

/// Confirms image content decodes and keeps its order.
#[test]
fn image_content_is_decoded_in_order() {
    let (connection, _handle) = connect(BackendFraming::Ndjson, standard_server);
    let outputs: Vec<_> = source(&connection, "image").invoke(ToolArguments::new()).collect();
    assert_eq!(
        outputs,
        vec![
            Ok(OutputItem::binary(vec![1, 2, 3], "image/png")),
            Ok(OutputItem::Text("caption".to_string())),
        ]
    );
}

/// Confirms an `isError` result becomes a single fault.
#[test]
fn is_error_result_becomes_single_fault() {
    let (connection, _handle) = connect(BackendFraming::Ndjson, standard_server);
    let outputs: Vec<_> = source(&connection, "fail").invoke(ToolArguments::new()).collect();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].as_ref().unwrap_err().message(), "boom");
}

/// Confirms invalid base64 ends the sequence with a fault.
#[test]
fn invalid_base64_ends_sequence_with_fault() {
    let (connection, _handle) = connect(BackendFraming::Ndjson, standard_server);
    let outputs: Vec<_> = source(&connection, "bad64").invoke(ToolArguments::new()).collect();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0], Ok(OutputItem::Text("before".to_string())));
    assert!(outputs[1].as_ref().unwrap_err().message().contains("base64"));
}

/// Confirms a JSON-RPC error is a fault and the session survives.
#[test]
fn json_rpc_error_is_fault_but_session_survives() {
    let (connection, _handle) = connect(BackendFraming::Ndjson, standard_server);
    let outputs: Vec<_> = source(&connection, "missing").invoke(ToolArguments::new()).collect();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].as_ref().unwrap_err().message().contains("unknown tool"));
    assert!(!connection.is_broken());

    let outputs: Vec<_> =
        source(&connection, "echo").invoke(ToolArguments::new().with("text", "again")).collect();
    assert_eq!(outputs, vec![Ok(OutputItem::Text("again".to_string()))]);
}

/// Confirms invoke does no work until the first pull.
#[test]
fn invoke_does_no_work_until_pulled() {
    let (connection, handle) = connect(BackendFraming::Ndjson, standard_server);
    let stream = source(&connection, "echo").invoke(ToolArguments::new().with("text", "x"));
    drop(stream);
    connection.close();
    let seen = handle.join().unwrap();
    assert!(seen.iter().all(|m| m["method"] != "tools/call"));
}

/// Confirms dropping a stream releases the session.
#[test]
fn dropped_stream_releases_session() {
    let (connection, _handle) = connect(BackendFraming::Ndjson, standard_server);
    let mut stream = source(&connection, "image").invoke(ToolArguments::new());
    assert!(stream.next().is_some());
    drop(stream);
    let outputs: Vec<_> =
        source(&connection, "echo").invoke(ToolArguments::new().with("text", "next")).collect();
    assert_eq!(outputs, vec![Ok(OutputItem::Text("next".to_string()))]);
}

/// Confirms concurrent calls are serialized.
#[test]
fn concurrent_calls_are_serialized() {
    let (connection, _handle) = connect(BackendFraming::Ndjson, standard_server);
    let workers: Vec<_> = (0..4)
        .map(|index| {
            let remote = source(&connection, "echo");
            thread::spawn(move || {
                let text = format!("caller-{index}");
                let outputs: Vec<_> =
                    remote.invoke(ToolArguments::new().with("text", text.clone())).collect();
                assert_eq!(outputs, vec![Ok(OutputItem::Text(text))]);
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
}

/// Confirms the session stays reserved until the output is consumed or dropped.
#[test]
fn token_is_held_until_output_is_consumed() {
    let (connection, _handle) = connect(BackendFraming::Ndjson, standard_server);
    let mut first = source(&connection, "image").invoke(ToolArguments::new());
    assert_eq!(first.next(), Some(Ok(OutputItem::binary(vec![1, 2, 3], "image/png"))));

    let (done_tx, done_rx) = mpsc::channel();
    let second = source(&connection, "echo");
    let waiter = thread::spawn(move || {
        let outputs: Vec<_> = second.invoke(ToolArguments::new().with("text", "queued")).collect();
        done_tx.send(outputs).unwrap();
    });
    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());

    drop(first);
    let outputs = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(outputs, vec![Ok(OutputItem::Text("queued".to_string()))]);
    waiter.join().unwrap();
}

// ============================================================================
// SECTION: Failures
// ============================================================================

/// Confirms an oversized response breaks the session.
#[test]
fn oversized_response_breaks_session() {
    let (connection, _handle) = connect_with_limit(BackendFraming::Ndjson, oversized_server, 1_024);
    let outputs: Vec<_> = source(&connection, "echo").invoke(ToolArguments::new()).collect();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].is_err());
    assert!(connection.is_broken());

    let outputs: Vec<_> = source(&connection, "echo").invoke(ToolArguments::new()).collect();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].as_ref().unwrap_err().message().contains("closed"));
}

/// Confirms a backend exit marks the connection broken.
#[test]
fn backend_exit_marks_connection_broken() {
    let backend = fake_backend(BackendFraming::Ndjson, standard_server);
    drop(backend.writer);
    backend.handle.join().unwrap();
    let err = RemoteBackendConnection::from_streams(
        "files",
        BackendFraming::Ndjson,
        1024,
        backend.reader,
        Box::new(std::io::sink()),
    )
    .unwrap_err();
    assert!(matches!(err, BackendError::Transport(_)));
}

/// Confirms close returns while a call is blocked on the backend.
#[test]
fn close_does_not_wait_for_a_stuck_call() {
    let config = BackendConfig {
        name: "stuck".to_string(),
        command: vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"read line; printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{}}'; exec cat > /dev/null"#
                .to_string(),
        ],
        env: BTreeMap::new(),
        framing: BackendFraming::Ndjson,
        max_response_bytes: 1024,
    };
    let connection = RemoteBackendConnection::spawn(&config).unwrap();

    let (call_tx, call_rx) = mpsc::channel();
    let remote = source(&connection, "hang");
    let caller = thread::spawn(move || {
        let outputs: Vec<_> = remote.invoke(ToolArguments::new()).collect();
        call_tx.send(outputs).unwrap();
    });
    assert!(call_rx.recv_timeout(Duration::from_millis(200)).is_err());

    let (close_tx, close_rx) = mpsc::channel();
    let closer = Arc::clone(&connection);
    thread::spawn(move || {
        closer.close();
        close_tx.send(()).unwrap();
    });
    close_rx.recv_timeout(Duration::from_secs(3)).unwrap();

    let outputs = call_rx.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].is_err());
    assert!(connection.is_broken());
    caller.join().unwrap();
}

/// Confirms close ends the backend's input.
#[test]
fn close_ends_backend_input() {
    let (connection, handle) = connect(BackendFraming::Ndjson, standard_server);
    connection.close();
    assert!(connection.is_broken());
    handle.join().unwrap();
    let outputs: Vec<_> = source(&connection, "echo").invoke(ToolArguments::new()).collect();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].is_err());
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Translates a `tools/call` result into output items.
fn translate(value: Value) -> Vec<mcs_core::ToolOutput> {
    let result: CallToolResult = serde_json::from_value(value).unwrap();
    translate_result(result)
}

/// Confirms resource and structured content translate to text.
#[test]
fn resources_and_structured_content_translate() {
    let outputs = translate(json!({
        "content": [
            {"type": "resource", "resource": {"uri": "file:///a.txt", "text": "alpha"}},
            {"type": "resource", "resource": {"uri": "file:///b.bin", "blob": "AAE="}},
            {"type": "resource_link", "uri": "file:///c", "name": "c"},
            {"type": "video", "url": "ignored"}
        ],
        "structuredContent": {"count": 2}
    }));
    assert_eq!(
        outputs,
        vec![
            Ok(OutputItem::Text("[Resource: file:///a.txt]\nalpha".to_string())),
            Ok(OutputItem::binary(vec![0, 1], "application/octet-stream")),
            Ok(OutputItem::Text("[Resource link: file:///c]".to_string())),
            Ok(OutputItem::Structured(json!({"count": 2}))),
        ]
    );
}

/// Confirms an empty error result gets the default message.
#[test]
fn empty_error_result_has_default_message() {
    let outputs = translate(json!({"isError": true, "content": []}));
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].as_ref().unwrap_err().message(), "Remote tool reported an error.");
}
