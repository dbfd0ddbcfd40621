// crates/mcs-core/src/protocol/tests.rs
// ============================================================================
// Module: RPC Wire Model Tests
// Description: Unit tests for chunk and status JSON shapes.
// Purpose: Keep the streamed chunk encoding stable for clients.
// Dependencies: mcs-core, serde_json
// ============================================================================

//! ## Overview
//! Pins the NDJSON chunk encoding and the status-to-HTTP mapping.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use serde_json::Value;
use serde_json::json;

use super::ChunkContent;
use super::ImagePayload;
use super::RpcCode;
use super::RpcStatus;
use super::ToolCallChunk;
use super::ToolCallRequest;

/// Confirms text chunks serialize flat beside `sequence_id`.
#[test]
fn text_chunk_flattens_payload_next_to_sequence_id() {
    let chunk = ToolCallChunk {
        sequence_id: 4,
        content: ChunkContent::Text("hello".to_string()),
    };
    let value = serde_json::to_value(&chunk).unwrap();
    assert_eq!(value, json!({"sequence_id": 4, "text": "hello"}));
}

/// Confirms image data is base64 encoded on the wire.
#[test]
fn image_chunk_encodes_data_as_base64() {
    let chunk = ToolCallChunk {
        sequence_id: 0,
        content: ChunkContent::Image(ImagePayload {
            data: vec![0xff, 0xd8, 0xff],
            mime_type: "image/jpeg".to_string(),
        }),
    };
    let value = serde_json::to_value(&chunk).unwrap();
    assert_eq!(value["image"]["data"], json!("/9j/"));
    assert_eq!(value["image"]["mime_type"], json!("image/jpeg"));
    let decoded: ToolCallChunk = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, chunk);
}

/// Confirms error chunks report as errors.
#[test]
fn error_chunk_is_detectable() {
    let chunk: ToolCallChunk =
        serde_json::from_str(r#"{"sequence_id":2,"error":"boom"}"#).unwrap();
    assert!(chunk.is_error());
    assert_eq!(chunk.sequence_id, 2);
}

/// Confirms NDJSON framing appends exactly one newline.
#[test]
fn ndjson_line_ends_with_single_newline() {
    let chunk = ToolCallChunk {
        sequence_id: 0,
        content: ChunkContent::Text("a\nb".to_string()),
    };
    let line = chunk.to_ndjson_line().unwrap();
    assert_eq!(line.iter().filter(|byte| **byte == b'\n').count(), 1);
    assert_eq!(line.last(), Some(&b'\n'));
}

/// Confirms a call without `arguments` decodes to an empty map.
#[test]
fn call_request_defaults_to_empty_arguments() {
    let request: ToolCallRequest = serde_json::from_str(r#"{"tool_name":"x"}"#).unwrap();
    assert!(request.arguments.is_empty());
}

/// Confirms every status maps to its HTTP code.
#[test]
fn status_codes_map_to_http() {
    assert_eq!(RpcCode::Unauthenticated.http_status(), 401);
    assert_eq!(RpcCode::NotFound.http_status(), 404);
    let body: Value =
        serde_json::to_value(RpcStatus::new(RpcCode::NotFound, "unknown tool")).unwrap();
    assert_eq!(body, json!({"code": "not_found", "message": "unknown tool"}));
}
