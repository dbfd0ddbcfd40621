// crates/mcs-cli/src/client/tests.rs
// ============================================================================
// Module: Gateway Client Tests
// Description: Chunk decoding, sequence checks, and token form encoding.
// ============================================================================

//! ## Overview
//! Unit tests for the NDJSON decoder, stream summary checks, and request
//! construction.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use mcs_core::ChunkContent;
use mcs_core::ToolCallChunk;

use super::CallSummary;
use super::ChunkDecoder;
use super::ClientError;
use super::GatewayClient;
use super::TokenRequest;

/// Text chunk with `sequence_id`.
fn text(sequence_id: u64, text: &str) -> ToolCallChunk {
    ToolCallChunk {
        sequence_id,
        content: ChunkContent::Text(text.to_string()),
    }
}

/// Confirms lines split across reads are reassembled.
#[test]
fn decoder_reassembles_split_lines() {
    let mut decoder = ChunkDecoder::new(1024);
    assert!(decoder.push(br#"{"sequence_id":0,"te"#).unwrap().is_empty());
    let chunks = decoder.push(b"xt\":\"a\"}\n{\"sequence_id\":1,\"text\":\"b\"}\n").unwrap();
    assert_eq!(chunks, vec![text(0, "a"), text(1, "b")]);
    assert!(decoder.finish().unwrap().is_none());
}

/// Confirms blank lines are skipped and an unterminated last line is kept.
#[test]
fn decoder_skips_blank_lines_and_keeps_trailing_line() {
    let mut decoder = ChunkDecoder::new(1024);
    let chunks = decoder.push(b"\n\r\n{\"sequence_id\":0,\"error\":\"bad\"}").unwrap();
    assert!(chunks.is_empty());
    let last = decoder.finish().unwrap().unwrap();
    assert_eq!(last.content, ChunkContent::Error("bad".to_string()));
}

/// Confirms invalid JSON lines are rejected.
#[test]
fn decoder_rejects_invalid_json() {
    let mut decoder = ChunkDecoder::new(1024);
    let err = decoder.push(b"not json\n").unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

/// Confirms lines over the cap are rejected.
#[test]
fn decoder_caps_line_length() {
    let mut decoder = ChunkDecoder::new(16);
    let err = decoder.push(&[b'x'; 32]).unwrap_err();
    assert!(matches!(
        err,
        ClientError::ResponseTooLarge {
            actual: 32,
            limit: 16
        }
    ));
}

/// Confirms a gap in sequence ids is a protocol error.
#[test]
fn summary_rejects_sequence_gaps() {
    let mut summary = CallSummary::default();
    summary.observe(&text(0, "a")).unwrap();
    let err = summary.observe(&text(2, "c")).unwrap_err();
    assert!(err.to_string().contains("expected sequence_id 1, got 2"));
}

/// Confirms output after an error chunk is a protocol error.
#[test]
fn summary_rejects_output_after_error() {
    let mut summary = CallSummary::default();
    summary
        .observe(&ToolCallChunk {
            sequence_id: 0,
            content: ChunkContent::Error("stopped".to_string()),
        })
        .unwrap();
    assert!(summary.failed);
    assert!(summary.observe(&text(1, "late")).is_err());
}

/// Confirms the server URL must use an HTTP scheme.
#[test]
fn client_requires_http_scheme() {
    let err = GatewayClient::new("ftp://gateway", "token").unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));
    assert!(GatewayClient::new("not a url", "token").is_err());
}

/// Confirms `Debug` output hides the bearer token.
#[test]
fn client_debug_redacts_token() {
    let client = GatewayClient::new("https://gateway:50051", "secret-token").unwrap();
    let rendered = format!("{client:?}");
    assert!(!rendered.contains("secret-token"));
}

/// Confirms the token form encodes the client credentials.
#[test]
fn token_form_encodes_credentials() {
    let request = TokenRequest {
        endpoint: "http://idp/token".to_string(),
        client_id: "mcs cli".to_string(),
        client_secret: "s&cret".to_string(),
        audience: Some("mcs-server".to_string()),
    };
    assert_eq!(
        request.form_body(),
        "grant_type=client_credentials&client_id=mcs+cli&client_secret=s%26cret&audience=mcs-server"
    );
    assert!(!format!("{request:?}").contains("s&cret"));
}
