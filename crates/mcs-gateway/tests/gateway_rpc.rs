// crates/mcs-gateway/tests/gateway_rpc.rs
// ============================================================================
// Module: Gateway RPC Integration Tests
// Description: End-to-end ListTools/CallTool over HTTP with signed tokens.
// Purpose: Validate auth gating, chunk streaming, and rejection codes.
// Dependencies: mcs-gateway, mcs-tools, jsonwebtoken, reqwest, tempfile
// ============================================================================

//! ## Overview
//! Boots a gateway on a loopback port with HMAC-signed tokens and exercises
//! both RPCs the way a remote caller would.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::encode;
use mcs_config::ServerConfig;
use mcs_core::CALL_TOOL_PATH;
use mcs_core::LIST_TOOLS_PATH;
use mcs_core::NativeToolSource;
use mcs_core::OutputItem;
use mcs_core::tool;
use mcs_gateway::AuthError;
use mcs_gateway::GatewayParts;
use mcs_gateway::GatewayServer;
use mcs_gateway::GatewayServerError;
use mcs_gateway::JwksTokenValidator;
use mcs_gateway::NoopAuditSink;
use mcs_gateway::NoopMetrics;
use mcs_gateway::ToolRegistryBuilder;
use mcs_gateway::jwks::KeySetSource;
use mcs_gateway::jwks::ValidatorSettings;
use mcs_gateway::jwks::VerificationKey;
use mcs_tools::FILE_READER;
use mcs_tools::NativeToolsConfig;
use mcs_tools::WEB_SEARCH;
use mcs_tools::builtin_tool_sources;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// HMAC secret shared by the key source and the token signer.
const SECRET: &[u8] = b"integration-secret";
/// Audience the gateway expects.
const AUDIENCE: &str = "mcs-server";
/// Issuer the gateway expects.
const ISSUER: &str = "https://idp.example.test/realms/mcs";
/// PNG signature served by `image_tool`.
const PNG_BYTES: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Key source holding the single `k1` secret.
struct StaticKeys;

impl KeySetSource for StaticKeys {
    fn fetch(&self) -> Result<Vec<VerificationKey>, AuthError> {
        Ok(vec![VerificationKey::new(
            Some("k1".to_string()),
            Algorithm::HS256,
            DecodingKey::from_secret(SECRET),
        )])
    }
}

/// Gateway running on a loopback port.
struct Gateway {
    /// Base URL.
    base: String,
    /// Number of `counting` invocations.
    invocations: Arc<AtomicUsize>,
    /// Shutdown trigger.
    stop: oneshot::Sender<()>,
    /// Serve task.
    task: JoinHandle<Result<(), GatewayServerError>>,
}

impl Gateway {
    /// Starts a gateway with built-in and fixture tools.
    async fn start() -> Self {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invocations);
        let mut builder = ToolRegistryBuilder::new(Arc::new(NoopAuditSink));
        let tools = NativeToolsConfig {
            enabled: Some(vec![FILE_READER.to_string(), WEB_SEARCH.to_string()]),
            ..NativeToolsConfig::default()
        };
        for source in tokio::task::block_in_place(|| builtin_tool_sources(&tools)).unwrap() {
            builder.register_native(source);
        }
        builder.register_native(NativeToolSource::new("image_tool", "Fixed PNG", |_args| {
            tool::single(OutputItem::binary(PNG_BYTES.to_vec(), "image/png"))
        }));
        builder.register_native(NativeToolSource::new("counting", "Counts calls", move |_args| {
            counter.fetch_add(1, Ordering::SeqCst);
            tool::single(OutputItem::text("counted"))
        }));

        let validator = JwksTokenValidator::new(
            Box::new(StaticKeys),
            ValidatorSettings {
                issuer: Some(ISSUER.to_string()),
                key_set_ttl: Duration::from_secs(300),
                refresh_cooldown: Duration::from_secs(5),
                leeway_secs: 0,
            },
        );
        let server = GatewayServer::new(GatewayParts {
            server: ServerConfig::default(),
            registry: Arc::new(builder.build()),
            verifier: Arc::new(validator),
            audience: AUDIENCE.to_string(),
            audit: Arc::new(NoopAuditSink),
            metrics: Arc::new(NoopMetrics),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_listener(listener, async move {
            let _ = stop_rx.await;
        }));
        Self {
            base: format!("http://{addr}"),
            invocations,
            stop,
            task,
        }
    }

    /// Triggers shutdown and waits for the serve task.
    async fn stop(self) {
        self.stop.send(()).unwrap();
        self.task.await.unwrap().unwrap();
    }

    /// Absolute URL for `path`.
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Posts a `CallTool` body with an optional bearer token.
    async fn call(&self, token: Option<&str>, body: Value) -> reqwest::Response {
        let mut request = reqwest::Client::new().post(self.url(CALL_TOOL_PATH)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }
}

/// Current Unix time in seconds.
fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// Signs a token with the given expiry and audience.
fn token_with(exp: u64, audience: &str) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("k1".to_string());
    let claims = json!({
        "sub": "service-account-caller",
        "aud": audience,
        "iss": ISSUER,
        "exp": exp,
    });
    encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

/// Token valid for ten minutes.
fn valid_token() -> String {
    token_with(now_secs() + 600, AUDIENCE)
}

/// Parses the NDJSON chunks of `response`.
async fn chunks(response: reqwest::Response) -> Vec<Value> {
    let body = response.text().await.unwrap();
    body.lines().map(|line| serde_json::from_str(line).unwrap()).collect()
}

// ============================================================================
// SECTION: ListTools
// ============================================================================

/// Confirms `ListTools` returns the registry snapshot.
#[tokio::test(flavor = "multi_thread")]
async fn list_tools_returns_registry_snapshot() {
    let gateway = Gateway::start().await;
    let response = reqwest::Client::new()
        .post(gateway.url(LIST_TOOLS_PATH))
        .bearer_auth(valid_token())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let names: BTreeSet<_> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap().to_string())
        .collect();
    let expected: BTreeSet<_> =
        ["counting", "file_reader", "image_tool", "web_search"].map(str::to_string).into();
    assert_eq!(names, expected);
    gateway.stop().await;
}

/// Confirms `ListTools` requires a token.
#[tokio::test(flavor = "multi_thread")]
async fn list_tools_requires_token() {
    let gateway = Gateway::start().await;
    let response = reqwest::Client::new().post(gateway.url(LIST_TOOLS_PATH)).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["www-authenticate"], "Bearer");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "unauthenticated");
    gateway.stop().await;
}

// ============================================================================
// SECTION: CallTool
// ============================================================================

/// Confirms `file_reader` streams lines in order.
#[tokio::test(flavor = "multi_thread")]
async fn file_reader_streams_lines() {
    let gateway = Gateway::start().await;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "alpha").unwrap();
    writeln!(file, "beta").unwrap();
    let path = file.path().to_string_lossy().to_string();

    let response = gateway
        .call(
            Some(&valid_token()),
            json!({"tool_name": "file_reader", "arguments": {"path": path}}),
        )
        .await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/x-ndjson");
    assert_eq!(
        chunks(response).await,
        vec![
            json!({"sequence_id": 0, "text": "LINE: alpha"}),
            json!({"sequence_id": 1, "text": "LINE: beta"}),
        ]
    );
    gateway.stop().await;
}

/// Confirms a missing file yields a single error chunk.
#[tokio::test(flavor = "multi_thread")]
async fn missing_file_yields_single_error_chunk() {
    let gateway = Gateway::start().await;
    let response = gateway
        .call(
            Some(&valid_token()),
            json!({"tool_name": "file_reader", "arguments": {"path": "/nonexistent/mcs/data.txt"}}),
        )
        .await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let chunks = chunks(response).await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0]["sequence_id"], 0);
    assert!(chunks[0]["error"].as_str().unwrap().contains("File not found"));
    gateway.stop().await;
}

/// Confirms binary output becomes a single image chunk.
#[tokio::test(flavor = "multi_thread")]
async fn binary_output_is_single_image_chunk() {
    let gateway = Gateway::start().await;
    let response =
        gateway.call(Some(&valid_token()), json!({"tool_name": "image_tool", "arguments": {}})).await;
    let chunks = chunks(response).await;
    assert_eq!(
        chunks,
        vec![json!({
            "sequence_id": 0,
            "image": {"data": "iVBORw0KGgo=", "mime_type": "image/png"}
        })]
    );
    gateway.stop().await;
}

/// Confirms rejected tokens never reach a tool.
#[tokio::test(flavor = "multi_thread")]
async fn rejected_tokens_never_reach_tools() {
    let gateway = Gateway::start().await;
    let body = json!({"tool_name": "counting", "arguments": {}});
    let expired = token_with(now_secs() - 3_600, AUDIENCE);
    let wrong_audience = token_with(now_secs() + 600, "other-service");
    for token in [None, Some("not-a-jwt"), Some(expired.as_str()), Some(wrong_audience.as_str())] {
        let response = gateway.call(token, body.clone()).await;
        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
        assert!(response.text().await.unwrap().contains("unauthenticated"));
    }
    assert_eq!(gateway.invocations.load(Ordering::SeqCst), 0);

    let response = gateway.call(Some(&valid_token()), body).await;
    assert_eq!(chunks(response).await, vec![json!({"sequence_id": 0, "text": "counted"})]);
    assert_eq!(gateway.invocations.load(Ordering::SeqCst), 1);
    gateway.stop().await;
}

/// Confirms unknown tools are not found and emit no chunks.
#[tokio::test(flavor = "multi_thread")]
async fn unknown_tool_is_not_found_without_chunks() {
    let gateway = Gateway::start().await;
    let response =
        gateway.call(Some(&valid_token()), json!({"tool_name": "nope", "arguments": {}})).await;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "not_found");
    assert!(body.get("sequence_id").is_none());
    gateway.stop().await;
}

/// Confirms malformed requests are invalid arguments.
#[tokio::test(flavor = "multi_thread")]
async fn malformed_request_is_invalid_argument() {
    let gateway = Gateway::start().await;
    let response = gateway.call(Some(&valid_token()), json!({"arguments": {}})).await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_argument");
    gateway.stop().await;
}

/// Confirms a missing argument is reported in band.
#[tokio::test(flavor = "multi_thread")]
async fn missing_argument_is_in_band_error() {
    let gateway = Gateway::start().await;
    let response =
        gateway.call(Some(&valid_token()), json!({"tool_name": "file_reader", "arguments": {}})).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let chunks = chunks(response).await;
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].get("error").is_some());
    gateway.stop().await;
}
