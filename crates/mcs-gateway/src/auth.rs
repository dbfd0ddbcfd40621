// crates/mcs-gateway/src/auth.rs
// ============================================================================
// Module: Auth Gate
// Description: Bearer token enforcement for every gateway RPC.
// Purpose: Reject unauthenticated calls before any handler logic runs.
// Dependencies: axum, sha2, thiserror, tokio
// ============================================================================

//! ## Overview
//! [`AuthGate`] extracts the bearer token from the `authorization` header,
//! delegates to a [`TokenVerifier`], and either rejects the call with
//! `Unauthenticated` or attaches an [`AuthContext`] to the request. The
//! specific [`AuthError`] kind goes to the audit log only; callers always see
//! the same rejection. All decisions are fail-closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::WWW_AUTHENTICATE;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use mcs_core::RpcCode;
use mcs_core::RpcStatus;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::audit::AuditSink;
use crate::audit::AuthAuditEvent;
use crate::jwks::TokenClaims;
use crate::jwks::TokenVerifier;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted `authorization` header size.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

/// Caller-facing rejection message.
const UNAUTHENTICATED_MESSAGE: &str = "valid bearer token required";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token validation failures. Every kind maps to `Unauthenticated`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No usable `authorization` header.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    /// Token cannot be parsed.
    #[error("malformed token: {0}")]
    MalformedToken(String),
    /// Token references a key the identity provider does not publish.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),
    /// Signature or algorithm check failed.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),
    /// Token is past its expiry.
    #[error("token expired: {0}")]
    Expired(String),
    /// Token is not valid yet.
    #[error("token not yet valid: {0}")]
    NotYetValid(String),
    /// Expected audience not present.
    #[error("audience mismatch: {0}")]
    AudienceMismatch(String),
    /// Issuer differs from the configured one.
    #[error("issuer mismatch: {0}")]
    IssuerMismatch(String),
    /// Signing keys could not be fetched.
    #[error("key set unavailable: {0}")]
    KeySetUnavailable(String),
}

impl AuthError {
    /// Returns a stable label for audit logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredentials(_) => "missing_credentials",
            Self::MalformedToken(_) => "malformed_token",
            Self::UnknownKey(_) => "unknown_key",
            Self::SignatureInvalid(_) => "signature_invalid",
            Self::Expired(_) => "expired",
            Self::NotYetValid(_) => "not_yet_valid",
            Self::AudienceMismatch(_) => "audience_mismatch",
            Self::IssuerMismatch(_) => "issuer_mismatch",
            Self::KeySetUnavailable(_) => "key_set_unavailable",
        }
    }
}

// ============================================================================
// SECTION: Auth Context
// ============================================================================

/// Authenticated caller context attached to request extensions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Verified claims.
    pub claims: Arc<TokenClaims>,
    /// SHA-256 fingerprint of the bearer token.
    pub token_fingerprint: String,
}

impl AuthContext {
    /// Returns the token subject.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.claims.subject.as_deref()
    }
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Bearer token gate shared by every RPC route.
pub struct AuthGate {
    /// Token verifier.
    verifier: Arc<dyn TokenVerifier>,
    /// Audience every token must carry.
    audience: String,
    /// Audit sink for decisions.
    audit: Arc<dyn AuditSink>,
}

impl AuthGate {
    /// Builds a gate.
    #[must_use]
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        audience: impl Into<String>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            verifier,
            audience: audience.into(),
            audit,
        }
    }

    /// Authorizes one call and records the decision.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] describing why the call was rejected.
    pub fn authorize(
        &self,
        auth_header: Option<&str>,
        rpc: &str,
        peer_ip: Option<IpAddr>,
    ) -> Result<AuthContext, AuthError> {
        let peer = peer_ip.map(|ip| ip.to_string());
        let token = match parse_bearer_token(auth_header) {
            Ok(token) => token,
            Err(err) => {
                self.audit.record_auth(&AuthAuditEvent::denied(rpc, peer, None, err.kind()));
                return Err(err);
            }
        };
        let fingerprint = token_fingerprint(&token);
        match self.verifier.validate(&token, &self.audience) {
            Ok(claims) => {
                self.audit.record_auth(&AuthAuditEvent::allowed(
                    rpc,
                    peer,
                    claims.subject.clone(),
                    fingerprint.clone(),
                ));
                Ok(AuthContext {
                    claims: Arc::new(claims),
                    token_fingerprint: fingerprint,
                })
            }
            Err(err) => {
                self.audit.record_auth(&AuthAuditEvent::denied(
                    rpc,
                    peer,
                    Some(fingerprint),
                    err.kind(),
                ));
                Err(err)
            }
        }
    }
}

/// Axum middleware enforcing [`AuthGate`] on the wrapped routes.
///
/// Validation may fetch signing keys with blocking I/O, so it runs on the
/// blocking pool.
pub async fn require_bearer(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let peer_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let rpc = request.uri().path().to_string();
    let decision =
        tokio::task::spawn_blocking(move || gate.authorize(header.as_deref(), &rpc, peer_ip))
            .await;
    match decision {
        Ok(Ok(context)) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Ok(Err(_)) | Err(_) => unauthenticated_response(),
    }
}

/// Builds the uniform 401 response.
#[must_use]
pub fn unauthenticated_response() -> Response {
    let status = RpcStatus::new(RpcCode::Unauthenticated, UNAUTHENTICATED_MESSAGE);
    let mut response = (StatusCode::UNAUTHORIZED, Json(status)).into_response();
    response.headers_mut().insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the token from a `Bearer <token>` header value.
fn parse_bearer_token(auth_header: Option<&str>) -> Result<String, AuthError> {
    let header = auth_header
        .ok_or_else(|| AuthError::MissingCredentials("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::MissingCredentials("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MissingCredentials("invalid authorization header".to_string()));
    }
    Ok(token.to_string())
}

/// Returns the lowercase hex SHA-256 of `token`.
fn token_fingerprint(token: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let digest = Sha256::digest(token.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}
