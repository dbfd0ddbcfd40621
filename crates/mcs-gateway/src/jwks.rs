// crates/mcs-gateway/src/jwks.rs
// ============================================================================
// Module: Token Validator
// Description: JWT verification against a cached, refreshable JWKS snapshot.
// Purpose: Turn bearer tokens into verified claims or a typed auth error.
// Dependencies: jsonwebtoken, reqwest, serde_json, mcs-config
// ============================================================================

//! ## Overview
//! [`JwksTokenValidator`] verifies signature, issuer, audience, expiry, and
//! not-before of a JWT. Signing keys come from a [`PublicKeySet`] snapshot
//! that is fetched lazily, refreshed when older than its TTL, and refreshed
//! once when a token names an unknown key id. Refresh publishes a new
//! immutable snapshot; readers holding the previous `Arc` are unaffected.
//! Refreshes are single-flight: concurrent callers wait for the in-progress
//! fetch and reuse its result.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::io::Read;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::time::Duration;
use std::time::Instant;

use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use jsonwebtoken::decode;
use jsonwebtoken::decode_header;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::AlgorithmParameters;
use jsonwebtoken::jwk::EllipticCurve;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::jwk::KeyAlgorithm;
use jsonwebtoken::jwk::PublicKeyUse;
use mcs_config::AuthConfig;
use reqwest::blocking::Client;
use serde_json::Map;
use serde_json::Value;

use crate::auth::AuthError;

// ============================================================================
// SECTION: Claims
// ============================================================================

/// Verified token payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    /// `sub` claim.
    pub subject: Option<String>,
    /// `aud` claim, normalized to a set.
    pub audience: BTreeSet<String>,
    /// `exp` claim in seconds since the epoch.
    pub expires_at: u64,
    /// `iss` claim.
    pub issuer: Option<String>,
    /// Every claim as decoded.
    pub claims: Map<String, Value>,
}

impl TokenClaims {
    /// Builds claims from a decoded payload.
    fn from_payload(claims: Map<String, Value>) -> Result<Self, AuthError> {
        let expires_at = claims
            .get("exp")
            .and_then(Value::as_u64)
            .ok_or_else(|| AuthError::MalformedToken("exp claim must be an integer".to_string()))?;
        let audience = match claims.get("aud") {
            Some(Value::String(aud)) => BTreeSet::from([aud.clone()]),
            Some(Value::Array(values)) => {
                values.iter().filter_map(Value::as_str).map(str::to_string).collect()
            }
            _ => BTreeSet::new(),
        };
        Ok(Self {
            subject: claims.get("sub").and_then(Value::as_str).map(str::to_string),
            audience,
            expires_at,
            issuer: claims.get("iss").and_then(Value::as_str).map(str::to_string),
            claims,
        })
    }
}

// ============================================================================
// SECTION: Key Set
// ============================================================================

/// One usable verification key.
#[derive(Clone)]
pub struct VerificationKey {
    /// Key identifier (`kid`).
    kid: Option<String>,
    /// Algorithm the key verifies.
    algorithm: Algorithm,
    /// Decoding key material.
    key: DecodingKey,
}

impl VerificationKey {
    /// Builds a key from parts.
    #[must_use]
    pub const fn new(kid: Option<String>, algorithm: Algorithm, key: DecodingKey) -> Self {
        Self {
            kid,
            algorithm,
            key,
        }
    }

    /// Converts a published JWK; returns `None` for encryption keys and
    /// unsupported algorithms.
    #[must_use]
    pub fn from_jwk(jwk: &Jwk) -> Option<Self> {
        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            return None;
        }
        let algorithm = match jwk.common.key_algorithm.as_ref() {
            Some(declared) => signing_algorithm(declared)?,
            None => inferred_algorithm(&jwk.algorithm)?,
        };
        let key = DecodingKey::from_jwk(jwk).ok()?;
        Some(Self::new(jwk.common.key_id.clone(), algorithm, key))
    }

    /// Returns the key identifier.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Returns the verification algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

/// Immutable snapshot of the identity provider's signing keys.
pub struct PublicKeySet {
    /// Usable keys.
    keys: Vec<VerificationKey>,
    /// Fetch timestamp.
    fetched_at: Instant,
}

impl PublicKeySet {
    /// Wraps freshly fetched keys.
    #[must_use]
    pub fn new(keys: Vec<VerificationKey>) -> Self {
        Self {
            keys,
            fetched_at: Instant::now(),
        }
    }

    /// Looks up the key for `kid`. A token without `kid` matches only a
    /// single-key set.
    #[must_use]
    pub fn resolve(&self, kid: Option<&str>) -> Option<&VerificationKey> {
        match kid {
            Some(kid) => self.keys.iter().find(|key| key.kid() == Some(kid)),
            None if self.keys.len() == 1 => self.keys.first(),
            None => None,
        }
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true when the set holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the snapshot age.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Source of signing keys.
pub trait KeySetSource: Send + Sync {
    /// Fetches the current key list.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeySetUnavailable`] when the keys cannot be fetched.
    fn fetch(&self) -> Result<Vec<VerificationKey>, AuthError>;
}

/// Fetches keys from a JWKS endpoint over HTTPS.
pub struct JwksKeySetSource {
    /// JWKS URL.
    url: String,
    /// Blocking HTTP client.
    client: Client,
    /// Maximum document size.
    max_bytes: usize,
}

impl JwksKeySetSource {
    /// Builds a source for the endpoint configured in `[auth]`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeySetUnavailable`] when the endpoint is missing or
    /// the HTTP client cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let url =
            config.jwks_endpoint().map_err(|err| AuthError::KeySetUnavailable(err.to_string()))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|_| AuthError::KeySetUnavailable("http client build failed".to_string()))?;
        Ok(Self {
            url,
            client,
            max_bytes: config.max_jwks_bytes,
        })
    }
}

impl KeySetSource for JwksKeySetSource {
    fn fetch(&self) -> Result<Vec<VerificationKey>, AuthError> {
        let response = self.client.get(&self.url).send().map_err(|err| {
            if err.is_timeout() {
                AuthError::KeySetUnavailable("jwks request timed out".to_string())
            } else {
                AuthError::KeySetUnavailable("jwks request failed".to_string())
            }
        })?;
        if !response.status().is_success() {
            return Err(AuthError::KeySetUnavailable(format!(
                "jwks endpoint returned {}",
                response.status().as_u16()
            )));
        }
        let max_bytes_u64 = u64::try_from(self.max_bytes).unwrap_or(u64::MAX);
        if let Some(length) = response.content_length()
            && length > max_bytes_u64
        {
            return Err(AuthError::KeySetUnavailable("jwks document too large".to_string()));
        }
        let mut body = Vec::new();
        response
            .take(max_bytes_u64.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|_| AuthError::KeySetUnavailable("jwks read failed".to_string()))?;
        if body.len() > self.max_bytes {
            return Err(AuthError::KeySetUnavailable("jwks document too large".to_string()));
        }
        let set: JwkSet = serde_json::from_slice(&body)
            .map_err(|_| AuthError::KeySetUnavailable("jwks document invalid".to_string()))?;
        Ok(set.keys.iter().filter_map(VerificationKey::from_jwk).collect())
    }
}

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Token verification contract.
pub trait TokenVerifier: Send + Sync {
    /// Verifies `token` and checks it was issued for `expected_audience`.
    ///
    /// # Errors
    ///
    /// Returns the specific [`AuthError`] kind describing the rejection.
    fn validate(&self, token: &str, expected_audience: &str) -> Result<TokenClaims, AuthError>;
}

/// Validator timing and issuer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSettings {
    /// Required issuer, when configured.
    pub issuer: Option<String>,
    /// Snapshot lifetime before a proactive refresh.
    pub key_set_ttl: Duration,
    /// Minimum snapshot age before an unknown `kid` may trigger a refresh.
    pub refresh_cooldown: Duration,
    /// Clock leeway for `exp`/`nbf`.
    pub leeway_secs: u64,
}

impl ValidatorSettings {
    /// Derives settings from `[auth]`.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            issuer: config.issuer_url(),
            key_set_ttl: Duration::from_secs(config.key_set_ttl_secs),
            refresh_cooldown: Duration::from_millis(config.refresh_cooldown_ms),
            leeway_secs: config.leeway_secs,
        }
    }
}

/// JWKS-backed [`TokenVerifier`].
pub struct JwksTokenValidator {
    /// Key source.
    source: Box<dyn KeySetSource>,
    /// Timing and issuer settings.
    settings: ValidatorSettings,
    /// Currently published snapshot.
    snapshot: RwLock<Option<Arc<PublicKeySet>>>,
    /// Serializes refreshes.
    refresh_lock: Mutex<()>,
}

impl JwksTokenValidator {
    /// Builds a validator over `source`. No fetch happens until first use.
    #[must_use]
    pub fn new(source: Box<dyn KeySetSource>, settings: ValidatorSettings) -> Self {
        Self {
            source,
            settings,
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Builds a validator for the JWKS endpoint configured in `[auth]`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the key source cannot be built.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let source = JwksKeySetSource::from_config(config)?;
        Ok(Self::new(Box::new(source), ValidatorSettings::from_config(config)))
    }

    /// Returns the published snapshot without fetching.
    fn published(&self) -> Result<Option<Arc<PublicKeySet>>, AuthError> {
        self.snapshot
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| AuthError::KeySetUnavailable("key set lock poisoned".to_string()))
    }

    /// Returns a snapshot younger than the TTL, fetching when needed.
    fn current(&self) -> Result<Arc<PublicKeySet>, AuthError> {
        match self.published()? {
            Some(snapshot) if snapshot.age() < self.settings.key_set_ttl => Ok(snapshot),
            observed => self.refresh(observed.as_ref()),
        }
    }

    /// Fetches and publishes a new snapshot unless another caller already
    /// replaced `observed` while this one waited.
    fn refresh(&self, observed: Option<&Arc<PublicKeySet>>) -> Result<Arc<PublicKeySet>, AuthError> {
        let _guard = self
            .refresh_lock
            .lock()
            .map_err(|_| AuthError::KeySetUnavailable("refresh lock poisoned".to_string()))?;
        if let Some(latest) = self.published()? {
            let replaced = observed.is_none_or(|observed| !Arc::ptr_eq(observed, &latest));
            if replaced && latest.age() < self.settings.key_set_ttl {
                return Ok(latest);
            }
        }
        let fresh = Arc::new(PublicKeySet::new(self.source.fetch()?));
        let mut slot = self
            .snapshot
            .write()
            .map_err(|_| AuthError::KeySetUnavailable("key set lock poisoned".to_string()))?;
        *slot = Some(Arc::clone(&fresh));
        drop(slot);
        Ok(fresh)
    }

    /// Resolves the signing key for `kid`, refreshing once on a miss.
    fn resolve_key(&self, kid: Option<&str>) -> Result<VerificationKey, AuthError> {
        let snapshot = self.current()?;
        if let Some(key) = snapshot.resolve(kid) {
            return Ok(key.clone());
        }
        let unknown = || AuthError::UnknownKey(kid.unwrap_or("<none>").to_string());
        if snapshot.age() < self.settings.refresh_cooldown {
            return Err(unknown());
        }
        let refreshed = self.refresh(Some(&snapshot))?;
        refreshed.resolve(kid).cloned().ok_or_else(unknown)
    }

    /// Builds jsonwebtoken validation rules for one key.
    fn validation(&self, algorithm: Algorithm, expected_audience: &str) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.settings.leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_audience(&[expected_audience]);
        match &self.settings.issuer {
            Some(issuer) => {
                validation.set_issuer(&[issuer.as_str()]);
                validation.set_required_spec_claims(&["exp", "aud", "iss"]);
            }
            None => validation.set_required_spec_claims(&["exp", "aud"]),
        }
        validation
    }
}

impl TokenVerifier for JwksTokenValidator {
    fn validate(&self, token: &str, expected_audience: &str) -> Result<TokenClaims, AuthError> {
        let header = decode_header(token)
            .map_err(|_| AuthError::MalformedToken("token header unreadable".to_string()))?;
        let key = self.resolve_key(header.kid.as_deref())?;
        if header.alg != key.algorithm() {
            return Err(AuthError::SignatureInvalid(
                "token algorithm does not match signing key".to_string(),
            ));
        }
        let validation = self.validation(key.algorithm(), expected_audience);
        let data = decode::<Map<String, Value>>(token, &key.key, &validation)
            .map_err(|err| map_jwt_error(err.kind()))?;
        TokenClaims::from_payload(data.claims)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps jsonwebtoken failures onto auth error kinds.
fn map_jwt_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::Expired("token expired".to_string()),
        ErrorKind::ImmatureSignature => AuthError::NotYetValid("token not yet valid".to_string()),
        ErrorKind::InvalidAudience => {
            AuthError::AudienceMismatch("audience not accepted".to_string())
        }
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
            AuthError::AudienceMismatch("audience claim missing".to_string())
        }
        ErrorKind::InvalidIssuer => AuthError::IssuerMismatch("issuer not accepted".to_string()),
        ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => {
            AuthError::IssuerMismatch("issuer claim missing".to_string())
        }
        ErrorKind::MissingRequiredClaim(claim) => {
            AuthError::MalformedToken(format!("missing required claim: {claim}"))
        }
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidRsaKey(_) => {
            AuthError::SignatureInvalid("signature verification failed".to_string())
        }
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::MalformedToken("token is not a valid jwt".to_string()),
        _ => AuthError::MalformedToken("token rejected".to_string()),
    }
}

/// Maps a declared JWK algorithm onto a signing algorithm.
const fn signing_algorithm(declared: &KeyAlgorithm) -> Option<Algorithm> {
    match declared {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// Infers the algorithm for keys published without `alg`.
const fn inferred_algorithm(parameters: &AlgorithmParameters) -> Option<Algorithm> {
    match parameters {
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(ec) => match ec.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
        _ => None,
    }
}
