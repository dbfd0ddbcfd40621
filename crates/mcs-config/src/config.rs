// crates/mcs-config/src/config.rs
// ============================================================================
// Module: Gateway Configuration
// Description: TOML configuration model, loading, overrides, and validation.
// Purpose: Resolve and validate mcs.toml before the gateway starts.
// Dependencies: mcs-tools, serde, thiserror, toml, url
// ============================================================================

//! ## Overview
//! [`GatewayConfig::load`] resolves the config path (explicit argument, then
//! `MCS_CONFIG`, then `mcs.toml`), enforces size and encoding limits, parses
//! TOML, and validates every section. [`ConfigOverrides`] carries CLI and
//! environment overrides applied before validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use mcs_tools::NativeToolsConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Limits and Defaults
// ============================================================================

/// Default config filename when no path is provided.
const DEFAULT_CONFIG_NAME: &str = "mcs.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "MCS_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of remote backends.
pub(crate) const MAX_BACKENDS: usize = 64;
/// Maximum backend name length.
pub(crate) const MAX_BACKEND_NAME_LENGTH: usize = 64;
/// Maximum worker pool size.
pub(crate) const MAX_WORKERS: usize = 1024;
/// Maximum chunk channel depth.
pub(crate) const MAX_STREAM_BUFFER: usize = 1024;
/// Minimum identity provider timeout in milliseconds.
pub(crate) const MIN_IDP_TIMEOUT_MS: u64 = 100;
/// Maximum identity provider timeout in milliseconds.
pub(crate) const MAX_IDP_TIMEOUT_MS: u64 = 30_000;
/// Maximum key set cache lifetime in seconds.
pub(crate) const MAX_KEY_SET_TTL_SECS: u64 = 86_400;
/// Maximum clock leeway in seconds.
pub(crate) const MAX_LEEWAY_SECS: u64 = 300;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// MCS gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Bearer token validation configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Native tool configuration.
    #[serde(default)]
    pub tools: NativeToolsConfig,
    /// Remote MCP backends.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl GatewayConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_overrides(path, &ConfigOverrides::default())
    }

    /// Loads configuration, applies `overrides`, then validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overriding, or validation fails.
    pub fn load_with_overrides(
        path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_overrides(overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies CLI/environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bind address cannot take the port.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(port) = overrides.port {
            let mut addr = self.server.bind_addr()?;
            addr.set_port(port);
            self.server.bind = addr.to_string();
        }
        if let Some(url) = &overrides.keycloak_url {
            self.auth.keycloak_url = Some(url.clone());
        }
        if let Some(realm) = &overrides.realm {
            self.auth.realm = Some(realm.clone());
        }
        if let Some(audience) = &overrides.audience {
            self.auth.audience.clone_from(audience);
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.auth.validate()?;
        self.tools.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
        validate_backends(&self.backends)?;
        Ok(())
    }
}

/// Overrides sourced from CLI flags or environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Listener port override.
    pub port: Option<u16>,
    /// Identity provider base URL override.
    pub keycloak_url: Option<String>,
    /// Identity provider realm override.
    pub realm: Option<String>,
    /// Expected audience override.
    pub audience: Option<String>,
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Listener configuration (`[server]`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Worker and streaming limits.
    #[serde(default)]
    pub limits: ServerLimitsConfig,
    /// Grace period for draining in-flight calls on shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Optional TLS configuration.
    #[serde(default)]
    pub tls: Option<ServerTlsConfig>,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            limits: ServerLimitsConfig::default(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            tls: None,
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid server.bind: {}", self.bind)))
    }

    /// Validates listener settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        self.limits.validate()?;
        if let Some(tls) = &self.tls {
            validate_path_string("server.tls.cert_path", &tls.cert_path)?;
            validate_path_string("server.tls.key_path", &tls.key_path)?;
        }
        if let Some(path) = &self.audit.path {
            validate_path_string("server.audit.path", path)?;
        }
        Ok(())
    }
}

/// Worker and streaming limits (`[server.limits]`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ServerLimitsConfig {
    /// Maximum concurrently executing tool calls.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Chunk channel depth per streaming call.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for ServerLimitsConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

impl ServerLimitsConfig {
    /// Validates limits.
    fn validate(self) -> Result<(), ConfigError> {
        if self.max_workers == 0 || self.max_workers > MAX_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "server.limits.max_workers must be between 1 and {MAX_WORKERS}"
            )));
        }
        if self.stream_buffer == 0 || self.stream_buffer > MAX_STREAM_BUFFER {
            return Err(ConfigError::Invalid(format!(
                "server.limits.stream_buffer must be between 1 and {MAX_STREAM_BUFFER}"
            )));
        }
        Ok(())
    }
}

/// TLS material locations (`[server.tls]`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerTlsConfig {
    /// PEM certificate chain path.
    pub cert_path: String,
    /// PEM private key path.
    pub key_path: String,
}

/// Audit logging configuration (`[server.audit]`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerAuditConfig {
    /// Whether audit events are emitted.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional JSON-lines file; stderr when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

// ============================================================================
// SECTION: Auth
// ============================================================================

/// Bearer token validation settings (`[auth]`).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Identity provider base URL (Keycloak style).
    #[serde(default)]
    pub keycloak_url: Option<String>,
    /// Identity provider realm.
    #[serde(default)]
    pub realm: Option<String>,
    /// Explicit issuer; derived from `keycloak_url` and `realm` when unset.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Explicit JWKS URL; derived from the issuer when unset.
    #[serde(default)]
    pub jwks_url: Option<String>,
    /// Audience every token must carry.
    #[serde(default)]
    pub audience: String,
    /// Key set cache lifetime in seconds.
    #[serde(default = "default_key_set_ttl_secs")]
    pub key_set_ttl_secs: u64,
    /// Minimum spacing between unknown-key refreshes.
    #[serde(default = "default_refresh_cooldown_ms")]
    pub refresh_cooldown_ms: u64,
    /// Clock leeway applied to `exp`/`nbf`.
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
    /// Connect timeout for key set fetches.
    #[serde(default = "default_idp_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Request timeout for key set fetches.
    #[serde(default = "default_idp_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Maximum key set document size.
    #[serde(default = "default_max_jwks_bytes")]
    pub max_jwks_bytes: usize,
    /// Allow plain-http identity provider URLs.
    #[serde(default)]
    pub allow_http: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            keycloak_url: None,
            realm: None,
            issuer: None,
            jwks_url: None,
            audience: String::new(),
            key_set_ttl_secs: default_key_set_ttl_secs(),
            refresh_cooldown_ms: default_refresh_cooldown_ms(),
            leeway_secs: default_leeway_secs(),
            connect_timeout_ms: default_idp_connect_timeout_ms(),
            request_timeout_ms: default_idp_request_timeout_ms(),
            max_jwks_bytes: default_max_jwks_bytes(),
            allow_http: false,
        }
    }
}

impl AuthConfig {
    /// Returns the expected issuer, if one is configured or derivable.
    #[must_use]
    pub fn issuer_url(&self) -> Option<String> {
        if let Some(issuer) = &self.issuer {
            return Some(issuer.trim_end_matches('/').to_string());
        }
        match (&self.keycloak_url, &self.realm) {
            (Some(base), Some(realm)) => {
                Some(format!("{}/realms/{}", base.trim_end_matches('/'), realm))
            }
            _ => None,
        }
    }

    /// Returns the JWKS endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when neither `jwks_url` nor an issuer
    /// is available.
    pub fn jwks_endpoint(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.jwks_url {
            return Ok(url.clone());
        }
        self.issuer_url()
            .map(|issuer| format!("{issuer}/protocol/openid-connect/certs"))
            .ok_or_else(|| {
                ConfigError::Invalid(
                    "auth requires jwks_url, issuer, or keycloak_url + realm".to_string(),
                )
            })
    }

    /// Returns the client-credentials token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no issuer is available.
    pub fn token_endpoint(&self) -> Result<String, ConfigError> {
        self.issuer_url()
            .map(|issuer| format!("{issuer}/protocol/openid-connect/token"))
            .ok_or_else(|| {
                ConfigError::Invalid("token endpoint requires issuer or keycloak_url + realm".to_string())
            })
    }

    /// Validates auth settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.audience.trim().is_empty() {
            return Err(ConfigError::Invalid("auth.audience must be non-empty".to_string()));
        }
        let jwks = self.jwks_endpoint()?;
        validate_idp_url("auth.jwks_url", &jwks, self.allow_http)?;
        if let Some(issuer) = self.issuer_url() {
            validate_idp_url("auth.issuer", &issuer, self.allow_http)?;
        }
        if self.key_set_ttl_secs == 0 || self.key_set_ttl_secs > MAX_KEY_SET_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "auth.key_set_ttl_secs must be between 1 and {MAX_KEY_SET_TTL_SECS}"
            )));
        }
        if self.leeway_secs > MAX_LEEWAY_SECS {
            return Err(ConfigError::Invalid(format!(
                "auth.leeway_secs must be at most {MAX_LEEWAY_SECS}"
            )));
        }
        validate_timeout("auth.connect_timeout_ms", self.connect_timeout_ms)?;
        validate_timeout("auth.request_timeout_ms", self.request_timeout_ms)?;
        if self.max_jwks_bytes == 0 {
            return Err(ConfigError::Invalid(
                "auth.max_jwks_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Backends
// ============================================================================

/// Remote MCP backend launched as a child process (`[[backends]]`).
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Namespace prefix for the backend's tools.
    pub name: String,
    /// Program and arguments.
    pub command: Vec<String>,
    /// Extra environment variables for the child.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Stdio message framing.
    #[serde(default)]
    pub framing: BackendFraming,
    /// Maximum size of a single backend message.
    #[serde(default = "default_backend_max_response_bytes")]
    pub max_response_bytes: usize,
}

/// Stdio framing spoken by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendFraming {
    /// One JSON message per line.
    #[default]
    Ndjson,
    /// `Content-Length` headers followed by the JSON body.
    ContentLength,
}

/// Validates backend entries.
fn validate_backends(backends: &[BackendConfig]) -> Result<(), ConfigError> {
    if backends.len() > MAX_BACKENDS {
        return Err(ConfigError::Invalid(format!("at most {MAX_BACKENDS} backends are allowed")));
    }
    let mut seen = BTreeSet::new();
    for backend in backends {
        let name = backend.name.trim();
        if name.is_empty() || name.len() > MAX_BACKEND_NAME_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "backend name must be 1..={MAX_BACKEND_NAME_LENGTH} characters"
            )));
        }
        if name.contains(':') || name.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "backend name must not contain ':' or whitespace: {name}"
            )));
        }
        if !seen.insert(name.to_string()) {
            return Err(ConfigError::Invalid(format!("duplicate backend name: {name}")));
        }
        match backend.command.first() {
            Some(program) if !program.trim().is_empty() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "backend {name} requires a non-empty command"
                )));
            }
        }
        if backend.max_response_bytes == 0 {
            return Err(ConfigError::Invalid(format!(
                "backend {name} max_response_bytes must be greater than zero"
            )));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from argument, environment, or default.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an identity provider URL and its scheme.
fn validate_idp_url(field: &str, value: &str, allow_http: bool) -> Result<(), ConfigError> {
    let url =
        Url::parse(value).map_err(|err| ConfigError::Invalid(format!("{field} invalid: {err}")))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        "http" => Err(ConfigError::Invalid(format!(
            "{field} uses http; set auth.allow_http = true to permit it"
        ))),
        other => Err(ConfigError::Invalid(format!("{field} has unsupported scheme {other}"))),
    }
}

/// Validates an identity provider timeout.
fn validate_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if !(MIN_IDP_TIMEOUT_MS..=MAX_IDP_TIMEOUT_MS).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between {MIN_IDP_TIMEOUT_MS} and {MAX_IDP_TIMEOUT_MS}"
        )));
    }
    Ok(())
}

/// Default listener address.
fn default_bind() -> String {
    "0.0.0.0:50051".to_string()
}

/// Default request body cap (1 MiB).
pub(crate) const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default worker pool size.
pub(crate) const fn default_max_workers() -> usize {
    10
}

/// Default chunk channel depth.
pub(crate) const fn default_stream_buffer() -> usize {
    8
}

/// Default shutdown grace period.
pub(crate) const fn default_shutdown_grace_ms() -> u64 {
    5_000
}

/// Audit logging is on unless disabled.
pub(crate) const fn default_audit_enabled() -> bool {
    true
}

/// Default key set cache lifetime.
pub(crate) const fn default_key_set_ttl_secs() -> u64 {
    300
}

/// Default unknown-key refresh spacing.
pub(crate) const fn default_refresh_cooldown_ms() -> u64 {
    5_000
}

/// Default clock leeway.
pub(crate) const fn default_leeway_secs() -> u64 {
    30
}

/// Default key set connect timeout.
pub(crate) const fn default_idp_connect_timeout_ms() -> u64 {
    2_000
}

/// Default key set request timeout.
pub(crate) const fn default_idp_request_timeout_ms() -> u64 {
    5_000
}

/// Default key set document cap (256 KiB).
pub(crate) const fn default_max_jwks_bytes() -> usize {
    256 * 1024
}

/// Default backend message cap (4 MiB).
pub(crate) const fn default_backend_max_response_bytes() -> usize {
    4 * 1024 * 1024
}
