//!
//! gatehouse configuration
//! -----------------------
//! One immutable `GatewayConfig` is assembled at process start (defaults, then
//! `GATEHOUSE_*` environment variables, then CLI flags applied by the server binary)
//! and handed by reference to the token codec, login endpoint and bootstrap.

use std::env;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_GRAPHQL_PATH: &str = "/graphql";
pub const DEFAULT_SCHEMA_PATH: &str = "schema.graphql";
pub const DEFAULT_USERS_PATH: &str = "users.json";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
pub const DEFAULT_WS_INIT_TIMEOUT_MS: u64 = 3000;

/// HMAC keys shorter than this are rejected.
pub const MIN_SIGNING_KEY_LEN: usize = 16;

/// Secret used to sign bearer tokens. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SIGNING_KEY_LEN {
            return Err(ConfigError::SigningKeyTooShort { min: MIN_SIGNING_KEY_LEN });
        }
        Ok(Self(bytes))
    }

    /// Random 256-bit key. Tokens signed with it do not survive a restart.
    pub fn ephemeral() -> Result<Self, ConfigError> {
        let mut buf = [0u8; 32];
        getrandom::getrandom(&mut buf).map_err(|e| ConfigError::InvalidValue {
            name: "signing_key",
            value: e.to_string(),
        })?;
        Ok(Self(buf.to_vec()))
    }

    /// Accepts `base64:<standard base64>` or a raw UTF-8 secret.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        if let Some(b64) = raw.strip_prefix("base64:") {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(b64.trim())
                .map_err(|_| ConfigError::InvalidValue { name: "signing_key", value: "<redacted>".into() })?;
            return Self::new(bytes);
        }
        Self::new(raw.as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] { &self.0 }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey(<{} bytes redacted>)", self.0.len())
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub graphql_path: String,
    pub schema_path: PathBuf,
    pub users_path: PathBuf,
    pub signing_key: SigningKey,
    pub token_ttl: Duration,
    pub ws_init_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(signing_key: SigningKey) -> Self {
        Self {
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            graphql_path: DEFAULT_GRAPHQL_PATH.to_string(),
            schema_path: PathBuf::from(DEFAULT_SCHEMA_PATH),
            users_path: PathBuf::from(DEFAULT_USERS_PATH),
            signing_key,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            ws_init_timeout: Duration::from_millis(DEFAULT_WS_INIT_TIMEOUT_MS),
        }
    }

    /// Defaults overridden by `GATEHOUSE_*` environment variables.
    ///
    /// When `GATEHOUSE_SIGNING_KEY` is unset an ephemeral key is generated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let key = match env::var("GATEHOUSE_SIGNING_KEY") {
            Ok(raw) => SigningKey::parse(&raw)?,
            Err(_) => {
                tracing::warn!(target: "startup", "GATEHOUSE_SIGNING_KEY unset; using an ephemeral signing key");
                SigningKey::ephemeral()?
            }
        };
        let mut cfg = Self::new(key);
        if let Some(v) = env_var("GATEHOUSE_BIND_ADDR") { cfg.bind_addr = parse_value("GATEHOUSE_BIND_ADDR", &v)?; }
        if let Some(v) = env_var("GATEHOUSE_PORT") { cfg.port = parse_value("GATEHOUSE_PORT", &v)?; }
        if let Some(v) = env_var("GATEHOUSE_GRAPHQL_PATH") { cfg.graphql_path = normalize_path("GATEHOUSE_GRAPHQL_PATH", &v)?; }
        if let Some(v) = env_var("GATEHOUSE_SCHEMA") { cfg.schema_path = PathBuf::from(v); }
        if let Some(v) = env_var("GATEHOUSE_USERS") { cfg.users_path = PathBuf::from(v); }
        if let Some(v) = env_var("GATEHOUSE_TOKEN_TTL_SECS") {
            cfg.token_ttl = Duration::from_secs(parse_nonzero("GATEHOUSE_TOKEN_TTL_SECS", &v)?);
        }
        if let Some(v) = env_var("GATEHOUSE_WS_INIT_TIMEOUT_MS") {
            cfg.ws_init_timeout = Duration::from_millis(parse_nonzero("GATEHOUSE_WS_INIT_TIMEOUT_MS", &v)?);
        }
        Ok(cfg)
    }

    pub fn with_graphql_path(mut self, path: &str) -> Result<Self, ConfigError> {
        self.graphql_path = normalize_path("graphql_path", path)?;
        Ok(self)
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_value<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue { name, value: raw.to_string() })
}

fn parse_nonzero(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match parse_value::<u64>(name, raw)? {
        0 => Err(ConfigError::InvalidValue { name, value: raw.to_string() }),
        n => Ok(n),
    }
}

/// Route paths must be absolute and must not collide with the login route.
pub fn normalize_path(name: &'static str, raw: &str) -> Result<String, ConfigError> {
    let p = raw.trim();
    if !p.starts_with('/') || p == "/" || p == "/login" || p.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidValue { name, value: raw.to_string() });
    }
    Ok(p.trim_end_matches('/').to_string())
}
