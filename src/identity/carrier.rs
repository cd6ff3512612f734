//! Transport-specific places a caller presents a token.

use std::fmt;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::token::Token;

/// Handshake field carrying the bearer token on the persistent channel.
pub const ACCESS_TOKEN_PARAM: &str = "accessToken";

/// Keys whose values are never written to logs.
const SENSITIVE_KEYS: &[&str] = &["accesstoken", "authorization", "token", "password", "secret"];

pub trait CredentialCarrier {
    fn extract_token(&self) -> Option<Token>;
}

/// `Authorization: Bearer <token>` on an HTTP request.
pub struct BearerHeader<'a>(pub &'a HeaderMap);

impl CredentialCarrier for BearerHeader<'_> {
    fn extract_token(&self) -> Option<Token> {
        let value = self.0.get(AUTHORIZATION)?.to_str().ok()?.trim();
        let (scheme, rest) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = rest.trim();
        if token.is_empty() { None } else { Some(Token::new(token)) }
    }
}

/// The `payload` of a `connection_init` message: any JSON object.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionParams(pub Map<String, Value>);

impl ConnectionParams {
    pub fn new() -> Self { Self(Map::new()) }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Non-object payloads (including `null`) are treated as empty.
    pub fn from_value(v: Option<Value>) -> Self {
        match v {
            Some(Value::Object(m)) => Self(m),
            _ => Self::default(),
        }
    }

    pub fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

impl CredentialCarrier for ConnectionParams {
    fn extract_token(&self) -> Option<Token> {
        match self.0.get(ACCESS_TOKEN_PARAM)? {
            Value::String(s) if !s.trim().is_empty() => Some(Token::new(s.trim())),
            _ => None,
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for (k, v) in self.0.iter() {
            if SENSITIVE_KEYS.contains(&k.to_ascii_lowercase().as_str()) {
                m.entry(k, &"<redacted>");
            } else {
                m.entry(k, v);
            }
        }
        m.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        h
    }

    #[test]
    fn bearer_header_extraction() {
        assert_eq!(BearerHeader(&headers("Bearer abc.def")).extract_token(), Some(Token::new("abc.def")));
        assert_eq!(BearerHeader(&headers("bearer   abc.def ")).extract_token(), Some(Token::new("abc.def")));
        assert_eq!(BearerHeader(&headers("Basic dXNlcjpwdw==")).extract_token(), None);
        assert_eq!(BearerHeader(&headers("Bearer ")).extract_token(), None);
        assert_eq!(BearerHeader(&HeaderMap::new()).extract_token(), None);
    }

    #[test]
    fn connection_params_extraction() {
        let p = ConnectionParams::new().with(ACCESS_TOKEN_PARAM, "tok");
        assert_eq!(p.extract_token(), Some(Token::new("tok")));
        assert_eq!(ConnectionParams::new().extract_token(), None);
        assert_eq!(ConnectionParams::new().with(ACCESS_TOKEN_PARAM, 42).extract_token(), None);
        assert_eq!(ConnectionParams::new().with(ACCESS_TOKEN_PARAM, "").extract_token(), None);
    }

    #[test]
    fn non_object_payload_is_empty() {
        assert_eq!(ConnectionParams::from_value(Some(Value::Null)), ConnectionParams::new());
        assert_eq!(ConnectionParams::from_value(Some(serde_json::json!([1, 2]))), ConnectionParams::new());
        assert_eq!(ConnectionParams::from_value(None), ConnectionParams::new());
    }

    #[test]
    fn debug_redacts_credentials() {
        let p = ConnectionParams::new()
            .with(ACCESS_TOKEN_PARAM, "very-secret-token")
            .with("client", "web");
        let dbg = format!("{:?}", p);
        assert!(!dbg.contains("very-secret-token"));
        assert!(dbg.contains("<redacted>"));
        assert!(dbg.contains("web"));
    }
}
