//! Stateless bearer tokens: HS256 JWTs carrying `{sub, iat, exp}`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::SigningKey;
use crate::error::{ConfigError, IssueError, TokenError};
use crate::tprintln;

/// Opaque signed credential as presented by clients.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(raw: impl Into<String>) -> Self { Self(raw.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_string(self) -> String { self.0 }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Decoded token payload. Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl IdentityClaims {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(key: &SigningKey) -> Result<Self, ConfigError> {
        Ok(Self {
            encoding: EncodingKey::from_secret(key.as_bytes()),
            decoding: DecodingKey::from_secret(key.as_bytes()),
        })
    }

    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<Token, IssueError> {
        self.issue_at(subject, ttl, Utc::now())
    }

    pub fn issue_at(&self, subject: &str, ttl: Duration, now: DateTime<Utc>) -> Result<Token, IssueError> {
        let iat = now.timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = IdentityClaims { sub: subject.to_string(), iat, exp: iat.saturating_add(ttl_secs) };
        let raw = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| IssueError(e.to_string()))?;
        tprintln!("token.issue sub={} exp={}", subject, claims.exp);
        Ok(Token(raw))
    }

    pub fn verify(&self, token: &Token) -> Result<IdentityClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Expiry is decided first: a token whose readable claims are past `exp` is `Expired`
    /// whatever its signature. Otherwise the signature over header and claims is checked
    /// (`BadSignature`), then the claims must decode (`Malformed`).
    pub fn verify_at(&self, token: &Token, now: DateTime<Utc>) -> Result<IdentityClaims, TokenError> {
        let raw = token.as_str().trim();
        if raw.split('.').count() != 3 {
            return Err(TokenError::Malformed);
        }

        if let Some(unverified) = self.peek_claims(raw) {
            if unverified.is_expired_at(now) {
                return Err(TokenError::Expired);
            }
        }

        let claims = decode::<IdentityClaims>(raw, &self.decoding, &strict_validation())
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?
            .claims;
        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Claims read without checking the signature. Used only to decide expiry.
    fn peek_claims(&self, raw: &str) -> Option<IdentityClaims> {
        let mut validation = strict_validation();
        validation.insecure_disable_signature_validation();
        decode::<IdentityClaims>(raw, &self.decoding, &validation).ok().map(|d| d.claims)
    }
}

/// HS256 only, no leeway. `exp` is required but compared against the caller's clock.
fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);
    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::TimeZone;

    fn codec() -> TokenCodec {
        TokenCodec::new(&SigningKey::parse("test-signing-key-0123456789").unwrap()).unwrap()
    }

    fn foreign() -> TokenCodec {
        TokenCodec::new(&SigningKey::parse("another-signing-key-abcdef").unwrap()).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn segments(tok: &Token) -> (String, String, String) {
        let mut parts = tok.as_str().split('.').map(str::to_string);
        (parts.next().unwrap(), parts.next().unwrap(), parts.next().unwrap())
    }

    #[test]
    fn issue_then_verify_returns_subject() {
        let c = codec();
        let tok = c.issue("alice", Duration::from_secs(3600)).unwrap();
        let claims = c.verify(&tok).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn tokens_are_hs256_jwts() {
        let tok = codec().issue_at("alice", Duration::from_secs(60), t0()).unwrap();
        let header = jsonwebtoken::decode_header(tok.as_str()).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);
    }

    #[test]
    fn valid_until_just_before_expiry() {
        let c = codec();
        let tok = c.issue_at("u1", Duration::from_secs(60), t0()).unwrap();
        for offset in [0i64, 1, 30, 59] {
            let at = t0() + chrono::Duration::seconds(offset);
            assert_eq!(c.verify_at(&tok, at).unwrap().sub, "u1", "offset {}", offset);
        }
    }

    #[test]
    fn expired_at_and_after_expiry() {
        let c = codec();
        let tok = c.issue_at("u1", Duration::from_secs(60), t0()).unwrap();
        assert_eq!(c.verify_at(&tok, t0() + chrono::Duration::seconds(60)), Err(TokenError::Expired));
        assert_eq!(c.verify_at(&tok, t0() + chrono::Duration::days(3)), Err(TokenError::Expired));
    }

    #[test]
    fn expiry_wins_over_a_bad_signature() {
        let c = codec();
        let tok = foreign().issue_at("u1", Duration::from_secs(10), t0()).unwrap();
        assert_eq!(c.verify_at(&tok, t0()), Err(TokenError::BadSignature));
        assert_eq!(c.verify_at(&tok, t0() + chrono::Duration::seconds(11)), Err(TokenError::Expired));
    }

    #[test]
    fn signed_claims_of_the_wrong_shape_are_malformed() {
        let c = codec();
        let key = EncodingKey::from_secret(b"test-signing-key-0123456789");
        for body in [serde_json::json!(["not", "claims"]), serde_json::json!({"sub": "alice"})] {
            let raw = encode(&Header::new(Algorithm::HS256), &body, &key).unwrap();
            assert_eq!(c.verify_at(&Token::new(raw), t0()), Err(TokenError::Malformed), "{}", body);
        }
    }

    #[test]
    fn any_altered_claims_byte_is_rejected() {
        let c = codec();
        let tok = c.issue_at("alice", Duration::from_secs(3600), t0()).unwrap();
        let (header, body, sig) = segments(&tok);
        for i in 0..body.len() {
            let mut altered = body.clone().into_bytes();
            altered[i] = if altered[i] == b'A' { b'B' } else { b'A' };
            let forged = Token::new(format!("{}.{}.{}", header, String::from_utf8(altered).unwrap(), sig));
            // An edit that moves `exp` into the past reads as expired; anything else fails the signature.
            let r = c.verify_at(&forged, t0());
            assert!(matches!(r, Err(TokenError::BadSignature) | Err(TokenError::Expired)), "byte {}: {:?}", i, r);
        }
    }

    #[test]
    fn forged_subject_is_bad_signature() {
        let c = codec();
        let tok = c.issue_at("alice", Duration::from_secs(3600), t0()).unwrap();
        let (header, _, sig) = segments(&tok);
        let forged_claims = serde_json::json!({"sub": "root", "iat": t0().timestamp(), "exp": t0().timestamp() + 3600}).to_string();
        let forged = Token::new(format!("{}.{}.{}", header, URL_SAFE_NO_PAD.encode(forged_claims), sig));
        assert_eq!(c.verify_at(&forged, t0()), Err(TokenError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let c = codec();
        for raw in ["garbage", "", ".", "abc.", "a.b", "a.b.c", "a.b.c.d"] {
            assert_eq!(c.verify(&Token::new(raw)), Err(TokenError::Malformed), "{:?}", raw);
        }
    }

    #[test]
    fn issuing_is_deterministic() {
        let c = codec();
        let a = c.issue_at("alice", Duration::from_secs(5), t0()).unwrap();
        let b = c.issue_at("alice", Duration::from_secs(5), t0()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn token_debug_is_redacted() {
        let c = codec();
        let tok = c.issue("alice", Duration::from_secs(5)).unwrap();
        assert_eq!(format!("{:?}", tok), "Token(<redacted>)");
    }
}
