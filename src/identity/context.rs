use serde::{Deserialize, Serialize};

use super::carrier::{CredentialCarrier, ConnectionParams};
use super::token::{IdentityClaims, TokenCodec};
use crate::error::TokenError;

/// Resolved caller identity attached to one execution. `user == None` is anonymous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl IdentityContext {
    pub fn anonymous() -> Self { Self::default() }

    pub fn for_user(user: impl Into<String>) -> Self { Self { user: Some(user.into()) } }

    pub fn is_anonymous(&self) -> bool { self.user.is_none() }
}

impl From<&IdentityClaims> for IdentityContext {
    fn from(c: &IdentityClaims) -> Self { Self::for_user(c.sub.clone()) }
}

/// Extract and verify whatever token the carrier holds. `Ok(None)` when it holds none.
pub fn verify_carrier<C: CredentialCarrier + ?Sized>(
    codec: &TokenCodec,
    carrier: &C,
) -> Result<Option<IdentityClaims>, TokenError> {
    match carrier.extract_token() {
        Some(token) => codec.verify(&token).map(Some),
        None => Ok(None),
    }
}

/// HTTP variant: the auth middleware has already verified the bearer token into a
/// request-scoped claim, or left the slot empty.
pub fn resolve_from_request(claims: Option<&IdentityClaims>) -> IdentityContext {
    claims.map(IdentityContext::from).unwrap_or_default()
}

/// Persistent-channel variant, evaluated once when the connection is initialised.
/// A present but invalid token rejects the whole connection.
pub fn resolve_from_connection_init(
    codec: &TokenCodec,
    params: &ConnectionParams,
) -> Result<IdentityContext, TokenError> {
    Ok(verify_carrier(codec, params)?
        .as_ref()
        .map(IdentityContext::from)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SigningKey;
    use crate::identity::carrier::{BearerHeader, ACCESS_TOKEN_PARAM};
    use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
    use std::time::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new(&SigningKey::parse("context-tests-signing-key").unwrap()).unwrap()
    }

    #[test]
    fn absent_request_claim_is_anonymous() {
        let ctx = resolve_from_request(None);
        assert!(ctx.is_anonymous());
        assert_eq!(serde_json::to_value(&ctx).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn request_claim_maps_to_user() {
        let claims = IdentityClaims { sub: "alice".into(), iat: 0, exp: 10 };
        assert_eq!(resolve_from_request(Some(&claims)), IdentityContext::for_user("alice"));
    }

    #[test]
    fn handshake_with_valid_token() {
        let c = codec();
        let tok = c.issue("bob", Duration::from_secs(60)).unwrap();
        let params = ConnectionParams::new().with(ACCESS_TOKEN_PARAM, tok.as_str());
        assert_eq!(resolve_from_connection_init(&c, &params), Ok(IdentityContext::for_user("bob")));
    }

    #[test]
    fn handshake_with_garbage_is_rejected() {
        let params = ConnectionParams::new().with(ACCESS_TOKEN_PARAM, "garbage");
        assert_eq!(resolve_from_connection_init(&codec(), &params), Err(TokenError::Malformed));
    }

    #[test]
    fn handshake_without_token_is_anonymous() {
        let params = ConnectionParams::new().with("client", "cli");
        assert_eq!(resolve_from_connection_init(&codec(), &params), Ok(IdentityContext::anonymous()));
    }

    #[test]
    fn resolution_is_idempotent_across_carriers() {
        let c = codec();
        let tok = c.issue("u1", Duration::from_secs(60)).unwrap();
        let params = ConnectionParams::new().with(ACCESS_TOKEN_PARAM, tok.as_str());
        let a = resolve_from_connection_init(&c, &params).unwrap();
        let b = resolve_from_connection_init(&c, &params).unwrap();
        assert_eq!(a, b);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", tok.as_str())).unwrap());
        let claims = verify_carrier(&c, &BearerHeader(&headers)).unwrap();
        let http_ctx = resolve_from_request(claims.as_ref());
        assert_eq!(http_ctx, a);
        assert_eq!(resolve_from_request(claims.as_ref()), http_ctx);
    }
}
