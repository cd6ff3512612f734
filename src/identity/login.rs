use std::sync::Arc;
use std::time::Duration;

use super::provider::{CredentialStore, LoginRequest};
use super::token::{Token, TokenCodec};
use crate::error::{AuthError, LoginError};

/// Checks submitted credentials and issues a bearer token on success.
pub struct LoginEndpoint {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    ttl: Duration,
}

impl LoginEndpoint {
    pub fn new(store: Arc<dyn CredentialStore>, codec: Arc<TokenCodec>, ttl: Duration) -> Self {
        Self { store, codec, ttl }
    }

    pub fn handle(&self, req: &LoginRequest) -> Result<Token, LoginError> {
        let username = req.username.trim();
        if username.is_empty() || !self.store.verify(username, &req.password) {
            tracing::info!(target: "auth", "login rejected");
            return Err(AuthError::InvalidCredentials.into());
        }
        let token = self.codec.issue(username, self.ttl)?;
        tracing::info!(target: "auth", user = %username, "login accepted");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SigningKey;

    struct FixedStore;

    impl CredentialStore for FixedStore {
        fn verify(&self, username: &str, password: &str) -> bool {
            username == "alice" && password == "secret"
        }
    }

    fn endpoint() -> (LoginEndpoint, Arc<TokenCodec>) {
        let codec = Arc::new(TokenCodec::new(&SigningKey::parse("login-tests-signing-key").unwrap()).unwrap());
        (LoginEndpoint::new(Arc::new(FixedStore), codec.clone(), Duration::from_secs(3600)), codec)
    }

    fn req(u: &str, p: &str) -> LoginRequest {
        LoginRequest { username: u.into(), password: p.into() }
    }

    #[test]
    fn issues_token_for_valid_credentials() {
        let (ep, codec) = endpoint();
        let tok = ep.handle(&req("alice", "secret")).unwrap();
        assert_eq!(codec.verify(&tok).unwrap().sub, "alice");
    }

    #[test]
    fn unknown_user_and_bad_password_are_indistinguishable() {
        let (ep, _) = endpoint();
        let a = ep.handle(&req("alice", "nope")).unwrap_err();
        let b = ep.handle(&req("nobody", "secret")).unwrap_err();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(ep.handle(&req("  ", "secret")).unwrap_err(), LoginError::Auth(AuthError::InvalidCredentials));
    }
}
