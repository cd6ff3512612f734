//! Caller identity: bearer token issuance/verification, credential carriers for each
//! transport, and the identity context handed to query execution.
//! Keep the public surface thin and split implementation across sub-modules.

mod carrier;
mod context;
mod login;
mod provider;
mod token;

pub use carrier::{BearerHeader, ConnectionParams, CredentialCarrier, ACCESS_TOKEN_PARAM};
pub use context::{resolve_from_connection_init, resolve_from_request, verify_carrier, IdentityContext};
pub use login::LoginEndpoint;
pub use provider::{ensure_default_users, hash_password, verify_password, CredentialStore, LocalCredentialStore, LoginRequest, UserRecord};
pub use token::{IdentityClaims, Token, TokenCodec};
