//!
//! gatehouse HTTP/WS server
//! ------------------------
//! One axum router on one TCP listener carries both transports:
//! - `POST /login` issues bearer tokens.
//! - `POST <graphql path>` executes queries and mutations with the bearer identity.
//! - `GET <graphql path>` upgrades to a `graphql-transport-ws` session whose identity
//!   is fixed at `connection_init`.
//! - `GET /` is a plain health check.
//!
//! Startup is driven through the `Gateway` state machine in `bootstrap`.

use std::sync::Arc;
use std::time::Duration;

use crate::identity::{LoginEndpoint, TokenCodec};
use crate::schema::SharedSchema;

pub mod bootstrap;
pub mod http;
pub mod ws;

pub use bootstrap::{BootstrapPhase, Gateway, ServerHandle};

/// Shared server state injected into all handlers. Everything in it is read-only.
#[derive(Clone)]
pub struct AppState {
    pub schema: SharedSchema,
    pub codec: Arc<TokenCodec>,
    pub login: Arc<LoginEndpoint>,
    pub ws_init_timeout: Duration,
}
