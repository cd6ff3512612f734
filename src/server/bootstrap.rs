//! Gateway startup as an explicit state machine. Each step checks the current phase
//! first and fails with `OutOfOrder` before touching anything.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use super::{http, ws, AppState};
use crate::config::GatewayConfig;
use crate::error::{BootstrapError, ConfigError, TransportError};
use crate::identity::{CredentialStore, LoginEndpoint, TokenCodec};
use crate::schema::{self, ResolverBindings, SharedSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Unstarted,
    SchemaReady,
    RequestTransportAttached,
    SocketTransportAttached,
    Listening,
}

pub struct Gateway {
    config: GatewayConfig,
    codec: Arc<TokenCodec>,
    store: Arc<dyn CredentialStore>,
    phase: BootstrapPhase,
    schema: Option<SharedSchema>,
    listener: Option<TcpListener>,
    state: Option<AppState>,
    router: Option<Router<AppState>>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, store: Arc<dyn CredentialStore>) -> Result<Self, ConfigError> {
        let codec = Arc::new(TokenCodec::new(&config.signing_key)?);
        Ok(Self {
            config,
            codec,
            store,
            phase: BootstrapPhase::Unstarted,
            schema: None,
            listener: None,
            state: None,
            router: None,
        })
    }

    pub fn phase(&self) -> BootstrapPhase { self.phase }

    pub fn config(&self) -> &GatewayConfig { &self.config }

    pub fn codec(&self) -> Arc<TokenCodec> { self.codec.clone() }

    pub fn schema(&self) -> Option<SharedSchema> { self.schema.clone() }

    /// Address of the bound listener once the request transport is attached.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    fn require(&self, expected: BootstrapPhase) -> Result<(), BootstrapError> {
        if self.phase != expected {
            return Err(BootstrapError::OutOfOrder { expected, actual: self.phase });
        }
        Ok(())
    }

    fn advance(&mut self, to: BootstrapPhase) {
        info!(target: "startup", from = ?self.phase, to = ?to, "bootstrap transition");
        self.phase = to;
    }

    /// `Unstarted -> SchemaReady`.
    pub fn load_schema(&mut self, source: &str, bindings: ResolverBindings) -> Result<(), BootstrapError> {
        self.require(BootstrapPhase::Unstarted)?;
        let built = schema::build(source, bindings).map_err(|e| {
            error!(target: "startup", error = %e, "schema build failed");
            e
        })?;
        self.schema = Some(Arc::new(built));
        self.advance(BootstrapPhase::SchemaReady);
        Ok(())
    }

    /// Same as `load_schema`, reading the definition from `path`.
    pub fn load_schema_file(&mut self, path: &Path, bindings: ResolverBindings) -> Result<(), BootstrapError> {
        self.require(BootstrapPhase::Unstarted)?;
        let source = schema::load_definition(path)?;
        self.load_schema(&source, bindings)
    }

    /// `SchemaReady -> RequestTransportAttached`: bind the listener and mount the HTTP routes.
    pub async fn attach_request_transport(&mut self) -> Result<SocketAddr, BootstrapError> {
        self.require(BootstrapPhase::SchemaReady)?;
        let Some(schema) = self.schema.clone() else {
            return Err(BootstrapError::OutOfOrder { expected: BootstrapPhase::SchemaReady, actual: BootstrapPhase::Unstarted });
        };
        let addr = SocketAddr::new(self.config.bind_addr, self.config.port);
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            error!(target: "startup", %addr, error = %source, "bind failed");
            TransportError::BindFailure { addr: addr.to_string(), source }
        })?;
        let local = listener.local_addr().map_err(|source| TransportError::BindFailure { addr: addr.to_string(), source })?;

        let state = AppState {
            schema,
            codec: self.codec.clone(),
            login: Arc::new(LoginEndpoint::new(self.store.clone(), self.codec.clone(), self.config.token_ttl)),
            ws_init_timeout: self.config.ws_init_timeout,
        };
        let graphql = post(http::graphql_handler)
            .layer(middleware::from_fn_with_state(state.clone(), http::authenticate));
        let router = Router::new()
            .route("/", get(|| async { "gatehouse ok" }))
            .route("/login", post(http::login_handler))
            .route(&self.config.graphql_path, graphql);

        info!(target: "startup", %local, path = %self.config.graphql_path, "request transport attached");
        self.listener = Some(listener);
        self.state = Some(state);
        self.router = Some(router);
        self.advance(BootstrapPhase::RequestTransportAttached);
        Ok(local)
    }

    /// `RequestTransportAttached -> SocketTransportAttached`: add the WebSocket upgrade to
    /// the GraphQL path of the same router.
    pub fn attach_socket_transport(&mut self) -> Result<(), BootstrapError> {
        self.require(BootstrapPhase::RequestTransportAttached)?;
        let Some(router) = self.router.take() else {
            return Err(BootstrapError::OutOfOrder {
                expected: BootstrapPhase::RequestTransportAttached,
                actual: BootstrapPhase::SchemaReady,
            });
        };
        self.router = Some(router.route(&self.config.graphql_path, get(ws::upgrade_handler)));
        info!(target: "startup", path = %self.config.graphql_path, protocol = ws::PROTOCOL, "socket transport attached");
        self.advance(BootstrapPhase::SocketTransportAttached);
        Ok(())
    }

    /// `SocketTransportAttached -> Listening`: start accepting connections.
    pub fn listen(&mut self) -> Result<ServerHandle, BootstrapError> {
        self.require(BootstrapPhase::SocketTransportAttached)?;
        let (Some(listener), Some(router), Some(state)) = (self.listener.take(), self.router.take(), self.state.take()) else {
            return Err(BootstrapError::OutOfOrder {
                expected: BootstrapPhase::SocketTransportAttached,
                actual: BootstrapPhase::RequestTransportAttached,
            });
        };
        let local_addr = listener.local_addr().map_err(|source| TransportError::BindFailure {
            addr: format!("{}:{}", self.config.bind_addr, self.config.port),
            source,
        })?;
        let app = router.layer(CorsLayer::permissive()).with_state(state);
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
        });
        info!(target: "startup", %local_addr, "gateway listening");
        self.advance(BootstrapPhase::Listening);
        Ok(ServerHandle { local_addr, shutdown: Some(tx), task })
    }

    /// Run every step in order.
    pub async fn start(&mut self, source: &str, bindings: ResolverBindings) -> Result<ServerHandle, BootstrapError> {
        self.load_schema(source, bindings)?;
        self.attach_request_transport().await?;
        self.attach_socket_transport()?;
        self.listen()
    }
}

/// Running server. Dropping it leaves the server running until the runtime stops.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr { self.local_addr }

    /// Wait for the server task to finish on its own.
    pub async fn wait(self) -> anyhow::Result<()> {
        self.task.await??;
        Ok(())
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await??;
        Ok(())
    }
}
