//!
//! gatehouse server binary
//! -----------------------
//! Starts the chat demo behind the gateway: bearer login over HTTP and GraphQL over
//! both HTTP and `graphql-transport-ws` on one port. Settings come from CLI flags,
//! then `GATEHOUSE_*` environment variables, then defaults.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gatehouse::chat::{self, ChatService};
use gatehouse::config::{normalize_path, GatewayConfig};
use gatehouse::identity::{ensure_default_users, LocalCredentialStore};
use gatehouse::server::Gateway;

#[derive(Parser, Debug)]
#[command(name = "gatehouse_server", version, about = "Authenticated GraphQL gateway (HTTP + WebSocket)")]
struct Args {
    /// Address to bind (env: GATEHOUSE_BIND_ADDR, default 0.0.0.0)
    #[arg(long)]
    bind: Option<IpAddr>,
    /// Port shared by both transports (env: GATEHOUSE_PORT, default 9000)
    #[arg(long)]
    port: Option<u16>,
    /// GraphQL route (env: GATEHOUSE_GRAPHQL_PATH, default /graphql)
    #[arg(long)]
    graphql_path: Option<String>,
    /// Schema definition file (env: GATEHOUSE_SCHEMA, default schema.graphql)
    #[arg(long)]
    schema: Option<PathBuf>,
    /// Users file; created with demo users when missing (env: GATEHOUSE_USERS)
    #[arg(long)]
    users: Option<PathBuf>,
    /// Token lifetime in seconds (env: GATEHOUSE_TOKEN_TTL_SECS, default 3600)
    #[arg(long)]
    token_ttl_secs: Option<u64>,
}

fn apply_args(mut cfg: GatewayConfig, args: Args) -> Result<GatewayConfig> {
    if let Some(b) = args.bind { cfg.bind_addr = b; }
    if let Some(p) = args.port { cfg.port = p; }
    if let Some(p) = args.graphql_path { cfg.graphql_path = normalize_path("--graphql-path", &p)?; }
    if let Some(s) = args.schema { cfg.schema_path = s; }
    if let Some(u) = args.users { cfg.users_path = u; }
    if let Some(t) = args.token_ttl_secs.filter(|t| *t > 0) { cfg.token_ttl = Duration::from_secs(t); }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let args = Args::parse();
    let cfg = apply_args(GatewayConfig::from_env().context("invalid configuration")?, args)?;

    ensure_default_users(&cfg.users_path)
        .with_context(|| format!("preparing users file {}", cfg.users_path.display()))?;
    let store = LocalCredentialStore::load(&cfg.users_path)
        .with_context(|| format!("loading users from {}", cfg.users_path.display()))?;
    tracing::info!(target: "startup", users = store.len(), path = %cfg.users_path.display(), "credential store loaded");

    let schema_path = cfg.schema_path.clone();
    let graphql_path = cfg.graphql_path.clone();
    let mut gateway = Gateway::new(cfg, Arc::new(store))?;
    gateway
        .load_schema_file(&schema_path, chat::bindings(Arc::new(ChatService::new())))
        .with_context(|| format!("building schema from {}", schema_path.display()))?;
    let addr = gateway.attach_request_transport().await.context("attaching request transport")?;
    gateway.attach_socket_transport()?;
    let handle = gateway.listen()?;

    println!("gatehouse running on {}", addr);
    println!("GraphQL endpoint: http://{}{}", addr, graphql_path);

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!(target: "startup", "shutdown requested");
    handle.shutdown().await
}
