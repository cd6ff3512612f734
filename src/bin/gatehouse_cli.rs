//!
//! gatehouse client binary
//! -----------------------
//! Talks to a running gateway: obtain a token, run queries and mutations over HTTP,
//! follow subscriptions over the WebSocket transport, or hash a password for the
//! users file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use gatehouse::cli::connectivity::{HttpSession, WsSession};
use gatehouse::cli::print_response;
use gatehouse::graphql::GraphQLRequest;
use gatehouse::identity::hash_password;

#[derive(Parser, Debug)]
#[command(name = "gatehouse_cli", version, about = "Client for the gatehouse GraphQL gateway")]
struct Cli {
    /// Gateway base URL
    #[arg(long, global = true, env = "GATEHOUSE_URL", default_value = "http://127.0.0.1:9000")]
    url: String,
    /// GraphQL route on the gateway
    #[arg(long, global = true, default_value = "/graphql")]
    graphql_path: String,
    /// Bearer token from a previous `login`
    #[arg(long, global = true, env = "GATEHOUSE_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Log in as this user before running the command
    #[arg(long, global = true)]
    user: Option<String>,
    #[arg(long, global = true, env = "GATEHOUSE_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and print the bearer token
    Login,
    /// Run a query or mutation over HTTP
    Query {
        query: String,
        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,
        #[arg(long)]
        operation_name: Option<String>,
    },
    /// Follow a subscription over the WebSocket transport
    Subscribe {
        query: String,
        #[arg(long)]
        variables: Option<String>,
        /// Stop after this many events
        #[arg(long)]
        count: Option<usize>,
    },
    /// Print an Argon2 PHC hash for the users file
    HashPassword { password: String },
}

fn build_request(query: String, variables: Option<String>, operation_name: Option<String>) -> Result<GraphQLRequest> {
    let mut req = GraphQLRequest::new(query);
    if let Some(raw) = variables {
        let v: Value = serde_json::from_str(&raw).context("--variables must be JSON")?;
        let Value::Object(m) = v else { bail!("--variables must be a JSON object") };
        req.variables = Some(m);
    }
    req.operation_name = operation_name;
    Ok(req)
}

async fn session(cli: &Cli) -> Result<HttpSession> {
    let mut s = HttpSession::new(&cli.url, &cli.graphql_path)?;
    if let Some(t) = &cli.token {
        s = s.with_token(t.clone());
    }
    if let Some(user) = &cli.user {
        let pass = cli.password.as_deref().unwrap_or_default();
        s.login(user, pass).await?;
    }
    Ok(s)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    match &cli.command {
        Command::HashPassword { password } => {
            println!("{}", hash_password(password)?);
        }
        Command::Login => {
            let Some(user) = cli.user.as_deref() else { bail!("login requires --user") };
            let mut s = HttpSession::new(&cli.url, &cli.graphql_path)?;
            let token = s.login(user, cli.password.as_deref().unwrap_or_default()).await?;
            println!("{}", token);
        }
        Command::Query { query, variables, operation_name } => {
            let req = build_request(query.clone(), variables.clone(), operation_name.clone())?;
            let resp = session(&cli).await?.post_query(&req).await?;
            print_response(&resp);
            if resp.data.is_none() {
                std::process::exit(2);
            }
        }
        Command::Subscribe { query, variables, count } => {
            let req = build_request(query.clone(), variables.clone(), None)?;
            let ws = WsSession::from_http_session(&session(&cli).await?)?;
            eprintln!("subscribed via {}", ws.url());
            let mut seen = 0usize;
            ws.subscribe(&req, |resp| {
                print_response(&resp);
                seen += 1;
                count.map(|c| seen < c).unwrap_or(true)
            })
            .await?;
        }
    }
    Ok(())
}
