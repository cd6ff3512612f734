use anyhow::{anyhow, bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue as WsHeaderValue;
use tokio_tungstenite::tungstenite::Message;

use crate::graphql::{GraphQLRequest, GraphQLResponse};

const WS_PROTOCOL: &str = "graphql-transport-ws";

/// HTTP side of the gateway: login plus bearer-authenticated GraphQL posts.
#[derive(Clone)]
pub struct HttpSession {
    base: Url,
    graphql_path: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpSession {
    pub fn new(base: &str, graphql_path: &str) -> Result<Self> {
        let base = Url::parse(base).context("invalid base URL")?;
        Ok(Self { base, graphql_path: graphql_path.to_string(), client: reqwest::Client::new(), token: None })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> { self.token.as_deref() }

    pub fn base(&self) -> &Url { &self.base }

    /// `POST /login`; keeps the returned bearer token for later calls.
    pub async fn login(&mut self, user: &str, pass: &str) -> Result<String> {
        let url = self.base.join("/login")?;
        let resp = self
            .client
            .post(url)
            .json(&json!({"username": user, "password": pass}))
            .send()
            .await?;
        let status = resp.status();
        let v: Value = resp.json().await.unwrap_or(json!({}));
        if !status.is_success() {
            let msg = v.get("message").and_then(Value::as_str).unwrap_or("login failed");
            bail!("login failed: HTTP {}: {}", status, msg);
        }
        let token = v
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("login response carried no token"))?
            .to_string();
        self.token = Some(token.clone());
        Ok(token)
    }

    /// Execute a query or mutation. Request-level GraphQL failures (HTTP 400) come back
    /// as a response with `errors`; other statuses are errors.
    pub async fn post_query(&self, req: &GraphQLRequest) -> Result<GraphQLResponse> {
        let url = self.base.join(&self.graphql_path)?;
        let mut call = self.client.post(url).json(req);
        if let Some(t) = &self.token {
            call = call.bearer_auth(t);
        }
        let resp = call.send().await?;
        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::BAD_REQUEST {
            return Ok(resp.json::<GraphQLResponse>().await?);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(anyhow!("remote error: HTTP {}: {}", status, body))
    }
}

/// One `graphql-transport-ws` connection.
pub struct WsSession {
    url: Url,
    token: Option<String>,
}

/// Why a socket session ended early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl std::fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "socket closed by server: {} {}", self.code, self.reason)
    }
}

impl std::error::Error for CloseInfo {}

impl WsSession {
    pub fn from_http_session(http: &HttpSession) -> Result<Self> {
        Ok(Self { url: ws_url_from_http_base(&http.base, &http.graphql_path)?, token: http.token.clone() })
    }

    pub fn url(&self) -> &Url { &self.url }

    /// Connect, initialise with the access token, run one operation and hand each
    /// `next` payload to `on_next` until the server completes it or `on_next` returns false.
    pub async fn subscribe<F>(&self, req: &GraphQLRequest, mut on_next: F) -> Result<()>
    where
        F: FnMut(GraphQLResponse) -> bool,
    {
        let mut request = self.url.as_str().into_client_request()?;
        request.headers_mut().insert("sec-websocket-protocol", WsHeaderValue::from_static(WS_PROTOCOL));
        let (mut stream, _resp) = tokio_tungstenite::connect_async(request).await?;

        let payload = match &self.token {
            Some(t) => json!({"accessToken": t}),
            None => json!({}),
        };
        stream.send(Message::Text(json!({"type": "connection_init", "payload": payload}).to_string())).await?;

        let mut acked = false;
        while let Some(msg) = stream.next().await {
            let text = match msg? {
                Message::Text(s) => s,
                Message::Close(frame) => {
                    let info = frame
                        .map(|f| CloseInfo { code: u16::from(f.code), reason: f.reason.to_string() })
                        .unwrap_or(CloseInfo { code: 1005, reason: String::new() });
                    return Err(info.into());
                }
                _ => continue,
            };
            let v: Value = serde_json::from_str(&text).context("invalid message from server")?;
            match v.get("type").and_then(Value::as_str) {
                Some("connection_ack") if !acked => {
                    acked = true;
                    let sub = json!({"type": "subscribe", "id": "1", "payload": req});
                    stream.send(Message::Text(sub.to_string())).await?;
                }
                Some("ping") => {
                    stream.send(Message::Text(json!({"type": "pong"}).to_string())).await?;
                }
                Some("next") => {
                    let resp: GraphQLResponse = serde_json::from_value(v.get("payload").cloned().unwrap_or(Value::Null))?;
                    if !on_next(resp) {
                        stream.send(Message::Text(json!({"type": "complete", "id": "1"}).to_string())).await?;
                        let _ = stream.close(None).await;
                        return Ok(());
                    }
                }
                Some("error") => {
                    let errors: Vec<crate::graphql::GraphQLError> =
                        serde_json::from_value(v.get("payload").cloned().unwrap_or(Value::Null)).unwrap_or_default();
                    on_next(GraphQLResponse::from_errors(errors));
                    let _ = stream.close(None).await;
                    return Ok(());
                }
                Some("complete") => {
                    let _ = stream.close(None).await;
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(anyhow!("ws: connection ended unexpectedly"))
    }
}

/// Convert http(s)://host[:port] to ws(s)://host[:port]<graphql path>.
pub fn ws_url_from_http_base(base: &Url, graphql_path: &str) -> Result<Url> {
    let mut ws = base.join(graphql_path)?;
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    ws.set_scheme(scheme).map_err(|_| anyhow!("cannot derive websocket URL from {}", base))?;
    Ok(ws)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_follows_http_scheme() {
        let http = Url::parse("http://localhost:9000").unwrap();
        assert_eq!(ws_url_from_http_base(&http, "/graphql").unwrap().as_str(), "ws://localhost:9000/graphql");
        let https = Url::parse("https://example.com/").unwrap();
        assert_eq!(ws_url_from_http_base(&https, "/gql").unwrap().as_str(), "wss://example.com/gql");
    }

    #[test]
    fn session_keeps_token() {
        let s = HttpSession::new("http://127.0.0.1:9000", "/graphql").unwrap().with_token("abc");
        assert_eq!(s.token(), Some("abc"));
        let ws = WsSession::from_http_session(&s).unwrap();
        assert_eq!(ws.url().as_str(), "ws://127.0.0.1:9000/graphql");
    }
}
