#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use gatehouse::chat::{self, ChatService};
use gatehouse::config::{GatewayConfig, SigningKey};
use gatehouse::identity::{hash_password, LocalCredentialStore, TokenCodec, UserRecord};
use gatehouse::schema::ResolverBindings;
use gatehouse::server::{Gateway, ServerHandle};

pub const SCHEMA: &str = include_str!("../../schema.graphql");

pub struct TestGateway {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    pub codec: Arc<TokenCodec>,
    pub chat: Arc<ChatService>,
}

impl TestGateway {
    pub fn http(&self, path: &str) -> String { format!("http://{}{}", self.addr, path) }

    pub fn ws_url(&self) -> String { format!("ws://{}/graphql", self.addr) }
}

pub async fn start() -> TestGateway {
    start_with(Duration::from_millis(500)).await
}

pub async fn start_with(ws_init_timeout: Duration) -> TestGateway {
    let chat = Arc::new(ChatService::new());
    boot(ws_init_timeout, SCHEMA, chat::bindings(chat.clone()), chat).await
}

/// Gateway serving an arbitrary schema instead of the chat demo.
pub async fn start_with_schema(source: &str, bindings: ResolverBindings) -> TestGateway {
    boot(Duration::from_millis(500), source, bindings, Arc::new(ChatService::new())).await
}

async fn boot(ws_init_timeout: Duration, source: &str, bindings: ResolverBindings, chat: Arc<ChatService>) -> TestGateway {
    let mut cfg = GatewayConfig::new(SigningKey::parse("integration-tests-signing-key").unwrap());
    cfg.bind_addr = [127, 0, 0, 1].into();
    cfg.port = 0;
    cfg.ws_init_timeout = ws_init_timeout;
    let store = LocalCredentialStore::from_records(vec![
        UserRecord { username: "alice".into(), password_hash: hash_password("alice").unwrap() },
        UserRecord { username: "bob".into(), password_hash: hash_password("bob").unwrap() },
    ])
    .unwrap();
    let mut gw = Gateway::new(cfg, Arc::new(store)).unwrap();
    let codec = gw.codec();
    let handle = gw.start(source, bindings).await.unwrap();
    TestGateway { addr: handle.local_addr(), handle, codec, chat }
}

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect(gw: &TestGateway) -> Socket {
    let mut req = gw.ws_url().into_client_request().unwrap();
    req.headers_mut().insert("sec-websocket-protocol", HeaderValue::from_static("graphql-transport-ws"));
    let (ws, resp) = tokio_tungstenite::connect_async(req).await.unwrap();
    assert_eq!(
        resp.headers().get("sec-websocket-protocol").and_then(|v| v.to_str().ok()),
        Some("graphql-transport-ws")
    );
    ws
}

pub async fn send(ws: &mut Socket, v: Value) {
    ws.send(Message::Text(v.to_string())).await.unwrap();
}

pub enum Frame {
    Json(Value),
    Closed(u16, String),
}

/// Next protocol message or close frame, failing the test after 5 s.
pub async fn recv(ws: &mut Socket) -> Frame {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), ws.next()).await.expect("timed out waiting for frame");
        match next {
            Some(Ok(Message::Text(s))) => return Frame::Json(serde_json::from_str(&s).unwrap()),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map(|f| (u16::from(f.code), f.reason.to_string())).unwrap_or((1005, String::new()));
                return Frame::Closed(code, reason);
            }
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return Frame::Closed(1006, String::new()),
        }
    }
}

pub async fn recv_json(ws: &mut Socket) -> Value {
    match recv(ws).await {
        Frame::Json(v) => v,
        Frame::Closed(code, reason) => panic!("socket closed: {} {}", code, reason),
    }
}

pub async fn recv_close(ws: &mut Socket) -> (u16, String) {
    match recv(ws).await {
        Frame::Closed(code, reason) => (code, reason),
        Frame::Json(v) => panic!("expected close, got {}", v),
    }
}

/// Open a socket and complete the handshake with the given payload.
pub async fn init(gw: &TestGateway, payload: Value) -> Socket {
    let mut ws = connect(gw).await;
    send(&mut ws, json!({"type": "connection_init", "payload": payload})).await;
    let ack = recv_json(&mut ws).await;
    assert_eq!(ack["type"], "connection_ack");
    ws
}

pub async fn login(gw: &TestGateway, user: &str, pass: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(gw.http("/login"))
        .json(&json!({"username": user, "password": pass}))
        .send()
        .await
        .unwrap()
}

pub async fn token_for(gw: &TestGateway, user: &str) -> String {
    let v: Value = login(gw, user, user).await.json().await.unwrap();
    v["token"].as_str().unwrap().to_string()
}

pub async fn graphql(gw: &TestGateway, token: Option<&str>, body: Value) -> (u16, Value) {
    let mut req = reqwest::Client::new().post(gw.http("/graphql")).json(&body);
    if let Some(t) = token {
        req = req.bearer_auth(t);
    }
    let resp = req.send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}
