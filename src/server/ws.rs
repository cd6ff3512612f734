//! Socket transport: the `graphql-transport-ws` protocol.
//!
//! The caller identity is resolved exactly once, from the `connection_init` payload,
//! and reused for every operation on the connection. Each operation runs in its own
//! task; all of them are aborted when the connection goes away.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::graphql::{codes, GraphQLError, GraphQLRequest, GraphQLResponse, OperationKind};
use crate::identity::{resolve_from_connection_init, ConnectionParams, IdentityContext};
use crate::schema::SharedSchema;

pub const PROTOCOL: &str = "graphql-transport-ws";

pub mod close_code {
    pub const BAD_MESSAGE: u16 = 4400;
    pub const UNAUTHORIZED: u16 = 4401;
    pub const FORBIDDEN: u16 = 4403;
    pub const INIT_TIMEOUT: u16 = 4408;
    pub const DUPLICATE_SUBSCRIBER: u16 = 4409;
    pub const TOO_MANY_INITS: u16 = 4429;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit {
        #[serde(default)]
        payload: Option<Value>,
    },
    Subscribe { id: String, payload: GraphQLRequest },
    Complete { id: String },
    Ping {
        #[serde(default)]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default)]
        payload: Option<Value>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck,
    Next { id: String, payload: GraphQLResponse },
    Error { id: String, payload: Vec<GraphQLError> },
    Complete { id: String },
    Ping,
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

impl ServerMessage {
    fn into_frame(self) -> Option<Message> {
        serde_json::to_string(&self).ok().map(|s| Message::Text(s.into()))
    }
}

pub async fn upgrade_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.protocols([PROTOCOL]).on_upgrade(move |socket| serve_connection(socket, state))
}

enum Flow {
    Continue,
    Close,
}

struct Session {
    state: AppState,
    out: mpsc::UnboundedSender<Message>,
    init_received: bool,
    ctx: Option<IdentityContext>,
    operations: HashMap<String, JoinHandle<()>>,
}

async fn serve_connection(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if sink.send(frame).await.is_err() || closing {
                break;
            }
        }
    });

    let deadline = tokio::time::sleep(state.ws_init_timeout);
    tokio::pin!(deadline);
    let mut session = Session { state, out, init_received: false, ctx: None, operations: HashMap::new() };
    debug!(target: "ws", "connection opened");

    loop {
        tokio::select! {
            _ = &mut deadline, if !session.init_received => {
                session.close(close_code::INIT_TIMEOUT, "Connection initialisation timeout");
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Flow::Close = session.handle_text(text.as_str()) { break; }
                }
                Some(Ok(Message::Binary(_))) => {
                    session.close(close_code::BAD_MESSAGE, "Binary messages are not supported");
                    break;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(target: "ws", error = %e, "socket error");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    let outstanding = session.abort_all();
    debug!(target: "ws", outstanding, "connection closed");
    drop(session);
    let _ = writer.await;
}

impl Session {
    fn send(&self, msg: ServerMessage) {
        if let Some(frame) = msg.into_frame() {
            let _ = self.out.send(frame);
        }
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.out.send(Message::Close(Some(CloseFrame { code, reason: reason.to_string().into() })));
    }

    fn abort_all(&mut self) -> usize {
        let mut n = 0;
        for (_, h) in self.operations.drain() {
            if !h.is_finished() { n += 1; }
            h.abort();
        }
        n
    }

    fn handle_text(&mut self, text: &str) -> Flow {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                debug!(target: "ws", error = %e, "invalid message");
                self.close(close_code::BAD_MESSAGE, "Invalid message received");
                return Flow::Close;
            }
        };
        match msg {
            ClientMessage::ConnectionInit { payload } => self.on_init(payload),
            ClientMessage::Ping { payload } => {
                self.send(ServerMessage::Pong { payload });
                Flow::Continue
            }
            ClientMessage::Pong { .. } => Flow::Continue,
            ClientMessage::Subscribe { id, payload } => self.on_subscribe(id, payload),
            ClientMessage::Complete { id } => {
                if let Some(h) = self.operations.remove(&id) {
                    h.abort();
                    debug!(target: "ws", %id, "operation completed by client");
                }
                Flow::Continue
            }
        }
    }

    fn on_init(&mut self, payload: Option<Value>) -> Flow {
        if self.init_received {
            self.close(close_code::TOO_MANY_INITS, "Too many initialisation requests");
            return Flow::Close;
        }
        self.init_received = true;
        let params = ConnectionParams::from_value(payload);
        info!(target: "ws", keys = ?params.keys(), "connection_init received");
        match resolve_from_connection_init(&self.state.codec, &params) {
            Ok(ctx) => {
                info!(target: "auth", user = ?ctx.user, "socket identity resolved");
                self.ctx = Some(ctx);
                self.send(ServerMessage::ConnectionAck);
                Flow::Continue
            }
            Err(e) => {
                warn!(target: "auth", code = e.code(), "handshake credential rejected");
                self.close(close_code::FORBIDDEN, e.code());
                Flow::Close
            }
        }
    }

    fn on_subscribe(&mut self, id: String, req: GraphQLRequest) -> Flow {
        let Some(ctx) = self.ctx.clone() else {
            self.close(close_code::UNAUTHORIZED, "Unauthorized");
            return Flow::Close;
        };
        // Clients never `complete` an operation the server already completed.
        self.operations.retain(|_, h| !h.is_finished());
        if self.operations.contains_key(&id) {
            self.close(close_code::DUPLICATE_SUBSCRIBER, &format!("Subscriber for {} already exists", id));
            return Flow::Close;
        }
        let schema = self.state.schema.clone();
        let out = self.out.clone();
        let op_id = id.clone();
        let task = tokio::spawn(async move {
            let run = run_operation(schema, req, ctx, op_id.clone(), out.clone());
            if let Err(panic_payload) = AssertUnwindSafe(run).catch_unwind().await {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                          else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                          else { "panic" };
                error!(target: "ws", id = %op_id, "resolver panic: {}", msg);
                let payload = vec![GraphQLError::new("internal server error", codes::INTERNAL)];
                if let Some(frame) = (ServerMessage::Error { id: op_id, payload }).into_frame() {
                    let _ = out.send(frame);
                }
            }
        });
        debug!(target: "ws", %id, "operation started");
        self.operations.insert(id, task);
        Flow::Continue
    }

    #[cfg(test)]
    fn operation_count(&self) -> usize { self.operations.len() }
}

async fn run_operation(
    schema: SharedSchema,
    req: GraphQLRequest,
    ctx: IdentityContext,
    op_id: String,
    out: mpsc::UnboundedSender<Message>,
) {
    let emit = |msg: ServerMessage| match msg.into_frame() {
        Some(frame) => out.send(frame).is_ok(),
        None => false,
    };
    let prepared = match schema.prepare(&req) {
        Ok(p) => p,
        Err(errors) => {
            emit(ServerMessage::Error { id: op_id, payload: errors });
            return;
        }
    };
    if prepared.kind() != OperationKind::Subscription {
        let resp = schema.execute_prepared(&prepared, &ctx);
        if emit(ServerMessage::Next { id: op_id.clone(), payload: resp }) {
            emit(ServerMessage::Complete { id: op_id });
        }
        return;
    }
    let mut events = match schema.subscribe(prepared, ctx) {
        Ok(s) => s,
        Err(errors) => {
            emit(ServerMessage::Error { id: op_id, payload: errors });
            return;
        }
    };
    while let Some(resp) = events.next().await {
        if !emit(ServerMessage::Next { id: op_id.clone(), payload: resp }) {
            return;
        }
    }
    emit(ServerMessage::Complete { id: op_id });
}
