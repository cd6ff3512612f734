//! Demo chat service served by the gateway binary: an in-memory message log whose
//! new entries fan out to subscribers over a broadcast channel.

use std::sync::{Arc, RwLock};

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::graphql::FieldError;
use crate::schema::{EventStream, ResolverBindings};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user: String,
    pub text: String,
}

pub struct ChatService {
    messages: RwLock<Vec<ChatMessage>>,
    tx: broadcast::Sender<ChatMessage>,
}

impl Default for ChatService {
    fn default() -> Self { Self::new() }
}

impl ChatService {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { messages: RwLock::new(Vec::new()), tx }
    }

    pub fn messages(&self) -> Result<Vec<ChatMessage>, FieldError> {
        let guard = self.messages.read().map_err(|_| FieldError::new("message log unavailable"))?;
        Ok(guard.clone())
    }

    pub fn add(&self, user: &str, text: &str) -> Result<ChatMessage, FieldError> {
        let msg = ChatMessage { id: new_message_id()?, user: user.to_string(), text: text.to_string() };
        {
            let mut guard = self.messages.write().map_err(|_| FieldError::new("message log unavailable"))?;
            guard.push(msg.clone());
        }
        // No receivers is fine: nobody is subscribed yet.
        let receivers = self.tx.send(msg.clone()).unwrap_or(0);
        debug!(target: "http", id = %msg.id, receivers, "message added");
        Ok(msg)
    }

    /// Live `messageAdded` streams.
    pub fn subscriber_count(&self) -> usize { self.tx.receiver_count() }

    /// Stream of messages added after the call.
    pub fn subscribe(&self) -> EventStream {
        let rx = self.tx.subscribe();
        stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => {
                        let value = serde_json::to_value(&msg).map_err(|e| FieldError::new(e.to_string()));
                        return Some((value, rx));
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(target: "ws", skipped = n, "subscriber lagged; dropping messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

fn new_message_id() -> Result<String, FieldError> {
    use std::fmt::Write as _;
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).map_err(|e| FieldError::new(format!("message id unavailable: {}", e)))?;
    let mut id = String::with_capacity(16);
    for b in &bytes { let _ = write!(&mut id, "{:02x}", b); }
    Ok(id)
}

fn to_value<T: Serialize>(v: &T) -> Result<Value, FieldError> {
    serde_json::to_value(v).map_err(|e| FieldError::new(e.to_string()))
}

/// Resolver bindings for `schema.graphql`. Every entry point requires a signed-in user.
pub fn bindings(chat: Arc<ChatService>) -> ResolverBindings {
    let (q, m, s) = (chat.clone(), chat.clone(), chat);
    ResolverBindings::new()
        .field("Query", "messages", move |a| {
            a.require_user()?;
            to_value(&q.messages()?)
        })
        .field("Mutation", "addMessage", move |a| {
            let user = a.require_user()?;
            let text = a.arg_str("text").ok_or_else(|| FieldError::bad_input("text is required"))?;
            to_value(&m.add(user, text)?)
        })
        .subscription("Subscription", "messageAdded", move |a| {
            a.require_user()?;
            Ok(s.subscribe())
        })
        .bind_properties("Message")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::{codes, GraphQLRequest};
    use crate::identity::IdentityContext;
    use crate::schema::build;
    use serde_json::json;

    const SCHEMA: &str = include_str!("../schema.graphql");

    #[test]
    fn shipped_schema_binds_completely() {
        build(SCHEMA, bindings(Arc::new(ChatService::new()))).unwrap();
    }

    #[test]
    fn anonymous_callers_are_unauthenticated() {
        let schema = build(SCHEMA, bindings(Arc::new(ChatService::new()))).unwrap();
        let r = schema.execute(&GraphQLRequest::new("{ messages { id } }"), &IdentityContext::anonymous());
        assert_eq!(r.data, Some(json!({"messages": null})));
        assert_eq!(r.errors[0].code(), Some(codes::UNAUTHENTICATED));
    }

    #[tokio::test]
    async fn added_messages_are_listed_and_broadcast() {
        let chat = Arc::new(ChatService::new());
        let schema = Arc::new(build(SCHEMA, bindings(chat.clone())).unwrap());
        let alice = IdentityContext::for_user("alice");

        let prepared = schema.prepare(&GraphQLRequest::new("subscription { messageAdded { user text } }")).unwrap();
        let mut events = schema.subscribe(prepared, alice.clone()).unwrap();

        let add = GraphQLRequest::new("mutation($t: String!) { addMessage(text: $t) { id user text } }")
            .with_variables(json!({"t": "hi"}));
        let r = schema.execute(&add, &alice);
        assert!(r.is_ok(), "{:?}", r.errors);
        assert_eq!(r.data.as_ref().unwrap()["addMessage"]["user"], json!("alice"));

        let next = events.next().await.unwrap();
        assert_eq!(next.data, Some(json!({"messageAdded": {"user": "alice", "text": "hi"}})));

        let listed = schema.execute(&GraphQLRequest::new("{ messages { text } }"), &alice);
        assert_eq!(listed.data, Some(json!({"messages": [{"text": "hi"}]})));
        assert_eq!(chat.messages().unwrap().len(), 1);
    }

    #[test]
    fn message_ids_are_random_hex() {
        let a = new_message_id().unwrap();
        let b = new_message_id().unwrap();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
