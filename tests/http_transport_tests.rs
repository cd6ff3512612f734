mod common;

use std::time::Duration;

use serde_json::{json, Value};

use gatehouse::identity::Token;

#[tokio::test]
async fn health_and_login() {
    let gw = common::start().await;
    let body = reqwest::get(gw.http("/")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "gatehouse ok");

    let resp = common::login(&gw, "alice", "alice").await;
    assert_eq!(resp.status().as_u16(), 200);
    let v: Value = resp.json().await.unwrap();
    let token = Token::new(v["token"].as_str().unwrap());
    assert_eq!(gw.codec.verify(&token).unwrap().sub, "alice");
    gw.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_logins_are_indistinguishable() {
    let gw = common::start().await;
    let wrong_pw = common::login(&gw, "alice", "nope").await;
    assert_eq!(wrong_pw.status().as_u16(), 401);
    let wrong_pw: Value = wrong_pw.json().await.unwrap();
    let unknown = common::login(&gw, "mallory", "alice").await;
    assert_eq!(unknown.status().as_u16(), 401);
    let unknown: Value = unknown.json().await.unwrap();
    assert_eq!(wrong_pw, unknown);
    assert_eq!(wrong_pw, json!({"type": "auth", "code": "invalid_credentials", "message": "invalid credentials"}));
    gw.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn anonymous_request_still_executes() {
    let gw = common::start().await;
    let (status, v) = common::graphql(&gw, None, json!({"query": "{ messages { id } }"})).await;
    assert_eq!(status, 200);
    assert_eq!(v["data"], json!({"messages": null}));
    assert_eq!(v["errors"][0]["extensions"]["code"], "UNAUTHENTICATED");
    gw.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_bearer_token_falls_back_to_anonymous() {
    let gw = common::start().await;
    let (status, v) = common::graphql(&gw, Some("garbage"), json!({"query": "{ messages { id } }"})).await;
    assert_eq!(status, 200);
    assert_eq!(v["errors"][0]["extensions"]["code"], "UNAUTHENTICATED");

    let expired = gw.codec.issue("alice", Duration::from_secs(0)).unwrap();
    let (status, v) = common::graphql(&gw, Some(expired.as_str()), json!({"query": "{ messages { id } }"})).await;
    assert_eq!(status, 200);
    assert_eq!(v["data"], json!({"messages": null}));
    gw.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn authenticated_mutation_and_query() {
    let gw = common::start().await;
    let token = common::token_for(&gw, "alice").await;
    let (status, v) = common::graphql(
        &gw,
        Some(&token),
        json!({
            "query": "mutation Add($text: String!) { addMessage(text: $text) { id user text } }",
            "variables": {"text": "hello"},
            "operationName": "Add"
        }),
    )
    .await;
    assert_eq!(status, 200, "{}", v);
    assert_eq!(v["data"]["addMessage"]["user"], "alice");
    assert_eq!(v["data"]["addMessage"]["text"], "hello");
    assert!(v.get("errors").is_none());

    let (_, v) = common::graphql(&gw, Some(&token), json!({"query": "{ messages { user text } }"})).await;
    assert_eq!(v["data"], json!({"messages": [{"user": "alice", "text": "hello"}]}));
    gw.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn request_level_failures_are_bad_requests() {
    let gw = common::start().await;
    let token = common::token_for(&gw, "bob").await;

    let (status, v) = common::graphql(&gw, Some(&token), json!({"query": "{ messages { id "})).await;
    assert_eq!(status, 400);
    assert_eq!(v["errors"][0]["extensions"]["code"], "GRAPHQL_PARSE_FAILED");
    assert!(v.get("data").is_none());

    let (status, v) = common::graphql(&gw, Some(&token), json!({"query": "{ nope }"})).await;
    assert_eq!(status, 400);
    assert_eq!(v["errors"][0]["extensions"]["code"], "GRAPHQL_VALIDATION_FAILED");

    let (status, v) = common::graphql(&gw, Some(&token), json!({"query": "mutation { addMessage { id } }"})).await;
    assert_eq!(status, 400);
    assert_eq!(v["errors"][0]["extensions"]["code"], "GRAPHQL_VALIDATION_FAILED");

    let (status, v) = common::graphql(&gw, Some(&token), json!({"query": "subscription { messageAdded { id } }"})).await;
    assert_eq!(status, 400);
    assert!(v["errors"][0]["message"].as_str().unwrap().contains("WebSocket"));
    gw.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn deeply_nested_query_is_rejected_without_a_token() {
    let gw = common::start().await;
    let deep = format!("{}{}", "{a".repeat(100_000), "}".repeat(100_000));
    let (status, v) = common::graphql(&gw, None, json!({"query": deep})).await;
    assert_eq!(status, 400);
    assert_eq!(v["errors"][0]["extensions"]["code"], "GRAPHQL_PARSE_FAILED");

    // The gateway is still serving.
    let (status, _) = common::graphql(&gw, None, json!({"query": "{ messages { id } }"})).await;
    assert_eq!(status, 200);
    gw.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn resolver_panic_is_an_internal_error() {
    let bindings = gatehouse::schema::ResolverBindings::new()
        .field("Query", "boom", |_| panic!("resolver exploded"));
    let gw = common::start_with_schema("type Query { boom: String }", bindings).await;
    let (status, v) = common::graphql(&gw, None, json!({"query": "{ boom }"})).await;
    assert_eq!(status, 500);
    assert_eq!(v["errors"][0]["extensions"]["code"], "INTERNAL_SERVER_ERROR");
    gw.handle.shutdown().await.unwrap();
}
