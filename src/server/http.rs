//! Request transport: bearer-token middleware plus the login and GraphQL handlers.

use std::panic::AssertUnwindSafe;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures_util::FutureExt; // for catch_unwind on async blocks
use serde_json::json;
use tracing::{debug, error, warn};

use super::AppState;
use crate::error::AppError;
use crate::graphql::{codes, GraphQLError, GraphQLRequest, GraphQLResponse, OperationKind};
use crate::identity::{resolve_from_request, verify_carrier, BearerHeader, IdentityClaims, LoginRequest};

/// Verify a bearer token when one is present. A bad token is logged (never echoed)
/// and the request continues without claims.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let verified = verify_carrier(&state.codec, &BearerHeader(req.headers()));
    match verified {
        Ok(Some(claims)) => {
            debug!(target: "auth", user = %claims.sub, "bearer token accepted");
            req.extensions_mut().insert(claims);
        }
        Ok(None) => {}
        Err(e) => warn!(target: "auth", code = e.code(), "bearer token rejected; continuing anonymous"),
    }
    next.run(req).await
}

pub async fn login_handler(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Result<Json<serde_json::Value>, AppError> {
    let login = state.login.clone();
    // Password hashing is CPU bound; keep it off the reactor threads.
    let token = tokio::task::spawn_blocking(move || login.handle(&body))
        .await
        .map_err(|e| AppError::internal("internal_error".to_string(), e.to_string()))??;
    Ok(Json(json!({ "token": token.as_str() })))
}

fn bad_request(errors: Vec<GraphQLError>) -> Response {
    (StatusCode::BAD_REQUEST, Json(GraphQLResponse::from_errors(errors))).into_response()
}

pub async fn graphql_handler(
    State(state): State<AppState>,
    claims: Option<Extension<IdentityClaims>>,
    Json(req): Json<GraphQLRequest>,
) -> Response {
    let ctx = resolve_from_request(claims.as_ref().map(|Extension(c)| c));
    let prepared = match state.schema.prepare(&req) {
        Ok(p) => p,
        Err(errors) => {
            debug!(target: "http", errors = errors.len(), "request rejected before execution");
            return bad_request(errors);
        }
    };
    if prepared.kind() == OperationKind::Subscription {
        return bad_request(vec![GraphQLError::new(
            "Subscriptions require the WebSocket transport.",
            codes::VALIDATION_FAILED,
        )]);
    }

    let schema = state.schema.clone();
    let fut = async move { schema.execute_prepared(&prepared, &ctx) };
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(resp) => Json(resp).into_response(),
        Err(panic_payload) => {
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                      else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                      else { "panic" };
            error!(target: "http", "resolver panic: {}", msg);
            let body = GraphQLResponse::from_errors(vec![GraphQLError::new("internal server error", codes::INTERNAL)]);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
