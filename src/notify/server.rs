//! `POST /subscribeToTopic`: add a device token to the alert topic.
//!
//! The token arrives as the `token` field of a JSON or form body.
//! Responses are plain text: 400 without a token, 500 when the gateway
//! refuses, 200 otherwise.

use super::PushGateway;
use crate::error::Result;
use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::routing::post;
use axum::{Form, Json, Router};
use log::{error, info};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
struct ForwarderState {
    gateway: Arc<dyn PushGateway>,
    topic: Arc<str>,
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(default)]
    token: Option<String>,
}

pub fn router(gateway: Arc<dyn PushGateway>, topic: &str) -> Router {
    Router::new()
        .route("/subscribeToTopic", post(subscribe_to_topic))
        .layer(CorsLayer::permissive())
        .with_state(ForwarderState {
            gateway,
            topic: Arc::from(topic),
        })
}

/// Serve the endpoint on `bind_addr` until `shutdown` fires.
pub async fn serve(
    bind_addr: &str,
    gateway: Arc<dyn PushGateway>,
    topic: &str,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("[Push] Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(gateway, topic))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn subscribe_to_topic(
    State(state): State<ForwarderState>,
    request: Request,
) -> (StatusCode, &'static str) {
    let Some(token) = token_from(request).await else {
        return (StatusCode::BAD_REQUEST, "Missing token");
    };

    match state.gateway.subscribe_to_topic(&token, &state.topic).await {
        Ok(()) => (StatusCode::OK, "Subscribed successfully"),
        Err(e) => {
            error!("[Push] Topic subscription failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Subscription failed")
        }
    }
}

async fn token_from(request: Request) -> Option<String> {
    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    let body = if is_form {
        Form::<TokenBody>::from_request(request, &()).await.ok()?.0
    } else {
        Json::<TokenBody>::from_request(request, &()).await.ok()?.0
    };
    body.token.filter(|t| !t.trim().is_empty())
}
