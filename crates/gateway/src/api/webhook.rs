//! Platform webhook endpoint: `POST /webhook`.
//!
//! The body is authenticated with the `x-line-signature` HMAC before it is
//! parsed.  Each event is then handed to the pipeline on its own detached
//! task and the request is acknowledged immediately; the platform would
//! otherwise redeliver slow events.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use mm_platform::events::WebhookPayload;
use mm_platform::signature::{verify_signature, SIGNATURE_HEADER};

use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

#[derive(Debug, PartialEq, Eq)]
pub enum Rejection {
    MissingSignature,
    BadSignature,
}

/// Check the signature header against `body`.  Without a configured
/// secret every body is accepted.
pub fn authenticate(
    secret: Option<&[u8]>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), Rejection> {
    let Some(secret) = secret else {
        return Ok(());
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(Rejection::MissingSignature)?;
    if verify_signature(secret, body, signature) {
        Ok(())
    } else {
        Err(Rejection::BadSignature)
    }
}

pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = authenticate(state.channel_secret.as_deref(), &headers, &body) {
        tracing::warn!(?rejection, "webhook rejected");
        return api_error(StatusCode::UNAUTHORIZED, "invalid webhook signature");
    }

    // Authenticated bodies are always acknowledged so the platform does
    // not redeliver.
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable webhook payload, acknowledged");
            return StatusCode::OK.into_response();
        }
    };

    let events = payload.events.len();
    tracing::debug!(destination = %payload.destination, events, "webhook received");

    for event in payload.events {
        let pipeline = state.pipeline.clone();
        let cancel = state.shutdown.child_token();
        tokio::spawn(async move {
            pipeline.dispatch(event, cancel).await;
        });
    }

    StatusCode::OK.into_response()
}
