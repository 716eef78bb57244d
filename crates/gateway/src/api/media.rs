//! Signed media downloads: `GET /media/*key?expires=<unix>&sig=<hex>`.
//!
//! These are the URLs handed to the generative backend for stored chat
//! media.  Expired or forged links get 403 without touching the disk.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub sig: String,
}

pub async fn serve(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<SignedQuery>,
) -> Response {
    if !state.media.verify(&key, q.expires, &q.sig, chrono::Utc::now()) {
        return StatusCode::FORBIDDEN.into_response();
    }

    match state.media.open(&key).await {
        Ok(media) => ([(header::CONTENT_TYPE, media.mime_type)], media.bytes).into_response(),
        Err(e) if e.is_not_found() => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!(storage_key = %key, error = %e, "media read failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
