//! MJPEG streaming endpoint
//!
//! GET /stream starts one decoder subprocess per request and relays its
//! frames to the client as a `multipart/x-mixed-replace` body. With
//! `test=1` the request only probes TCP reachability of the source and
//! answers with JSON.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};
use url::Url;

use camrelay_core::probe;
use camrelay_core::relay::{
    multipart,
    session::{StreamSession, RESPONSE_CHANNEL_CAPACITY},
    Transport,
};

use super::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    url: Option<String>,
    transport: Option<String>,
    #[serde(rename = "forceDecode")]
    force_decode: Option<String>,
    test: Option<String>,
}

/// GET /stream - MJPEG relay (or connectivity test with `test=1`)
pub async fn handle_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> AppResult<Response> {
    // Validation happens before any subprocess exists.
    let source_url = query
        .url
        .clone()
        .or_else(|| state.config.source.url.clone())
        .ok_or_else(|| AppError::bad_request("an RTSP URL is required"))?;

    let url = Url::parse(&source_url)
        .map_err(|e| AppError::bad_request(format!("invalid RTSP URL: {e}")))?;
    if url.scheme() != "rtsp" {
        return Err(AppError::bad_request(
            "invalid RTSP URL: must begin with rtsp://",
        ));
    }

    let transport = Transport::from_query(query.transport.as_deref().unwrap_or(""));
    let force_decode = query.force_decode.as_deref() == Some("1");
    let is_test = query.test.as_deref() == Some("1");

    info!(
        url = %source_url,
        transport = transport.as_str(),
        force_decode,
        test = is_test,
        "stream request"
    );

    if is_test {
        return Ok(connection_test(&url).await);
    }

    // One decoder process and one relay pipeline per client connection.
    let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
    let session = StreamSession::start(&state.config.decoder, &source_url, transport, tx)?;
    tokio::spawn(session.run());

    let body = Body::from_stream(ReceiverStream::new(rx));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, multipart::CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "close")
        .header(header::PRAGMA, "no-cache")
        .body(body)
        .map_err(|e| AppError::internal(format!("failed to build response: {e}")))
}

/// Probe the source and report the outcome as JSON. Advisory only: a
/// reachable port says nothing about a valid RTSP session.
async fn connection_test(url: &Url) -> Response {
    match probe::probe_url(url, probe::PROBE_TIMEOUT).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(e) => {
            error!("connection test failed: {e}");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
