use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

use crate::http::soap;
use crate::http::state::AppState;
use crate::media::library::MediaItem;
use crate::resolve::{find_chapters, find_representation, with_audio_subtitle_engine, Representation};
use crate::stream::{SessionError, StreamSession};

const DLNA_TRANSFER_MODE: &str = "Streaming";

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// Seconds into the item, for chapter entries.
    pub start: Option<f64>,
}

fn parse_id(id_str: &str) -> Option<Uuid> {
    Uuid::parse_str(id_str).ok()
}

/// Build the response headers for a session. Content-Length only when the
/// size is known up front, i.e. never for transcoded output.
fn session_headers(session: &StreamSession) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let item = session.item();
    let mime = HeaderValue::from_str(session.mime())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, mime);
    if let Some(length) = session.content_length() {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    if let Some(range) = session.content_range() {
        if let Ok(v) = HeaderValue::from_str(&range) {
            headers.insert(header::CONTENT_RANGE, v);
        }
    }
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        HeaderName::from_static("transfermode.dlna.org"),
        HeaderValue::from_static(DLNA_TRANSFER_MODE),
    );

    let features = match &session.representation().engine {
        None => soap::content_features(item.meta.dlna_profile, false, false),
        Some(engine) => soap::content_features(None, true, engine.time_seekable),
    };
    if let Ok(v) = HeaderValue::from_str(&features) {
        headers.insert(HeaderName::from_static("contentfeatures.dlna.org"), v);
    }
    if let Some(start) = session.time_seek() {
        if let Ok(v) = HeaderValue::from_str(&format!("npt={}-", start)) {
            headers.insert(HeaderName::from_static("timeseekrange.dlna.org"), v);
        }
    }
    headers
}

/// Answer one request for `representation` of `item`.
/// HEAD never opens the file or spawns an engine.
async fn serve(
    state: &AppState,
    item: MediaItem,
    representation: Representation,
    start: f64,
    req_headers: &HeaderMap,
    head: bool,
) -> Response {
    let mut session = StreamSession::new(item, representation, start);
    let range_header = req_headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let range = session.parse_range(range_header);
    let status = if range.is_partial() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let headers = session_headers(&session);

    if head {
        if session.content_length().is_some() {
            return (status, headers).into_response();
        }
        // A body of unknown size, or the router announces Content-Length: 0.
        let unsized_body = Body::from_stream(tokio_stream::empty::<std::io::Result<Bytes>>());
        return (status, headers, unsized_body).into_response();
    }

    if let Err(e) = session.open(&state.transcoder).await {
        return session_error_response(&e);
    }
    match session.stream() {
        Ok(body) => (status, headers, Body::from_stream(body)).into_response(),
        Err(e) => session_error_response(&e),
    }
}

fn session_error_response(e: &SessionError) -> Response {
    if e.is_busy() {
        tracing::warn!("Refusing stream: {}", e);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    match e {
        SessionError::Open { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::error!("{}", e);
            StatusCode::NOT_FOUND.into_response()
        }
        _ => {
            tracing::error!("{}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// The item's canonical direct representation.
async fn serve_item(state: AppState, id_str: String, req_headers: HeaderMap, head: bool) -> Response {
    let Some(item) = parse_id(&id_str).and_then(|id| state.item(&id)) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let representation = with_audio_subtitle_engine(&item, item.sole_audio_track(), None, None);
    serve(&state, item, representation, 0.0, &req_headers, head).await
}

/// Representation `rep` of the item, as resolved for the requesting renderer.
async fn serve_representation(
    state: AppState,
    id_str: String,
    rep: usize,
    params: StreamParams,
    req_headers: HeaderMap,
    head: bool,
) -> Response {
    let Some(item) = parse_id(&id_str).and_then(|id| state.item(&id)) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let renderer = state.renderer(&req_headers);
    let children = state.transcode_children(&item, &renderer);
    let Some(listed) = find_representation(&children, rep) else {
        tracing::debug!("No representation {} of {} for {}", rep, item.id, renderer.name);
        return StatusCode::NOT_FOUND.into_response();
    };
    let start = match params.start {
        Some(start) if !start.is_finite() || start < 0.0 => {
            tracing::debug!("Rejecting start offset {}", start);
            return StatusCode::BAD_REQUEST.into_response();
        }
        Some(start) => start,
        None => 0.0,
    };
    // A direct entry cannot start at an offset; its chapters play through
    // the engine its chapter folder names.
    let representation = match (params.start, listed.is_direct()) {
        (Some(_), true) => match find_chapters(&children, rep) {
            Some(folder) => folder.playback.clone(),
            None => {
                tracing::debug!("Representation {} of {} has no chapters", rep, item.id);
                return StatusCode::NOT_FOUND.into_response();
            }
        },
        _ => listed.clone(),
    };
    serve(&state, item, representation, start, &req_headers, head).await
}

/// HEAD /media/{id}
pub async fn serve_media_head(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
    req_headers: HeaderMap,
) -> Response {
    serve_item(state, id_str, req_headers, true).await
}

/// GET /media/{id}
pub async fn serve_media_get(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
    req_headers: HeaderMap,
) -> Response {
    serve_item(state, id_str, req_headers, false).await
}

/// HEAD /media/{id}/{rep}
pub async fn serve_representation_head(
    State(state): State<AppState>,
    Path((id_str, rep)): Path<(String, usize)>,
    Query(params): Query<StreamParams>,
    req_headers: HeaderMap,
) -> Response {
    serve_representation(state, id_str, rep, params, req_headers, true).await
}

/// GET /media/{id}/{rep}
pub async fn serve_representation_get(
    State(state): State<AppState>,
    Path((id_str, rep)): Path<(String, usize)>,
    Query(params): Query<StreamParams>,
    req_headers: HeaderMap,
) -> Response {
    serve_representation(state, id_str, rep, params, req_headers, false).await
}

/// GET /subtitles/{id}/{index}: a sidecar subtitle file, for renderers that
/// fetch subtitles themselves.
pub async fn serve_subtitle(
    State(state): State<AppState>,
    Path((id_str, index)): Path<(String, u32)>,
) -> Response {
    let Some(item) = parse_id(&id_str).and_then(|id| state.item(&id)) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(track) = item
        .subtitle_tracks
        .iter()
        .find(|s| s.index == Some(index) && s.is_external())
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(path) = track.external.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, track.mime.unwrap_or("text/plain"))],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to read subtitle {}: {}", path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
