pub mod content_directory;
pub mod listen;
pub mod media;
pub mod resource;
pub mod soap;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use crate::http::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/media/{id}", get(media::serve_media_get).head(media::serve_media_head))
        .route(
            "/media/{id}/{rep}",
            get(media::serve_representation_get).head(media::serve_representation_head),
        )
        .route("/subtitles/{id}/{index}", get(media::serve_subtitle))
        .route("/cds/control", post(content_directory::cds_control))
        .route("/cms/control", post(crate::cms::cms_control))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
