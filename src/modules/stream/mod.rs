use crate::state::AppState;
use axum::routing::get;
use axum::Router;

pub mod dto;
pub mod handler;
pub mod service;

/// Token issuance and token-gated delivery. Access control is the token
/// itself, so no auth middleware is layered here.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/get-token", get(handler::get_token))
        .route("/stream/{content_id}/{*file}", get(handler::stream_file))
}
