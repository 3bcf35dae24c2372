use crate::state::AppState;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

pub mod dto;
pub mod events;
pub mod handler;
pub mod jobs;
pub mod ladder;
pub mod manifest;
pub mod model;
pub mod processor;
pub mod repository;
pub mod service;
pub mod transcoder;

pub fn router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/url/{content_id}", get(handler::get_video_url))
        .route("/jobs/{job_id}", get(handler::get_job))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::optional_auth_middleware,
        ));

    let protected_routes = Router::new()
        .route("/upload", post(handler::upload_video))
        .route_layer(middleware::from_fn(crate::middleware::role::admin_guard))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}
