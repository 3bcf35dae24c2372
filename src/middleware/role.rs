use crate::common::response::ApiError;
use crate::modules::auth::dto::TokenClaims;
use axum::{
    extract::{Extension, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

pub async fn admin_guard(
    Extension(claims): Extension<TokenClaims>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if claims.role != "ADMIN" {
        return Err(ApiError::new("Forbidden: Admin access required", StatusCode::FORBIDDEN));
    }

    Ok(next.run(req).await)
}
