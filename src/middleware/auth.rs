use crate::common::response::ApiError;
use crate::modules::auth::dto::MaybeUser;
use crate::modules::auth::service::AuthService;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract token from header
    let token = AuthService::bearer_token(req.headers())
        .ok_or_else(|| ApiError::unauthorized("Unauthorized: Missing or invalid token"))?;

    // 2. Check if token is blocked in Redis
    let blocked = AuthService::is_blocked(&state.redis, &token).await.map_err(|e| {
        warn!("Token blocklist lookup failed: {}", e);
        ApiError::new("Internal Server Error: Redis unavailable", StatusCode::INTERNAL_SERVER_ERROR)
    })?;
    if blocked {
        return Err(ApiError::unauthorized("Unauthorized: Token is blocked/revoked"));
    }

    // 3. Verify JWT
    let claims = AuthService::verify_access_token(&state.config.jwt_secret, &token)
        .map_err(|_| ApiError::unauthorized("Unauthorized: Invalid token signature"))?;

    // 4. Inject claims into request extensions
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Like `auth_middleware`, but never rejects: a missing, invalid or revoked
/// token leaves the request anonymous.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let mut user = MaybeUser::default();

    if let Some(token) = AuthService::bearer_token(req.headers()) {
        match AuthService::verify_access_token(&state.config.jwt_secret, &token) {
            Ok(claims) => match AuthService::is_blocked(&state.redis, &token).await {
                Ok(false) => user = MaybeUser(Some(claims)),
                Ok(true) => debug!("Ignoring revoked token"),
                Err(e) => {
                    warn!("Token blocklist lookup failed, treating caller as anonymous: {}", e)
                }
            },
            Err(e) => debug!("Ignoring bearer token: {}", e),
        }
    }

    req.extensions_mut().insert(user);
    next.run(req).await
}
