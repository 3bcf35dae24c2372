use super::dto::{StreamQuery, StreamTokenResponse, TokenRequestQuery};
use super::service::{validate_file_name, StreamError, StreamTokenService};
use crate::common::media_key::MediaKey;
use crate::common::response::{ApiError, ApiSuccess, ErrorResponse};
use crate::infrastructure::storage::s3::origin_status;
use crate::infrastructure::storage::uploader::content_type_for;
use crate::modules::auth::service::AuthService;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

impl From<StreamError> for ApiError {
    fn from(e: StreamError) -> Self {
        let status = match e {
            StreamError::MissingToken | StreamError::InvalidToken => StatusCode::UNAUTHORIZED,
            StreamError::WrongContent => StatusCode::FORBIDDEN,
            StreamError::InvalidPath => StatusCode::BAD_REQUEST,
            StreamError::Signing => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(e.to_string(), status)
    }
}

fn token_service(state: &AppState) -> StreamTokenService<'_> {
    StreamTokenService {
        secret: &state.config.stream_token_secret,
        ttl_secs: state.config.stream_token_ttl_secs,
    }
}

/// Issue a short-lived stream token
#[utoipa::path(
    get,
    path = "/api/v1/stream/get-token",
    params(TokenRequestQuery),
    responses(
        (status = 200, description = "Stream token", body = StreamTokenResponse),
        (status = 400, description = "Malformed content id", body = ErrorResponse)
    ),
    tag = "Stream"
)]
pub async fn get_token(
    State(state): State<AppState>,
    Query(query): Query<TokenRequestQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let content = query
        .content_id
        .as_deref()
        .map(str::parse::<MediaKey>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let token = token_service(&state).issue(content)?;
    Ok(ApiSuccess(
        StreamTokenResponse {
            token,
            expires_in: state.config.stream_token_ttl_secs,
        },
        StatusCode::OK,
    ))
}

/// Serve a manifest or segment behind a stream token
///
/// Files published locally are served from disk; anything else is proxied
/// from object storage with the origin's status.
#[utoipa::path(
    get,
    path = "/api/v1/stream/stream/{content_id}/{file}",
    params(
        ("content_id" = String, Path, description = "Content id, or `ep_<id>` for an episode"),
        ("file" = String, Path, description = "Manifest or segment file name"),
        StreamQuery
    ),
    responses(
        (status = 200, description = "File contents"),
        (status = 206, description = "Partial content from origin"),
        (status = 400, description = "Invalid path", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 500, description = "Origin unavailable", body = ErrorResponse)
    ),
    tag = "Stream",
    security(("bearer_auth" = []))
)]
pub async fn stream_file(
    State(state): State<AppState>,
    Path((content_id, file)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    // 1. Token from header or query
    let token = AuthService::bearer_token(&headers)
        .or(query.token.filter(|t| !t.is_empty()))
        .ok_or(StreamError::MissingToken)?;

    let key: MediaKey = content_id.parse().map_err(|_| StreamError::InvalidPath)?;
    token_service(&state).verify(&token, &key)?;
    let file = validate_file_name(&file)?;

    // 2. Local copy first
    let local = state.config.public_video_dir.join(key.to_string()).join(file);
    if let Ok(f) = tokio::fs::File::open(&local).await {
        if let Ok(meta) = f.metadata().await {
            if meta.is_file() {
                debug!(path = %local.display(), "Serving local file");
                return Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, content_type_for(&local))
                    .header(header::CONTENT_LENGTH, meta.len())
                    .body(Body::from_stream(ReaderStream::new(f)))
                    .map_err(|e| ApiError::internal(e.to_string()));
            }
        }
    }

    // 3. Proxy from object storage
    let object_key = format!("{}{}", key.storage_prefix(), file);
    let range = headers
        .get(header::RANGE)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let resp = match state.storage.get_object(&object_key, range).await {
        Ok(r) => r,
        Err(e) => {
            let status = origin_status(&e)
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error!(key = %object_key, %status, "S3 Error: {}", e);
            let message = if status == StatusCode::NOT_FOUND {
                "File not found"
            } else {
                "Failed to fetch from origin"
            };
            return Err(ApiError::new(message, status));
        }
    };

    let mut builder = Response::builder();

    let content_type = resp
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| content_type_for(std::path::Path::new(file)));
    builder = builder.header(header::CONTENT_TYPE, content_type);

    if let Some(cl) = resp.content_length() {
        builder = builder.header(header::CONTENT_LENGTH, cl);
    }

    if let Some(cr) = resp.content_range() {
        builder = builder.header(header::CONTENT_RANGE, cr).status(StatusCode::PARTIAL_CONTENT);
    } else {
        builder = builder.header(header::ACCEPT_RANGES, "bytes").status(StatusCode::OK);
    }

    if let Some(et) = resp.e_tag() {
        builder = builder.header(header::ETAG, et);
    }

    let stream = ReaderStream::new(resp.body.into_async_read());
    builder
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(e.to_string()))
}
