use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadAccepted {
    pub message: String,
    pub job_id: Uuid,
    pub content_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoUrlResponse {
    pub video_url: String,
}

/// Multipart form accepted by the upload endpoint (documentation only).
#[allow(dead_code, non_snake_case)]
#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub video: Vec<u8>,
    pub contentId: String,
}
