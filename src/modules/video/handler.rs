use super::dto::{UploadAccepted, UploadForm, VideoUrlResponse};
use super::events::TranscodeJob;
use super::jobs::{JobRecord, JobStatus};
use super::service::{media_exists, PlaybackService};
use crate::common::media_key::{MediaKey, MediaKeyError};
use crate::common::response::{ApiError, ApiSuccess, ErrorResponse};
use crate::common::upload::{sanitize_file_name, stream_to_file, TempUpload};
use crate::modules::auth::dto::MaybeUser;
use crate::state::AppState;
use axum::{
    extract::{Extension, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Upload a source video for packaging
///
/// Responds as soon as the file is stored and the job is queued; encoding
/// happens in the background. Poll the job endpoint for completion.
#[utoipa::path(
    post,
    path = "/api/v1/video/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Upload accepted", body = UploadAccepted),
        (status = 400, description = "Missing file or content id", body = ErrorResponse),
        (status = 404, description = "Unknown content id", body = ErrorResponse),
        (status = 503, description = "Job queue unavailable", body = ErrorResponse)
    ),
    tag = "Video",
    security(("bearer_auth" = []))
)]
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = Uuid::new_v4();
    let mut upload: Option<TempUpload> = None;
    let mut content_id: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                if let Some(u) = &upload {
                    u.discard().await;
                }
                return Err(ApiError::bad_request(format!("Malformed multipart body: {}", e)));
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "video" if upload.is_none() => {
                let file_name = sanitize_file_name(field.file_name().unwrap_or("video.mp4"));
                let dest = state
                    .config
                    .upload_dir()
                    .join(format!("{}_{}", job_id.simple(), file_name));
                match stream_to_file(field, &dest).await {
                    Ok(u) => {
                        info!(%job_id, bytes = u.bytes, "📥 Received upload {}", file_name);
                        upload = Some(u);
                    }
                    Err(e) => return Err(ApiError::bad_request(format!("Upload failed: {}", e))),
                }
            }
            "contentId" => match field.text().await {
                Ok(text) => content_id = Some(text),
                Err(e) => {
                    if let Some(u) = &upload {
                        u.discard().await;
                    }
                    return Err(ApiError::bad_request(format!("Invalid contentId field: {}", e)));
                }
            },
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("No video file uploaded"))?;

    let key = match content_id.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        None => {
            upload.discard().await;
            return Err(ApiError::bad_request("contentId is required"));
        }
        Some(raw) => match raw.parse::<MediaKey>() {
            Ok(key) => key,
            Err(e) => {
                upload.discard().await;
                return Err(ApiError::bad_request(e.to_string()));
            }
        },
    };

    match media_exists(state.catalog.as_ref(), &key).await {
        Ok(true) => {}
        Ok(false) => {
            upload.discard().await;
            return Err(ApiError::not_found(format!("No content or episode with id {}", key)));
        }
        Err(e) => {
            error!("Database Error: {:#}", e);
            upload.discard().await;
            return Err(ApiError::internal("Failed to look up content"));
        }
    }

    if let Err(e) = enqueue(&state, job_id, key, &upload).await {
        error!(%job_id, content_id = %key, "Failed to enqueue transcode job: {:#}", e);
        upload.discard().await;
        state
            .jobs
            .set(job_id, JobStatus::Failed, Some("could not be queued".to_string()))
            .await;
        return Err(ApiError::new(
            "Processing queue unavailable, try again later",
            StatusCode::SERVICE_UNAVAILABLE,
        ));
    }

    info!(%job_id, content_id = %key, "📤 Transcode job queued");
    Ok(ApiSuccess(
        UploadAccepted {
            message: "Video uploaded, processing started".to_string(),
            job_id,
            content_id: key.to_string(),
        },
        StatusCode::ACCEPTED,
    ))
}

async fn enqueue(
    state: &AppState,
    job_id: Uuid,
    key: MediaKey,
    upload: &TempUpload,
) -> anyhow::Result<()> {
    state.jobs.create(job_id, &key.to_string()).await?;

    let job = TranscodeJob {
        job_id,
        content_id: key,
        input_path: upload.path.clone(),
    };
    state.dispatcher.enqueue(&job).await
}

/// Resolve a playable manifest URL
#[utoipa::path(
    get,
    path = "/api/v1/video/url/{content_id}",
    params(
        ("content_id" = String, Path, description = "Content id, or `ep_<id>` for an episode")
    ),
    responses(
        (status = 200, description = "Playable URL", body = VideoUrlResponse),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 401, description = "AUTH_REQUIRED", body = ErrorResponse),
        (status = 403, description = "SUBSCRIPTION_REQUIRED", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Video",
    security((), ("bearer_auth" = []))
)]
pub async fn get_video_url(
    State(state): State<AppState>,
    Extension(user): Extension<MaybeUser>,
    Path(content_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key: MediaKey = content_id
        .parse()
        .map_err(|e: MediaKeyError| ApiError::bad_request(e.to_string()))?;

    let service = PlaybackService {
        catalog: state.catalog.as_ref(),
        public_root: &state.config.public_video_dir,
        public_base_url: &state.config.media_public_base_url,
    };

    let video_url = service.resolve(key, user.user_id()).await?;
    Ok(ApiSuccess(VideoUrlResponse { video_url }, StatusCode::OK))
}

/// Background job status
#[utoipa::path(
    get,
    path = "/api/v1/video/jobs/{job_id}",
    params(
        ("job_id" = Uuid, Path, description = "Job id returned by the upload endpoint")
    ),
    responses(
        (status = 200, description = "Job status", body = JobRecord),
        (status = 404, description = "Unknown or expired job", body = ErrorResponse)
    ),
    tag = "Video"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.jobs.get(job_id).await {
        Ok(Some(record)) => Ok(ApiSuccess(record, StatusCode::OK)),
        Ok(None) => Err(ApiError::not_found("Job not found")),
        Err(e) => {
            warn!(%job_id, "Job lookup failed: {:#}", e);
            Err(ApiError::internal("Failed to read job status"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::video::events::MemoryQueue;
    use crate::modules::video::jobs::MemoryJobStore;
    use crate::modules::video::service::MemoryCatalog;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-INGEST-BOUNDARY";
    const SAMPLE: &[u8] = b"\x00\x00\x00\x18ftypmp42";

    fn part(name: &str, file_name: Option<&str>, data: &[u8]) -> Vec<u8> {
        let mut body = format!("--{BOUNDARY}\r\n").into_bytes();
        let disposition = match file_name {
            Some(f) => format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                 Content-Type: video/mp4\r\n\r\n"
            ),
            None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(data);
        body
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file_name, data) in parts {
            body.extend(part(name, *file_name, data));
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    struct Harness {
        _root: tempfile::TempDir,
        state: AppState,
        jobs: Arc<MemoryJobStore>,
        queue: Arc<MemoryQueue>,
    }

    fn harness(catalog: MemoryCatalog, queue: MemoryQueue) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let mut state = AppState::for_tests(root.path());
        let jobs = Arc::new(MemoryJobStore::default());
        let queue = Arc::new(queue);
        state.catalog = Arc::new(catalog);
        state.jobs = jobs.clone();
        state.dispatcher = queue.clone();
        Harness { _root: root, state, jobs, queue }
    }

    fn catalog_with_42() -> MemoryCatalog {
        MemoryCatalog::default().with_content(42, false, None)
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/upload", post(upload_video))
            .route("/jobs/{job_id}", get(get_job))
            .with_state(state)
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_upload(state: AppState, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let req = Request::post("/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();
        send(app(state), req).await
    }

    fn leftover_uploads(state: &AppState) -> usize {
        std::fs::read_dir(state.config.upload_dir()).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn rejects_request_without_file() {
        let h = harness(MemoryCatalog::default(), MemoryQueue::default());

        let body = multipart_body(&[("contentId", None, b"42")]);
        let (status, body) = post_upload(h.state, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No video file uploaded");
    }

    #[tokio::test]
    async fn rejects_missing_content_id_and_deletes_file() {
        let h = harness(MemoryCatalog::default(), MemoryQueue::default());

        let body = multipart_body(&[("video", Some("clip.mp4"), SAMPLE)]);
        let (status, json) = post_upload(h.state.clone(), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "contentId is required");
        assert_eq!(leftover_uploads(&h.state), 0);
    }

    #[tokio::test]
    async fn rejects_malformed_content_id_and_deletes_file() {
        let h = harness(MemoryCatalog::default(), MemoryQueue::default());

        let body = multipart_body(&[
            ("video", Some("clip.mp4"), b"data"),
            ("contentId", None, b"../../etc"),
        ]);
        let (status, _) = post_upload(h.state.clone(), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(leftover_uploads(&h.state), 0);
    }

    #[tokio::test]
    async fn truncated_content_id_field_deletes_file() {
        let h = harness(catalog_with_42(), MemoryQueue::default());

        // Stream ends inside the contentId part, with no closing boundary.
        let mut body = part("video", Some("clip.mp4"), SAMPLE);
        body.extend_from_slice(b"\r\n");
        body.extend(part("contentId", None, b"42"));

        let (status, _) = post_upload(h.state.clone(), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(leftover_uploads(&h.state), 0);
        assert!(h.queue.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepts_upload_and_queues_pending_job() {
        let h = harness(catalog_with_42(), MemoryQueue::default());

        let body = multipart_body(&[
            ("contentId", None, b"42"),
            ("video", Some("clip.mp4"), SAMPLE),
        ]);
        let (status, json) = post_upload(h.state.clone(), body).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["contentId"], "42");
        assert_eq!(json["message"], "Video uploaded, processing started");
        let job_id: Uuid = json["jobId"].as_str().unwrap().parse().unwrap();

        // Nothing has been encoded yet: the upload waits on disk for the worker.
        let queued = h.queue.jobs.lock().unwrap().clone();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].job_id, job_id);
        assert_eq!(queued[0].content_id, MediaKey::Content(42));
        assert_eq!(std::fs::read(&queued[0].input_path).unwrap(), SAMPLE);
        assert_eq!(h.jobs.history(job_id), vec![JobStatus::Pending]);

        let req = Request::get(format!("/jobs/{job_id}")).body(Body::empty()).unwrap();
        let (status, record) = send(app(h.state.clone()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], "pending");
        assert_eq!(record["contentId"], "42");
    }

    #[tokio::test]
    async fn accepts_episode_uploads() {
        let catalog = MemoryCatalog::default()
            .with_content(1, true, None)
            .with_episode(17, 1, false, None, None);
        let h = harness(catalog, MemoryQueue::default());

        let body = multipart_body(&[
            ("video", Some("ep.mp4"), SAMPLE),
            ("contentId", None, b"ep_17"),
        ]);
        let (status, json) = post_upload(h.state.clone(), body).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["contentId"], "ep_17");
        assert_eq!(h.queue.jobs.lock().unwrap()[0].content_id, MediaKey::Episode(17));
    }

    #[tokio::test]
    async fn unknown_content_is_not_found_and_deletes_file() {
        let h = harness(catalog_with_42(), MemoryQueue::default());

        let body = multipart_body(&[
            ("video", Some("clip.mp4"), SAMPLE),
            ("contentId", None, b"43"),
        ]);
        let (status, _) = post_upload(h.state.clone(), body).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(leftover_uploads(&h.state), 0);
        assert!(h.queue.jobs.lock().unwrap().is_empty());
        assert!(h.jobs.job_ids().is_empty());
    }

    #[tokio::test]
    async fn queue_outage_is_unavailable_and_marks_job_failed() {
        let offline = MemoryQueue { offline: true, ..Default::default() };
        let h = harness(catalog_with_42(), offline);

        let body = multipart_body(&[
            ("video", Some("clip.mp4"), SAMPLE),
            ("contentId", None, b"42"),
        ]);
        let (status, json) = post_upload(h.state.clone(), body).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["message"], "Processing queue unavailable, try again later");
        assert_eq!(leftover_uploads(&h.state), 0);

        let ids = h.jobs.job_ids();
        assert_eq!(ids.len(), 1);
        assert_eq!(h.jobs.history(ids[0]), vec![JobStatus::Pending, JobStatus::Failed]);
        assert_eq!(h.jobs.last_error(ids[0]).as_deref(), Some("could not be queued"));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let h = harness(MemoryCatalog::default(), MemoryQueue::default());
        let req = Request::get(format!("/jobs/{}", Uuid::new_v4())).body(Body::empty()).unwrap();
        let (status, json) = send(app(h.state), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Job not found");
    }
}
