use crate::common::response::ErrorResponse;
use crate::modules::stream::dto::StreamTokenResponse;
use crate::modules::video::dto::{UploadAccepted, UploadForm, VideoUrlResponse};
use crate::modules::video::jobs::{JobRecord, JobStatus};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::video::handler::upload_video,
        crate::modules::video::handler::get_video_url,
        crate::modules::video::handler::get_job,
        crate::modules::stream::handler::get_token,
        crate::modules::stream::handler::stream_file,
    ),
    components(
        schemas(
            UploadForm, UploadAccepted, VideoUrlResponse, JobRecord, JobStatus,
            StreamTokenResponse, ErrorResponse,
        )
    ),
    tags(
        (name = "Video", description = "Upload, packaging jobs and playback resolution"),
        (name = "Stream", description = "Token-gated manifest and segment delivery")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
