use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    RedisUrl,
    RabbitMqUrl,
    MinioUrl,
    MinioBucket,
    MinioAccessKey,
    MinioSecretKey,
    MinioRegion,
    MediaPublicBaseUrl,
    JwtSecret,
    StreamTokenSecret,
    StreamTokenTtlSecs,
    PublicVideoDir,
    TempDir,
    FfmpegPath,
    TranscodeLadder,
    HlsSegmentSeconds,
    AudioBitrateKbps,
    TranscodeWorkers,
    TranscodeLockTtlSecs,
    S3UploadConcurrency,
    MaxUploadBytes,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioBucket => "MINIO_BUCKET_VIDEOS",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::MinioRegion => "AWS_REGION",
            EnvKey::MediaPublicBaseUrl => "MEDIA_PUBLIC_BASE_URL",
            EnvKey::JwtSecret => "JWT_SECRET",
            EnvKey::StreamTokenSecret => "STREAM_TOKEN_SECRET",
            EnvKey::StreamTokenTtlSecs => "STREAM_TOKEN_TTL_SECS",
            EnvKey::PublicVideoDir => "PUBLIC_VIDEO_DIR",
            EnvKey::TempDir => "TEMP_DIR",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::TranscodeLadder => "TRANSCODE_LADDER",
            EnvKey::HlsSegmentSeconds => "HLS_SEGMENT_SECONDS",
            EnvKey::AudioBitrateKbps => "AUDIO_BITRATE_KBPS",
            EnvKey::TranscodeWorkers => "TRANSCODE_WORKERS",
            EnvKey::TranscodeLockTtlSecs => "TRANSCODE_LOCK_TTL_SECS",
            EnvKey::S3UploadConcurrency => "S3_UPLOAD_CONCURRENCY",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
