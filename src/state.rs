use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool::DbPool;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::redis::client::RedisService;
use crate::infrastructure::storage::s3::StorageService;
use crate::modules::video::events::JobQueue;
use crate::modules::video::jobs::{JobStore, RedisJobStore};
use crate::modules::video::processor::PipelinePaths;
use crate::modules::video::service::{CatalogReader, PgCatalog};
use crate::modules::video::transcoder::{FfmpegTranscoder, Transcoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub redis: RedisService,
    pub storage: StorageService,
    /// Broker connection the worker consumes from.
    pub queue: RabbitMqService,
    /// Where the upload intake submits jobs.
    pub dispatcher: Arc<dyn JobQueue>,
    pub catalog: Arc<dyn CatalogReader>,
    pub jobs: Arc<dyn JobStore>,
    pub transcoder: Arc<dyn Transcoder>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: DbPool,
        redis: RedisService,
        storage: StorageService,
        queue: RabbitMqService,
    ) -> Self {
        let transcoder = Arc::new(FfmpegTranscoder::new(config.transcode.clone()));
        Self {
            jobs: Arc::new(RedisJobStore::new(redis.clone())),
            catalog: Arc::new(PgCatalog(db)),
            dispatcher: Arc::new(queue.clone()),
            config,
            redis,
            storage,
            queue,
            transcoder,
        }
    }

    pub fn pipeline_paths(&self) -> PipelinePaths {
        PipelinePaths {
            work_root: self.config.work_dir(),
            public_root: self.config.public_video_dir.clone(),
        }
    }
}

#[cfg(test)]
impl AppState {
    /// Network clients connect lazily and are never reached by the handlers
    /// under test; catalog, job records and the queue live in memory.
    pub fn for_tests(root: &std::path::Path) -> Self {
        use crate::modules::video::events::MemoryQueue;
        use crate::modules::video::jobs::MemoryJobStore;
        use crate::modules::video::service::MemoryCatalog;

        let config = AppConfig::for_tests(root);
        let redis = RedisService::open(&config.redis_url).unwrap();
        let storage = StorageService::new(
            &config.minio_url,
            &config.minio_bucket,
            &config.minio_region,
            &config.minio_access_key,
            &config.minio_secret_key,
            config.s3_upload_concurrency,
        );
        let queue = RabbitMqService::lazy(&config.rabbitmq_url);
        let transcoder = Arc::new(FfmpegTranscoder::new(config.transcode.clone()));

        Self {
            config,
            redis,
            storage,
            queue,
            dispatcher: Arc::new(MemoryQueue::default()),
            catalog: Arc::new(MemoryCatalog::default()),
            jobs: Arc::new(MemoryJobStore::default()),
            transcoder,
        }
    }
}
