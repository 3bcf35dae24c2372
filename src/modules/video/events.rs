use crate::common::media_key::MediaKey;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

pub const TRANSCODE_QUEUE: &str = "transcoding_tasks";

/// Message handed from the upload intake to the transcoder worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub job_id: Uuid,
    pub content_id: MediaKey,
    pub input_path: PathBuf,
}

/// Hands accepted uploads to the transcoder worker.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &TranscodeJob) -> anyhow::Result<()>;
}

#[async_trait]
impl JobQueue for RabbitMqService {
    async fn enqueue(&self, job: &TranscodeJob) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(job)?;
        self.publish(TRANSCODE_QUEUE, &payload).await
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryQueue {
    pub jobs: std::sync::Mutex<Vec<TranscodeJob>>,
    /// Rejects every job, as a broker that is down would.
    pub offline: bool,
}

#[cfg(test)]
#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &TranscodeJob) -> anyhow::Result<()> {
        if self.offline {
            anyhow::bail!("Failed to connect to RabbitMQ: connection refused");
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}
