use crate::modules::video::events::{TranscodeJob, TRANSCODE_QUEUE};
use crate::modules::video::jobs::{JobStatus, JobStore};
use uuid::Uuid;
use crate::modules::video::processor::{Processor, RemotePublish};
use crate::state::AppState;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

const LOCK_RETRY_DELAY: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub async fn start_transcoder_worker(state: AppState) {
    info!("🎥 Starting Transcoder Worker...");

    loop {
        if let Err(e) = consume(&state).await {
            error!("Transcoder consumer stopped: {:#}", e);
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn consume(state: &AppState) -> anyhow::Result<()> {
    let workers = state.config.transcode_workers;
    // Headroom for deliveries parked behind a busy key.
    let prefetch = u16::try_from(workers.saturating_mul(2)).unwrap_or(u16::MAX);
    let mut consumer = state
        .queue
        .consume(TRANSCODE_QUEUE, "transcoder_worker", prefetch)
        .await?;
    let permits = Arc::new(Semaphore::new(workers));

    info!(
        "🎥 Transcoder Worker listening on '{}' ({} concurrent jobs)",
        TRANSCODE_QUEUE, workers
    );

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        let permit = permits.clone().acquire_owned().await?;
        let state = state.clone();

        tokio::spawn(async move {
            handle_delivery(&state, delivery, permit).await;
        });
    }

    Err(anyhow::anyhow!("consumer stream ended"))
}

async fn handle_delivery(state: &AppState, delivery: Delivery, permit: OwnedSemaphorePermit) {
    let job = match serde_json::from_slice::<TranscodeJob>(&delivery.data) {
        Ok(job) => job,
        Err(e) => {
            // Unparseable payloads would be redelivered forever.
            error!("❌ Failed to parse job: {}", e);
            ack(&delivery).await;
            return;
        }
    };

    let content_id = job.content_id.to_string();
    let ttl = state.config.transcode_lock_ttl_secs;
    match claim(state.jobs.as_ref(), &content_id, job.job_id, ttl).await {
        Claim::Acquired => {}
        Claim::Busy => {
            info!(
                job_id = %job.job_id,
                %content_id,
                "Another job is processing this content, requeueing"
            );
            back_off(permit, LOCK_RETRY_DELAY).await;
            requeue(&delivery).await;
            return;
        }
        Claim::Unavailable => {
            back_off(permit, LOCK_RETRY_DELAY).await;
            requeue(&delivery).await;
            return;
        }
    }

    if tokio::fs::try_exists(&job.input_path).await.unwrap_or(false) {
        run_job(state, &job).await;
    } else {
        error!(
            job_id = %job.job_id,
            path = %job.input_path.display(),
            "❌ Upload is gone, dropping job"
        );
        state
            .jobs
            .set(job.job_id, JobStatus::Failed, Some("uploaded file no longer exists".to_string()))
            .await;
    }

    if let Err(e) = state.jobs.unlock(&content_id, job.job_id).await {
        warn!(job_id = %job.job_id, "Failed to release lock, it will expire: {}", e);
    }
    ack(&delivery).await;
    drop(permit);
}

#[derive(Debug, PartialEq)]
enum Claim {
    Acquired,
    Busy,
    Unavailable,
}

async fn claim(jobs: &dyn JobStore, content_id: &str, job_id: Uuid, ttl_secs: u64) -> Claim {
    match jobs.try_lock(content_id, job_id, ttl_secs).await {
        Ok(true) => Claim::Acquired,
        Ok(false) => Claim::Busy,
        Err(e) => {
            warn!(%job_id, "Lock unavailable, requeueing: {}", e);
            Claim::Unavailable
        }
    }
}

/// Returns the worker slot before waiting, so deliveries parked behind a
/// busy key do not starve jobs for other keys.
async fn back_off(permit: OwnedSemaphorePermit, delay: Duration) {
    drop(permit);
    tokio::time::sleep(delay).await;
}

async fn run_job(state: &AppState, job: &TranscodeJob) {
    info!(job_id = %job.job_id, content_id = %job.content_id, "📦 Processing transcoding job");

    let paths = state.pipeline_paths();
    let processor = Processor {
        transcoder: state.transcoder.as_ref(),
        sink: &state.storage,
        status: state.jobs.as_ref(),
        paths: &paths,
    };

    match processor.run(job.job_id, job.content_id, &job.input_path).await {
        Ok(report) => {
            let dir = report.local_dir.display();
            match report.remote {
                RemotePublish::Published(files) => {
                    info!(
                        job_id = %job.job_id,
                        renditions = ?report.renditions,
                        %dir,
                        files,
                        "✅ Job completed successfully"
                    )
                }
                RemotePublish::Failed(reason) => {
                    warn!(
                        job_id = %job.job_id,
                        renditions = ?report.renditions,
                        %dir,
                        %reason,
                        "✅ Job completed, local copy only"
                    )
                }
            }
        }
        Err(e) => error!(job_id = %job.job_id, "❌ Failed to process job: {:#}", e),
    }
}

async fn ack(delivery: &Delivery) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        error!("Failed to ack message: {}", e);
    }
}

async fn requeue(delivery: &Delivery) {
    let options = BasicNackOptions {
        requeue: true,
        ..BasicNackOptions::default()
    };
    if let Err(e) = delivery.nack(options).await {
        error!("Failed to nack message: {}", e);
    }
}
