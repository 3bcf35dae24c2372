use crate::infrastructure::redis::client::RedisService;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

const JOB_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Encoding,
    Published,
    Done,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Encoding => "encoding",
            JobStatus::Published => "published",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "encoding" => Ok(JobStatus::Encoding),
            "published" => Ok(JobStatus::Published),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(anyhow!("unknown job status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: Uuid,
    pub content_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: String,
}

impl JobRecord {
    fn from_hash(job_id: Uuid, fields: HashMap<String, String>) -> Result<Self> {
        let field = |name: &str| {
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("job {} is missing '{}'", job_id, name))
        };
        Ok(Self {
            job_id,
            content_id: field("content_id")?,
            status: field("status")?.parse()?,
            error: fields.get("error").filter(|e| !e.is_empty()).cloned(),
            updated_at: field("updated_at")?,
        })
    }
}

/// Job records and the per-content encode lock.
///
/// `set` is best effort: a lost status update must never fail the job
/// itself. The other operations report their errors.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job_id: Uuid, content_id: &str) -> Result<()>;
    async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>>;
    async fn set(&self, job_id: Uuid, status: JobStatus, error: Option<String>);
    /// Takes the per-content encode lock. Returns false when another job holds it.
    async fn try_lock(&self, content_id: &str, job_id: Uuid, ttl_secs: u64) -> Result<bool>;
    /// Releases the lock only if `job_id` still owns it.
    async fn unlock(&self, content_id: &str, job_id: Uuid) -> Result<()>;
}

fn job_key(job_id: Uuid) -> String {
    format!("transcode_job:{}", job_id)
}

fn lock_key(content_id: &str) -> String {
    format!("transcode_lock:{}", content_id)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Job records and per-content locks kept in Redis.
#[derive(Clone)]
pub struct RedisJobStore {
    redis: RedisService,
}

impl RedisJobStore {
    pub fn new(redis: RedisService) -> Self {
        Self { redis }
    }

    async fn update(&self, job_id: Uuid, status: JobStatus, error: Option<String>) -> Result<()> {
        let mut conn = self.redis.get_conn().await?;
        let key = job_key(job_id);
        let _: () = conn
            .hset_multiple(
                &key,
                &[
                    ("status", status.to_string()),
                    ("error", error.unwrap_or_default()),
                    ("updated_at", now_rfc3339()),
                ],
            )
            .await?;
        let _: () = conn.expire(&key, JOB_TTL_SECS).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, job_id: Uuid, content_id: &str) -> Result<()> {
        let mut conn = self.redis.get_conn().await?;
        let key = job_key(job_id);
        let _: () = conn
            .hset_multiple(
                &key,
                &[
                    ("content_id", content_id.to_string()),
                    ("status", JobStatus::Pending.to_string()),
                    ("error", String::new()),
                    ("updated_at", now_rfc3339()),
                ],
            )
            .await?;
        let _: () = conn.expire(&key, JOB_TTL_SECS).await?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        let mut conn = self.redis.get_conn().await?;
        let fields: HashMap<String, String> = conn.hgetall(job_key(job_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        JobRecord::from_hash(job_id, fields).map(Some)
    }

    async fn set(&self, job_id: Uuid, status: JobStatus, error: Option<String>) {
        if let Err(e) = self.update(job_id, status, error).await {
            warn!(%job_id, %status, "Failed to record job status: {}", e);
        }
    }

    async fn try_lock(&self, content_id: &str, job_id: Uuid, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.redis.get_conn().await?;
        let acquired: Option<String> = redis::cmd("SET")
            .arg(lock_key(content_id))
            .arg(job_id.to_string())
            .arg("NX")
            .arg("PX")
            .arg(ttl_secs.saturating_mul(1000))
            .query_async(&mut conn)
            .await?;
        Ok(acquired.is_some())
    }

    async fn unlock(&self, content_id: &str, job_id: Uuid) -> Result<()> {
        let mut conn = self.redis.get_conn().await?;
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
            "#,
        );
        let _: i64 = script
            .key(lock_key(content_id))
            .arg(job_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryJobStore {
    events: std::sync::Mutex<Vec<(Uuid, JobStatus, Option<String>)>>,
    contents: std::sync::Mutex<HashMap<Uuid, String>>,
    locks: std::sync::Mutex<HashMap<String, Uuid>>,
    /// Makes `create` fail, as an unreachable Redis would.
    pub offline: bool,
}

#[cfg(test)]
impl MemoryJobStore {
    pub fn history(&self, job_id: Uuid) -> Vec<JobStatus> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == job_id)
            .map(|(_, s, _)| *s)
            .collect()
    }

    pub fn last_error(&self, job_id: Uuid) -> Option<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _, _)| *id == job_id)
            .and_then(|(_, _, e)| e.clone())
    }

    pub fn job_ids(&self) -> Vec<Uuid> {
        self.contents.lock().unwrap().keys().copied().collect()
    }
}

#[cfg(test)]
#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job_id: Uuid, content_id: &str) -> Result<()> {
        if self.offline {
            return Err(anyhow!("connection refused"));
        }
        self.contents.lock().unwrap().insert(job_id, content_id.to_string());
        self.events.lock().unwrap().push((job_id, JobStatus::Pending, None));
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        let Some(content_id) = self.contents.lock().unwrap().get(&job_id).cloned() else {
            return Ok(None);
        };
        let events = self.events.lock().unwrap();
        let (_, status, error) = events
            .iter()
            .rev()
            .find(|(id, _, _)| *id == job_id)
            .cloned()
            .ok_or_else(|| anyhow!("job {} has no status", job_id))?;
        Ok(Some(JobRecord { job_id, content_id, status, error, updated_at: now_rfc3339() }))
    }

    async fn set(&self, job_id: Uuid, status: JobStatus, error: Option<String>) {
        self.events.lock().unwrap().push((job_id, status, error));
    }

    async fn try_lock(&self, content_id: &str, job_id: Uuid, _ttl_secs: u64) -> Result<bool> {
        let mut locks = self.locks.lock().unwrap();
        if locks.contains_key(content_id) {
            return Ok(false);
        }
        locks.insert(content_id.to_string(), job_id);
        Ok(true)
    }

    async fn unlock(&self, content_id: &str, job_id: Uuid) -> Result<()> {
        let mut locks = self.locks.lock().unwrap();
        if locks.get(content_id) == Some(&job_id) {
            locks.remove(content_id);
        }
        Ok(())
    }
}
