use super::jobs::{JobStatus, JobStore};
use super::transcoder::Transcoder;
use crate::common::media_key::MediaKey;
use crate::common::upload::{remove_dir_quiet, remove_file_quiet};
use crate::infrastructure::storage::uploader::{upload_directory, ObjectSink};
use anyhow::{Context, Result};
use futures_util::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Filesystem layout the processor works in.
#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub work_root: PathBuf,
    pub public_root: PathBuf,
}

impl PipelinePaths {
    pub fn work_dir(&self, key: &MediaKey) -> PathBuf {
        self.work_root.join(key.to_string())
    }

    pub fn public_dir(&self, key: &MediaKey) -> PathBuf {
        self.public_root.join(key.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemotePublish {
    Published(usize),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub renditions: Vec<String>,
    pub local_dir: PathBuf,
    pub remote: RemotePublish,
}

pub struct Processor<'a> {
    pub transcoder: &'a dyn Transcoder,
    pub sink: &'a dyn ObjectSink,
    pub status: &'a dyn JobStore,
    pub paths: &'a PipelinePaths,
}

impl Processor<'_> {
    /// Runs encode, local publish, best-effort remote publish and cleanup for
    /// one upload. Only an encode or local publish failure is an error; the
    /// temp input and working directory are removed on every path.
    pub async fn run(&self, job_id: Uuid, key: MediaKey, input: &Path) -> Result<ProcessReport> {
        let work_dir = self.paths.work_dir(&key);
        let result = self.stages(job_id, key, input, &work_dir).await;

        remove_file_quiet(input).await;
        remove_dir_quiet(&work_dir).await;

        match &result {
            Ok(_) => self.status.set(job_id, JobStatus::Done, None).await,
            Err(e) => self.status.set(job_id, JobStatus::Failed, Some(format!("{e:#}"))).await,
        }
        result
    }

    async fn stages(
        &self,
        job_id: Uuid,
        key: MediaKey,
        input: &Path,
        work_dir: &Path,
    ) -> Result<ProcessReport> {
        self.status.set(job_id, JobStatus::Encoding, None).await;

        // A previous crashed attempt may have left output behind.
        remove_dir_quiet(work_dir).await;
        info!(%job_id, content_id = %key, "🎥 Encoding");
        let renditions = self
            .transcoder
            .transcode(input, work_dir)
            .await
            .context("transcoding failed")?;

        let local_dir = publish_local(work_dir, &self.paths.public_dir(&key), job_id).await?;
        info!(%job_id, content_id = %key, dir = %local_dir.display(), "📁 Published locally");
        self.status.set(job_id, JobStatus::Published, None).await;

        let remote = match upload_directory(self.sink, work_dir, &key.storage_prefix()).await {
            Ok(count) => {
                info!(
                    %job_id,
                    content_id = %key,
                    files = count,
                    "☁️ Published to object storage"
                );
                RemotePublish::Published(count)
            }
            Err(e) => {
                warn!(
                    %job_id,
                    content_id = %key,
                    "Object storage publish failed, keeping local copy only: {:#}",
                    e
                );
                RemotePublish::Failed(format!("{e:#}"))
            }
        };

        Ok(ProcessReport {
            renditions: renditions.into_iter().map(|r| r.name).collect(),
            local_dir,
            remote,
        })
    }
}

/// Replaces `dest` with a copy of `src`. The copy is staged next to `dest`
/// and swapped in, so the old rendition set is never merged with the new one.
pub async fn publish_local(src: &Path, dest: &Path, job_id: Uuid) -> Result<PathBuf> {
    let parent = dest.parent().context("public directory has no parent")?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let name = dest.file_name().context("public directory has no name")?.to_string_lossy();
    let staging = parent.join(format!("{}.staging-{}", name, job_id.simple()));

    remove_dir_quiet(&staging).await;
    if let Err(e) = copy_dir(src, &staging).await {
        remove_dir_quiet(&staging).await;
        return Err(e);
    }

    remove_dir_quiet(dest).await;
    tokio::fs::rename(&staging, dest)
        .await
        .with_context(|| format!("failed to move {} into place", staging.display()))?;

    Ok(dest.to_path_buf())
}

fn copy_dir<'a>(src: &'a Path, dest: &'a Path) -> BoxFuture<'a, Result<()>> {
    async move {
        tokio::fs::create_dir_all(dest)
            .await
            .with_context(|| format!("failed to create {}", dest.display()))?;

        let mut entries = tokio::fs::read_dir(src)
            .await
            .with_context(|| format!("failed to read {}", src.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let target = dest.join(entry.file_name());
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                copy_dir(&entry.path(), &target).await?;
            } else if file_type.is_file() {
                tokio::fs::copy(entry.path(), &target)
                    .await
                    .with_context(|| format!("failed to copy to {}", target.display()))?;
            }
        }
        Ok(())
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::video::jobs::MemoryJobStore;
    use crate::modules::video::ladder::{default_ladder, Rendition};
    use crate::modules::video::manifest::MASTER_PLAYLIST;
    use crate::modules::video::transcoder::{write_master, TranscodeError};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Writes a small but structurally valid rendition set.
    struct FakeTranscoder {
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(
            &self,
            _input: &Path,
            out_dir: &Path,
        ) -> Result<Vec<Rendition>, TranscodeError> {
            tokio::fs::create_dir_all(out_dir).await.unwrap();
            let ladder = default_ladder();
            for r in &ladder {
                if self.fail_on == Some(r.name.as_str()) {
                    return Err(TranscodeError::Encoder {
                        rendition: r.name.clone(),
                        code: Some(1),
                        stderr: "Invalid data found when processing input".to_string(),
                    });
                }
                let playlist = format!(
                    "#EXTM3U\n#EXTINF:10.0,\n{0}_000.ts\n\
                     #EXTINF:4.0,\n{0}_001.ts\n#EXT-X-ENDLIST\n",
                    r.name
                );
                tokio::fs::write(out_dir.join(r.playlist_name()), playlist).await.unwrap();
                for segment in ["000", "001"] {
                    let name = format!("{}_{}.ts", r.name, segment);
                    tokio::fs::write(out_dir.join(name), [0u8; 4]).await.unwrap();
                }
            }
            write_master(out_dir, &ladder).await?;
            Ok(ladder)
        }
    }

    #[derive(Default)]
    struct FakeSink {
        keys: Mutex<Vec<String>>,
        offline: bool,
    }

    #[async_trait]
    impl ObjectSink for FakeSink {
        async fn put_file(&self, key: &str, _path: &Path, _content_type: &str) -> Result<()> {
            if self.offline {
                return Err(anyhow!("dns error: failed to lookup address"));
            }
            self.keys.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    struct Fixture {
        _root: tempfile::TempDir,
        paths: PipelinePaths,
        input: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let paths = PipelinePaths {
            work_root: root.path().join("tmp/work"),
            public_root: root.path().join("public/videos"),
        };
        let input = root.path().join("tmp/uploads/job_sample.mp4");
        std::fs::create_dir_all(input.parent().unwrap()).unwrap();
        std::fs::write(&input, b"not really a video").unwrap();
        Fixture { _root: root, paths, input }
    }

    #[tokio::test]
    async fn publishes_full_ladder_locally_and_remotely() {
        let fx = fixture();
        let transcoder = FakeTranscoder { fail_on: None };
        let sink = FakeSink::default();
        let status = MemoryJobStore::default();
        let job_id = Uuid::new_v4();
        let key = MediaKey::Content(42);

        let processor = Processor {
            transcoder: &transcoder,
            sink: &sink,
            status: &status,
            paths: &fx.paths,
        };
        let report = processor.run(job_id, key, &fx.input).await.unwrap();

        let public = fx.paths.public_dir(&key);
        assert_eq!(report.local_dir, public);
        for name in ["240p", "360p", "480p", "720p", "1080p"] {
            let playlist = std::fs::read_to_string(public.join(format!("{name}.m3u8"))).unwrap();
            assert!(playlist.contains(&format!("{name}_000.ts")));
        }
        let master = std::fs::read_to_string(public.join(MASTER_PLAYLIST)).unwrap();
        assert_eq!(master.matches("#EXT-X-STREAM-INF").count(), 5);
        assert!(master.contains("BANDWIDTH=6000000,RESOLUTION=1920x1080"));

        // 5 playlists + 10 segments + master
        assert_eq!(report.remote, RemotePublish::Published(16));
        let keys = sink.keys.lock().unwrap();
        assert!(keys.contains(&"videos/42/master.m3u8".to_string()));
        assert!(keys.contains(&"videos/42/1080p_001.ts".to_string()));

        assert!(!fx.input.exists());
        assert!(!fx.paths.work_dir(&key).exists());
        assert_eq!(
            status.history(job_id),
            vec![JobStatus::Encoding, JobStatus::Published, JobStatus::Done]
        );
    }

    #[tokio::test]
    async fn remote_failure_keeps_local_copy() {
        let fx = fixture();
        let transcoder = FakeTranscoder { fail_on: None };
        let sink = FakeSink { offline: true, ..Default::default() };
        let status = MemoryJobStore::default();
        let job_id = Uuid::new_v4();
        let key = MediaKey::Episode(7);

        let processor = Processor {
            transcoder: &transcoder,
            sink: &sink,
            status: &status,
            paths: &fx.paths,
        };
        let report = processor.run(job_id, key, &fx.input).await.unwrap();

        assert!(matches!(
            report.remote,
            RemotePublish::Failed(ref msg) if msg.contains("dns error")
        ));
        assert!(fx.paths.public_dir(&key).join(MASTER_PLAYLIST).exists());
        assert!(!fx.input.exists());
        assert!(!fx.paths.work_dir(&key).exists());
        assert_eq!(status.history(job_id).last(), Some(&JobStatus::Done));
    }

    #[tokio::test]
    async fn encode_failure_publishes_nothing_and_cleans_up() {
        let fx = fixture();
        let transcoder = FakeTranscoder { fail_on: Some("480p") };
        let sink = FakeSink::default();
        let status = MemoryJobStore::default();
        let job_id = Uuid::new_v4();
        let key = MediaKey::Content(9);

        let processor = Processor {
            transcoder: &transcoder,
            sink: &sink,
            status: &status,
            paths: &fx.paths,
        };
        let err = processor.run(job_id, key, &fx.input).await.unwrap_err();

        assert!(format!("{err:#}").contains("480p"));
        assert!(!fx.paths.public_dir(&key).exists());
        assert!(sink.keys.lock().unwrap().is_empty());
        assert!(!fx.input.exists());
        assert!(!fx.paths.work_dir(&key).exists());
        assert_eq!(
            status.history(job_id),
            vec![JobStatus::Encoding, JobStatus::Failed]
        );
        assert!(status.last_error(job_id).unwrap().contains("480p"));
    }

    #[tokio::test]
    async fn reprocessing_replaces_previous_output() {
        let fx = fixture();
        let key = MediaKey::Content(42);
        let public = fx.paths.public_dir(&key);
        std::fs::create_dir_all(&public).unwrap();
        std::fs::write(public.join("stale_999.ts"), b"old").unwrap();

        let transcoder = FakeTranscoder { fail_on: None };
        let sink = FakeSink::default();
        let status = MemoryJobStore::default();
        let processor = Processor {
            transcoder: &transcoder,
            sink: &sink,
            status: &status,
            paths: &fx.paths,
        };
        processor.run(Uuid::new_v4(), key, &fx.input).await.unwrap();

        assert!(!public.join("stale_999.ts").exists());
        assert!(public.join(MASTER_PLAYLIST).exists());
        // No staging directories left next to the published one.
        let siblings: Vec<_> = std::fs::read_dir(&fx.paths.public_root).unwrap().collect();
        assert_eq!(siblings.len(), 1);
    }

    #[tokio::test]
    async fn publish_local_copies_nested_directories() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("src");
        std::fs::create_dir_all(src.join("audio")).unwrap();
        std::fs::write(src.join("master.m3u8"), b"#EXTM3U\n").unwrap();
        std::fs::write(src.join("audio/en.m3u8"), b"#EXTM3U\n").unwrap();

        let dest = root.path().join("public/5");
        publish_local(&src, &dest, Uuid::new_v4()).await.unwrap();

        assert!(dest.join("master.m3u8").is_file());
        assert!(dest.join("audio/en.m3u8").is_file());
        assert!(src.join("master.m3u8").is_file());
    }
}
