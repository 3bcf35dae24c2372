use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::{try_join_all, BoxFuture, FutureExt};
use std::path::Path;

/// Destination for published files, keyed by object key.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> Result<()>;
}

pub fn content_type_for(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl".to_string(),
        Some("ts") => "video/mp2t".to_string(),
        _ => mime_guess::from_path(path).first_or_octet_stream().to_string(),
    }
}

/// Uploads every regular file under `dir` to `prefix + relative path`.
///
/// Entries of one directory level are uploaded concurrently, subdirectories
/// included. The first failure drops the siblings still in flight and is
/// returned. Resolves to the number of files uploaded.
pub fn upload_directory<'a>(
    sink: &'a dyn ObjectSink,
    dir: &'a Path,
    prefix: &'a str,
) -> BoxFuture<'a, Result<usize>> {
    async move {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("failed to read {}", dir.display()))?;

        let mut tasks: Vec<BoxFuture<'a, Result<usize>>> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                let sub_prefix = format!("{prefix}{name}/");
                tasks.push(async move { upload_directory(sink, &path, &sub_prefix).await }.boxed());
            } else if file_type.is_file() {
                let key = format!("{prefix}{name}");
                tasks.push(
                    async move {
                        sink.put_file(&key, &path, &content_type_for(&path))
                            .await
                            .with_context(|| format!("failed to upload {key}"))?;
                        Ok(1)
                    }
                    .boxed(),
                );
            }
        }

        let counts = try_join_all(tasks).await?;
        Ok(counts.into_iter().sum())
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        puts: Mutex<Vec<(String, String)>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl ObjectSink for RecordingSink {
        async fn put_file(&self, key: &str, _path: &Path, content_type: &str) -> Result<()> {
            if self.fail_on.as_deref() == Some(key) {
                return Err(anyhow!("connection reset"));
            }
            self.puts.lock().unwrap().push((key.to_string(), content_type.to_string()));
            Ok(())
        }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("master.m3u8"), "#EXTM3U\n").unwrap();
        std::fs::write(dir.path().join("240p.m3u8"), "#EXTM3U\n").unwrap();
        std::fs::write(dir.path().join("240p_000.ts"), [0u8; 8]).unwrap();
        std::fs::create_dir_all(dir.path().join("thumbs/small")).unwrap();
        std::fs::write(dir.path().join("thumbs/poster.jpg"), [1u8; 4]).unwrap();
        std::fs::write(dir.path().join("thumbs/small/0.jpg"), [1u8; 4]).unwrap();
        dir
    }

    #[tokio::test]
    async fn uploads_tree_under_prefix() {
        let dir = fixture();
        let sink = RecordingSink::default();

        let count = upload_directory(&sink, dir.path(), "videos/42/").await.unwrap();
        assert_eq!(count, 5);

        let mut puts = sink.puts.into_inner().unwrap();
        puts.sort();
        assert_eq!(
            puts,
            vec![
                ("videos/42/240p.m3u8".to_string(), "application/vnd.apple.mpegurl".to_string()),
                ("videos/42/240p_000.ts".to_string(), "video/mp2t".to_string()),
                ("videos/42/master.m3u8".to_string(), "application/vnd.apple.mpegurl".to_string()),
                ("videos/42/thumbs/poster.jpg".to_string(), "image/jpeg".to_string()),
                ("videos/42/thumbs/small/0.jpg".to_string(), "image/jpeg".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn single_failure_fails_the_walk() {
        let dir = fixture();
        let sink = RecordingSink {
            fail_on: Some("videos/42/thumbs/small/0.jpg".to_string()),
            ..Default::default()
        };

        let err = upload_directory(&sink, dir.path(), "videos/42/").await.unwrap_err();
        assert!(format!("{err:#}").contains("videos/42/thumbs/small/0.jpg"));
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::default();
        assert!(upload_directory(&sink, &dir.path().join("nope"), "p/").await.is_err());
    }
}
