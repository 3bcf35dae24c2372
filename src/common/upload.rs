use anyhow::{anyhow, Context, Result};
use axum::extract::multipart::Field;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, warn};

/// A source file received from a client and parked on local disk until the
/// background job consumes it.
#[derive(Debug)]
pub struct TempUpload {
    pub path: PathBuf,
    pub bytes: u64,
}

impl TempUpload {
    /// Deletes the file; a file that is already gone is not an error.
    pub async fn discard(&self) {
        remove_file_quiet(&self.path).await;
    }
}

pub fn is_accepted_video_type(content_type: &str) -> bool {
    content_type.starts_with("video/") || content_type == "application/octet-stream"
}

/// Keeps only characters that are safe in a single file name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() { "upload.bin".to_string() } else { cleaned }
}

/// Streams a multipart field chunk by chunk into `dest`.
pub async fn stream_to_file(mut field: Field<'_>, dest: &Path) -> Result<TempUpload> {
    let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
    if !is_accepted_video_type(&content_type) {
        return Err(anyhow!("Invalid content type: only video/* allowed"));
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file = File::create(dest)
        .await
        .with_context(|| format!("failed to create {}", dest.display()))?;
    let mut writer = BufWriter::new(file);
    let mut bytes = 0u64;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(c)) => c,
            Ok(None) => break,
            Err(e) => {
                error!("Stream error: {}", e);
                drop(writer);
                remove_file_quiet(dest).await;
                return Err(anyhow!("Stream interrupted"));
            }
        };

        if let Err(e) = writer.write_all(&chunk).await {
            error!("Write error: {}", e);
            drop(writer);
            remove_file_quiet(dest).await;
            return Err(e.into());
        }
        bytes += chunk.len() as u64;
    }

    writer.flush().await?;

    Ok(TempUpload {
        path: dest.to_path_buf(),
        bytes,
    })
}

pub async fn remove_file_quiet(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Failed to remove file: {}", e);
        }
    }
}

pub async fn remove_dir_quiet(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Failed to remove directory: {}", e);
        }
    }
}
