use super::ladder::Rendition;
use super::manifest::{self, MASTER_PLAYLIST};
use crate::config::settings::TranscodeConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to launch encoder for {rendition}: {source}")]
    Spawn {
        rendition: String,
        source: std::io::Error,
    },
    #[error("encoder failed for {rendition} (exit code {code:?}): {stderr}")]
    Encoder {
        rendition: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("failed to write master playlist: {0}")]
    Manifest(std::io::Error),
}

/// Produces a full HLS rendition set for one source file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// On success `out_dir` holds one playlist per rendition plus the master
    /// playlist. On failure no master playlist is written; partial rendition
    /// output may remain.
    async fn transcode(
        &self,
        input: &Path,
        out_dir: &Path,
    ) -> Result<Vec<Rendition>, TranscodeError>;
}

pub struct FfmpegTranscoder {
    config: TranscodeConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscodeConfig) -> Self {
        Self { config }
    }

    fn rendition_args(&self, input: &Path, out_dir: &Path, r: &Rendition) -> Vec<String> {
        let kbps = format!("{}k", r.video_kbps);
        vec![
            "-hide_banner".into(),
            "-y".into(),
            "-i".into(),
            input.display().to_string(),
            "-vf".into(),
            format!("scale={}:{}", r.width, r.height),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-b:v".into(),
            kbps.clone(),
            "-maxrate".into(),
            kbps,
            "-bufsize".into(),
            format!("{}k", r.video_kbps * 2),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            format!("{}k", self.config.audio_kbps),
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            self.config.segment_seconds.to_string(),
            "-hls_playlist_type".into(),
            "vod".into(),
            "-hls_segment_filename".into(),
            out_dir.join(r.segment_pattern()).display().to_string(),
            out_dir.join(r.playlist_name()).display().to_string(),
        ]
    }

    async fn encode_rendition(
        &self,
        input: &Path,
        out_dir: &Path,
        r: &Rendition,
    ) -> Result<(), TranscodeError> {
        let args = self.rendition_args(input, out_dir, r);
        debug!(rendition = %r.name, ?args, "Spawning encoder");

        let output = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                rendition: r.name.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TranscodeError::Encoder {
                rendition: r.name.clone(),
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr, 10),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        out_dir: &Path,
    ) -> Result<Vec<Rendition>, TranscodeError> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|source| TranscodeError::OutputDir {
                path: out_dir.to_path_buf(),
                source,
            })?;

        for r in &self.config.ladder {
            info!(
                rendition = %r.name,
                resolution = %r.resolution(),
                kbps = r.video_kbps,
                "🎞️ Encoding rendition"
            );
            self.encode_rendition(input, out_dir, r).await?;
        }

        write_master(out_dir, &self.config.ladder).await?;
        Ok(self.config.ladder.clone())
    }
}

pub async fn write_master(out_dir: &Path, ladder: &[Rendition]) -> Result<(), TranscodeError> {
    tokio::fs::write(out_dir.join(MASTER_PLAYLIST), manifest::master_playlist(ladder))
        .await
        .map_err(TranscodeError::Manifest)
}

fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::video::ladder::default_ladder;

    fn config(ffmpeg: &str) -> TranscodeConfig {
        TranscodeConfig {
            ffmpeg_path: ffmpeg.to_string(),
            ladder: default_ladder(),
            segment_seconds: 10,
            audio_kbps: 128,
        }
    }

    #[test]
    fn rendition_args_describe_one_hls_output() {
        let t = FfmpegTranscoder::new(config("ffmpeg"));
        let r = Rendition::new("720p", 1280, 720, 2800);
        let args = t.rendition_args(Path::new("/in/src.mp4"), Path::new("/out/42"), &r);

        let pair = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(pair("-i"), "/in/src.mp4");
        assert_eq!(pair("-vf"), "scale=1280:720");
        assert_eq!(pair("-c:v"), "libx264");
        assert_eq!(pair("-b:v"), "2800k");
        assert_eq!(pair("-bufsize"), "5600k");
        assert_eq!(pair("-c:a"), "aac");
        assert_eq!(pair("-b:a"), "128k");
        assert_eq!(pair("-hls_time"), "10");
        assert_eq!(pair("-hls_segment_filename"), "/out/42/720p_%03d.ts");
        assert_eq!(args.last().unwrap(), "/out/42/720p.m3u8");
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        assert_eq!(stderr_tail(b"a\nb\nc\nd", 2), "c\nd");
        assert_eq!(stderr_tail(b"only", 5), "only");
    }

    #[tokio::test]
    async fn missing_encoder_fails_without_master() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let t = FfmpegTranscoder::new(config("/nonexistent/definitely-not-ffmpeg"));

        let err = t.transcode(&dir.path().join("in.mp4"), &out).await.unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { ref rendition, .. } if rendition == "1080p"));
        assert!(out.is_dir());
        assert!(!out.join(MASTER_PLAYLIST).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_encoder_reports_rendition() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        // `false` ignores its arguments and exits 1.
        let t = FfmpegTranscoder::new(config("false"));

        let err = t.transcode(&dir.path().join("in.mp4"), &out).await.unwrap_err();
        match err {
            TranscodeError::Encoder { rendition, code, .. } => {
                assert_eq!(rendition, "1080p");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!out.join(MASTER_PLAYLIST).exists());
    }

    #[tokio::test]
    async fn write_master_creates_playlist() {
        let dir = tempfile::tempdir().unwrap();
        write_master(dir.path(), &default_ladder()).await.unwrap();
        let text = std::fs::read_to_string(dir.path().join(MASTER_PLAYLIST)).unwrap();
        assert_eq!(text.matches("#EXT-X-STREAM-INF").count(), 5);
    }
}
