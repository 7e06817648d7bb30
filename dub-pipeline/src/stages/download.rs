//! Download stage: fetch source audio and video with yt-dlp

use async_trait::async_trait;
use dub_common::api::VideoQuality;
use dub_common::{Failure, Stage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::command::{self, CommandError};
use super::{unexpected_input, JobContext, StageProcessor};
use crate::models::{Artifact, MediaFiles};

const AUDIO_STEM: &str = "original_audio";
const VIDEO_STEM: &str = "original_video";
const AUDIO_EXTENSIONS: &[&str] = &["wav"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv"];

pub struct DownloadStage {
    yt_dlp: PathBuf,
    ffprobe: PathBuf,
}

impl DownloadStage {
    pub fn new(yt_dlp: PathBuf, ffprobe: PathBuf) -> Self {
        Self { yt_dlp, ffprobe }
    }

    async fn fetch_audio(&self, url: &str, work_dir: &Path) -> Result<PathBuf, Failure> {
        let template = work_dir
            .join(format!("{}.%(ext)s", AUDIO_STEM))
            .to_string_lossy()
            .into_owned();
        let args = [
            "--no-playlist",
            "-f",
            "bestaudio/best",
            "-x",
            "--audio-format",
            "wav",
            "-o",
            template.as_str(),
            url,
        ];
        command::run(&self.yt_dlp, args)
            .await
            .map_err(download_failure)?;

        find_with_stem(work_dir, AUDIO_STEM, AUDIO_EXTENSIONS)
            .await
            .ok_or_else(|| Failure::Other("audio download produced no file".to_string()))
    }

    async fn fetch_video(
        &self,
        url: &str,
        quality: VideoQuality,
        work_dir: &Path,
    ) -> Result<PathBuf, Failure> {
        let template = work_dir
            .join(format!("{}.%(ext)s", VIDEO_STEM))
            .to_string_lossy()
            .into_owned();
        let selector = format_selector(quality);
        let args = [
            "--no-playlist",
            "-f",
            selector.as_str(),
            "-o",
            template.as_str(),
            url,
        ];
        command::run(&self.yt_dlp, args)
            .await
            .map_err(download_failure)?;

        find_with_stem(work_dir, VIDEO_STEM, VIDEO_EXTENSIONS)
            .await
            .ok_or_else(|| Failure::Other("video download produced no file".to_string()))
    }
}

#[async_trait]
impl StageProcessor for DownloadStage {
    fn stage(&self) -> Stage {
        Stage::Download
    }

    async fn process(&self, input: &Artifact, ctx: &JobContext) -> Result<Artifact, Failure> {
        let params = match input {
            Artifact::Submission(params) => params,
            other => return Err(unexpected_input(Stage::Download, other)),
        };
        if params.source_url.trim().is_empty() {
            return Err(Failure::InvalidInput("source URL is empty".to_string()));
        }

        tokio::fs::create_dir_all(&ctx.work_dir)
            .await
            .map_err(|e| Failure::Other(format!("cannot create work folder: {}", e)))?;

        let audio_path = self.fetch_audio(&params.source_url, &ctx.work_dir).await?;
        debug!(session_id = %ctx.session_id, path = %audio_path.display(), "Audio downloaded");

        let video_path = self
            .fetch_video(&params.source_url, params.options.quality, &ctx.work_dir)
            .await?;
        debug!(session_id = %ctx.session_id, path = %video_path.display(), "Video downloaded");

        let duration_seconds = command::probe_duration(&self.ffprobe, &audio_path).await;
        info!(
            session_id = %ctx.session_id,
            duration_seconds = ?duration_seconds,
            "Source media downloaded"
        );

        Ok(Artifact::Media(MediaFiles {
            audio_path,
            video_path,
            duration_seconds,
        }))
    }
}

/// yt-dlp format selector for a quality cap
fn format_selector(quality: VideoQuality) -> String {
    match quality.max_height() {
        Some(height) => format!("best[height<={}]/best", height),
        None => "best".to_string(),
    }
}

/// Map a yt-dlp failure onto a raw failure using its stderr
fn download_failure(err: CommandError) -> Failure {
    let stderr = err.stderr().to_lowercase();
    if stderr.contains("unsupported url")
        || stderr.contains("is not a valid url")
        || stderr.contains("video unavailable")
        || stderr.contains("private video")
        || stderr.contains("this video has been removed")
    {
        Failure::InvalidInput(err.to_string())
    } else if stderr.contains("http error 429") {
        Failure::RateLimited(err.to_string())
    } else if stderr.contains("http error 5")
        || stderr.contains("unable to download webpage")
        || stderr.contains("timed out")
    {
        Failure::Connection(err.to_string())
    } else {
        err.into()
    }
}

/// First file in `dir` named `<stem>.<ext>` for one of `extensions`
async fn find_with_stem(dir: &Path, stem: &str, extensions: &[&str]) -> Option<PathBuf> {
    for ext in extensions {
        let candidate = dir.join(format!("{}.{}", stem, ext));
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use dub_common::ErrorKind;

    fn exit(stderr: &str) -> CommandError {
        CommandError::Exit {
            program: "yt-dlp".to_string(),
            code: Some(1),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_format_selector() {
        assert_eq!(format_selector(VideoQuality::High), "best[height<=720]/best");
        assert_eq!(format_selector(VideoQuality::Low), "best[height<=360]/best");
        assert_eq!(format_selector(VideoQuality::Best), "best");
    }

    #[test]
    fn test_stderr_classification() {
        let kind = |s: &str| ErrorKind::from_failure(&download_failure(exit(s)));
        assert_eq!(kind("ERROR: Unsupported URL: https://x.io"), ErrorKind::BadInput);
        assert_eq!(kind("ERROR: [youtube] abc: Video unavailable"), ErrorKind::BadInput);
        assert_eq!(kind("ERROR: HTTP Error 429: Too Many Requests"), ErrorKind::RateLimit);
        assert_eq!(kind("ERROR: HTTP Error 503: Service Unavailable"), ErrorKind::Network);
        assert_eq!(kind("ERROR: something odd"), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_find_with_stem() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_with_stem(dir.path(), VIDEO_STEM, VIDEO_EXTENSIONS).await.is_none());

        let webm = dir.path().join("original_video.webm");
        std::fs::write(&webm, b"x").unwrap();
        assert_eq!(
            find_with_stem(dir.path(), VIDEO_STEM, VIDEO_EXTENSIONS).await,
            Some(webm)
        );
    }
}
