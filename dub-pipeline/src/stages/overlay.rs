//! Overlay stage: mux the dubbed audio onto the original video with ffmpeg

use async_trait::async_trait;
use dub_common::api::{JobOptions, OutputFormat};
use dub_common::{Failure, Stage};
use std::path::{Path, PathBuf};
use tracing::info;

use super::command;
use super::{unexpected_input, JobContext, StageProcessor};
use crate::models::{Artifact, FinalVideo};

const OUTPUT_STEM: &str = "final_dubbed_video";

/// Outputs smaller than this are treated as a failed mux
const MIN_OUTPUT_BYTES: u64 = 1024;

pub struct OverlayStage {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl OverlayStage {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }
}

#[async_trait]
impl StageProcessor for OverlayStage {
    fn stage(&self) -> Stage {
        Stage::Overlay
    }

    async fn process(&self, input: &Artifact, ctx: &JobContext) -> Result<Artifact, Failure> {
        let (media, audio) = match input {
            Artifact::DubbedAudio { media, audio } => (media, audio),
            other => return Err(unexpected_input(Stage::Overlay, other)),
        };
        for path in [&media.video_path, &audio.audio_path] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(Failure::InvalidInput(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
        }

        let output_path = ctx
            .work_dir
            .join(format!("{}.{}", OUTPUT_STEM, ctx.params.options.format.extension()));
        let args = mux_args(
            &media.video_path,
            &audio.audio_path,
            &output_path,
            &ctx.params.options,
        );
        command::run(&self.ffmpeg, &args).await?;

        let file_size_bytes = tokio::fs::metadata(&output_path)
            .await
            .map(|m| m.len())
            .map_err(|e| Failure::Other(format!("output video missing: {}", e)))?;
        if file_size_bytes < MIN_OUTPUT_BYTES {
            return Err(Failure::Other(format!(
                "output video is only {} bytes",
                file_size_bytes
            )));
        }

        let duration_seconds = command::probe_duration(&self.ffprobe, &output_path)
            .await
            .or(media.duration_seconds);

        info!(
            session_id = %ctx.session_id,
            path = %output_path.display(),
            file_size_bytes,
            "Dubbed video written"
        );

        Ok(Artifact::FinalVideo(FinalVideo {
            video_path: output_path,
            file_size_bytes,
            duration_seconds,
        }))
    }
}

/// ffmpeg arguments for the mux
///
/// The video stream is copied when the source container already matches the
/// requested one (mkv accepts anything), and re-encoded otherwise. With
/// `preserve_original`, the source audio is kept as a second track.
fn mux_args(video: &Path, audio: &Path, output: &Path, options: &JobOptions) -> Vec<String> {
    let source_ext = video
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let video_codec = match options.format {
        OutputFormat::Mkv => "copy",
        format if format.extension() == source_ext => "copy",
        OutputFormat::Mp4 => "libx264",
        OutputFormat::Webm => "libvpx-vp9",
    };

    let mut args: Vec<String> = vec![
        "-y".into(),
        "-i".into(),
        video.to_string_lossy().into_owned(),
        "-i".into(),
        audio.to_string_lossy().into_owned(),
        "-c:v".into(),
        video_codec.into(),
        "-c:a".into(),
        options.format.audio_codec().into(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
    ];
    if options.preserve_original {
        args.extend(["-map".into(), "0:a:0?".into()]);
        args.extend(["-metadata:s:a:0".into(), "title=Dubbed".into()]);
        args.extend(["-metadata:s:a:1".into(), "title=Original".into()]);
    }
    args.extend([
        "-shortest".into(),
        "-avoid_negative_ts".into(),
        "make_zero".into(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}
