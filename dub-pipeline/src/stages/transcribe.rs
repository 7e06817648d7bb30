//! Transcribe stage: ElevenLabs speech-to-text with language detection

use async_trait::async_trait;
use dub_common::{Failure, Stage};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::http::{check_status, send_failure};
use super::{require_key, unexpected_input, JobContext, StageProcessor};
use crate::models::{Artifact, Transcript};

const MODEL_ID: &str = "scribe_v1";
const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Deserialize)]
struct SpeechToTextResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language_code: Option<String>,
}

pub struct TranscribeStage {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TranscribeStage {
    pub fn new(client: Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl StageProcessor for TranscribeStage {
    fn stage(&self) -> Stage {
        Stage::Transcribe
    }

    async fn process(&self, input: &Artifact, ctx: &JobContext) -> Result<Artifact, Failure> {
        let media = match input {
            Artifact::Media(media) => media.clone(),
            other => return Err(unexpected_input(Stage::Transcribe, other)),
        };
        let api_key = require_key(&self.api_key, "ElevenLabs")?;

        let audio = tokio::fs::read(&media.audio_path).await.map_err(|e| {
            Failure::InvalidInput(format!(
                "audio file {} unreadable: {}",
                media.audio_path.display(),
                e
            ))
        })?;
        let file_name = media
            .audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let form = Form::new()
            .text("model_id", MODEL_ID)
            .part("file", Part::bytes(audio).file_name(file_name));

        let response = self
            .client
            .post(format!("{}/v1/speech-to-text", self.base_url.trim_end_matches('/')))
            .header("xi-api-key", api_key)
            .multipart(form)
            .send()
            .await
            .map_err(send_failure)?;
        let body: SpeechToTextResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(send_failure)?;

        let text = body.text.trim().to_string();
        let detected_language = body
            .language_code
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        info!(
            session_id = %ctx.session_id,
            text_length = text.len(),
            language = %detected_language,
            "Transcription complete"
        );

        Ok(Artifact::Transcript {
            media,
            transcript: Transcript {
                text,
                detected_language,
            },
        })
    }
}
