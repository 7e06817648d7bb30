//! Synthesize stage: ElevenLabs text-to-speech

use async_trait::async_trait;
use dub_common::{Failure, Stage};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use super::http::{check_status, send_failure};
use super::{require_key, unexpected_input, JobContext, StageProcessor};
use crate::models::{Artifact, SynthesizedAudio};

const MODEL_ID: &str = "eleven_multilingual_v2";
const OUTPUT_FORMAT: &str = "mp3_44100_128";
const OUTPUT_FILE: &str = "dubbed_audio.mp3";

/// Rachel
const VOICE_RACHEL: &str = "21m00Tcm4TlvDq8ikWAM";
/// Sarah
const VOICE_SARAH: &str = "EXAVITQu4vr4xnSDxMaL";
/// Laura
const VOICE_LAURA: &str = "FGY2WhTYpPnrIDTdsKH5";

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

pub struct SynthesizeStage {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SynthesizeStage {
    pub fn new(client: Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl StageProcessor for SynthesizeStage {
    fn stage(&self) -> Stage {
        Stage::Synthesize
    }

    async fn process(&self, input: &Artifact, ctx: &JobContext) -> Result<Artifact, Failure> {
        let (media, translation) = match input {
            Artifact::Translation { media, translation } => (media, translation),
            other => return Err(unexpected_input(Stage::Synthesize, other)),
        };
        if translation.text.trim().is_empty() {
            return Err(Failure::InvalidInput("nothing to synthesize".to_string()));
        }
        let api_key = require_key(&self.api_key, "ElevenLabs")?;

        let voice_id = voice_for_language(&translation.target_language).unwrap_or_else(|| {
            warn!(
                language = %translation.target_language,
                "No voice mapped for language, using default"
            );
            VOICE_RACHEL
        });

        let response = self
            .client
            .post(format!(
                "{}/v1/text-to-speech/{}",
                self.base_url.trim_end_matches('/'),
                voice_id
            ))
            .query(&[("output_format", OUTPUT_FORMAT)])
            .header("xi-api-key", api_key)
            .json(&SpeechRequest {
                text: &translation.text,
                model_id: MODEL_ID,
            })
            .send()
            .await
            .map_err(send_failure)?;
        let audio = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(send_failure)?;
        if audio.is_empty() {
            return Err(Failure::Other("speech service returned no audio".to_string()));
        }

        let audio_path = ctx.work_dir.join(OUTPUT_FILE);
        tokio::fs::write(&audio_path, &audio)
            .await
            .map_err(|e| Failure::Other(format!("cannot write {}: {}", audio_path.display(), e)))?;

        info!(
            session_id = %ctx.session_id,
            voice_id,
            bytes = audio.len(),
            "Speech synthesized"
        );

        Ok(Artifact::DubbedAudio {
            media: media.clone(),
            audio: SynthesizedAudio {
                audio_path,
                voice_id: voice_id.to_string(),
                text_length: translation.text.chars().count(),
            },
        })
    }
}

/// Voice for a language name or ISO 639-1 code, `None` if unmapped
pub fn voice_for_language(language: &str) -> Option<&'static str> {
    let normalized = language.trim().to_lowercase();
    let name = match normalized.as_str() {
        "en" => "english",
        "es" => "spanish",
        "fr" => "french",
        "de" => "german",
        "it" => "italian",
        "pt" => "portuguese",
        "pl" => "polish",
        "tr" => "turkish",
        "ru" => "russian",
        "nl" => "dutch",
        "sv" => "swedish",
        "no" => "norwegian",
        "da" => "danish",
        "fi" => "finnish",
        "ja" => "japanese",
        "zh" => "chinese",
        "ko" => "korean",
        "hi" => "hindi",
        "ar" => "arabic",
        other => other,
    };

    match name {
        "english" | "spanish" | "italian" | "portuguese" => Some(VOICE_RACHEL),
        "french" | "turkish" | "dutch" | "japanese" | "chinese" | "korean" | "hindi"
        | "arabic" => Some(VOICE_SARAH),
        "german" | "polish" | "russian" | "swedish" | "norwegian" | "danish" | "finnish" => {
            Some(VOICE_LAURA)
        }
        _ => None,
    }
}
