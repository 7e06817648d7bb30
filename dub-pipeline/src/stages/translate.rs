//! Translate stage: Anthropic Messages API

use async_trait::async_trait;
use dub_common::{Failure, Stage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::http::{check_status, send_failure};
use super::{require_key, unexpected_input, JobContext, StageProcessor};
use crate::models::{Artifact, Translation};

const MODEL: &str = "claude-3-haiku-20240307";
const MAX_TOKENS: u32 = 2000;
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

pub struct TranslateStage {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TranslateStage {
    pub fn new(client: Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl StageProcessor for TranslateStage {
    fn stage(&self) -> Stage {
        Stage::Translate
    }

    async fn process(&self, input: &Artifact, ctx: &JobContext) -> Result<Artifact, Failure> {
        let (media, transcript) = match input {
            Artifact::Transcript { media, transcript } => (media, transcript),
            other => return Err(unexpected_input(Stage::Translate, other)),
        };
        let target_language = &ctx.params.target_language;
        if transcript.text.trim().is_empty() {
            debug!(session_id = %ctx.session_id, "Empty transcript, nothing to translate");
            return Ok(Artifact::Translation {
                media: media.clone(),
                translation: Translation {
                    text: String::new(),
                    source_language: transcript.detected_language.clone(),
                    target_language: target_language.clone(),
                    original_text: String::new(),
                },
            });
        }
        let api_key = require_key(&self.api_key, "Anthropic")?;

        let request = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: translation_prompt(
                    &transcript.text,
                    &transcript.detected_language,
                    target_language,
                ),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(send_failure)?;
        let body: MessagesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(send_failure)?;

        let text = body
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect::<String>()
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(Failure::Other("translation response had no text".to_string()));
        }

        info!(
            session_id = %ctx.session_id,
            source_chars = transcript.text.len(),
            translated_chars = text.len(),
            "Translation complete"
        );

        Ok(Artifact::Translation {
            media: media.clone(),
            translation: Translation {
                text,
                source_language: transcript.detected_language.clone(),
                target_language: target_language.clone(),
                original_text: transcript.text.clone(),
            },
        })
    }
}

fn translation_prompt(text: &str, source_language: &str, target_language: &str) -> String {
    format!(
        "Translate this {} text to {}. Preserve the natural speaking style and conversational \
         tone. Keep the translation length similar to the original. Return only the translated \
         text with no additional commentary.\n\n{}",
        source_language, target_language, text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_names_both_languages_and_ends_with_text() {
        let prompt = translation_prompt("Hello there", "en", "spanish");
        assert!(prompt.starts_with("Translate this en text to spanish."));
        assert!(prompt.ends_with("\n\nHello there"));
    }

    #[test]
    fn test_response_parsing_skips_non_text_blocks() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"Hola"},{"type":"tool_use","id":"x"}]}"#,
        )
        .unwrap();
        let texts: Vec<_> = body
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text.as_str())
            .collect();
        assert_eq!(texts, vec!["Hola"]);
    }

    fn ctx() -> JobContext {
        JobContext {
            session_id: uuid::Uuid::new_v4(),
            params: crate::models::JobParams::from_request(
                &dub_common::api::SubmitRequest::new("https://youtu.be/x", "italian"),
            )
            .unwrap(),
            work_dir: std::env::temp_dir(),
        }
    }

    fn transcript(text: &str) -> Artifact {
        Artifact::Transcript {
            media: crate::models::MediaFiles {
                audio_path: "a.wav".into(),
                video_path: "v.mp4".into(),
                duration_seconds: None,
            },
            transcript: crate::models::Transcript {
                text: text.to_string(),
                detected_language: "en".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_empty_transcript_skips_service() {
        let stage = TranslateStage::new(Client::new(), "http://127.0.0.1:9".to_string(), None);
        let output = stage.process(&transcript("   "), &ctx()).await.unwrap();
        match output {
            Artifact::Translation { translation, .. } => {
                assert!(translation.text.is_empty());
                assert_eq!(translation.target_language, "italian");
            }
            other => panic!("unexpected artifact {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_failure() {
        let stage = TranslateStage::new(Client::new(), "http://127.0.0.1:9".to_string(), None);
        let result = stage.process(&transcript("hello"), &ctx()).await;
        assert!(matches!(result, Err(Failure::Auth(_))));
    }
}
