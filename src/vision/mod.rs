//! Alt-text generation for collected stickers.
//!
//! Captioning is a hard requirement of the collection workflow: alt-text is
//! an accessibility attribute, not optional metadata, so a captioner failure
//! fails the whole collection attempt.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use crate::error::{Result, StickerbookError};
use crate::matrix::is_image_mime_type;

const ALT_TEXT_PROMPT: &str = "Describe this sticker in one short sentence.
Aim for ~15 words, max 30 words unless the image contains text.
Focus on: main subject, emotion/action, distinctive shapes/colors, clothing/art style.
IMPORTANT: If there is any text visible in the image, include it verbatim (for accessibility).
Output ONLY the description - no markdown, no headers, no formatting.

Good examples:
\"Anime girl with cat ears and school uniform looking surprised\"
\"Two characters in spacesuits kissing against starry background\"
\"Bright pink octopus wearing top hat with text 'Nope' in bold letters\"";

/// Given raw image bytes, produce a short human-readable description.
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn describe(&self, data: &[u8], mime_type: &str) -> Result<String>;
}

/// [`Captioner`] backed by the Anthropic Messages API.
pub struct AnthropicVision {
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
    http: reqwest::Client,
}

impl AnthropicVision {
    pub fn new(api_key: &str, model: &str, max_tokens: u32) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
            base_url: "https://api.anthropic.com".to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Captioner for AnthropicVision {
    async fn describe(&self, data: &[u8], mime_type: &str) -> Result<String> {
        if data.is_empty() {
            return Err(StickerbookError::external(
                "alt-text generation",
                "image data is empty",
            ));
        }
        if !is_image_mime_type(mime_type) {
            return Err(StickerbookError::external(
                "alt-text generation",
                format!("invalid MIME type for image: {mime_type}"),
            ));
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {"type": "base64", "media_type": mime_type, "data": encoded},
                    },
                    {"type": "text", "text": ALT_TEXT_PROMPT},
                ],
            }],
        });

        let resp: Value = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| StickerbookError::external("alt-text generation", e))?
            .error_for_status()
            .map_err(|e| StickerbookError::external("alt-text generation", e))?
            .json()
            .await
            .map_err(|e| StickerbookError::external("alt-text generation", e))?;

        let text = resp["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b["type"].as_str() == Some("text"))
                    .and_then(|b| b["text"].as_str())
            })
            .ok_or_else(|| {
                StickerbookError::external("alt-text generation", "no text content in response")
            })?;

        Ok(text.to_string())
    }
}
