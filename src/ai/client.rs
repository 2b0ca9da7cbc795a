use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// One piece of a prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    InlineData { mime_type: String, data: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text(text.into())
    }

    /// Base64-encodes `bytes` for inline transport.
    pub fn inline(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        ContentPart::InlineData {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }
}

/// The single outbound operation the apps need from a generative model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        parts: Vec<ContentPart>,
    ) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineBlob,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineBlob {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl From<ContentPart> for RequestPart {
    fn from(part: ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => RequestPart::Text { text },
            ContentPart::InlineData { mime_type, data } => RequestPart::Inline {
                inline_data: InlineBlob { mime_type, data },
            },
        }
    }
}

/// Gemini `generateContent` over HTTPS.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        parts: Vec<ContentPart>,
    ) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: parts.into_iter().map(RequestPart::from).collect(),
            }],
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("API request failed: {e}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response: {e}"))?;
        if !status.is_success() {
            return Err(anyhow!("API error {status}: {body}"));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("failed to decode generateContent response")?;
        Ok(response_text(parsed))
    }
}

/// Concatenates the text parts of the first candidate; empty when there are none.
fn response_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_text_and_inline_parts() {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![
                    ContentPart::inline("image/png", b"hi").into(),
                    ContentPart::text("describe").into(),
                ],
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"contents": [{"parts": [
                {"inlineData": {"mimeType": "image/png", "data": "aGk="}},
                {"text": "describe"}
            ]}]})
        );
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "Hello "}, {"text": "there"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(response_text(response), "Hello there");

        let empty: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(response_text(empty), "");
    }
}
