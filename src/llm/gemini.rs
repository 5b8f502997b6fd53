use crate::config::LlmConfig;
use crate::http::browser_headers;
use crate::listing::ListingData;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::{Client, header::CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;
const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Model API key is not configured")]
    MissingApiKey,
    #[error("Model request failed: {0}")]
    Http(String),
    #[error("Model API error: HTTP {0}")]
    Status(u16),
    #[error("Model returned an unreadable response: {0}")]
    InvalidResponse(String),
    #[error("No analysis returned from the model")]
    NoAnalysis,
}

/// An image attached inline to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(http: Client, config: LlmConfig) -> Self {
        Self { http, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Sends `prompt` for `listing`, attaching its cover photo when one can be
    /// downloaded. Returns the model's raw reply text.
    pub async fn analyze(&self, prompt: &str, listing: &ListingData) -> Result<String, LlmError> {
        if self.config.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let image = match listing.cover_image() {
            Some(url) => self.fetch_inline_image(url).await,
            None => None,
        };
        self.generate(prompt, image).await
    }

    pub async fn generate(
        &self,
        prompt: &str,
        image: Option<InlineImage>,
    ) -> Result<String, LlmError> {
        let api_key = self.config.api_key.trim();
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let mut parts = vec![Part::Text {
            text: prompt.to_string(),
        }];
        let has_image = image.is_some();
        if let Some(image) = image {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type,
                    data: image.data,
                },
            });
        }

        let body = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let endpoint = format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        );
        debug!(target = "dealscope.llm", model = %self.config.model, has_image, "model_request");

        let response = self
            .http
            .post(endpoint)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Http(err.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(target = "dealscope.llm", status = status.as_u16(), "model_http_error");
            return Err(LlmError::Status(status.as_u16()));
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.without_url().to_string()))?;

        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::NoAnalysis)?;

        Ok(text)
    }

    /// Best effort: any failure is logged and the analysis continues text-only.
    async fn fetch_inline_image(&self, url: &str) -> Option<InlineImage> {
        match self.download_image(url).await {
            Ok(image) => Some(image),
            Err(reason) => {
                warn!(target = "dealscope.llm", %url, %reason, "cover_image_skipped");
                None
            }
        }
    }

    async fn download_image(&self, url: &str) -> Result<InlineImage, String> {
        let response = self
            .http
            .get(url)
            .headers(browser_headers())
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
        if !mime_type.starts_with("image/") {
            return Err(format!("unexpected content type {mime_type}"));
        }

        if let Some(declared) = response.content_length()
            && declared > MAX_IMAGE_BYTES as u64
        {
            return Err(format!("image too large ({declared} bytes declared)"));
        }

        let bytes = response.bytes().await.map_err(|err| err.to_string())?;
        if bytes.is_empty() {
            return Err("empty image body".into());
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(format!("image too large ({} bytes)", bytes.len()));
        }

        Ok(InlineImage {
            mime_type,
            data: BASE64.encode(&bytes),
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}
