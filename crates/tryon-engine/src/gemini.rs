use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tryon_contracts::{ImagePayload, Part};

use crate::model::{
    GenerationConfig, GenerativeModel, ModelCall, ModelResponse, OutputModality, ResponsePart,
};
use crate::clip;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Everything the Gemini transport needs, resolved once at startup.
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"));
        let Some(api_key) = api_key else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let mut config = Self::new(api_key);
        if let Some(base) = non_empty_env("GEMINI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

pub struct GeminiModel {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiModel {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("Gemini API key is empty");
        }
        if config.model.trim().is_empty() {
            bail!("Gemini model id is empty");
        }
        Ok(Self {
            config,
            http: HttpClient::new(),
        })
    }

    fn endpoint(&self) -> String {
        let trimmed = self.config.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!(
            "{}/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model_path
        )
    }
}

impl GenerativeModel for GeminiModel {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }

    fn generate_content(&self, call: &ModelCall<'_>) -> Result<ModelResponse> {
        let endpoint = self.endpoint();
        let payload = build_payload(call);
        debug!(%endpoint, parts = call.parts.len(), "posting Gemini generateContent");
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(self.config.request_timeout)
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let body = response_body_or_error("Gemini", response)?;
        parse_response(&body)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    contents: Vec<WireContent>,
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: WireInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    response_modalities: Vec<&'static str>,
}

impl From<GenerationConfig> for WireGenerationConfig {
    fn from(config: GenerationConfig) -> Self {
        let response_modalities = match config.output {
            OutputModality::TextAndImage => vec!["TEXT", "IMAGE"],
            OutputModality::TextOnly => vec!["TEXT"],
        };
        Self {
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
            max_output_tokens: config.max_output_tokens,
            response_modalities,
        }
    }
}

fn build_payload(call: &ModelCall<'_>) -> WireRequest {
    let parts = call
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => WirePart::Text { text: text.clone() },
            Part::Image { payload, .. } => WirePart::Inline {
                inline_data: WireInlineData {
                    mime_type: payload.mime_type().to_string(),
                    data: payload.to_base64(),
                },
            },
        })
        .collect();
    WireRequest {
        contents: vec![WireContent { role: "user", parts }],
        generation_config: call.config.into(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    prompt_feedback: Option<WirePromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireCandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Option<Vec<WireResponsePart>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "inline_data")]
    inline_data: Option<WireResponseInline>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponseInline {
    #[serde(default, alias = "mime_type")]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Decodes a `generateContent` body.
///
/// A body without any candidate carrying `content.parts` is malformed, not an
/// empty answer: prompt blocks and error envelopes end the call here.
fn parse_response(body: &str) -> Result<ModelResponse> {
    let wire: WireResponse =
        serde_json::from_str(body).context("Gemini returned invalid JSON payload")?;
    let block_reason = wire
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason);
    if let Some(reason) = block_reason.as_deref() {
        warn!(block_reason = reason, "Gemini blocked the prompt");
    }

    let mut candidates = Vec::with_capacity(wire.candidates.len());
    for candidate in wire.candidates {
        if let Some(reason) = candidate.finish_reason.as_deref() {
            debug!(finish_reason = reason, "Gemini candidate finished");
        }
        let Some(wire_parts) = candidate.content.and_then(|content| content.parts) else {
            continue;
        };
        let mut parts = Vec::with_capacity(wire_parts.len());
        for part in wire_parts {
            if let Some(inline) = part.inline_data {
                if inline.data.is_empty() {
                    continue;
                }
                let mime_type = inline
                    .mime_type
                    .filter(|value| !value.trim().is_empty())
                    .unwrap_or_else(|| "image/png".to_string());
                let payload = ImagePayload::from_base64(mime_type, &inline.data)
                    .context("Gemini image base64 decode failed")?;
                parts.push(ResponsePart::Image(payload));
            } else if let Some(text) = part.text {
                parts.push(ResponsePart::Text(text));
            }
        }
        candidates.push(parts);
    }
    if candidates.is_empty() {
        match block_reason {
            Some(reason) => bail!("Gemini response has no content (blocked: {reason})"),
            None => bail!("Gemini response has no candidate content"),
        }
    }
    Ok(ModelResponse { candidates })
}

fn response_body_or_error(provider: &str, response: HttpResponse) -> Result<String> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            clip(&body, 512)
        );
    }
    Ok(body)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
