use std::time::Instant;

use tracing::{info, warn};
use tryon_contracts::{
    AttemptOutcome, EventWriter, GenerationRequest, ImagePayload, TryOnError, TryOnEvent,
};

use crate::model::{GenerationConfig, GenerativeModel, ModelCall, OutputModality};
use crate::prompts::STRICT_RETRY_INSTRUCTION;
use crate::{clip, elapsed_ms, emit_event, error_summary};

pub const PRIMARY_ATTEMPT: GenerationConfig = GenerationConfig {
    temperature: 0.4,
    top_k: 32,
    top_p: 1.0,
    max_output_tokens: Some(4096),
    output: OutputModality::TextAndImage,
};

pub const RETRY_ATTEMPT: GenerationConfig = GenerationConfig {
    temperature: 0.2,
    top_k: 16,
    top_p: 0.8,
    max_output_tokens: Some(4096),
    output: OutputModality::TextAndImage,
};

pub const ANALYSIS_ATTEMPT: GenerationConfig = GenerationConfig {
    temperature: 0.4,
    top_k: 32,
    top_p: 1.0,
    max_output_tokens: Some(1024),
    output: OutputModality::TextOnly,
};

const MODEL_TEXT_MAX_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub image: ImagePayload,
    /// 1 when the first call produced the image, 2 when the retry did.
    pub attempts: u8,
}

enum AttemptResult {
    Image(ImagePayload),
    NoImage { model_text: Option<String> },
}

/// Sends requests to the model and pulls out the first image.
///
/// A valid response without an image gets exactly one more call with a
/// stricter instruction. Transport failures end the call immediately.
pub struct GenerationClient {
    model: Box<dyn GenerativeModel>,
    events: Option<EventWriter>,
}

impl GenerationClient {
    pub fn new(model: Box<dyn GenerativeModel>) -> Self {
        Self {
            model,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, TryOnError> {
        if let AttemptResult::Image(image) = self.attempt(1, request, PRIMARY_ATTEMPT)? {
            return Ok(GeneratedImage { image, attempts: 1 });
        }

        warn!(
            model = self.model_id(),
            "no image in first response; retrying with stricter instruction"
        );
        let retry = request.reformulated(STRICT_RETRY_INSTRUCTION);
        match self.attempt(2, &retry, RETRY_ATTEMPT)? {
            AttemptResult::Image(image) => {
                info!("image obtained on second attempt");
                Ok(GeneratedImage { image, attempts: 2 })
            }
            AttemptResult::NoImage { model_text } => Err(TryOnError::NoImageGenerated {
                attempts: 2,
                model_text,
            }),
        }
    }

    /// Analysis-only path: one call, first text part wins.
    pub fn describe(&self, request: &GenerationRequest) -> Result<String, TryOnError> {
        let call = ModelCall {
            parts: request.parts(),
            config: ANALYSIS_ATTEMPT,
        };
        let response = self
            .model
            .generate_content(&call)
            .map_err(|err| TryOnError::Transport(error_summary(&err, 512)))?;
        response
            .first_text()
            .map(|text| text.trim().to_string())
            .ok_or(TryOnError::NoDescription)
    }

    fn attempt(
        &self,
        attempt: u8,
        request: &GenerationRequest,
        config: GenerationConfig,
    ) -> Result<AttemptResult, TryOnError> {
        emit_event(
            self.events.as_ref(),
            &TryOnEvent::AttemptStarted {
                attempt,
                model: self.model_id().to_string(),
            },
        );
        let started = Instant::now();
        let call = ModelCall {
            parts: request.parts(),
            config,
        };
        let outcome = self.model.generate_content(&call);
        let latency_ms = elapsed_ms(started);

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                let message = error_summary(&err, 512);
                warn!(attempt, error = %message, "model call failed");
                emit_event(
                    self.events.as_ref(),
                    &TryOnEvent::AttemptFinished {
                        attempt,
                        outcome: AttemptOutcome::TransportError,
                        latency_ms,
                    },
                );
                return Err(TryOnError::Transport(message));
            }
        };

        let result = match response.first_image() {
            Some(image) => AttemptResult::Image(image.clone()),
            None => AttemptResult::NoImage {
                model_text: response
                    .first_text()
                    .map(|text| clip(text.trim(), MODEL_TEXT_MAX_CHARS)),
            },
        };
        let outcome = match &result {
            AttemptResult::Image(image) => {
                info!(
                    attempt,
                    latency_ms,
                    mime = image.mime_type(),
                    bytes = image.len(),
                    "model returned an image"
                );
                AttemptOutcome::Image
            }
            AttemptResult::NoImage { model_text } => {
                info!(
                    attempt,
                    latency_ms,
                    model_text = model_text.as_deref().unwrap_or(""),
                    "model returned no image"
                );
                AttemptOutcome::NoImage
            }
        };
        emit_event(
            self.events.as_ref(),
            &TryOnEvent::AttemptFinished {
                attempt,
                outcome,
                latency_ms,
            },
        );
        Ok(result)
    }
}
