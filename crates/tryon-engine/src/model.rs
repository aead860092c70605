use std::sync::Arc;

use anyhow::Result;
use tryon_contracts::{ImagePayload, Part};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputModality {
    TextAndImage,
    TextOnly,
}

/// Sampling parameters for one model call. These are fixed per attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: Option<u32>,
    pub output: OutputModality,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelCall<'a> {
    pub parts: &'a [Part],
    pub config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    Text(String),
    Image(ImagePayload),
}

/// Candidates in the order the service returned them, each an ordered list of parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResponse {
    pub candidates: Vec<Vec<ResponsePart>>,
}

impl ModelResponse {
    pub fn single(parts: Vec<ResponsePart>) -> Self {
        Self {
            candidates: vec![parts],
        }
    }

    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates.iter().flatten()
    }

    /// First non-empty image part across all candidates.
    pub fn first_image(&self) -> Option<&ImagePayload> {
        self.parts().find_map(|part| match part {
            ResponsePart::Image(payload) if !payload.is_empty() => Some(payload),
            _ => None,
        })
    }

    pub fn first_text(&self) -> Option<&str> {
        self.parts().find_map(|part| match part {
            ResponsePart::Text(text) if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Seam over the external image-generation service.
///
/// An `Err` means the round trip itself failed (network, status, or an
/// unreadable body). A readable response without images is `Ok`.
pub trait GenerativeModel: Send + Sync {
    fn name(&self) -> &str;
    fn model_id(&self) -> &str;
    fn generate_content(&self, call: &ModelCall<'_>) -> Result<ModelResponse>;
}

impl<M: GenerativeModel + ?Sized> GenerativeModel for Arc<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn generate_content(&self, call: &ModelCall<'_>) -> Result<ModelResponse> {
        (**self).generate_content(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_image_scans_candidates_in_order_and_skips_empty_payloads() {
        let response = ModelResponse {
            candidates: vec![
                vec![
                    ResponsePart::Text("thinking".to_string()),
                    ResponsePart::Image(ImagePayload::new("image/png", Vec::new())),
                ],
                vec![
                    ResponsePart::Image(ImagePayload::new("image/png", vec![1])),
                    ResponsePart::Image(ImagePayload::new("image/png", vec![2])),
                ],
            ],
        };
        assert_eq!(response.first_image().map(ImagePayload::bytes), Some([1u8].as_slice()));
        assert_eq!(response.first_text(), Some("thinking"));
    }

    #[test]
    fn empty_response_has_neither_image_nor_text() {
        let response = ModelResponse::single(vec![ResponsePart::Text("  ".to_string())]);
        assert!(response.first_image().is_none());
        assert!(response.first_text().is_none());
    }
}
