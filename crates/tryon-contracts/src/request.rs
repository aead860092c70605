use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::payload::ImagePayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    /// The end user's photo.
    Subject,
    /// The catalog photo of the garment.
    Product,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Image { role: ImageRole, payload: ImagePayload },
}

impl Part {
    pub fn text(value: impl Into<String>) -> Self {
        Part::Text(value.into())
    }

    pub fn image(role: ImageRole, payload: ImagePayload) -> Self {
        Part::Image { role, payload }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text.as_str()),
            Part::Image { .. } => None,
        }
    }

    pub fn as_image(&self) -> Option<(ImageRole, &ImagePayload)> {
        match self {
            Part::Image { role, payload } => Some((*role, payload)),
            Part::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestShapeError {
    #[error("request needs exactly one subject photo, found {0}")]
    SubjectCount(usize),
    #[error("request allows at most one product photo, found {0}")]
    ProductCount(usize),
    #[error("request needs at least one text instruction")]
    MissingText,
}

/// Ordered parts sent to the generative model.
///
/// Construction checks the shape: exactly one subject photo, at most one
/// product photo, and at least one non-blank text part. Order is kept as
/// given; by convention the instruction comes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    parts: Vec<Part>,
}

impl GenerationRequest {
    pub fn new(parts: Vec<Part>) -> Result<Self, RequestShapeError> {
        let mut subjects = 0;
        let mut products = 0;
        let mut texts = 0;
        for part in &parts {
            match part {
                Part::Text(text) if !text.trim().is_empty() => texts += 1,
                Part::Text(_) => {}
                Part::Image {
                    role: ImageRole::Subject,
                    ..
                } => subjects += 1,
                Part::Image {
                    role: ImageRole::Product,
                    ..
                } => products += 1,
            }
        }
        if subjects != 1 {
            return Err(RequestShapeError::SubjectCount(subjects));
        }
        if products > 1 {
            return Err(RequestShapeError::ProductCount(products));
        }
        if texts == 0 {
            return Err(RequestShapeError::MissingText);
        }
        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// The leading instruction, or the first text part when none leads.
    pub fn instruction(&self) -> &str {
        self.parts
            .iter()
            .find_map(Part::as_text)
            .unwrap_or_default()
    }

    pub fn subject(&self) -> Option<&ImagePayload> {
        self.image(ImageRole::Subject)
    }

    pub fn product(&self) -> Option<&ImagePayload> {
        self.image(ImageRole::Product)
    }

    pub fn has_product_image(&self) -> bool {
        self.product().is_some()
    }

    /// Same images, leading instruction swapped for `instruction`.
    ///
    /// Trailing text parts (a closing note) are kept in place.
    pub fn reformulated(&self, instruction: &str) -> Self {
        let mut parts = Vec::with_capacity(self.parts.len() + 1);
        parts.push(Part::text(instruction));
        let skip = usize::from(matches!(self.parts.first(), Some(Part::Text(_))));
        parts.extend(self.parts.iter().skip(skip).cloned());
        Self { parts }
    }

    /// Hex SHA-256 over the ordered parts; equal requests share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => {
                    hasher.update(b"text\0");
                    hasher.update((text.len() as u64).to_be_bytes());
                    hasher.update(text.as_bytes());
                }
                Part::Image { role, payload } => {
                    hasher.update(match role {
                        ImageRole::Subject => b"subject\0".as_slice(),
                        ImageRole::Product => b"product\0".as_slice(),
                    });
                    hasher.update(payload.mime_type().as_bytes());
                    hasher.update(b"\0");
                    hasher.update((payload.len() as u64).to_be_bytes());
                    hasher.update(payload.bytes());
                }
            }
        }
        hex::encode(hasher.finalize())
    }

    fn image(&self, wanted: ImageRole) -> Option<&ImagePayload> {
        self.parts.iter().find_map(|part| match part.as_image() {
            Some((role, payload)) if role == wanted => Some(payload),
            _ => None,
        })
    }
}
