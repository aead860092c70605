use serde::{Deserialize, Serialize};

use crate::request::RequestShapeError;

/// Coarse failure classes surfaced to callers and written to events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ProductNotFound,
    ProductUnavailable,
    TransportError,
    NoImageGenerated,
    NoOutput,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ProductNotFound => "product_not_found",
            ErrorKind::ProductUnavailable => "product_unavailable",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::NoImageGenerated => "no_image_generated",
            ErrorKind::NoOutput => "no_output",
        }
    }

    /// Whether the caller can fix the failure by changing what they sent.
    pub fn is_user_correctable(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidInput | ErrorKind::ProductNotFound | ErrorKind::ProductUnavailable
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The specific input rule a request violated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputRule {
    #[error("photo is empty")]
    EmptyPhoto,
    #[error("photo is {size} bytes, the limit is {limit} bytes")]
    PhotoTooLarge { size: usize, limit: usize },
    #[error("photo type `{0}` is not accepted, use JPG, PNG or WebP")]
    UnsupportedType(String),
    #[error("product id is required")]
    MissingProductId,
    #[error(transparent)]
    Shape(#[from] RequestShapeError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TryOnError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputRule),
    #[error("product `{0}` not found")]
    ProductNotFound(String),
    #[error("product `{0}` is not available")]
    ProductUnavailable(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no image generated after {attempts} attempt(s)")]
    NoImageGenerated {
        attempts: u8,
        /// Text the model answered with instead, if any.
        model_text: Option<String>,
    },
    #[error("model returned no description")]
    NoDescription,
}

impl TryOnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TryOnError::InvalidInput(_) => ErrorKind::InvalidInput,
            TryOnError::ProductNotFound(_) => ErrorKind::ProductNotFound,
            TryOnError::ProductUnavailable(_) => ErrorKind::ProductUnavailable,
            TryOnError::Transport(_) => ErrorKind::TransportError,
            TryOnError::NoImageGenerated { .. } => ErrorKind::NoImageGenerated,
            TryOnError::NoDescription => ErrorKind::NoOutput,
        }
    }
}

impl From<RequestShapeError> for TryOnError {
    fn from(err: RequestShapeError) -> Self {
        TryOnError::InvalidInput(InputRule::Shape(err))
    }
}
