use std::time::Instant;

use tracing::warn;
use tryon_contracts::{EventWriter, TryOnEvent};

pub mod builder;
pub mod client;
pub mod dryrun;
pub mod gemini;
pub mod model;
pub mod output;
pub mod prompts;
pub mod service;
pub mod source;
#[cfg(test)]
pub(crate) mod test_server;

pub use builder::{
    analysis_request, validate_photo, RequestBuilder, SubjectPhoto, MAX_PHOTO_BYTES,
};
pub use client::{GeneratedImage, GenerationClient};
pub use dryrun::DryrunModel;
pub use gemini::{GeminiConfig, GeminiModel};
pub use model::{GenerativeModel, ModelResponse, ResponsePart};
pub use output::{deliver, Delivered, OutputMode};
pub use service::{analyze_photo, session_event_writer, TryOnService};
pub use source::{LocalFirstImageSource, ProductImageSource};

/// Event write failures are logged, never surfaced: the try-on result stands.
pub(crate) fn emit_event(events: Option<&EventWriter>, event: &TryOnEvent) {
    let Some(events) = events else {
        return;
    };
    if let Err(err) = events.emit(event) {
        warn!(path = %events.path().display(), error = %err, "failed to write event");
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// `outer: inner` rendering of an error chain on one line, clipped for logs.
pub(crate) fn error_summary(err: &anyhow::Error, max_chars: usize) -> String {
    clip(&format!("{err:#}"), max_chars)
}

pub(crate) fn clip(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &value[..cut]),
        None => value.to_string(),
    }
}
