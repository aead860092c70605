use std::path::Path;
use std::time::Instant;

use tracing::{error, info};
use tryon_contracts::{EventWriter, TryOnError, TryOnEvent};

use crate::builder::{analysis_request, RequestBuilder, SubjectPhoto};
use crate::client::{GeneratedImage, GenerationClient};
use crate::{elapsed_ms, emit_event};

/// New event writer with a fresh session id.
pub fn session_event_writer(path: &Path) -> EventWriter {
    EventWriter::new(path, uuid::Uuid::new_v4().to_string())
}

/// Describes the person in a photo. Needs only a client, no catalog.
pub fn analyze_photo(
    client: &GenerationClient,
    events: Option<&EventWriter>,
    photo: SubjectPhoto,
) -> Result<String, TryOnError> {
    let started = Instant::now();
    let result = analysis_request(photo).and_then(|request| client.describe(&request));
    let elapsed = elapsed_ms(started);
    match &result {
        Ok(text) => {
            let chars = text.chars().count();
            info!(chars, elapsed_ms = elapsed, "analysis finished");
            emit_event(
                events,
                &TryOnEvent::AnalysisFinished {
                    chars,
                    elapsed_ms: elapsed,
                },
            );
        }
        Err(err) => report_failure(events, err, elapsed),
    }
    result
}

fn report_failure(events: Option<&EventWriter>, err: &TryOnError, elapsed: u64) {
    error!(kind = %err.kind(), error = %err, elapsed_ms = elapsed, "request failed");
    emit_event(
        events,
        &TryOnEvent::TryonFailed {
            kind: err.kind(),
            message: err.to_string(),
            elapsed_ms: elapsed,
        },
    );
}

/// One try-on pipeline: build the request, generate, report.
///
/// Each call is independent; the service holds no per-request state.
pub struct TryOnService {
    builder: RequestBuilder,
    client: GenerationClient,
    events: Option<EventWriter>,
}

impl TryOnService {
    pub fn new(builder: RequestBuilder, client: GenerationClient) -> Self {
        Self {
            builder,
            client,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.client = self.client.with_events(events.clone());
        self.events = Some(events);
        self
    }

    pub fn try_on(
        &self,
        photo: SubjectPhoto,
        product_id: &str,
        note: Option<&str>,
    ) -> Result<GeneratedImage, TryOnError> {
        let started = Instant::now();
        info!(
            product_id,
            photo_mime = %photo.mime_type,
            photo_bytes = photo.bytes.len(),
            "starting try-on"
        );
        self.emit(&TryOnEvent::TryonStarted {
            product_id: product_id.to_string(),
            photo_mime: photo.mime_type.clone(),
            photo_bytes: photo.bytes.len(),
        });

        let result = self.run_try_on(photo, product_id, note);
        let elapsed = elapsed_ms(started);
        match &result {
            Ok(generated) => {
                info!(
                    attempts = generated.attempts,
                    elapsed_ms = elapsed,
                    "try-on finished"
                );
                self.emit(&TryOnEvent::TryonFinished {
                    attempts: generated.attempts,
                    mime_type: generated.image.mime_type().to_string(),
                    bytes: generated.image.len(),
                    elapsed_ms: elapsed,
                });
            }
            Err(err) => self.report_failure(err, elapsed),
        }
        result
    }

    pub fn analyze(&self, photo: SubjectPhoto) -> Result<String, TryOnError> {
        analyze_photo(&self.client, self.events.as_ref(), photo)
    }

    fn run_try_on(
        &self,
        photo: SubjectPhoto,
        product_id: &str,
        note: Option<&str>,
    ) -> Result<GeneratedImage, TryOnError> {
        let request = self.builder.build(photo, product_id, note)?;
        self.emit(&TryOnEvent::RequestBuilt {
            fingerprint: request.fingerprint(),
            parts: request.parts().len(),
            has_product_image: request.has_product_image(),
        });
        self.client.generate(&request)
    }

    fn report_failure(&self, err: &TryOnError, elapsed: u64) {
        report_failure(self.events.as_ref(), err, elapsed);
    }

    fn emit(&self, event: &TryOnEvent) {
        emit_event(self.events.as_ref(), event);
    }
}
