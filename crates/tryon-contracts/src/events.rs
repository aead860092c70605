use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Image,
    NoImage,
    TransportError,
}

/// One line of `events.jsonl`. The variant name becomes the `type` field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TryOnEvent {
    TryonStarted {
        product_id: String,
        photo_mime: String,
        photo_bytes: usize,
    },
    RequestBuilt {
        fingerprint: String,
        parts: usize,
        has_product_image: bool,
    },
    AttemptStarted {
        attempt: u8,
        model: String,
    },
    AttemptFinished {
        attempt: u8,
        outcome: AttemptOutcome,
        latency_ms: u64,
    },
    TryonFinished {
        attempts: u8,
        mime_type: String,
        bytes: usize,
        elapsed_ms: u64,
    },
    TryonFailed {
        kind: ErrorKind,
        message: String,
        elapsed_ms: u64,
    },
    AnalysisFinished {
        chars: usize,
        elapsed_ms: u64,
    },
}

/// Append-only writer for `events.jsonl`.
///
/// - every line gets `session_id` and `ts` unless the event already set them
/// - one compact JSON object per line
/// - clones share the file lock, so concurrent emits never interleave
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event: &TryOnEvent) -> anyhow::Result<Value> {
        let body = match serde_json::to_value(event)? {
            Value::Object(map) => map,
            other => anyhow::bail!("event did not serialize to an object: {other}"),
        };
        let mut line_obj = Map::new();
        line_obj.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        line_obj.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in body {
            line_obj.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&line_obj)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(line_obj))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let emitted = writer.emit(&TryOnEvent::AttemptStarted {
            attempt: 1,
            model: "stub".to_string(),
        })?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("attempt_started".to_string()));
        assert_eq!(parsed["session_id"], Value::String("session-123".to_string()));
        assert_eq!(parsed["attempt"], Value::from(1));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn error_kinds_and_outcomes_are_snake_case() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "s");

        let failed = writer.emit(&TryOnEvent::TryonFailed {
            kind: ErrorKind::NoImageGenerated,
            message: "no image".to_string(),
            elapsed_ms: 5,
        })?;
        let attempt = writer.emit(&TryOnEvent::AttemptFinished {
            attempt: 2,
            outcome: AttemptOutcome::NoImage,
            latency_ms: 1,
        })?;

        assert_eq!(failed["type"], "tryon_failed");
        assert_eq!(failed["kind"], "no_image_generated");
        assert_eq!(attempt["outcome"], "no_image");
        Ok(())
    }

    #[test]
    fn emit_appends_lines_and_creates_parent_dirs() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        writer.emit(&TryOnEvent::AnalysisFinished {
            chars: 10,
            elapsed_ms: 3,
        })?;
        writer.clone().emit(&TryOnEvent::AnalysisFinished {
            chars: 20,
            elapsed_ms: 4,
        })?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(second["chars"], Value::from(20));
        Ok(())
    }
}
