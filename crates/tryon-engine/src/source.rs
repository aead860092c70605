use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use tryon_contracts::payload::mime_for_path;
use tryon_contracts::ImagePayload;

use crate::error_summary;

const REMOTE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Loads the bytes behind a product image reference.
pub trait ProductImageSource: Send + Sync {
    fn load(&self, reference: &str) -> Result<ImagePayload>;
}

/// Local public directory first, HTTP fetch as fallback.
///
/// References are catalog paths such as `/products/jacket-1.jpg` or full
/// `http(s)` URLs. Relative paths fall back to `remote_base` when set.
pub struct LocalFirstImageSource {
    public_dir: PathBuf,
    remote_base: Option<String>,
    http: HttpClient,
}

impl LocalFirstImageSource {
    pub fn new(public_dir: impl Into<PathBuf>) -> Self {
        Self {
            public_dir: public_dir.into(),
            remote_base: None,
            http: HttpClient::new(),
        }
    }

    pub fn with_remote_base(mut self, base: impl Into<String>) -> Self {
        let base = base.into().trim().trim_end_matches('/').to_string();
        self.remote_base = Some(base).filter(|value| !value.is_empty());
        self
    }

    fn load_local(&self, reference: &str) -> Result<ImagePayload> {
        let relative = Path::new(reference.trim_start_matches('/'));
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            bail!("product image path '{reference}' escapes the public directory");
        }
        let path = self.public_dir.join(relative);
        let bytes = fs::read(&path).with_context(|| format!("failed reading {}", path.display()))?;
        if bytes.is_empty() {
            bail!("{} is empty", path.display());
        }
        let mime = mime_for_path(&path).unwrap_or("image/jpeg");
        Ok(ImagePayload::new(mime, bytes))
    }

    fn remote_url(&self, reference: &str) -> Option<String> {
        if is_http_url(reference) {
            return Some(reference.to_string());
        }
        self.remote_base
            .as_ref()
            .map(|base| format!("{base}/{}", reference.trim_start_matches('/')))
    }

    fn fetch_remote(&self, url: &str) -> Result<ImagePayload> {
        let response = self
            .http
            .get(url)
            .timeout(REMOTE_FETCH_TIMEOUT)
            .send()
            .with_context(|| format!("product image fetch failed ({url})"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("product image fetch failed ({}): {url}", status.as_u16());
        }
        let header_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .with_context(|| format!("product image body read failed ({url})"))?
            .to_vec();
        if bytes.is_empty() {
            bail!("product image at {url} is empty");
        }
        let mime = resolve_remote_mime(header_mime.as_deref(), &bytes);
        Ok(ImagePayload::new(mime, bytes))
    }
}

impl ProductImageSource for LocalFirstImageSource {
    fn load(&self, reference: &str) -> Result<ImagePayload> {
        let reference = reference.trim();
        if reference.is_empty() {
            bail!("product image reference is empty");
        }
        if is_http_url(reference) {
            return self.fetch_remote(reference);
        }

        let local_err = match self.load_local(reference) {
            Ok(payload) => return Ok(payload),
            Err(err) => err,
        };
        let Some(url) = self.remote_url(reference) else {
            return Err(local_err);
        };
        debug!(
            reference,
            error = %error_summary(&local_err, 200),
            "local product image unavailable; trying remote"
        );
        self.fetch_remote(&url).with_context(|| {
            format!("local read also failed: {}", error_summary(&local_err, 200))
        })
    }
}

fn is_http_url(reference: &str) -> bool {
    let lowered = reference.to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

/// `Content-Type` when it names an image, else sniff the bytes, else PNG.
fn resolve_remote_mime(header: Option<&str>, bytes: &[u8]) -> String {
    let declared = header
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| value.starts_with("image/"));
    if let Some(declared) = declared {
        return declared;
    }
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "image/png".to_string())
}
