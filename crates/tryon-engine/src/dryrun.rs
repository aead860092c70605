use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use tryon_contracts::ImagePayload;

use crate::model::{GenerativeModel, ModelCall, ModelResponse, OutputModality, ResponsePart};

const DRYRUN_SIZE: u32 = 64;

/// Offline model: answers with a solid-colour PNG keyed on the instruction.
///
/// `text_only_calls` makes the first N image calls answer with text, which
/// drives the retry path without a network.
#[derive(Debug, Default)]
pub struct DryrunModel {
    text_only_calls: usize,
    calls: AtomicUsize,
}

impl DryrunModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text_only_calls(mut self, count: usize) -> Self {
        self.text_only_calls = count;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GenerativeModel for DryrunModel {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn model_id(&self) -> &str {
        "dryrun-image-1"
    }

    fn generate_content(&self, call: &ModelCall<'_>) -> Result<ModelResponse> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let instruction = call
            .parts
            .iter()
            .find_map(|part| part.as_text())
            .unwrap_or_default();

        if call.config.output == OutputModality::TextOnly {
            return Ok(ModelResponse::single(vec![ResponsePart::Text(format!(
                "Dry-run description ({} input parts).",
                call.parts.len()
            ))]));
        }
        if index < self.text_only_calls {
            return Ok(ModelResponse::single(vec![ResponsePart::Text(
                "Dry-run: answering with text instead of an image.".to_string(),
            )]));
        }

        let bytes = render_swatch(instruction)?;
        Ok(ModelResponse::single(vec![ResponsePart::Image(
            ImagePayload::new("image/png", bytes),
        )]))
    }
}

fn render_swatch(instruction: &str) -> Result<Vec<u8>> {
    let (r, g, b) = color_from_instruction(instruction);
    let mut image = RgbImage::new(DRYRUN_SIZE, DRYRUN_SIZE);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut cursor, ImageFormat::Png)
        .context("failed to encode dry-run image")?;
    Ok(cursor.into_inner())
}

fn color_from_instruction(instruction: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(instruction.as_bytes());
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use tryon_contracts::Part;

    use super::*;
    use crate::client::{ANALYSIS_ATTEMPT, PRIMARY_ATTEMPT};

    #[test]
    fn renders_png_keyed_on_instruction() -> anyhow::Result<()> {
        let model = DryrunModel::new();
        let parts = vec![Part::text("dress them")];
        let call = ModelCall {
            parts: &parts,
            config: PRIMARY_ATTEMPT,
        };
        let first = model.generate_content(&call)?;
        let second = model.generate_content(&call)?;

        let image = first.first_image().cloned().unwrap();
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image::guess_format(image.bytes())?, ImageFormat::Png);
        assert_eq!(first, second);
        assert_eq!(model.calls(), 2);
        Ok(())
    }

    #[test]
    fn text_only_calls_come_first() -> anyhow::Result<()> {
        let model = DryrunModel::new().with_text_only_calls(1);
        let parts = vec![Part::text("dress them")];
        let call = ModelCall {
            parts: &parts,
            config: PRIMARY_ATTEMPT,
        };
        assert!(model.generate_content(&call)?.first_image().is_none());
        assert!(model.generate_content(&call)?.first_image().is_some());
        Ok(())
    }

    #[test]
    fn analysis_calls_answer_with_text() -> anyhow::Result<()> {
        let model = DryrunModel::new();
        let parts = vec![Part::text("describe")];
        let call = ModelCall {
            parts: &parts,
            config: ANALYSIS_ATTEMPT,
        };
        let response = model.generate_content(&call)?;
        assert!(response.first_text().is_some());
        assert!(response.first_image().is_none());
        Ok(())
    }
}
