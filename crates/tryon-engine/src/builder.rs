use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, warn};
use tryon_contracts::payload::mime_for_path;
use tryon_contracts::{
    GenerationRequest, ImagePayload, ImageRole, InputRule, Part, ProductCatalog, TryOnError,
};

use crate::error_summary;
use crate::prompts::{closing_note, ANALYSIS_INSTRUCTION, TRY_ON_INSTRUCTION};
use crate::source::ProductImageSource;

pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;
pub const ACCEPTED_PHOTO_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// The user's upload as received: declared MIME type plus raw bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SubjectPhoto {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SubjectPhoto {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Reads a photo from disk, declaring its type from the file extension.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let mime = mime_for_path(path).unwrap_or("application/octet-stream");
        Ok(Self::new(mime, bytes))
    }
}

impl std::fmt::Debug for SubjectPhoto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectPhoto")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Checks size bounds and the type allow-list; returns the canonical MIME type.
pub fn validate_photo(photo: &SubjectPhoto) -> Result<String, InputRule> {
    if photo.bytes.is_empty() {
        return Err(InputRule::EmptyPhoto);
    }
    if photo.bytes.len() > MAX_PHOTO_BYTES {
        return Err(InputRule::PhotoTooLarge {
            size: photo.bytes.len(),
            limit: MAX_PHOTO_BYTES,
        });
    }
    let declared = photo
        .mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !ACCEPTED_PHOTO_TYPES.contains(&declared.as_str()) {
        return Err(InputRule::UnsupportedType(photo.mime_type.clone()));
    }
    if declared == "image/jpg" {
        return Ok("image/jpeg".to_string());
    }
    Ok(declared)
}

/// Describe-the-person request: same photo rules, no catalog involved.
pub fn analysis_request(photo: SubjectPhoto) -> Result<GenerationRequest, TryOnError> {
    let mime = validate_photo(&photo)?;
    Ok(GenerationRequest::new(vec![
        Part::text(ANALYSIS_INSTRUCTION),
        Part::image(ImageRole::Subject, ImagePayload::new(mime, photo.bytes)),
    ])?)
}

/// Turns an upload and a product id into a well-formed [`GenerationRequest`].
pub struct RequestBuilder {
    catalog: Box<dyn ProductCatalog>,
    images: Box<dyn ProductImageSource>,
}

impl RequestBuilder {
    pub fn new(catalog: Box<dyn ProductCatalog>, images: Box<dyn ProductImageSource>) -> Self {
        Self { catalog, images }
    }

    /// Instruction, subject photo, product photo when it loads, then the note.
    ///
    /// A product image that cannot be loaded is not an error: the request
    /// goes out with the subject photo alone.
    pub fn build(
        &self,
        photo: SubjectPhoto,
        product_id: &str,
        note: Option<&str>,
    ) -> Result<GenerationRequest, TryOnError> {
        let mime = validate_photo(&photo)?;
        let product_id = product_id.trim();
        if product_id.is_empty() {
            return Err(InputRule::MissingProductId.into());
        }
        let product = self
            .catalog
            .product_by_id(product_id)
            .ok_or_else(|| TryOnError::ProductNotFound(product_id.to_string()))?;
        if !product.in_stock {
            return Err(TryOnError::ProductUnavailable(product_id.to_string()));
        }

        let mut parts = vec![
            Part::text(TRY_ON_INSTRUCTION),
            Part::image(ImageRole::Subject, ImagePayload::new(mime, photo.bytes)),
        ];
        match self.load_product_image(product.primary_image()) {
            Some(payload) => {
                debug!(
                    product_id,
                    mime = payload.mime_type(),
                    bytes = payload.len(),
                    "product image loaded"
                );
                parts.push(Part::image(ImageRole::Product, payload));
            }
            None => warn!(
                product_id,
                product = %product.name,
                "product image unavailable; continuing with subject photo only"
            ),
        }
        if let Some(note) = note.and_then(closing_note) {
            parts.push(Part::Text(note));
        }
        Ok(GenerationRequest::new(parts)?)
    }

    fn load_product_image(&self, reference: Option<&str>) -> Option<ImagePayload> {
        let reference = reference?;
        match self.images.load(reference) {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(
                    reference,
                    error = %error_summary(&err, 300),
                    "failed loading product image"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::bail;
    use tryon_contracts::{Catalog, ErrorKind, Product};

    use super::*;
    use crate::source::LocalFirstImageSource;
    use crate::test_server::{Canned, TestServer};

    struct MapSource {
        loads: Arc<AtomicUsize>,
        payload: Option<ImagePayload>,
    }

    impl ProductImageSource for MapSource {
        fn load(&self, _reference: &str) -> anyhow::Result<ImagePayload> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            match &self.payload {
                Some(payload) => Ok(payload.clone()),
                None => bail!("not found anywhere"),
            }
        }
    }

    fn product(id: &str, in_stock: bool) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            price: 10.0,
            description: String::new(),
            images: vec![format!("/products/{id}-1.jpg")],
            sizes: Vec::new(),
            colors: Vec::new(),
            category: "Tops".to_string(),
            in_stock,
        }
    }

    fn builder(product_image: Option<ImagePayload>) -> (RequestBuilder, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let catalog = Catalog::new(vec![product("1", true), product("2", false)])
            .unwrap_or_default();
        let source = MapSource {
            loads: Arc::clone(&loads),
            payload: product_image,
        };
        (RequestBuilder::new(Box::new(catalog), Box::new(source)), loads)
    }

    fn png(len: usize) -> SubjectPhoto {
        SubjectPhoto::new("image/png", vec![7; len])
    }

    #[test]
    fn builds_instruction_subject_and_product_in_order() -> anyhow::Result<()> {
        let jpeg = ImagePayload::new("image/jpeg", vec![3; 50 * 1024]);
        let (builder, _) = builder(Some(jpeg.clone()));
        let request = builder.build(png(2 * 1024), "1", None)?;

        let parts = request.parts();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].as_text(), Some(TRY_ON_INSTRUCTION));
        assert_eq!(
            parts[1].as_image().map(|(role, p)| (role, p.mime_type())),
            Some((ImageRole::Subject, "image/png"))
        );
        assert_eq!(parts[2].as_image(), Some((ImageRole::Product, &jpeg)));
        Ok(())
    }

    #[test]
    fn closing_note_is_appended_after_images() -> anyhow::Result<()> {
        let (builder, _) = builder(Some(ImagePayload::new("image/jpeg", vec![1])));
        let request = builder.build(png(10), "1", Some("roll up the sleeves"))?;
        let last = request.parts().last().and_then(|part| part.as_text()).unwrap_or_default();
        assert!(last.ends_with("roll up the sleeves"));
        assert_eq!(request.instruction(), TRY_ON_INSTRUCTION);
        Ok(())
    }

    #[test]
    fn oversized_photo_is_rejected_before_any_lookup() {
        let (builder, loads) = builder(None);
        let err = builder
            .build(png(MAX_PHOTO_BYTES + 1), "1", None)
            .err()
            .map(|err| err.kind());
        assert_eq!(err, Some(ErrorKind::InvalidInput));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn photo_at_the_limit_is_accepted() -> anyhow::Result<()> {
        let (builder, _) = builder(None);
        builder.build(png(MAX_PHOTO_BYTES), "1", None)?;
        Ok(())
    }

    #[test]
    fn empty_and_unsupported_photos_name_the_rule() {
        assert_eq!(
            validate_photo(&SubjectPhoto::new("image/png", Vec::new())),
            Err(InputRule::EmptyPhoto)
        );
        for mime in ["image/gif", "image/svg+xml", "application/pdf", ""] {
            assert_eq!(
                validate_photo(&SubjectPhoto::new(mime, vec![1])),
                Err(InputRule::UnsupportedType(mime.to_string()))
            );
        }
    }

    #[test]
    fn jpg_alias_and_case_are_normalized() {
        assert_eq!(
            validate_photo(&SubjectPhoto::new("IMAGE/JPG", vec![1])),
            Ok("image/jpeg".to_string())
        );
        assert_eq!(
            validate_photo(&SubjectPhoto::new("image/webp", vec![1])),
            Ok("image/webp".to_string())
        );
    }

    #[test]
    fn unknown_product_fails_with_not_found() {
        let (builder, loads) = builder(None);
        let err = builder.build(png(10), "99", None).err();
        assert_eq!(err, Some(TryOnError::ProductNotFound("99".to_string())));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn out_of_stock_product_fails_with_unavailable() {
        let (builder, _) = builder(None);
        let err = builder.build(png(10), "2", None).err();
        assert_eq!(err, Some(TryOnError::ProductUnavailable("2".to_string())));
    }

    #[test]
    fn blank_product_id_is_invalid_input() {
        let (builder, _) = builder(None);
        let err = builder.build(png(10), "  ", None).err();
        assert_eq!(err, Some(TryOnError::InvalidInput(InputRule::MissingProductId)));
    }

    #[test]
    fn unloadable_product_image_degrades_to_subject_only() -> anyhow::Result<()> {
        let (builder, loads) = builder(None);
        let request = builder.build(png(10), "1", None)?;
        assert_eq!(request.parts().len(), 2);
        assert!(!request.has_product_image());
        assert!(request.subject().is_some());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn analysis_request_needs_no_product() -> anyhow::Result<()> {
        let request = analysis_request(SubjectPhoto::new("image/jpg", vec![1, 2]))?;
        assert_eq!(request.instruction(), ANALYSIS_INSTRUCTION);
        assert_eq!(request.subject().map(ImagePayload::mime_type), Some("image/jpeg"));
        assert!(!request.has_product_image());
        assert_eq!(
            analysis_request(SubjectPhoto::new("image/gif", vec![1])).err(),
            Some(TryOnError::InvalidInput(InputRule::UnsupportedType(
                "image/gif".to_string()
            )))
        );
        Ok(())
    }

    #[test]
    fn remote_product_image_error_degrades_to_subject_only() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let server = TestServer::serve(vec![Canned::new(503, "text/plain", "unavailable")])?;
        let catalog = Catalog::new(vec![product("1", true)])?;
        let images = LocalFirstImageSource::new(temp.path()).with_remote_base(server.base_url());
        let builder = RequestBuilder::new(Box::new(catalog), Box::new(images));

        let request = builder.build(png(10), "1", Some("tuck it in"))?;
        assert!(!request.has_product_image());
        assert_eq!(request.parts().len(), 3);
        assert_eq!(server.paths(), vec!["/products/1-1.jpg".to_string()]);
        Ok(())
    }
}
