// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page extractor — open a source PDF, enumerate its pages, and render
// individual pages to bitmaps through the configured rasterizer.

use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, ObjectId};
use pagesmith_core::config::RenderConfig;
use pagesmith_core::error::{PagesmithError, Result};
use pagesmith_core::{PageSize, Rotation};
use sha2::{Digest, Sha256};
use tracing::{Span, debug, info, instrument, warn};

use crate::image::ImageProcessor;
use crate::raster::{PageRasterizer, RasterImage, rasterizer_from_config};

/// US Letter, used when neither a page nor its ancestors carry a /MediaBox.
const FALLBACK_PAGE_SIZE: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

/// A parsed, read-only source document.
///
/// Holds the original bytes (shared, never written to) next to the parsed
/// object graph so pages can be copied and rendered without re-parsing.
pub struct SourceDocument {
    document: Document,
    bytes: Arc<[u8]>,
    fingerprint: String,
    /// Page object ids in page order.
    page_ids: Vec<ObjectId>,
    page_sizes: Vec<PageSize>,
    page_rotations: Vec<Rotation>,
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("fingerprint", &self.fingerprint)
            .field("pages", &self.page_ids.len())
            .finish()
    }
}

impl SourceDocument {
    // -- Construction ---------------------------------------------------------

    /// Parse PDF bytes. Fails with a parse error when the bytes are not a
    /// well-formed PDF or the document has no pages.
    #[instrument(skip_all, fields(bytes_len = tracing::field::Empty))]
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let bytes: Arc<[u8]> = bytes.into();
        Span::current().record("bytes_len", bytes.len());
        let document = Document::load_mem(&bytes)
            .map_err(|err| PagesmithError::Parse(format!("failed to load PDF: {}", err)))?;

        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(PagesmithError::Parse("document has no pages".into()));
        }

        let page_sizes = page_ids
            .iter()
            .map(|&id| media_box_size(&document, id).unwrap_or(FALLBACK_PAGE_SIZE))
            .collect();
        let page_rotations = page_ids
            .iter()
            .map(|&id| intrinsic_rotation(&document, id))
            .collect();

        let fingerprint = fingerprint(&bytes);
        info!(pages = page_ids.len(), %fingerprint, "PDF loaded");

        Ok(Self {
            document,
            bytes,
            fingerprint,
            page_ids,
            page_sizes,
            page_rotations,
        })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Hex SHA-256 of the source bytes.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Whether `bytes` are the bytes this document was parsed from.
    pub fn is_same_source(&self, bytes: &[u8]) -> bool {
        self.bytes.len() == bytes.len() && self.fingerprint == fingerprint(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Intrinsic page size from the (possibly inherited) /MediaBox.
    pub fn page_size(&self, page_index: usize) -> Result<PageSize> {
        self.check_index(page_index)?;
        Ok(self.page_sizes[page_index])
    }

    /// The page's own /Rotate value (inherited through the page tree).
    pub fn page_rotation(&self, page_index: usize) -> Result<Rotation> {
        self.check_index(page_index)?;
        Ok(self.page_rotations[page_index])
    }

    pub fn page_object_id(&self, page_index: usize) -> Result<ObjectId> {
        self.check_index(page_index)?;
        Ok(self.page_ids[page_index])
    }

    fn check_index(&self, page_index: usize) -> Result<()> {
        if page_index < self.page_ids.len() {
            Ok(())
        } else {
            Err(PagesmithError::Range {
                position: page_index,
                len: self.page_ids.len(),
            })
        }
    }
}

/// Opens documents and renders page previews with an injected rasterizer.
pub struct PageExtractor {
    config: RenderConfig,
    rasterizer: Box<dyn PageRasterizer>,
}

impl PageExtractor {
    /// Build an extractor using the backend named in `config`.
    pub fn new(config: RenderConfig) -> Result<Self> {
        let rasterizer = rasterizer_from_config(&config)?;
        info!(backend = rasterizer.name(), "Page extractor ready");
        Ok(Self { config, rasterizer })
    }

    /// Build an extractor around a caller-supplied rasterizer.
    pub fn with_rasterizer(config: RenderConfig, rasterizer: Box<dyn PageRasterizer>) -> Self {
        Self { config, rasterizer }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn open(&self, bytes: impl Into<Arc<[u8]>>) -> Result<SourceDocument> {
        SourceDocument::from_bytes(bytes)
    }

    /// Render one page at `scale` x native size, rotated clockwise by
    /// `rotation_degrees`. The rotation is for display only; the document is
    /// not touched. Pass the page's own /Rotate to see it as a viewer would.
    #[instrument(skip(self, source))]
    pub fn render_page(
        &self,
        source: &SourceDocument,
        page_index: usize,
        scale: f32,
        rotation_degrees: i32,
    ) -> Result<RasterImage> {
        let bitmap = self.rasterizer.rasterize(source, page_index, scale)?;
        if rotation_degrees.rem_euclid(360) == 0 {
            return Ok(bitmap);
        }
        Ok(ImageProcessor::from_rgba(bitmap)
            .rotate(rotation_degrees as f32)
            .into_rgba())
    }

    /// Render every page independently, each turned by its own /Rotate. One
    /// failing page does not stop the others.
    pub fn render_all(&self, source: &SourceDocument, scale: f32) -> Vec<Result<RasterImage>> {
        (0..source.page_count())
            .map(|index| {
                let intrinsic = source.page_rotation(index)?.degrees();
                self.render_page(source, index, scale, intrinsic)
            })
            .collect()
    }

    /// Page-grid thumbnails at the configured thumbnail scale. Pages that fail
    /// to render come back as `None` so the grid can show a placeholder.
    pub fn thumbnails(&self, source: &SourceDocument) -> Vec<Option<RasterImage>> {
        self.render_all(source, self.config.thumbnail_scale)
            .into_iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(image) => Some(image),
                Err(err) => {
                    warn!(page_index = index, %err, "Thumbnail render failed, using placeholder");
                    None
                }
            })
            .collect()
    }
}

/// Hex SHA-256 digest of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// -- Page tree helpers --------------------------------------------------------

/// Look up `key` on a page, falling back to its /Parent chain (the PDF
/// inheritance rule for MediaBox, CropBox, Resources and Rotate).
pub(crate) fn inherited_attribute<'a>(
    document: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        // Guard against malformed parent cycles.
        if depth > 64 {
            warn!(?page_id, "Page tree deeper than 64 levels, giving up");
            return None;
        }
        let dict = document.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }
    None
}

pub(crate) fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        other => other,
    }
}

pub(crate) fn object_to_f64(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some((*f).into()),
        _ => None,
    }
}

/// The page's (possibly inherited) /MediaBox as `[x0, y0, x1, y1]`.
fn media_box(document: &Document, page_id: ObjectId) -> Option<[f64; 4]> {
    let raw = inherited_attribute(document, page_id, b"MediaBox")?;
    let array = resolve(document, raw).as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let coords: Vec<f64> = array
        .iter()
        .map(|o| object_to_f64(resolve(document, o)))
        .collect::<Option<_>>()?;
    Some([coords[0], coords[1], coords[2], coords[3]])
}

fn media_box_size(document: &Document, page_id: ObjectId) -> Option<PageSize> {
    let [x0, y0, x1, y1] = media_box(document, page_id)?;
    Some(PageSize::new((x1 - x0).abs(), (y1 - y0).abs()))
}

/// Lower-left corner of the page's /MediaBox; page content is drawn
/// relative to it.
pub(crate) fn media_box_origin(document: &Document, page_id: ObjectId) -> (f64, f64) {
    media_box(document, page_id).map_or((0.0, 0.0), |[x0, y0, x1, y1]| (x0.min(x1), y0.min(y1)))
}

fn intrinsic_rotation(document: &Document, page_id: ObjectId) -> Rotation {
    let degrees = inherited_attribute(document, page_id, b"Rotate")
        .and_then(|o| resolve(document, o).as_i64().ok())
        .unwrap_or(0);
    Rotation::from_degrees(degrees as i32).unwrap_or_else(|_| {
        debug!(?page_id, degrees, "Ignoring non-right-angle /Rotate");
        Rotation::NONE
    })
}

/// Clone a page-tree dictionary value into an owned dictionary, resolving a
/// top-level reference.
pub(crate) fn owned_dictionary(document: &Document, object: &Object) -> Option<Dictionary> {
    match resolve(document, object) {
        Object::Dictionary(dict) => Some(dict.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{corrupt_page_pdf, sample_pdf};

    #[test]
    fn opens_and_counts_pages() {
        let source = SourceDocument::from_bytes(sample_pdf(&[(612.0, 792.0), (300.0, 400.0)]))
            .expect("open");
        assert_eq!(source.page_count(), 2);
        assert_eq!(source.page_size(1).unwrap(), PageSize::new(300.0, 400.0));
        assert_eq!(source.fingerprint().len(), 64);
    }

    #[test]
    fn opens_shared_bytes_in_place() {
        crate::testing::init_tracing();
        let shared: Arc<[u8]> = sample_pdf(&[(612.0, 792.0)]).into();
        let source = SourceDocument::from_bytes(Arc::clone(&shared)).expect("open");
        assert_eq!(source.page_count(), 1);
        assert!(Arc::ptr_eq(&source.shared_bytes(), &shared));
        assert_eq!(source.bytes().len(), shared.len());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = SourceDocument::from_bytes(b"definitely not a pdf".to_vec()).unwrap_err();
        assert!(matches!(err, PagesmithError::Parse(_)));
    }

    #[test]
    fn inherits_media_box_from_parent() {
        let source = SourceDocument::from_bytes(crate::testing::inherited_media_box_pdf())
            .expect("open");
        assert_eq!(source.page_size(0).unwrap(), PageSize::new(420.0, 595.0));
        assert_eq!(source.page_rotation(0).unwrap().degrees(), 90);
    }

    #[test]
    fn out_of_range_page_is_rejected() {
        let source = SourceDocument::from_bytes(sample_pdf(&[(612.0, 792.0)])).unwrap();
        assert!(matches!(
            source.page_size(3),
            Err(PagesmithError::Range { position: 3, len: 1 })
        ));
    }

    #[test]
    fn same_source_detection_uses_fingerprint() {
        let bytes = sample_pdf(&[(612.0, 792.0)]);
        let source = SourceDocument::from_bytes(bytes.clone()).unwrap();
        assert!(source.is_same_source(&bytes));
        assert!(!source.is_same_source(&sample_pdf(&[(100.0, 100.0)])));
    }

    #[test]
    fn renders_at_scale_and_rotation() {
        let extractor = PageExtractor::new(RenderConfig::default()).unwrap();
        let source = extractor.open(sample_pdf(&[(200.0, 100.0)])).unwrap();

        let plain = extractor.render_page(&source, 0, 2.0, 0).unwrap();
        assert_eq!(plain.dimensions(), (400, 200));

        let turned = extractor.render_page(&source, 0, 2.0, 90).unwrap();
        assert_eq!(turned.dimensions(), (200, 400));
    }

    #[test]
    fn one_bad_page_does_not_block_the_rest() {
        let extractor = PageExtractor::new(RenderConfig::default()).unwrap();
        let source = extractor.open(corrupt_page_pdf()).unwrap();

        let thumbs = extractor.thumbnails(&source);
        assert_eq!(thumbs.len(), 3);
        assert!(thumbs[0].is_some());
        assert!(thumbs[1].is_none());
        assert!(thumbs[2].is_some());

        let err = extractor.render_page(&source, 1, 1.0, 0).unwrap_err();
        assert!(matches!(err, PagesmithError::Render { page_index: 1, .. }));
    }
}
