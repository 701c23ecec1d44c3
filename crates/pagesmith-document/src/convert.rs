// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch conversions that run outside an editing session: merge, export pages
// as images, render-based compression, images to PDF, and image resizing.
//
// Compression rasterizes every page. It trades vector content (selectable
// text, sharp line art) for size and is lossy by construction.

use lopdf::content::{Content, Operation};
use lopdf::{Object, dictionary};
use pagesmith_core::config::ToolkitConfig;
use pagesmith_core::error::{PagesmithError, Result};
use pagesmith_core::{CompressionLevel, ImageKind, PageSize};
use tracing::{info, instrument};

use crate::archive::{NamedBuffer, page_file_name, zip_buffers};
use crate::image::ImageProcessor;
use crate::pdf::overlay::embed_image;
use crate::pdf::pages::{OutputDocument, PageCopier};
use crate::pdf::reader::{PageExtractor, SourceDocument};
use crate::pdf::writer::PdfWriter;

/// JPEG quality for exported page images.
const EXPORT_JPEG_QUALITY: u8 = 92;

/// JPEG quality for resized images.
const RESIZE_JPEG_QUALITY: u8 = 90;

/// Runs the batch tools with one configuration and rasterizer.
pub struct DocumentConverter {
    config: ToolkitConfig,
    extractor: PageExtractor,
}

impl DocumentConverter {
    pub fn new(config: ToolkitConfig) -> Result<Self> {
        let extractor = PageExtractor::new(config.render.clone())?;
        Ok(Self { config, extractor })
    }

    /// Use an existing extractor (and its rasterizer) for the render-based
    /// tools.
    pub fn with_extractor(config: ToolkitConfig, extractor: PageExtractor) -> Self {
        Self { config, extractor }
    }

    pub fn config(&self) -> &ToolkitConfig {
        &self.config
    }

    // -- Merge ----------------------------------------------------------------

    /// Concatenate the pages of every source, in the order given.
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub fn merge(&self, sources: &[&[u8]]) -> Result<Vec<u8>> {
        if sources.len() < 2 {
            return Err(PagesmithError::Pdf(
                "select at least two PDF files to merge".into(),
            ));
        }
        let documents = sources
            .iter()
            .enumerate()
            .map(|(index, bytes)| {
                SourceDocument::from_bytes(bytes.to_vec()).map_err(|err| {
                    PagesmithError::Parse(format!("file {} of the merge: {err}", index + 1))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut output = OutputDocument::new("1.7");
        for document in &documents {
            let mut copier = PageCopier::new(document);
            for index in 0..document.page_count() {
                output.push_copy(&mut copier, index, None)?;
            }
        }
        let pages = output.page_count();
        let bytes = output.finish()?;
        info!(pages, output_bytes = bytes.len(), "PDFs merged");
        Ok(bytes)
    }

    // -- Export ---------------------------------------------------------------

    /// Render every page at the export scale, turned by its /Rotate, and
    /// encode it as `kind`. Entries are named `{base_name}-page-{n}.{ext}`.
    #[instrument(skip(self, pdf), fields(bytes_len = pdf.len()))]
    pub fn export_pages(
        &self,
        pdf: &[u8],
        kind: ImageKind,
        base_name: &str,
    ) -> Result<Vec<NamedBuffer>> {
        let source = SourceDocument::from_bytes(pdf.to_vec())?;
        let scale = self.config.render.export_scale;
        let mut entries = Vec::with_capacity(source.page_count());
        for index in 0..source.page_count() {
            let rotation = source.page_rotation(index)?.degrees();
            let bitmap = self.extractor.render_page(&source, index, scale, rotation)?;
            let bytes = ImageProcessor::from_rgba(bitmap).encode(kind, EXPORT_JPEG_QUALITY)?;
            entries.push(NamedBuffer::new(
                page_file_name(base_name, index + 1, kind),
                bytes,
            ));
        }
        info!(pages = entries.len(), ?kind, "Pages exported");
        Ok(entries)
    }

    /// [`export_pages`](Self::export_pages) packed into one ZIP archive.
    pub fn export_pages_zip(
        &self,
        pdf: &[u8],
        kind: ImageKind,
        base_name: &str,
    ) -> Result<Vec<u8>> {
        zip_buffers(&self.export_pages(pdf, kind, base_name)?)
    }

    // -- Compress -------------------------------------------------------------

    /// Re-encode every page as a single JPEG image at the level's quality.
    /// Each output page is sized to its raster, so the page count is kept.
    #[instrument(skip(self, pdf), fields(bytes_len = pdf.len(), ?level))]
    pub fn compress(&self, pdf: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        let source = SourceDocument::from_bytes(pdf.to_vec())?;
        let quality = self.config.compression.for_level(level);
        let scale = self.config.render.compress_scale;

        let mut output = OutputDocument::new("1.7");
        for index in 0..source.page_count() {
            // The page is baked upright, so the output page carries no /Rotate.
            let rotation = source.page_rotation(index)?.degrees();
            let bitmap = self.extractor.render_page(&source, index, scale, rotation)?;
            let (width, height) = bitmap.dimensions();
            let jpeg = ImageProcessor::from_rgba(bitmap).to_jpeg_bytes(quality)?;

            let image_id = embed_image(output.document_mut(), &jpeg).map_err(|reason| {
                PagesmithError::Image(format!("page {}: {reason}", index + 1))
            })?;
            let size = PageSize::new(
                f64::from(width) / f64::from(scale),
                f64::from(height) / f64::from(scale),
            );
            let content = full_page_image(size, "Im0")?;
            output.push_page(
                size,
                dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
                content,
            );
        }

        let bytes = output.finish()?;
        info!(
            input_bytes = pdf.len(),
            output_bytes = bytes.len(),
            quality,
            "PDF compressed"
        );
        Ok(bytes)
    }

    // -- Images ---------------------------------------------------------------

    /// One page per image on the configured image paper size.
    pub fn images_to_pdf(&self, images: &[&[u8]]) -> Result<Vec<u8>> {
        PdfWriter::new(self.config.image_page).images_to_pdf(images)
    }
}

/// Scale an encoded image to a target width and/or height. A missing
/// dimension keeps the aspect ratio. The output keeps the input's encoding.
#[instrument(skip(bytes), fields(bytes_len = bytes.len()))]
pub fn resize_image(bytes: &[u8], width: Option<u32>, height: Option<u32>) -> Result<Vec<u8>> {
    if width.is_none() && height.is_none() {
        return Err(PagesmithError::InvalidGeometry(
            "enter a width or a height".into(),
        ));
    }
    if width == Some(0) || height == Some(0) {
        return Err(PagesmithError::InvalidGeometry(
            "dimensions must be positive".into(),
        ));
    }
    let kind = ImageKind::sniff(bytes).unwrap_or(ImageKind::Png);
    ImageProcessor::from_bytes(bytes)?
        .resize_to(width, height)
        .encode(kind, RESIZE_JPEG_QUALITY)
}

/// Content stream that paints image `name` over the whole page.
fn full_page_image(size: PageSize, name: &str) -> Result<Vec<u8>> {
    let real = |value: f64| -> Object { (value as f32).into() };
    Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(size.width),
                    real(0.0),
                    real(0.0),
                    real(size.height),
                    real(0.0),
                    real(0.0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    }
    .encode()
    .map_err(|err| PagesmithError::Pdf(format!("cannot encode page content: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{init_tracing, page_text, png_bytes, sample_pdf};
    use lopdf::Object;

    fn converter() -> DocumentConverter {
        DocumentConverter::new(ToolkitConfig::default()).unwrap()
    }

    #[test]
    fn merge_concatenates_in_order() {
        let first = sample_pdf(&[(612.0, 792.0), (612.0, 792.0)]);
        let second = sample_pdf(&[(300.0, 300.0), (300.0, 300.0), (300.0, 300.0)]);
        let merged = converter().merge(&[&first, &second]).unwrap();

        let doc = SourceDocument::from_bytes(merged).unwrap();
        assert_eq!(doc.page_count(), 5);
        assert!(page_text(&doc, 1).contains("Page 2"));
        assert!(page_text(&doc, 2).contains("Page 1"));
        assert_eq!(doc.page_size(4).unwrap(), PageSize::new(300.0, 300.0));
    }

    #[test]
    fn merge_needs_two_valid_files() {
        let one = sample_pdf(&[(612.0, 792.0)]);
        assert!(converter().merge(&[&one]).is_err());
        let err = converter().merge(&[&one, b"junk".as_slice()]).unwrap_err();
        assert!(matches!(err, PagesmithError::Parse(message) if message.contains("file 2")));
    }

    #[test]
    fn export_names_and_scales_pages() {
        let pdf = sample_pdf(&[(100.0, 50.0), (100.0, 50.0)]);
        let entries = converter()
            .export_pages(&pdf, ImageKind::Png, "report")
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "report-page-2.png");

        let image = ImageProcessor::from_bytes(&entries[0].bytes).unwrap();
        assert_eq!((image.width(), image.height()), (200, 100));
    }

    #[test]
    fn exported_pages_carry_the_page_content() {
        init_tracing();
        // "Page 1" sits on a baseline 72pt above the bottom edge.
        let pdf = sample_pdf(&[(200.0, 300.0)]);
        let entries = converter()
            .export_pages(&pdf, ImageKind::Png, "ink")
            .unwrap();
        let image = ImageProcessor::from_bytes(&entries[0].bytes).unwrap().into_rgba();
        assert_eq!(image.dimensions(), (400, 600));

        let ink: Vec<(u32, u32)> = image
            .enumerate_pixels()
            .filter(|(_, _, pixel)| pixel.0[..3].iter().any(|&channel| channel < 200))
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(ink.len() > 100, "only {} inked pixels", ink.len());
        assert!(ink.iter().all(|&(x, y)| x >= 100 && y >= 300), "ink outside the text run");
    }

    #[test]
    fn export_jpeg_uses_jpg_extension() {
        let pdf = sample_pdf(&[(100.0, 50.0)]);
        let entries = converter()
            .export_pages(&pdf, ImageKind::Jpeg, "scan")
            .unwrap();
        assert_eq!(entries[0].name, "scan-page-1.jpg");
        assert_eq!(ImageKind::sniff(&entries[0].bytes), Some(ImageKind::Jpeg));
    }

    #[test]
    fn compress_keeps_one_image_per_page() {
        let pdf = sample_pdf(&[(200.0, 300.0); 10]);
        let compressed = converter().compress(&pdf, CompressionLevel::Low).unwrap();

        let doc = SourceDocument::from_bytes(compressed).unwrap();
        assert_eq!(doc.page_count(), 10);
        for index in 0..10 {
            assert_eq!(doc.page_size(index).unwrap(), PageSize::new(200.0, 300.0));
            let text = page_text(&doc, index);
            assert!(!text.contains("Tj"), "page {index} still has text");
            assert_eq!(text.matches("Do").count(), 1);

            let page = doc
                .document()
                .get_dictionary(doc.page_object_id(index).unwrap())
                .unwrap();
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            assert_eq!(xobjects.len(), 1);
            let image = doc
                .document()
                .get_object(xobjects.get(b"Im0").unwrap().as_reference().unwrap())
                .unwrap()
                .as_stream()
                .unwrap();
            assert_eq!(
                image.dict.get(b"Filter").and_then(Object::as_name).unwrap(),
                b"DCTDecode"
            );
        }
    }

    #[test]
    fn compress_propagates_render_failures() {
        let err = converter()
            .compress(&crate::testing::corrupt_page_pdf(), CompressionLevel::High)
            .unwrap_err();
        assert!(matches!(err, PagesmithError::Render { page_index: 1, .. }));
    }

    #[test]
    fn resize_keeps_aspect_and_format() {
        let png = png_bytes(40, 20, false);
        let resized = resize_image(&png, Some(10), None).unwrap();
        assert_eq!(ImageKind::sniff(&resized), Some(ImageKind::Png));
        let image = ImageProcessor::from_bytes(&resized).unwrap();
        assert_eq!((image.width(), image.height()), (10, 5));

        assert!(resize_image(&png, None, None).is_err());
        assert!(resize_image(&png, Some(0), None).is_err());
    }
}
