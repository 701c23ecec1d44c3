// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — new documents from images (or blank pages) using `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use pagesmith_core::PaperSize;
use pagesmith_core::error::{PagesmithError, Result};
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, info, instrument};

/// Margin kept around placed images.
const IMAGE_MARGIN_MM: f32 = 15.0;

/// Resolution images are assumed to have when sized onto paper.
const IMAGE_DPI: f32 = 150.0;

/// Creates new PDF documents on a fixed paper size.
pub struct PdfWriter {
    paper_size: PaperSize,
}

impl PdfWriter {
    pub fn new(paper_size: PaperSize) -> Self {
        Self { paper_size }
    }

    /// Create a new writer defaulting to A4.
    pub fn a4() -> Self {
        Self::new(PaperSize::A4)
    }

    /// Paper dimensions in printpdf's Mm units.
    fn page_dimensions(&self) -> (Mm, Mm) {
        let (w_mm, h_mm) = self.paper_size.dimensions_mm();
        (Mm(w_mm as f32), Mm(h_mm as f32))
    }

    fn save(&self, mut doc: PdfDocument, pages: Vec<PdfPage>) -> Vec<u8> {
        doc.with_pages(pages);
        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            debug!(warnings = warnings.len(), "printpdf reported warnings");
        }
        output
    }

    /// A document of `count` empty pages.
    pub fn blank_pages(&self, count: usize) -> Result<Vec<u8>> {
        if count == 0 {
            return Err(PagesmithError::Pdf("a document needs at least one page".into()));
        }
        let (page_w, page_h) = self.page_dimensions();
        let pages = (0..count)
            .map(|_| PdfPage::new(page_w, page_h, Vec::new()))
            .collect();
        Ok(self.save(PdfDocument::new("Pagesmith Document"), pages))
    }

    /// One page per image, in order. Each image is centred inside the page
    /// margins, scaled down to fit and never scaled up.
    #[instrument(skip_all, fields(images = images.len()))]
    pub fn images_to_pdf(&self, images: &[&[u8]]) -> Result<Vec<u8>> {
        if images.is_empty() {
            return Err(PagesmithError::Image("no images to convert".into()));
        }
        let (page_w, page_h) = self.page_dimensions();
        info!(paper = ?self.paper_size, "Creating image PDF");

        let mut doc = PdfDocument::new("Pagesmith Images");
        let mut pages = Vec::with_capacity(images.len());

        for (index, bytes) in images.iter().enumerate() {
            let decoded = ::image::load_from_memory(bytes).map_err(|err| {
                PagesmithError::Image(format!("image {} could not be decoded: {err}", index + 1))
            })?;
            let (width, height) = (decoded.width(), decoded.height());
            let xobject = doc.add_image(&RawImage {
                pixels: RawImageData::U8(decoded.into_rgb8().into_raw()),
                width: width as usize,
                height: height as usize,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            });

            let (x, y, scale) = fit_image(page_w, page_h, width, height);
            let transform = XObjectTransform {
                translate_x: Some(Pt(x)),
                translate_y: Some(Pt(y)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(IMAGE_DPI),
                rotate: None,
            };
            debug!(index, scale, "Image placed on page");
            pages.push(PdfPage::new(
                page_w,
                page_h,
                vec![Op::UseXobject { id: xobject, transform }],
            ));
        }

        Ok(self.save(doc, pages))
    }
}

/// Lower-left corner (points) and scale for a `width` x `height` pixel image
/// centred inside the page margins. Images are shrunk to fit, never grown.
fn fit_image(page_w: Mm, page_h: Mm, width: u32, height: u32) -> (f32, f32, f32) {
    let margin = Mm(IMAGE_MARGIN_MM).into_pt().0;
    let box_w = Mm(page_w.0 - 2.0 * IMAGE_MARGIN_MM).into_pt().0;
    let box_h = Mm(page_h.0 - 2.0 * IMAGE_MARGIN_MM).into_pt().0;
    let natural_w = width.max(1) as f32 * 72.0 / IMAGE_DPI;
    let natural_h = height.max(1) as f32 * 72.0 / IMAGE_DPI;
    let scale = (box_w / natural_w).min(box_h / natural_h).min(1.0);
    (
        margin + (box_w - natural_w * scale) / 2.0,
        margin + (box_h - natural_h * scale) / 2.0,
        scale,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::SourceDocument;
    use crate::testing::{jpeg_bytes, png_bytes};

    #[test]
    fn one_page_per_image() {
        let png = png_bytes(40, 20, true);
        let jpeg = jpeg_bytes(20, 40);
        let bytes = PdfWriter::a4().images_to_pdf(&[&png, &jpeg]).unwrap();

        let doc = SourceDocument::from_bytes(bytes).unwrap();
        assert_eq!(doc.page_count(), 2);
        let size = doc.page_size(0).unwrap();
        assert!((size.width - 595.0).abs() < 1.0);
        assert!((size.height - 842.0).abs() < 1.0);
    }

    #[test]
    fn large_images_shrink_small_ones_stay() {
        let (page_w, page_h) = PdfWriter::a4().page_dimensions();
        let (_, _, small) = fit_image(page_w, page_h, 150, 150);
        assert_eq!(small, 1.0);
        let (x, _, large) = fit_image(page_w, page_h, 6000, 1000);
        assert!(large < 1.0);
        assert!((x - Mm(IMAGE_MARGIN_MM).into_pt().0).abs() < 0.5);
    }

    #[test]
    fn undecodable_image_is_an_image_error() {
        let err = PdfWriter::a4()
            .images_to_pdf(&[b"nope".as_slice()])
            .unwrap_err();
        assert!(matches!(err, PagesmithError::Image(_)));
    }

    #[test]
    fn blank_pages_use_paper_size() {
        let bytes = PdfWriter::new(PaperSize::Letter).blank_pages(3).unwrap();
        let doc = SourceDocument::from_bytes(bytes).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert!((doc.page_size(2).unwrap().width - 612.0).abs() < 1.0);
        assert!(PdfWriter::a4().blank_pages(0).is_err());
    }
}
