// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDFium-backed rasterizer. The library location comes from `RenderConfig`;
// nothing is looked up through process-wide settings.

use std::path::Path;

use pagesmith_core::error::{PagesmithError, Result};
use pdfium_render::prelude::*;
use tracing::{info, instrument};

use super::{PageRasterizer, RasterImage};
use crate::pdf::reader::SourceDocument;

/// Full-fidelity rasterizer bound to a PDFium shared library.
pub struct PdfiumRasterizer {
    pdfium: Pdfium,
}

impl PdfiumRasterizer {
    /// Bind PDFium from `library_dir`, or from the system library path when
    /// `None`.
    pub fn bind(library_dir: Option<&Path>) -> Result<Self> {
        let bindings = match library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|err| PagesmithError::Pdf(format!("failed to bind pdfium: {err}")))?;

        info!(path = ?library_dir, "PDFium bound");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    #[instrument(skip(self, source))]
    fn rasterize(
        &self,
        source: &SourceDocument,
        page_index: usize,
        scale: f32,
    ) -> Result<RasterImage> {
        let render_err = |reason: String| PagesmithError::Render { page_index, reason };

        let document = self
            .pdfium
            .load_pdf_from_byte_slice(source.bytes(), None)
            .map_err(|err| render_err(format!("pdfium could not open document: {err}")))?;
        let index = u16::try_from(page_index)
            .map_err(|_| render_err("page index exceeds pdfium range".into()))?;
        let page = document
            .pages()
            .get(index)
            .map_err(|err| render_err(err.to_string()))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|err| render_err(err.to_string()))?;

        Ok(bitmap.as_image().to_rgba8())
    }
}
