// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster module — turning a source page into a bitmap.
//
// The backend is chosen from `RenderConfig` when the extractor is built, so
// no rendering state lives at process scope.

pub(crate) mod decode;
#[cfg(feature = "pdfium")]
mod pdfium;
mod vector;

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRasterizer;
pub use vector::VectorRasterizer;

use image::RgbaImage;
use pagesmith_core::config::{RasterBackend, RenderConfig};
use pagesmith_core::error::{PagesmithError, Result};

use crate::pdf::reader::SourceDocument;

/// A rendered page bitmap.
pub type RasterImage = RgbaImage;

/// Renders one page of a source document at a scale relative to its native
/// size in points. Implementations must not mutate the source.
pub trait PageRasterizer {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Render page `page_index` (0-based) without applying any rotation.
    fn rasterize(
        &self,
        source: &SourceDocument,
        page_index: usize,
        scale: f32,
    ) -> Result<RasterImage>;
}

/// Build the rasterizer selected by `config`.
pub fn rasterizer_from_config(config: &RenderConfig) -> Result<Box<dyn PageRasterizer>> {
    match &config.backend {
        RasterBackend::Vector => Ok(Box::new(VectorRasterizer)),
        #[cfg(feature = "pdfium")]
        RasterBackend::Pdfium { library_path } => {
            Ok(Box::new(PdfiumRasterizer::bind(library_path.as_deref())?))
        }
        #[cfg(not(feature = "pdfium"))]
        RasterBackend::Pdfium { .. } => Err(PagesmithError::Pdf(
            "the PDFium rasterizer requires the `pdfium` feature".into(),
        )),
    }
}

/// Pixel dimensions of a page of `width` x `height` points at `scale`.
pub(crate) fn scaled_dimensions(width: f64, height: f64, scale: f32) -> Result<(u32, u32)> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(PagesmithError::Zoom(f64::from(scale)));
    }
    let w = (width * f64::from(scale)).round().max(1.0) as u32;
    let h = (height * f64::from(scale)).round().max(1.0) as u32;
    Ok((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_selects_vector() {
        let rasterizer = rasterizer_from_config(&RenderConfig::default()).unwrap();
        assert_eq!(rasterizer.name(), "vector");
    }

    #[test]
    fn scaled_dimensions_round_and_clamp() {
        assert_eq!(scaled_dimensions(595.0, 842.0, 0.5).unwrap(), (298, 421));
        assert_eq!(scaled_dimensions(0.2, 0.2, 1.0).unwrap(), (1, 1));
        assert!(scaled_dimensions(10.0, 10.0, 0.0).is_err());
    }
}
