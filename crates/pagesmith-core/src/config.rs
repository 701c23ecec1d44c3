// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Toolkit configuration. Passed explicitly to the extractor and batch
// operations; nothing here is read from process-wide state.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{CompressionLevel, PaperSize};

/// Which rasterizer turns a page into a bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterBackend {
    /// Built-in tiny-skia renderer for paths, images and text placement.
    /// Needs no native library.
    Vector,
    /// PDFium bound from `library_path`, or from the system library search
    /// path when `None`. Requires the `pdfium` feature.
    Pdfium { library_path: Option<PathBuf> },
}

/// Rendering settings injected into the page extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub backend: RasterBackend,
    /// Scale used for page-grid thumbnails.
    pub thumbnail_scale: f32,
    /// Scale used when exporting pages as images.
    pub export_scale: f32,
    /// Scale used when rasterizing pages for compression.
    pub compress_scale: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: RasterBackend::Vector,
            thumbnail_scale: 0.5,
            export_scale: 2.0,
            compress_scale: 1.0,
        }
    }
}

/// JPEG quality (1-100) for each compression level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionQualities {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
}

impl CompressionQualities {
    pub fn for_level(&self, level: CompressionLevel) -> u8 {
        match level {
            CompressionLevel::Low => self.low,
            CompressionLevel::Medium => self.medium,
            CompressionLevel::High => self.high,
        }
    }
}

impl Default for CompressionQualities {
    fn default() -> Self {
        Self {
            low: 50,
            medium: 75,
            high: 90,
        }
    }
}

/// Top-level settings for an editing session and the batch tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolkitConfig {
    pub render: RenderConfig,
    /// Size of pages inserted by "insert blank".
    pub blank_page: PaperSize,
    /// Paper used by the images-to-PDF converter.
    pub image_page: PaperSize,
    pub compression: CompressionQualities,
    /// Font size for newly placed text annotations.
    pub default_font_size: f64,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            render: RenderConfig::default(),
            blank_page: PaperSize::A4,
            image_page: PaperSize::A4,
            compression: CompressionQualities::default(),
            default_font_size: 24.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_editor_presets() {
        let config = ToolkitConfig::default();
        assert_eq!(config.blank_page.dimensions_pt(), (595.0, 842.0));
        assert_eq!(config.compression.for_level(CompressionLevel::Medium), 75);
        assert_eq!(config.render.export_scale, 2.0);
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut config = ToolkitConfig::default();
        config.render.backend = RasterBackend::Pdfium {
            library_path: Some(PathBuf::from("/opt/pdfium/lib")),
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ToolkitConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.render.backend, config.render.backend);
    }
}
