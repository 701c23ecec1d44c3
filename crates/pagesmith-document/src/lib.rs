// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagesmith-document — Document processing for the Pagesmith page editor.
//
// Provides PDF operations (open, render, rebuild with page edits and overlays,
// merge, compress, export to images), image processing (rotate, resize,
// encode), and the ZIP archive sink for multi-file outputs.

pub mod archive;
pub mod convert;
pub mod image;
pub mod pdf;
pub mod raster;

#[cfg(test)]
mod testing;

// Re-export the primary structs so callers can use `pagesmith_document::Rebuilder` etc.
pub use archive::{NamedBuffer, zip_buffers};
pub use convert::{DocumentConverter, resize_image};
pub use image::ImageProcessor;
pub use pdf::{PageExtractor, PdfWriter, RebuildJob, Rebuilder, SourceDocument};
pub use raster::{PageRasterizer, RasterImage, VectorRasterizer};

#[cfg(feature = "pdfium")]
pub use raster::PdfiumRasterizer;
