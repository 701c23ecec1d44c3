// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — reading source documents, assembling output page trees,
// drawing overlays, rebuilding edited documents, and creating new PDFs.

pub(crate) mod overlay;
pub(crate) mod pages;
pub mod reader;
pub mod rebuild;
pub mod writer;

pub use reader::{PageExtractor, SourceDocument};
pub use rebuild::{RebuildJob, Rebuilder};
pub use writer::PdfWriter;
