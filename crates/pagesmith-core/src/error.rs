// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Pagesmith.

use thiserror::Error;

use crate::types::PageId;

/// Top-level error type for all Pagesmith operations.
#[derive(Debug, Error)]
pub enum PagesmithError {
    // -- Input documents --
    #[error("failed to parse document: {0}")]
    Parse(String),

    #[error("failed to render page {page_index}: {reason}")]
    Render { page_index: usize, reason: String },

    // -- Edit model --
    #[error("position {position} out of range (sequence has {len} pages)")]
    Range { position: usize, len: usize },

    #[error("page {0} is not in the edit sequence")]
    NotFound(PageId),

    #[error("annotation {0} does not exist")]
    AnnotationNotFound(String),

    #[error("rotation must be a multiple of 90, got {0}")]
    InvalidRotation(i32),

    #[error("invalid annotation geometry: {0}")]
    InvalidGeometry(String),

    #[error("zoom factor must be positive and finite, got {0}")]
    Zoom(f64),

    // -- Session --
    #[error("no document is loaded")]
    NoDocument,

    #[error("a save is already in progress")]
    Busy,

    // -- Rebuild --
    #[error("failed to copy original page {page_index}: {reason}")]
    Rebuild { page_index: usize, reason: String },

    #[error("failed to draw annotation: {0}")]
    Annotation(String),

    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("image processing failed: {0}")]
    Image(String),

    // -- Output --
    #[error("archive error: {0}")]
    Archive(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PagesmithError>;
