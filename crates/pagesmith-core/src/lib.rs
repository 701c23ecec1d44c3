// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pagesmith — Core types, coordinate mapping, and error definitions shared
// across all crates.

pub mod annotation;
pub mod config;
pub mod coords;
pub mod error;
pub mod human_errors;
pub mod types;

pub use annotation::{AnnotationKind, AnnotationObject, AnnotationPayload, Point, Size};
pub use config::{RasterBackend, RenderConfig, ToolkitConfig};
pub use error::PagesmithError;
pub use types::*;
