// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagesmith-editor — Interactive editing state for the Pagesmith page editor.
//
// The edit sequence describes the output pages, the annotation layer holds
// overlays placed on them, and the session ties both to a loaded document
// and drives rendering and saving.

pub mod annotations;
pub mod session;
pub mod sequence;

pub use annotations::{AnnotationLayer, PageSnapshot};
pub use sequence::EditSequence;
pub use session::{EditSession, RebuildOutcome, SessionOutcome};
