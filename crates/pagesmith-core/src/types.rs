// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Pagesmith page editor.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PagesmithError, Result};

/// Stable identity of a page descriptor.
///
/// Independent of the page's position and of the original page it refers to.
/// A fresh UUID is minted for every descriptor, so identities are never reused
/// within (or across) editing sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub Uuid);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a placed annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationId(pub Uuid);

impl AnnotationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page rotation normalised to one of 0, 90, 180 or 270 degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Rotation(u16);

impl Rotation {
    pub const NONE: Rotation = Rotation(0);

    /// Build a rotation from any multiple of 90 (negative values allowed).
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        if degrees % 90 != 0 {
            return Err(PagesmithError::InvalidRotation(degrees));
        }
        Ok(Self(degrees.rem_euclid(360) as u16))
    }

    /// Add `delta` degrees, wrapping modulo 360.
    pub fn rotated_by(self, delta: i32) -> Result<Self> {
        if delta % 90 != 0 {
            return Err(PagesmithError::InvalidRotation(delta));
        }
        Self::from_degrees(i32::from(self.0) + delta.rem_euclid(360))
    }

    pub fn degrees(self) -> i32 {
        i32::from(self.0)
    }

    /// Whether the page's width and height swap when displayed.
    pub fn is_quarter_turn(self) -> bool {
        self.0 == 90 || self.0 == 270
    }
}

impl TryFrom<i32> for Rotation {
    type Error = PagesmithError;

    fn try_from(value: i32) -> Result<Self> {
        Self::from_degrees(value)
    }
}

impl From<Rotation> for i32 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

/// Where an output page's content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceRef {
    /// A page of the original, immutable source document (0-based index).
    Original(usize),
    /// A synthetic blank page.
    Blank,
}

/// The edit model's record of one output page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDescriptor {
    pub id: PageId,
    pub source: SourceRef,
    pub rotation: Rotation,
}

impl PageDescriptor {
    pub fn original(index: usize) -> Self {
        Self {
            id: PageId::new(),
            source: SourceRef::Original(index),
            rotation: Rotation::NONE,
        }
    }

    pub fn blank() -> Self {
        Self {
            id: PageId::new(),
            source: SourceRef::Blank,
            rotation: Rotation::NONE,
        }
    }
}

/// Raster image encodings accepted as annotation payloads and produced by
/// the export flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Png,
    Jpeg,
}

/// The eight-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// JPEG start-of-image marker.
const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];

impl ImageKind {
    /// Detect the encoding from the leading bytes, ignoring any claimed
    /// content type.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&PNG_SIGNATURE) {
            Some(Self::Png)
        } else if bytes.starts_with(&JPEG_SOI) {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    /// MIME type string.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// File extension used in archive entry names.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Standard paper sizes for synthetic pages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Custom { width_pt: f64, height_pt: f64 },
}

impl PaperSize {
    /// Dimensions in PDF points (width, height).
    pub fn dimensions_pt(&self) -> (f64, f64) {
        match self {
            Self::A4 => (595.0, 842.0),
            Self::A3 => (842.0, 1191.0),
            Self::A5 => (420.0, 595.0),
            Self::Letter => (612.0, 792.0),
            Self::Legal => (612.0, 1008.0),
            Self::Custom {
                width_pt,
                height_pt,
            } => (*width_pt, *height_pt),
        }
    }

    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (f64, f64) {
        let (w, h) = self.dimensions_pt();
        (w * 25.4 / 72.0, h * 25.4 / 72.0)
    }
}

/// Quality presets for render-based compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompressionLevel {
    Low,
    Medium,
    High,
}

/// A page's intrinsic size in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl From<PaperSize> for PageSize {
    fn from(paper: PaperSize) -> Self {
        let (width, height) = paper.dimensions_pt();
        Self { width, height }
    }
}
