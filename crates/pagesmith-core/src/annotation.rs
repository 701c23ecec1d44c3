// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Overlay objects (placed images and text runs) bound to a page identity.

use serde::{Deserialize, Serialize};

use crate::types::{AnnotationId, ImageKind, PageId};

/// Average Helvetica glyph advance as a fraction of the font size.
pub const HELVETICA_AVG_ADVANCE: f64 = 0.5;

/// A point in either coordinate space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A width/height pair in either coordinate space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width >= 0.0 && self.height >= 0.0
    }
}

/// Discriminant of an [`AnnotationPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationKind {
    Image,
    Text,
}

/// What an annotation draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnnotationPayload {
    /// Encoded image bytes with the format detected from their signature.
    Image { bytes: Vec<u8>, format: Option<ImageKind> },
    /// A literal string drawn in the standard font.
    Text { text: String, font_size: f64 },
}

impl AnnotationPayload {
    /// Build an image payload, sniffing the real encoding from `bytes`.
    pub fn image(bytes: Vec<u8>) -> Self {
        let format = ImageKind::sniff(&bytes);
        Self::Image { bytes, format }
    }

    pub fn text(text: impl Into<String>, font_size: f64) -> Self {
        Self::Text {
            text: text.into(),
            font_size,
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Image { .. } => AnnotationKind::Image,
            Self::Text { .. } => AnnotationKind::Text,
        }
    }
}

/// A placed overlay in surface coordinates (top-left origin, y-down).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationObject {
    pub id: AnnotationId,
    pub target: PageId,
    pub position: Point,
    /// Explicit size for images. Ignored for text, whose extent follows from
    /// the string and font size.
    pub size: Size,
    pub rotation_degrees: f64,
    /// Zoom of the surface the position and size were captured at.
    #[serde(default = "unit_zoom")]
    pub surface_zoom: f64,
    pub payload: AnnotationPayload,
}

fn unit_zoom() -> f64 {
    1.0
}

impl AnnotationObject {
    /// A new, unrotated annotation captured at `surface_zoom`.
    pub fn new(
        target: PageId,
        position: Point,
        size: Size,
        surface_zoom: f64,
        payload: AnnotationPayload,
    ) -> Self {
        Self {
            id: AnnotationId::new(),
            target,
            position,
            size,
            rotation_degrees: 0.0,
            surface_zoom,
            payload,
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        self.payload.kind()
    }

    /// On-surface extent of the object.
    pub fn extent(&self) -> Size {
        match &self.payload {
            AnnotationPayload::Image { .. } => self.size,
            AnnotationPayload::Text { text, font_size } => text_extent(text, *font_size),
        }
    }
}

/// Approximate extent of a single-line Helvetica run.
pub fn text_extent(text: &str, font_size: f64) -> Size {
    let chars = text.chars().count() as f64;
    Size::new(chars * font_size * HELVETICA_AVG_ADVANCE, font_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_extent_scales_with_font_size() {
        let small = text_extent("hello", 10.0);
        let large = text_extent("hello", 20.0);
        assert_eq!(small.height, 10.0);
        assert!((large.width - 2.0 * small.width).abs() < 1e-9);
    }

    #[test]
    fn image_payload_sniffs_format() {
        let payload = AnnotationPayload::image(vec![0xFF, 0xD8, 0xFF, 0xDB]);
        assert_eq!(payload.kind(), AnnotationKind::Image);
        match payload {
            AnnotationPayload::Image { format, .. } => assert_eq!(format, Some(ImageKind::Jpeg)),
            AnnotationPayload::Text { .. } => unreachable!(),
        }
    }

    #[test]
    fn surface_zoom_defaults_to_one_when_absent() {
        let object = AnnotationObject::new(
            PageId::new(),
            Point::new(1.0, 2.0),
            Size::new(3.0, 4.0),
            2.0,
            AnnotationPayload::text("hi", 12.0),
        );
        let mut value = serde_json::to_value(&object).unwrap();
        value.as_object_mut().unwrap().remove("surface_zoom");
        let back: AnnotationObject = serde_json::from_value(value).unwrap();
        assert_eq!(back.surface_zoom, 1.0);
        assert_eq!(back.position, object.position);
    }

    #[test]
    fn negative_sizes_are_invalid() {
        assert!(Size::new(0.0, 4.0).is_valid());
        assert!(!Size::new(-1.0, 4.0).is_valid());
        assert!(!Size::new(f64::NAN, 4.0).is_valid());
    }
}
