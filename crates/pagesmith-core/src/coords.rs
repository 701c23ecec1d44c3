// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Coordinate mapping between the interactive editing surface and PDF user
// space.
//
// Surface space: origin top-left, y grows downward, scaled by the zoom factor
// the page was rendered at. Document space: origin bottom-left, y grows
// upward, unscaled points.

use crate::annotation::{Point, Size};
use crate::error::{PagesmithError, Result};
use crate::types::{PageSize, Rotation};

fn check_zoom(zoom: f64) -> Result<()> {
    if zoom.is_finite() && zoom > 0.0 {
        Ok(())
    } else {
        Err(PagesmithError::Zoom(zoom))
    }
}

/// Map the top-left corner of an object on the surface to the bottom-left
/// corner of the same object in document space.
///
/// `object_height` is in document units.
pub fn surface_to_document(
    point: Point,
    object_height: f64,
    page: PageSize,
    zoom: f64,
) -> Result<Point> {
    check_zoom(zoom)?;
    Ok(Point {
        x: point.x / zoom,
        y: page.height - point.y / zoom - object_height,
    })
}

/// Inverse of [`surface_to_document`].
pub fn document_to_surface(
    point: Point,
    object_height: f64,
    page: PageSize,
    zoom: f64,
) -> Result<Point> {
    check_zoom(zoom)?;
    Ok(Point {
        x: point.x * zoom,
        y: (page.height - point.y - object_height) * zoom,
    })
}

/// Scale a surface size down to document units.
pub fn surface_size_to_document(size: Size, zoom: f64) -> Result<Size> {
    check_zoom(zoom)?;
    Ok(Size::new(size.width / zoom, size.height / zoom))
}

/// Final drawing rotation of an overlay on a rotated page.
///
/// The page's own rotation is subtracted so the overlay reads upright once the
/// viewer applies `/Rotate`.
pub fn placement_rotation(annotation_degrees: f64, page_rotation: Rotation) -> f64 {
    annotation_degrees - f64::from(page_rotation.degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: PageSize = PageSize {
        width: 595.0,
        height: 842.0,
    };

    #[test]
    fn maps_top_left_to_bottom_left() {
        let doc = surface_to_document(Point::new(0.0, 0.0), 100.0, A4, 1.0).unwrap();
        assert_eq!(doc, Point::new(0.0, 742.0));
    }

    #[test]
    fn zoom_divides_surface_offsets() {
        let doc = surface_to_document(Point::new(200.0, 100.0), 10.0, A4, 2.0).unwrap();
        assert_eq!(doc, Point::new(100.0, 842.0 - 50.0 - 10.0));
    }

    #[test]
    fn round_trip_holds_across_zoom_levels() {
        let points = [
            Point::new(0.0, 0.0),
            Point::new(12.5, 840.0),
            Point::new(-30.0, 1200.25),
            Point::new(594.9, 0.1),
        ];
        for zoom in [0.1, 0.5, 1.0, 1.5, 2.0, 3.7, 10.0] {
            for p in points {
                let doc = surface_to_document(p, 24.0, A4, zoom).unwrap();
                let back = document_to_surface(doc, 24.0, A4, zoom).unwrap();
                assert!((back.x - p.x).abs() < 1e-9, "x drift at zoom {zoom}");
                assert!((back.y - p.y).abs() < 1e-9, "y drift at zoom {zoom}");
            }
        }
    }

    #[test]
    fn rejects_non_positive_zoom() {
        for zoom in [0.0, -1.0, f64::INFINITY, f64::NAN] {
            assert!(surface_to_document(Point::default(), 0.0, A4, zoom).is_err());
        }
    }

    #[test]
    fn placement_counter_rotates_page() {
        let page = Rotation::from_degrees(90).unwrap();
        assert_eq!(placement_rotation(0.0, page), -90.0);
        assert_eq!(placement_rotation(30.0, page), -60.0);
        assert_eq!(placement_rotation(15.0, Rotation::NONE), 15.0);
    }
}
