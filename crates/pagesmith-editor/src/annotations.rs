// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Annotation layer — overlays placed on pages, kept in surface coordinates
// until the document is rebuilt.

use pagesmith_core::annotation::{AnnotationObject, AnnotationPayload, Point, Size};
use pagesmith_core::error::{PagesmithError, Result};
use pagesmith_core::{AnnotationId, PageId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sequence::EditSequence;

/// Every annotation placed on one page, as captured when the editor leaves
/// that page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub page: PageId,
    pub objects: Vec<AnnotationObject>,
}

/// Overlays for all pages of a session.
#[derive(Debug, Clone)]
pub struct AnnotationLayer {
    objects: Vec<AnnotationObject>,
    /// Zoom of the editing surface new placements are captured at.
    zoom: f64,
}

impl Default for AnnotationLayer {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            zoom: 1.0,
        }
    }
}

fn check_zoom(zoom: f64) -> Result<()> {
    if zoom.is_finite() && zoom > 0.0 {
        Ok(())
    } else {
        Err(PagesmithError::Zoom(zoom))
    }
}

fn check_size(size: Size) -> Result<()> {
    if size.is_valid() {
        Ok(())
    } else {
        Err(PagesmithError::InvalidGeometry(format!(
            "size {}x{} must be finite and non-negative",
            size.width, size.height
        )))
    }
}

fn check_point(point: Point) -> Result<()> {
    if point.x.is_finite() && point.y.is_finite() {
        Ok(())
    } else {
        Err(PagesmithError::InvalidGeometry(format!(
            "position ({}, {}) must be finite",
            point.x, point.y
        )))
    }
}

impl AnnotationLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Set the surface zoom used for annotations placed from now on.
    pub fn set_zoom(&mut self, zoom: f64) -> Result<()> {
        check_zoom(zoom)?;
        self.zoom = zoom;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn all(&self) -> &[AnnotationObject] {
        &self.objects
    }

    pub fn get(&self, id: AnnotationId) -> Option<&AnnotationObject> {
        self.objects.iter().find(|object| object.id == id)
    }

    pub fn for_page(&self, page: PageId) -> Vec<&AnnotationObject> {
        self.objects
            .iter()
            .filter(|object| object.target == page)
            .collect()
    }

    fn get_mut(&mut self, id: AnnotationId) -> Result<&mut AnnotationObject> {
        self.objects
            .iter_mut()
            .find(|object| object.id == id)
            .ok_or_else(|| PagesmithError::AnnotationNotFound(id.to_string()))
    }

    /// Place a new overlay on `target`, which must be in `sequence`.
    /// `size` is only used by images; text sizes itself.
    pub fn place(
        &mut self,
        sequence: &EditSequence,
        target: PageId,
        position: Point,
        size: Size,
        payload: AnnotationPayload,
    ) -> Result<AnnotationId> {
        if !sequence.contains(target) {
            return Err(PagesmithError::NotFound(target));
        }
        check_point(position)?;
        check_size(size)?;
        if let AnnotationPayload::Text { font_size, .. } = &payload {
            if !(font_size.is_finite() && *font_size > 0.0) {
                return Err(PagesmithError::InvalidGeometry(format!(
                    "font size {font_size} must be positive"
                )));
            }
        }

        let object = AnnotationObject::new(target, position, size, self.zoom, payload);
        let id = object.id;
        debug!(%id, page = %target, kind = ?object.kind(), "Annotation placed");
        self.objects.push(object);
        Ok(id)
    }

    pub fn move_to(&mut self, id: AnnotationId, position: Point) -> Result<()> {
        check_point(position)?;
        self.get_mut(id)?.position = position;
        Ok(())
    }

    pub fn resize(&mut self, id: AnnotationId, size: Size) -> Result<()> {
        check_size(size)?;
        self.get_mut(id)?.size = size;
        Ok(())
    }

    /// Set the overlay's own rotation, clockwise in degrees.
    pub fn rotate(&mut self, id: AnnotationId, degrees: f64) -> Result<()> {
        if !degrees.is_finite() {
            return Err(PagesmithError::InvalidGeometry(format!(
                "rotation {degrees} must be finite"
            )));
        }
        self.get_mut(id)?.rotation_degrees = degrees.rem_euclid(360.0);
        Ok(())
    }

    pub fn remove(&mut self, id: AnnotationId) -> Result<AnnotationObject> {
        let position = self
            .objects
            .iter()
            .position(|object| object.id == id)
            .ok_or_else(|| PagesmithError::AnnotationNotFound(id.to_string()))?;
        Ok(self.objects.remove(position))
    }

    /// Drop every overlay on `page`. Returns how many were removed.
    pub fn remove_for_page(&mut self, page: PageId) -> usize {
        let before = self.objects.len();
        self.objects.retain(|object| object.target != page);
        let removed = before - self.objects.len();
        if removed > 0 {
            debug!(%page, removed, "Annotations discarded with page");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    // -- Per-page capture and restore -----------------------------------------

    pub fn capture(&self, page: PageId) -> PageSnapshot {
        PageSnapshot {
            page,
            objects: self.for_page(page).into_iter().cloned().collect(),
        }
    }

    /// Replace the overlays of the snapshot's page with the snapshot's.
    pub fn restore(&mut self, snapshot: PageSnapshot) {
        let PageSnapshot { page, objects } = snapshot;
        self.objects.retain(|object| object.target != page);
        self.objects.extend(objects.into_iter().map(|mut object| {
            object.target = page;
            object
        }));
    }

    pub fn capture_json(&self, page: PageId) -> Result<String> {
        Ok(serde_json::to_string(&self.capture(page))?)
    }

    pub fn restore_json(&mut self, json: &str) -> Result<PageId> {
        let snapshot: PageSnapshot = serde_json::from_str(json)?;
        let page = snapshot.page;
        self.restore(snapshot);
        Ok(page)
    }

    /// The overlays of `page` as they appear on a surface drawn at `zoom`.
    pub fn view_at(&self, page: PageId, zoom: f64) -> Result<Vec<AnnotationObject>> {
        check_zoom(zoom)?;
        Ok(self
            .for_page(page)
            .into_iter()
            .map(|object| {
                let factor = zoom / object.surface_zoom;
                let mut view = object.clone();
                view.position = Point::new(object.position.x * factor, object.position.y * factor);
                view.size = Size::new(object.size.width * factor, object.size.height * factor);
                if let AnnotationPayload::Text { font_size, .. } = &mut view.payload {
                    *font_size *= factor;
                }
                view.surface_zoom = zoom;
                view
            })
            .collect())
    }
}
