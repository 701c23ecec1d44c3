// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Edit session — one loaded document, its page sequence and its annotation
// layer, driven by cooperative async tasks.
//
// The session is a cheap handle: clones share the same state. Long per-page
// loops yield to the runtime between pages. Nothing holds the state lock
// across an await point; rebuilds work on a snapshot taken when they start.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::{Rgba, RgbaImage};
use pagesmith_core::annotation::{AnnotationObject, AnnotationPayload, Point, Size};
use pagesmith_core::config::ToolkitConfig;
use pagesmith_core::error::{PagesmithError, Result};
use pagesmith_core::{AnnotationId, PageId, PageSize, SourceRef};
use pagesmith_document::{PageExtractor, RasterImage, Rebuilder, SourceDocument};
use tracing::{debug, info, instrument, warn};

use crate::annotations::{AnnotationLayer, PageSnapshot};
use crate::sequence::EditSequence;

/// Result of a long-running session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome<T> {
    Completed(T),
    /// The session was reset or reloaded while the task ran; its result
    /// belongs to a document that is gone.
    Discarded,
}

impl<T> SessionOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Discarded => None,
        }
    }
}

pub type RebuildOutcome = SessionOutcome<Vec<u8>>;

#[derive(Default)]
struct SessionState {
    source: Option<Arc<SourceDocument>>,
    sequence: EditSequence,
    annotations: AnnotationLayer,
    selection: HashSet<PageId>,
}

impl SessionState {
    fn source(&self) -> Result<Arc<SourceDocument>> {
        self.source.clone().ok_or(PagesmithError::NoDocument)
    }

    fn clear_edits(&mut self) {
        self.sequence = self.sequence.reset();
        self.annotations.clear();
        self.selection.clear();
    }

    /// Delete pages and everything that hangs off them.
    fn delete_pages(&mut self, ids: &[PageId]) -> Result<Option<PageId>> {
        let (sequence, next) = self.sequence.delete_many(ids)?;
        for id in ids {
            self.annotations.remove_for_page(*id);
            self.selection.remove(id);
        }
        self.sequence = sequence;
        Ok(next)
    }
}

/// Clears the busy flag when a save ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PagesmithError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared editing session.
///
/// All fields are cheaply cloneable so the handle can be moved into async
/// blocks without lifetime issues.
#[derive(Clone)]
pub struct EditSession {
    state: Arc<Mutex<SessionState>>,
    generation: Arc<AtomicU64>,
    busy: Arc<AtomicBool>,
    extractor: Arc<PageExtractor>,
    rebuilder: Rebuilder,
    config: Arc<ToolkitConfig>,
}

impl EditSession {
    /// Build a session whose rasterizer is chosen by `config.render`.
    pub fn new(config: ToolkitConfig) -> Result<Self> {
        let extractor = PageExtractor::new(config.render.clone())?;
        Ok(Self::with_extractor(config, extractor))
    }

    pub fn with_extractor(config: ToolkitConfig, extractor: PageExtractor) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            busy: Arc::new(AtomicBool::new(false)),
            extractor: Arc::new(extractor),
            rebuilder: Rebuilder::from_config(&config),
            config: Arc::new(config),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) != generation
    }

    pub fn config(&self) -> &ToolkitConfig {
        &self.config
    }

    /// Increases on every load and reset.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether a save is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    // -- Document lifecycle ---------------------------------------------------

    /// Load a PDF and start a fresh sequence over its pages. Loading the bytes
    /// that are already open reuses the parsed document. Returns the page count.
    #[instrument(skip_all, fields(bytes_len = bytes.len()))]
    pub async fn load(&self, bytes: Vec<u8>) -> Result<usize> {
        let current = self.lock().source.clone();
        let source = match current {
            Some(source) if source.is_same_source(&bytes) => {
                debug!(fingerprint = source.fingerprint(), "Same document, skipping parse");
                source
            }
            _ => {
                tokio::task::yield_now().await;
                Arc::new(self.extractor.open(bytes)?)
            }
        };

        let page_count = source.page_count();
        self.bump_generation();
        let mut state = self.lock();
        state.clear_edits();
        state.sequence = EditSequence::initialize(page_count);
        state.source = Some(source);
        info!(pages = page_count, "Document loaded");
        Ok(page_count)
    }

    /// Forget the document and every edit. Tasks still running for the old
    /// document will report [`SessionOutcome::Discarded`].
    pub fn reset(&self) {
        self.bump_generation();
        let mut state = self.lock();
        state.clear_edits();
        state.source = None;
        info!("Session reset");
    }

    pub fn has_document(&self) -> bool {
        self.lock().source.is_some()
    }

    /// Snapshot of the current page sequence.
    pub fn sequence(&self) -> EditSequence {
        self.lock().sequence.clone()
    }

    pub fn page_count(&self) -> usize {
        self.lock().sequence.len()
    }

    // -- Page operations ------------------------------------------------------

    pub fn reorder(&self, from: usize, to: usize) -> Result<()> {
        let mut state = self.lock();
        state.sequence = state.sequence.reorder(from, to)?;
        Ok(())
    }

    /// Delete a page together with its annotations. Returns the page to
    /// select next.
    pub fn delete_page(&self, id: PageId) -> Result<Option<PageId>> {
        self.lock().delete_pages(&[id])
    }

    pub fn delete_pages(&self, ids: &[PageId]) -> Result<Option<PageId>> {
        self.lock().delete_pages(ids)
    }

    /// Insert a blank page after `after`, or at the end when `None`.
    pub fn insert_blank(&self, after: Option<PageId>) -> Result<PageId> {
        let mut state = self.lock();
        if state.source.is_none() {
            return Err(PagesmithError::NoDocument);
        }
        let (sequence, id) = match after {
            Some(after) => state.sequence.insert_blank(after)?,
            None => state.sequence.push_blank(),
        };
        state.sequence = sequence;
        Ok(id)
    }

    pub fn rotate_page(&self, id: PageId, delta: i32) -> Result<()> {
        let mut state = self.lock();
        state.sequence = state.sequence.rotate(id, delta)?;
        Ok(())
    }

    pub fn rotate_pages(&self, ids: &[PageId], delta: i32) -> Result<()> {
        let mut state = self.lock();
        state.sequence = state.sequence.rotate_many(ids, delta)?;
        Ok(())
    }

    // -- Selection ------------------------------------------------------------

    /// Flip a page in or out of the multi-selection. Returns whether it is
    /// now selected.
    pub fn toggle_selection(&self, id: PageId) -> Result<bool> {
        let mut state = self.lock();
        if !state.sequence.contains(id) {
            return Err(PagesmithError::NotFound(id));
        }
        if state.selection.remove(&id) {
            Ok(false)
        } else {
            state.selection.insert(id);
            Ok(true)
        }
    }

    pub fn clear_selection(&self) {
        self.lock().selection.clear();
    }

    /// Selected pages in sequence order.
    pub fn selection(&self) -> Vec<PageId> {
        let state = self.lock();
        state
            .sequence
            .iter()
            .map(|page| page.id)
            .filter(|id| state.selection.contains(id))
            .collect()
    }

    pub fn delete_selected(&self) -> Result<Option<PageId>> {
        let ids = self.selection();
        if ids.is_empty() {
            return Ok(None);
        }
        self.lock().delete_pages(&ids)
    }

    pub fn rotate_selected(&self, delta: i32) -> Result<()> {
        let ids = self.selection();
        self.rotate_pages(&ids, delta)
    }

    // -- Annotations ----------------------------------------------------------

    pub fn set_zoom(&self, zoom: f64) -> Result<()> {
        self.lock().annotations.set_zoom(zoom)
    }

    pub fn zoom(&self) -> f64 {
        self.lock().annotations.zoom()
    }

    pub fn place_image(
        &self,
        target: PageId,
        position: Point,
        size: Size,
        bytes: Vec<u8>,
    ) -> Result<AnnotationId> {
        self.place(target, position, size, AnnotationPayload::image(bytes))
    }

    /// Place text at the configured default font size when `font_size` is
    /// `None`.
    pub fn place_text(
        &self,
        target: PageId,
        position: Point,
        text: &str,
        font_size: Option<f64>,
    ) -> Result<AnnotationId> {
        let font_size = font_size.unwrap_or(self.config.default_font_size);
        self.place(
            target,
            position,
            Size::default(),
            AnnotationPayload::text(text, font_size),
        )
    }

    fn place(
        &self,
        target: PageId,
        position: Point,
        size: Size,
        payload: AnnotationPayload,
    ) -> Result<AnnotationId> {
        let mut state = self.lock();
        let SessionState {
            sequence,
            annotations,
            ..
        } = &mut *state;
        annotations.place(sequence, target, position, size, payload)
    }

    pub fn move_annotation(&self, id: AnnotationId, position: Point) -> Result<()> {
        self.lock().annotations.move_to(id, position)
    }

    pub fn resize_annotation(&self, id: AnnotationId, size: Size) -> Result<()> {
        self.lock().annotations.resize(id, size)
    }

    pub fn rotate_annotation(&self, id: AnnotationId, degrees: f64) -> Result<()> {
        self.lock().annotations.rotate(id, degrees)
    }

    pub fn remove_annotation(&self, id: AnnotationId) -> Result<AnnotationObject> {
        self.lock().annotations.remove(id)
    }

    pub fn annotations_for(&self, page: PageId) -> Vec<AnnotationObject> {
        self.lock()
            .annotations
            .for_page(page)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn annotation_count(&self) -> usize {
        self.lock().annotations.len()
    }

    /// Serialise a page's annotations, as done when the editor leaves it.
    pub fn capture_page_json(&self, page: PageId) -> Result<String> {
        let state = self.lock();
        if !state.sequence.contains(page) {
            return Err(PagesmithError::NotFound(page));
        }
        state.annotations.capture_json(page)
    }

    /// Put back a page's annotations from [`capture_page_json`] output.
    ///
    /// [`capture_page_json`]: Self::capture_page_json
    pub fn restore_page_json(&self, json: &str) -> Result<PageId> {
        let snapshot: PageSnapshot = serde_json::from_str(json)?;
        let mut state = self.lock();
        if !state.sequence.contains(snapshot.page) {
            return Err(PagesmithError::NotFound(snapshot.page));
        }
        let page = snapshot.page;
        state.annotations.restore(snapshot);
        Ok(page)
    }

    // -- Rendering ------------------------------------------------------------

    /// Render one sequence page at `scale` with its edit rotation applied.
    pub async fn render_page(&self, id: PageId, scale: f32) -> Result<RasterImage> {
        let (source, descriptor) = {
            let state = self.lock();
            let descriptor = state
                .sequence
                .get(id)
                .cloned()
                .ok_or(PagesmithError::NotFound(id))?;
            (state.source()?, descriptor)
        };
        tokio::task::yield_now().await;
        match descriptor.source {
            SourceRef::Original(index) => {
                self.extractor
                    .render_page(&source, index, scale, descriptor.rotation.degrees())
            }
            SourceRef::Blank => blank_canvas(
                self.config.blank_page.into(),
                descriptor.rotation.is_quarter_turn(),
                scale,
            ),
        }
    }

    /// Thumbnails for every page of the sequence, in order. A page that
    /// fails to render becomes `None`.
    #[instrument(skip_all)]
    pub async fn render_thumbnails(&self) -> Result<SessionOutcome<Vec<Option<RasterImage>>>> {
        let generation = self.generation();
        let (source, sequence) = {
            let state = self.lock();
            (state.source()?, state.sequence.clone())
        };
        let scale = self.extractor.config().thumbnail_scale;

        let mut thumbnails = Vec::with_capacity(sequence.len());
        for descriptor in &sequence {
            let rendered = match descriptor.source {
                SourceRef::Original(index) => self.extractor.render_page(
                    &source,
                    index,
                    scale,
                    descriptor.rotation.degrees(),
                ),
                SourceRef::Blank => blank_canvas(
                    self.config.blank_page.into(),
                    descriptor.rotation.is_quarter_turn(),
                    scale,
                ),
            };
            thumbnails.push(match rendered {
                Ok(image) => Some(image),
                Err(err) => {
                    warn!(page = %descriptor.id, %err, "Thumbnail failed, using placeholder");
                    None
                }
            });

            tokio::task::yield_now().await;
            if self.is_stale(generation) {
                debug!("Thumbnails discarded after reset");
                return Ok(SessionOutcome::Discarded);
            }
        }
        Ok(SessionOutcome::Completed(thumbnails))
    }

    // -- Save -----------------------------------------------------------------

    /// Rebuild the edited document. Only one rebuild runs at a time; a second
    /// call while one is in flight fails with [`PagesmithError::Busy`].
    #[instrument(skip_all)]
    pub async fn rebuild(&self) -> Result<RebuildOutcome> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let generation = self.generation();
        let (source, sequence, annotations) = {
            let state = self.lock();
            (
                state.source()?,
                state.sequence.clone(),
                state.annotations.all().to_vec(),
            )
        };

        let mut job = self.rebuilder.start(&source, sequence.as_slice());
        while job.copy_next()? {
            let (done, total) = job.progress();
            debug!(done, total, "Rebuild progress");
            tokio::task::yield_now().await;
            if self.is_stale(generation) {
                info!("Rebuild discarded after reset");
                return Ok(SessionOutcome::Discarded);
            }
        }
        let bytes = job.finish(&annotations)?;

        if self.is_stale(generation) {
            info!("Rebuild discarded after reset");
            return Ok(SessionOutcome::Discarded);
        }
        info!(
            pages = sequence.len(),
            overlays = annotations.len(),
            output_bytes = bytes.len(),
            "Document rebuilt"
        );
        Ok(SessionOutcome::Completed(bytes))
    }
}

/// White page of `size` points at `scale`, dimensions swapped for a quarter
/// turn.
fn blank_canvas(size: PageSize, quarter_turn: bool, scale: f32) -> Result<RasterImage> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(PagesmithError::Zoom(f64::from(scale)));
    }
    let width = (size.width * f64::from(scale)).round().max(1.0) as u32;
    let height = (size.height * f64::from(scale)).round().max(1.0) as u32;
    let (width, height) = if quarter_turn {
        (height, width)
    } else {
        (width, height)
    };
    Ok(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
}
