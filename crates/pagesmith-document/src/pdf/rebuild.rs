// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document rebuilder — turns a source document plus an ordered list of page
// descriptors and a set of overlays into new PDF bytes.
//
// The source is only ever read. A failure anywhere aborts the whole rebuild;
// there is no partial output.

use std::collections::HashMap;
use std::sync::Arc;

use pagesmith_core::annotation::AnnotationObject;
use pagesmith_core::config::ToolkitConfig;
use pagesmith_core::error::{PagesmithError, Result};
use pagesmith_core::{PageDescriptor, PageId, PageSize, Rotation, SourceRef};
use tracing::{debug, info, instrument};

use super::overlay::OverlayPainter;
use super::pages::{OutputDocument, PageCopier};
use super::reader::SourceDocument;

/// Stateless page-sequence rebuilder.
#[derive(Debug, Clone, Copy)]
pub struct Rebuilder {
    blank_page: PageSize,
}

impl Default for Rebuilder {
    fn default() -> Self {
        Self::from_config(&ToolkitConfig::default())
    }
}

impl Rebuilder {
    pub fn new(blank_page: PageSize) -> Self {
        Self { blank_page }
    }

    pub fn from_config(config: &ToolkitConfig) -> Self {
        Self::new(config.blank_page.into())
    }

    /// Rebuild in one go.
    #[instrument(skip_all, fields(pages = pages.len(), overlays = annotations.len()))]
    pub fn rebuild(
        &self,
        source: &SourceDocument,
        pages: &[PageDescriptor],
        annotations: &[AnnotationObject],
    ) -> Result<Vec<u8>> {
        let mut job = self.start(source, pages);
        while job.copy_next()? {}
        job.finish(annotations)
    }

    /// Parse `bytes` and rebuild from them.
    pub fn rebuild_bytes(
        &self,
        bytes: impl Into<Arc<[u8]>>,
        pages: &[PageDescriptor],
        annotations: &[AnnotationObject],
    ) -> Result<Vec<u8>> {
        let source = SourceDocument::from_bytes(bytes)?;
        self.rebuild(&source, pages, annotations)
    }

    /// Begin a rebuild that is driven one page at a time, so callers can
    /// yield between pages.
    pub fn start<'a>(
        &self,
        source: &'a SourceDocument,
        pages: &'a [PageDescriptor],
    ) -> RebuildJob<'a> {
        RebuildJob {
            pages,
            output: OutputDocument::new(&source.document().version),
            copier: PageCopier::new(source),
            source,
            blank_page: self.blank_page,
            rotations: Vec::with_capacity(pages.len()),
            next: 0,
        }
    }
}

/// An in-progress rebuild.
pub struct RebuildJob<'a> {
    source: &'a SourceDocument,
    pages: &'a [PageDescriptor],
    output: OutputDocument,
    copier: PageCopier<'a>,
    blank_page: PageSize,
    /// Final /Rotate of each written page.
    rotations: Vec<Rotation>,
    next: usize,
}

impl RebuildJob<'_> {
    /// Pages written so far and the total to write.
    pub fn progress(&self) -> (usize, usize) {
        (self.next, self.pages.len())
    }

    /// Write the next page. Returns `false` once every page is written.
    pub fn copy_next(&mut self) -> Result<bool> {
        let Some(descriptor) = self.pages.get(self.next) else {
            return Ok(false);
        };

        match descriptor.source {
            SourceRef::Blank => {
                let page_id = self.output.push_blank(self.blank_page);
                if descriptor.rotation != Rotation::NONE {
                    let position = self.next;
                    self.output
                        .document_mut()
                        .get_object_mut(page_id)
                        .and_then(lopdf::Object::as_dict_mut)
                        .map_err(|err| PagesmithError::Rebuild {
                            page_index: position,
                            reason: err.to_string(),
                        })?
                        .set("Rotate", i64::from(descriptor.rotation.degrees()));
                }
                self.rotations.push(descriptor.rotation);
            }
            SourceRef::Original(index) => {
                // The descriptor's rotation is the page's absolute /Rotate,
                // so NONE clears any rotation the source page inherited.
                self.output
                    .push_copy(&mut self.copier, index, Some(descriptor.rotation))?;
                self.rotations.push(descriptor.rotation);
            }
        }

        debug!(position = self.next, source = ?descriptor.source, "Page written");
        self.next += 1;
        Ok(true)
    }

    /// Write any remaining pages, draw `annotations` and serialise.
    ///
    /// Annotations whose target is not in the page list are not drawn.
    pub fn finish(mut self, annotations: &[AnnotationObject]) -> Result<Vec<u8>> {
        while self.copy_next()? {}

        let mut by_page: HashMap<PageId, Vec<&AnnotationObject>> = HashMap::new();
        for annotation in annotations {
            by_page.entry(annotation.target).or_default().push(annotation);
        }

        let mut painter = OverlayPainter::new();
        let mut drawn = 0;
        for (position, descriptor) in self.pages.iter().enumerate() {
            let Some(overlays) = by_page.remove(&descriptor.id) else {
                continue;
            };
            let Some((page_id, size)) = self.output.page(position) else {
                continue;
            };
            painter.paint(
                self.output.document_mut(),
                page_id,
                size,
                self.rotations[position],
                &overlays,
            )?;
            drawn += overlays.len();
        }
        if !by_page.is_empty() {
            debug!(
                orphaned = by_page.values().map(Vec::len).sum::<usize>(),
                "Skipping annotations for pages not in the sequence"
            );
        }

        let bytes = self.output.finish()?;
        info!(
            pages = self.pages.len(),
            overlays = drawn,
            output_bytes = bytes.len(),
            "Document rebuilt"
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{init_tracing, jpeg_bytes, page_text, png_bytes, sample_pdf};
    use lopdf::Object;
    use pagesmith_core::annotation::{AnnotationPayload, Point, Size};

    fn originals(count: usize) -> Vec<PageDescriptor> {
        (0..count).map(PageDescriptor::original).collect()
    }

    fn image_overlay(target: PageId, bytes: Vec<u8>) -> AnnotationObject {
        AnnotationObject::new(
            target,
            Point::new(50.0, 60.0),
            Size::new(80.0, 40.0),
            1.0,
            AnnotationPayload::image(bytes),
        )
    }

    /// Names of the image XObjects a page draws from, resolved to streams.
    fn page_images(doc: &SourceDocument, index: usize) -> Vec<lopdf::Stream> {
        let document = doc.document();
        let page = document
            .get_dictionary(doc.page_object_id(index).unwrap())
            .unwrap();
        let resources = match page.get(b"Resources").unwrap() {
            Object::Reference(id) => document.get_dictionary(*id).unwrap(),
            Object::Dictionary(dict) => dict,
            other => panic!("unexpected resources {other:?}"),
        };
        let Ok(xobjects) = resources.get(b"XObject") else {
            return Vec::new();
        };
        let xobjects = match xobjects {
            Object::Reference(id) => document.get_dictionary(*id).unwrap(),
            Object::Dictionary(dict) => dict,
            other => panic!("unexpected xobjects {other:?}"),
        };
        xobjects
            .iter()
            .map(|(_, value)| {
                document
                    .get_object(value.as_reference().unwrap())
                    .unwrap()
                    .as_stream()
                    .unwrap()
                    .clone()
            })
            .collect()
    }

    #[test]
    fn untouched_rebuild_preserves_pages() {
        init_tracing();
        let sizes = [(612.0, 792.0), (300.0, 500.0), (842.0, 595.0)];
        let source = SourceDocument::from_bytes(sample_pdf(&sizes)).unwrap();
        let bytes = Rebuilder::default()
            .rebuild(&source, &originals(3), &[])
            .unwrap();

        let rebuilt = SourceDocument::from_bytes(bytes).unwrap();
        assert_eq!(rebuilt.page_count(), 3);
        for (index, (w, h)) in sizes.iter().enumerate() {
            assert_eq!(rebuilt.page_size(index).unwrap(), PageSize::new(*w, *h));
            assert!(page_text(&rebuilt, index).contains(&format!("Page {}", index + 1)));
        }
    }

    #[test]
    fn follows_order_rotation_and_blanks() {
        let source = SourceDocument::from_bytes(sample_pdf(&[(612.0, 792.0), (300.0, 500.0)]))
            .unwrap();
        let mut second = PageDescriptor::original(1);
        second.rotation = Rotation::from_degrees(270).unwrap();
        let pages = vec![second, PageDescriptor::blank(), PageDescriptor::original(0)];

        let rebuilt =
            SourceDocument::from_bytes(Rebuilder::default().rebuild(&source, &pages, &[]).unwrap())
                .unwrap();
        assert_eq!(rebuilt.page_count(), 3);
        assert!(page_text(&rebuilt, 0).contains("Page 2"));
        assert_eq!(rebuilt.page_rotation(0).unwrap().degrees(), 270);
        assert_eq!(rebuilt.page_size(1).unwrap(), PageSize::new(595.0, 842.0));
        assert!(page_text(&rebuilt, 2).contains("Page 1"));
        assert_eq!(rebuilt.page_rotation(2).unwrap(), Rotation::NONE);
    }

    #[test]
    fn rotation_is_absolute_on_copied_pages() {
        init_tracing();
        // The source page inherits /Rotate 90 from its page tree.
        let source = SourceDocument::from_bytes(crate::testing::inherited_media_box_pdf()).unwrap();
        let mut page = PageDescriptor::original(0);
        page.rotation = Rotation::from_degrees(90).unwrap();

        let rebuilt = SourceDocument::from_bytes(
            Rebuilder::default()
                .rebuild(&source, &[page.clone()], &[])
                .unwrap(),
        )
        .unwrap();
        assert_eq!(rebuilt.page_rotation(0).unwrap().degrees(), 90);

        page.rotation = Rotation::NONE;
        let rebuilt = SourceDocument::from_bytes(
            Rebuilder::default().rebuild(&source, &[page], &[]).unwrap(),
        )
        .unwrap();
        assert_eq!(rebuilt.page_rotation(0).unwrap(), Rotation::NONE);
    }

    #[test]
    fn hex_encoded_content_survives_the_rebuild() {
        init_tracing();
        let source = SourceDocument::from_bytes(crate::testing::hex_content_pdf()).unwrap();
        let bytes = Rebuilder::default()
            .rebuild(&source, &originals(1), &[])
            .unwrap();
        let rebuilt = SourceDocument::from_bytes(bytes).unwrap();
        assert!(page_text(&rebuilt, 0).contains("(Page 1) Tj"));
    }

    #[test]
    fn deleted_page_leaves_no_overlay() {
        let source =
            SourceDocument::from_bytes(sample_pdf(&[(612.0, 792.0), (612.0, 792.0)])).unwrap();
        let pages = originals(2);
        let overlay = image_overlay(pages[1].id, png_bytes(4, 4, false));

        // Page 2 removed from the sequence; its overlay must not be drawn.
        let bytes = Rebuilder::default()
            .rebuild(&source, &pages[..1], &[overlay])
            .unwrap();
        let rebuilt = SourceDocument::from_bytes(bytes).unwrap();
        assert_eq!(rebuilt.page_count(), 1);
        assert!(page_images(&rebuilt, 0).is_empty());
    }

    #[test]
    fn mislabelled_jpeg_overlay_uses_dct() {
        let source = SourceDocument::from_bytes(sample_pdf(&[(612.0, 792.0)])).unwrap();
        let pages = originals(1);
        let mut overlay = image_overlay(pages[0].id, jpeg_bytes(16, 8));
        if let AnnotationPayload::Image { format, .. } = &mut overlay.payload {
            *format = Some(pagesmith_core::ImageKind::Png);
        }

        let bytes = Rebuilder::default()
            .rebuild(&source, &pages, &[overlay])
            .unwrap();
        let rebuilt = SourceDocument::from_bytes(bytes).unwrap();
        let images = page_images(&rebuilt, 0);
        assert_eq!(images.len(), 1);
        assert_eq!(
            images[0].dict.get(b"Filter").unwrap().as_name().unwrap(),
            b"DCTDecode"
        );
        // Original content is kept under the overlay.
        assert!(page_text(&rebuilt, 0).contains("Page 1"));
        assert!(page_text(&rebuilt, 0).contains("Do"));
    }

    #[test]
    fn text_overlays_share_one_font() {
        let source =
            SourceDocument::from_bytes(sample_pdf(&[(612.0, 792.0), (612.0, 792.0)])).unwrap();
        let pages = originals(2);
        let text = |target| {
            AnnotationObject::new(
                target,
                Point::new(10.0, 10.0),
                Size::default(),
                1.0,
                AnnotationPayload::text("Approved", 18.0),
            )
        };
        let bytes = Rebuilder::default()
            .rebuild(&source, &pages, &[text(pages[0].id), text(pages[1].id)])
            .unwrap();
        let rebuilt = SourceDocument::from_bytes(bytes).unwrap();

        let helvetica_fonts = rebuilt
            .document()
            .objects
            .values()
            .filter_map(|object| object.as_dict().ok())
            .filter(|dict| {
                dict.get(b"Encoding")
                    .and_then(Object::as_name)
                    .is_ok_and(|name| name == b"WinAnsiEncoding")
            })
            .count();
        assert_eq!(helvetica_fonts, 1);
        assert!(page_text(&rebuilt, 1).contains("(Approved) Tj"));
    }

    #[test]
    fn undecodable_image_fails_the_rebuild() {
        let source = SourceDocument::from_bytes(sample_pdf(&[(612.0, 792.0)])).unwrap();
        let pages = originals(1);
        let overlay = image_overlay(pages[0].id, b"not an image at all".to_vec());
        let err = Rebuilder::default()
            .rebuild(&source, &pages, &[overlay])
            .unwrap_err();
        assert!(matches!(err, PagesmithError::Annotation(_)));
    }

    #[test]
    fn corrupt_source_page_fails_with_its_index() {
        let source = SourceDocument::from_bytes(crate::testing::corrupt_page_pdf()).unwrap();
        let err = Rebuilder::default()
            .rebuild(&source, &originals(3), &[])
            .unwrap_err();
        assert!(matches!(err, PagesmithError::Rebuild { page_index: 1, .. }));
    }

    #[test]
    fn stepwise_job_reports_progress() {
        let source =
            SourceDocument::from_bytes(sample_pdf(&[(612.0, 792.0), (612.0, 792.0)])).unwrap();
        let pages = originals(2);
        let mut job = Rebuilder::default().start(&source, &pages);
        assert_eq!(job.progress(), (0, 2));
        assert!(job.copy_next().unwrap());
        assert_eq!(job.progress(), (1, 2));
        let bytes = job.finish(&[]).unwrap();
        assert_eq!(SourceDocument::from_bytes(bytes).unwrap().page_count(), 2);
    }
}
