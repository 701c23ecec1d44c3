// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page assembly — a fresh output document with its own page tree, and a
// copier that imports pages (plus everything they reference) from a source
// document.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use pagesmith_core::error::{PagesmithError, Result};
use pagesmith_core::{PageSize, Rotation};
use tracing::{debug, warn};

use super::reader::{SourceDocument, inherited_attribute, resolve};
use crate::raster::decode::decoded_page_content;

/// Page attributes that PDF lets a page inherit from its ancestors. They are
/// materialised on the copy because the copy gets a new parent.
const INHERITABLE: &[&[u8]] = &[b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

fn media_box(size: PageSize) -> Vec<Object> {
    vec![
        0.into(),
        0.into(),
        (size.width as f32).into(),
        (size.height as f32).into(),
    ]
}

/// An output document under construction.
pub(crate) struct OutputDocument {
    document: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    sizes: Vec<PageSize>,
}

impl OutputDocument {
    pub(crate) fn new(version: &str) -> Self {
        let mut document = Document::with_version(version);
        let pages_id = document.new_object_id();
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);
        Self {
            document,
            pages_id,
            kids: Vec::new(),
            sizes: Vec::new(),
        }
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub(crate) fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Object id and size of the output page at `position`.
    pub(crate) fn page(&self, position: usize) -> Option<(ObjectId, PageSize)> {
        Some((*self.kids.get(position)?, *self.sizes.get(position)?))
    }

    /// Append an empty page of the given size.
    pub(crate) fn push_blank(&mut self, size: PageSize) -> ObjectId {
        let contents_id = self.document.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box(size),
            "Resources" => dictionary! {},
            "Contents" => contents_id,
        });
        self.kids.push(page_id);
        self.sizes.push(size);
        page_id
    }

    /// Append a page whose content is the given stream and resources.
    pub(crate) fn push_page(
        &mut self,
        size: PageSize,
        resources: Dictionary,
        content: Vec<u8>,
    ) -> ObjectId {
        let contents_id = self.document.add_object(Stream::new(dictionary! {}, content));
        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box(size),
            "Resources" => resources,
            "Contents" => contents_id,
        });
        self.kids.push(page_id);
        self.sizes.push(size);
        page_id
    }

    /// Copy page `page_index` of the copier's source and append it. When
    /// `rotation` is given it replaces the page's /Rotate outright.
    pub(crate) fn push_copy(
        &mut self,
        copier: &mut PageCopier<'_>,
        page_index: usize,
        rotation: Option<Rotation>,
    ) -> Result<ObjectId> {
        let page_id = copier.copy_page(&mut self.document, page_index)?;
        let dict = self
            .document
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| PagesmithError::Rebuild {
                page_index,
                reason: format!("copied page is not a dictionary: {err}"),
            })?;
        dict.set("Parent", self.pages_id);
        if let Some(rotation) = rotation {
            dict.set("Rotate", i64::from(rotation.degrees()));
        }
        self.kids.push(page_id);
        self.sizes.push(copier.source.page_size(page_index)?);
        Ok(page_id)
    }

    /// Write the page tree root and serialise.
    pub(crate) fn finish(mut self) -> Result<Vec<u8>> {
        let kids: Vec<Object> = self.kids.iter().map(|&id| Object::Reference(id)).collect();
        let count = kids.len() as i64;
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        self.document.compress();

        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|err| PagesmithError::Pdf(format!("failed to serialise PDF: {}", err)))?;
        debug!(pages = count, output_bytes = output.len(), "Output document serialised");
        Ok(output)
    }
}

/// Imports pages from one source document into an output document.
///
/// Objects shared between pages (fonts, images, resource dictionaries) are
/// copied once per copier and reused, and reference cycles are followed only
/// once. Use one copier per source per output document.
pub(crate) struct PageCopier<'a> {
    source: &'a SourceDocument,
    copied: HashMap<ObjectId, ObjectId>,
}

impl<'a> PageCopier<'a> {
    pub(crate) fn new(source: &'a SourceDocument) -> Self {
        Self {
            source,
            copied: HashMap::new(),
        }
    }

    /// Deep-copy a page into `target`, returning the new page's id. The copy
    /// has no /Parent yet.
    pub(crate) fn copy_page(
        &mut self,
        target: &mut Document,
        page_index: usize,
    ) -> Result<ObjectId> {
        let rebuild_err = |reason: String| PagesmithError::Rebuild { page_index, reason };
        let source = self.source;
        let source_doc = source.document();
        let source_page_id = source
            .page_object_id(page_index)
            .map_err(|err| rebuild_err(err.to_string()))?;

        let mut page = source_doc
            .get_dictionary(source_page_id)
            .map_err(|err| rebuild_err(format!("page object unreadable: {err}")))?
            .clone();

        // The page's own /Parent links back into the source page tree; the
        // caller sets the output parent. Nested /Parent keys (popups, form
        // fields) are ordinary references and are copied.
        page.remove(b"Parent");

        // Fail here rather than emit a page whose content cannot be read.
        decoded_page_content(source_doc, source_page_id).map_err(rebuild_err)?;

        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(source_doc, source_page_id, key) {
                    page.set(key.to_vec(), resolve(source_doc, value).clone());
                }
            }
        }

        // Each copy of a page is a distinct object even when the same source
        // page is imported twice; shared resources stay shared.
        let new_page_id = target.new_object_id();
        let previous = self.copied.insert(source_page_id, new_page_id);

        let cloned = self.clone_dictionary(target, &page);
        match previous {
            Some(prior) => {
                self.copied.insert(source_page_id, prior);
            }
            None => {
                self.copied.remove(&source_page_id);
            }
        }
        let cloned = cloned.map_err(rebuild_err)?;

        target.objects.insert(new_page_id, Object::Dictionary(cloned));
        Ok(new_page_id)
    }

    fn clone_dictionary(
        &mut self,
        target: &mut Document,
        dict: &Dictionary,
    ) -> std::result::Result<Dictionary, String> {
        let mut out = Dictionary::new();
        for (key, value) in dict.iter() {
            out.set(key.clone(), self.clone_object(target, value)?);
        }
        Ok(out)
    }

    fn clone_object(
        &mut self,
        target: &mut Document,
        object: &Object,
    ) -> std::result::Result<Object, String> {
        match object {
            Object::Reference(id) => Ok(Object::Reference(self.clone_reference(target, *id)?)),
            Object::Dictionary(dict) => {
                Ok(Object::Dictionary(self.clone_dictionary(target, dict)?))
            }
            Object::Array(items) => items
                .iter()
                .map(|item| self.clone_object(target, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Object::Array),
            Object::Stream(stream) => {
                let dict = self.clone_dictionary(target, &stream.dict)?;
                let mut copy = Stream::new(dict, stream.content.clone());
                copy.allows_compression = stream.allows_compression;
                Ok(Object::Stream(copy))
            }
            other => Ok(other.clone()),
        }
    }

    fn clone_reference(
        &mut self,
        target: &mut Document,
        source_id: ObjectId,
    ) -> std::result::Result<ObjectId, String> {
        if let Some(&existing) = self.copied.get(&source_id) {
            return Ok(existing);
        }
        let source = self.source;
        let referenced = match source.document().get_object(source_id) {
            Ok(object) => object,
            Err(err) => {
                // A dangling reference means null in PDF.
                warn!(?source_id, %err, "Cannot resolve reference, using Null");
                let null_id = target.add_object(Object::Null);
                self.copied.insert(source_id, null_id);
                return Ok(null_id);
            }
        };

        // Reserve the id first so cycles resolve to it.
        let new_id = target.new_object_id();
        self.copied.insert(source_id, new_id);
        let cloned = self.clone_object(target, referenced)?;
        target.objects.insert(new_id, cloned);
        Ok(new_id)
    }
}
