// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Edit sequence — the ordered list of output pages.
//
// Every operation returns a new sequence and leaves the receiver untouched, so
// a snapshot taken before an edit (for example by a save in progress) never
// changes underneath its holder.

use std::collections::HashSet;
use std::sync::Arc;

use pagesmith_core::error::{PagesmithError, Result};
use pagesmith_core::{PageDescriptor, PageId};
use tracing::debug;

/// Ordered page descriptors. Cheap to clone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditSequence {
    pages: Arc<Vec<PageDescriptor>>,
}

impl EditSequence {
    /// One `Original` descriptor per source page, in source order, each with
    /// a fresh identity and no rotation.
    pub fn initialize(page_count: usize) -> Self {
        Self::from_pages((0..page_count).map(PageDescriptor::original).collect())
    }

    fn from_pages(pages: Vec<PageDescriptor>) -> Self {
        Self {
            pages: Arc::new(pages),
        }
    }

    /// The empty sequence.
    pub fn reset(&self) -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PageDescriptor> {
        self.pages.iter()
    }

    pub fn as_slice(&self) -> &[PageDescriptor] {
        &self.pages
    }

    pub fn position_of(&self, id: PageId) -> Option<usize> {
        self.pages.iter().position(|page| page.id == id)
    }

    pub fn get(&self, id: PageId) -> Option<&PageDescriptor> {
        self.pages.iter().find(|page| page.id == id)
    }

    pub fn contains(&self, id: PageId) -> bool {
        self.position_of(id).is_some()
    }

    fn require(&self, id: PageId) -> Result<usize> {
        self.position_of(id).ok_or(PagesmithError::NotFound(id))
    }

    fn check_position(&self, position: usize) -> Result<()> {
        if position < self.pages.len() {
            Ok(())
        } else {
            Err(PagesmithError::Range {
                position,
                len: self.pages.len(),
            })
        }
    }

    /// Move the page at `from` to `to`, shifting the pages in between.
    pub fn reorder(&self, from: usize, to: usize) -> Result<Self> {
        self.check_position(from)?;
        self.check_position(to)?;
        if from == to {
            return Ok(self.clone());
        }
        let mut pages = self.pages.to_vec();
        let moved = pages.remove(from);
        pages.insert(to, moved);
        debug!(from, to, "Page moved");
        Ok(Self::from_pages(pages))
    }

    /// Remove a page. Also returns the page to select next: the one now at the
    /// deleted position, else the new last page, else none.
    pub fn delete(&self, id: PageId) -> Result<(Self, Option<PageId>)> {
        self.delete_many(&[id])
    }

    /// Remove several pages at once. Fails without changes if any is missing.
    pub fn delete_many(&self, ids: &[PageId]) -> Result<(Self, Option<PageId>)> {
        let mut first_position = usize::MAX;
        for &id in ids {
            first_position = first_position.min(self.require(id)?);
        }
        let doomed: HashSet<PageId> = ids.iter().copied().collect();
        let pages: Vec<PageDescriptor> = self
            .pages
            .iter()
            .filter(|page| !doomed.contains(&page.id))
            .cloned()
            .collect();

        let neighbour = pages
            .get(first_position)
            .or_else(|| pages.last())
            .map(|page| page.id);
        debug!(removed = doomed.len(), remaining = pages.len(), "Pages deleted");
        Ok((Self::from_pages(pages), neighbour))
    }

    /// Insert a blank page directly after `after`. Returns the new page's id.
    pub fn insert_blank(&self, after: PageId) -> Result<(Self, PageId)> {
        let position = self.require(after)?;
        let blank = PageDescriptor::blank();
        let id = blank.id;
        let mut pages = self.pages.to_vec();
        pages.insert(position + 1, blank);
        Ok((Self::from_pages(pages), id))
    }

    /// Append a blank page at the end. Works on an empty sequence too.
    pub fn push_blank(&self) -> (Self, PageId) {
        let blank = PageDescriptor::blank();
        let id = blank.id;
        let mut pages = self.pages.to_vec();
        pages.push(blank);
        (Self::from_pages(pages), id)
    }

    /// Add `delta` (a multiple of 90, negative allowed) to a page's rotation.
    pub fn rotate(&self, id: PageId, delta: i32) -> Result<Self> {
        self.rotate_many(&[id], delta)
    }

    /// Rotate several pages by the same delta. Fails without changes if any
    /// page is missing or the delta is not a right angle.
    pub fn rotate_many(&self, ids: &[PageId], delta: i32) -> Result<Self> {
        let mut pages = self.pages.to_vec();
        for &id in ids {
            let position = self.require(id)?;
            let page = &mut pages[position];
            page.rotation = page.rotation.rotated_by(delta)?;
        }
        Ok(Self::from_pages(pages))
    }
}

impl<'a> IntoIterator for &'a EditSequence {
    type Item = &'a PageDescriptor;
    type IntoIter = std::slice::Iter<'a, PageDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
