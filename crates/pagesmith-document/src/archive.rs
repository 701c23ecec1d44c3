// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serialization sink — named byte buffers and ZIP archives of them.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use pagesmith_core::ImageKind;
use pagesmith_core::error::{PagesmithError, Result};
use tracing::{debug, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A finished output file held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBuffer {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl NamedBuffer {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// `{base}-page-{n}.{ext}` with `n` counted from 1.
pub fn page_file_name(base_name: &str, page_number: usize, kind: ImageKind) -> String {
    format!("{base_name}-page-{page_number}.{}", kind.extension())
}

/// Pack `entries` into a deflate-compressed ZIP archive, in order.
#[instrument(skip_all, fields(entries = entries.len()))]
pub fn zip_buffers(entries: &[NamedBuffer]) -> Result<Vec<u8>> {
    let mut seen = HashSet::new();
    if let Some(duplicate) = entries.iter().find(|entry| !seen.insert(entry.name.as_str())) {
        return Err(PagesmithError::Archive(format!(
            "duplicate entry name {}",
            duplicate.name
        )));
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|err| PagesmithError::Archive(format!("cannot add {}: {err}", entry.name)))?;
        writer.write_all(&entry.bytes)?;
    }
    let archive = writer
        .finish()
        .map_err(|err| PagesmithError::Archive(format!("cannot finish archive: {err}")))?
        .into_inner();

    debug!(archive_bytes = archive.len(), "Archive written");
    Ok(archive)
}
