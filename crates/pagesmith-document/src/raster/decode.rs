// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stream decoding — runs a stream's /Filter chain. lopdf handles the
// compression filters; the two ASCII/run-length text filters it lacks are
// decoded here.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Concatenate the page's content streams, decoded.
pub(crate) fn decoded_page_content(
    document: &Document,
    page_id: ObjectId,
) -> std::result::Result<Vec<u8>, String> {
    let mut content = Vec::new();
    for stream_id in document.get_page_contents(page_id) {
        let stream = document
            .get_object(stream_id)
            .and_then(Object::as_stream)
            .map_err(|err| format!("content stream {stream_id:?} unreadable: {err}"))?;
        content.extend_from_slice(&decode_stream(stream)?);
        content.push(b'\n');
    }
    Ok(content)
}

/// Apply every filter of `stream` in order. Image codecs (DCT, JPX, CCITT,
/// JBIG2) are not content filters and are rejected like unknown names.
pub(crate) fn decode_stream(stream: &Stream) -> std::result::Result<Vec<u8>, String> {
    let filters = filter_names(&stream.dict)?;
    if filters.is_empty() {
        return Ok(stream.content.clone());
    }
    let params = decode_params(&stream.dict);

    let mut data = stream.content.clone();
    for (position, filter) in filters.iter().enumerate() {
        data = match filter.as_slice() {
            b"ASCIIHexDecode" | b"AHx" => ascii_hex(&data)?,
            b"RunLengthDecode" | b"RL" => run_length(&data)?,
            b"FlateDecode" | b"Fl" => with_lopdf(b"FlateDecode", params.get(position), data)?,
            b"LZWDecode" | b"LZW" => with_lopdf(b"LZWDecode", params.get(position), data)?,
            b"ASCII85Decode" | b"A85" => with_lopdf(b"ASCII85Decode", None, data)?,
            other => {
                return Err(format!(
                    "unsupported stream filter /{}",
                    String::from_utf8_lossy(other)
                ));
            }
        };
    }
    Ok(data)
}

fn filter_names(dict: &Dictionary) -> std::result::Result<Vec<Vec<u8>>, String> {
    match dict.get(b"Filter") {
        Err(_) | Ok(Object::Null) => Ok(Vec::new()),
        Ok(Object::Name(name)) => Ok(vec![name.clone()]),
        Ok(Object::Array(items)) => items
            .iter()
            .map(|item| item.as_name().map(<[u8]>::to_vec))
            .collect::<lopdf::Result<_>>()
            .map_err(|err| format!("malformed /Filter array: {err}")),
        Ok(other) => Err(format!("malformed /Filter {other:?}")),
    }
}

/// /DecodeParms per filter position. A single dictionary belongs to the first
/// filter.
fn decode_params(dict: &Dictionary) -> Vec<Option<Dictionary>> {
    match dict.get(b"DecodeParms") {
        Ok(Object::Dictionary(params)) => vec![Some(params.clone())],
        Ok(Object::Array(items)) => items
            .iter()
            .map(|item| item.as_dict().ok().cloned())
            .collect(),
        _ => Vec::new(),
    }
}

fn with_lopdf(
    filter: &[u8],
    params: Option<&Option<Dictionary>>,
    data: Vec<u8>,
) -> std::result::Result<Vec<u8>, String> {
    let mut dict = Dictionary::new();
    dict.set("Filter", Object::Name(filter.to_vec()));
    if let Some(Some(params)) = params {
        dict.set("DecodeParms", params.clone());
    }
    Stream::new(dict, data)
        .decompressed_content()
        .map_err(|err| format!("cannot decode /{}: {err}", String::from_utf8_lossy(filter)))
}

fn ascii_hex(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;
    for &byte in data {
        if byte == b'>' {
            break;
        }
        if byte.is_ascii_whitespace() {
            continue;
        }
        let nibble = (byte as char)
            .to_digit(16)
            .ok_or_else(|| format!("invalid ASCIIHex digit {:?}", byte as char))?
            as u8;
        match high.take() {
            Some(h) => out.push((h << 4) | nibble),
            None => high = Some(nibble),
        }
    }
    // An odd trailing digit is padded with 0.
    if let Some(h) = high {
        out.push(h << 4);
    }
    Ok(out)
}

fn run_length(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut index = 0;
    while index < data.len() {
        let length = data[index];
        index += 1;
        match length {
            128 => break,
            0..=127 => {
                let count = usize::from(length) + 1;
                let literal = data
                    .get(index..index + count)
                    .ok_or("RunLength literal run past end of data")?;
                out.extend_from_slice(literal);
                index += count;
            }
            _ => {
                let byte = *data
                    .get(index)
                    .ok_or("RunLength repeat run past end of data")?;
                out.extend(std::iter::repeat_n(byte, 257 - usize::from(length)));
                index += 1;
            }
        }
    }
    Ok(out)
}
