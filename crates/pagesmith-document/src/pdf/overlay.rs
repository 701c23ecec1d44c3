// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Overlay drawing — images and text runs stamped onto output pages.
//
// Every overlay is drawn in its own `q … Q` block. The page's existing
// content is wrapped in an outer `q … Q` first so any graphics state it leaves
// behind cannot shift the overlays.

use std::io::Cursor;

use image::codecs::jpeg::JpegDecoder;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use pagesmith_core::annotation::{AnnotationObject, AnnotationPayload, Point, Size};
use pagesmith_core::coords::{placement_rotation, surface_size_to_document, surface_to_document};
use pagesmith_core::error::{PagesmithError, Result};
use pagesmith_core::{ImageKind, PageSize, Rotation};
use tracing::{debug, instrument};

use super::reader::owned_dictionary;

/// Resource name of the shared overlay font.
const FONT_RESOURCE: &str = "PsmF0";

/// Draws annotations onto the pages of one output document.
///
/// Holds the per-document shared state: one Helvetica font object for all
/// text overlays and a counter for unique image resource names.
#[derive(Debug, Default)]
pub(crate) struct OverlayPainter {
    font_id: Option<ObjectId>,
    images: usize,
}

/// One overlay, resolved into document space.
struct Placement {
    /// Bottom-left corner before rotation.
    origin: Point,
    size: Size,
    /// Counter-clockwise drawing angle in degrees.
    angle: f64,
}

impl Placement {
    /// Operators that move the origin to the object's centre and turn it.
    fn centre_transform(&self) -> [Operation; 2] {
        let cx = self.origin.x + self.size.width / 2.0;
        let cy = self.origin.y + self.size.height / 2.0;
        let (sin, cos) = self.angle.to_radians().sin_cos();
        [
            cm(1.0, 0.0, 0.0, 1.0, cx, cy),
            cm(cos, sin, -sin, cos, 0.0, 0.0),
        ]
    }
}

impl OverlayPainter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Draw `annotations` on the output page `page_id`.
    ///
    /// `page_size` and `page_rotation` are the page's intrinsic size and the
    /// absolute rotation it was written with.
    #[instrument(skip_all, fields(?page_id, overlays = annotations.len()))]
    pub(crate) fn paint(
        &mut self,
        document: &mut Document,
        page_id: ObjectId,
        page_size: PageSize,
        page_rotation: Rotation,
        annotations: &[&AnnotationObject],
    ) -> Result<()> {
        if annotations.is_empty() {
            return Ok(());
        }

        let page = document
            .get_dictionary(page_id)
            .map_err(|err| PagesmithError::Pdf(format!("output page unreadable: {err}")))?
            .clone();
        let mut resources = inline_resources(document, &page);
        let mut xobjects = Dictionary::new();
        let mut fonts = Dictionary::new();

        let mut operations = vec![Operation::new("Q", vec![])];
        for annotation in annotations {
            let placement = place(annotation, page_size, page_rotation)?;
            operations.push(Operation::new("q", vec![]));
            operations.extend(placement.centre_transform());

            match &annotation.payload {
                AnnotationPayload::Image { bytes, .. } => {
                    let image_id = embed_image(document, bytes).map_err(|reason| {
                        PagesmithError::Annotation(format!("{}: {reason}", annotation.id))
                    })?;
                    let name = format!("PsmIm{}", self.images);
                    self.images += 1;
                    xobjects.set(name.as_bytes().to_vec(), image_id);

                    let Size { width, height } = placement.size;
                    operations.push(cm(width, 0.0, 0.0, height, -width / 2.0, -height / 2.0));
                    operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
                }
                AnnotationPayload::Text { text, font_size } => {
                    let font_id = self.font(document);
                    fonts.set(FONT_RESOURCE, font_id);

                    let size = *font_size / annotation.surface_zoom;
                    let Size { width, height } = placement.size;
                    operations.push(Operation::new("BT", vec![]));
                    operations.push(Operation::new(
                        "Tf",
                        vec![Object::Name(FONT_RESOURCE.into()), real(size)],
                    ));
                    operations.push(Operation::new(
                        "Td",
                        vec![real(-width / 2.0), real(-height / 2.0)],
                    ));
                    operations.push(Operation::new(
                        "Tj",
                        vec![Object::String(win_ansi(text), StringFormat::Literal)],
                    ));
                    operations.push(Operation::new("ET", vec![]));
                }
            }
            operations.push(Operation::new("Q", vec![]));
        }

        merge_subdictionary(document, &mut resources, b"XObject", xobjects);
        merge_subdictionary(document, &mut resources, b"Font", fonts);

        let overlay = Content { operations }
            .encode()
            .map_err(|err| PagesmithError::Pdf(format!("cannot encode overlay content: {err}")))?;
        let open_id = document.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let overlay_id = document.add_object(Stream::new(dictionary! {}, overlay));

        let mut contents = vec![Object::Reference(open_id)];
        match page.get(b"Contents") {
            // A reference may name the stream itself or an array of streams.
            Ok(Object::Reference(id)) => match document.get_object(*id) {
                Ok(Object::Array(items)) => contents.extend(items.iter().cloned()),
                _ => contents.push(Object::Reference(*id)),
            },
            Ok(Object::Array(items)) => contents.extend(items.iter().cloned()),
            _ => {}
        }
        contents.push(Object::Reference(overlay_id));

        let page = document
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| PagesmithError::Pdf(format!("output page unreadable: {err}")))?;
        page.set("Resources", resources);
        page.set("Contents", contents);

        debug!("Overlays drawn");
        Ok(())
    }

    fn font(&mut self, document: &mut Document) -> ObjectId {
        *self.font_id.get_or_insert_with(|| {
            document.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            })
        })
    }
}

fn place(
    annotation: &AnnotationObject,
    page_size: PageSize,
    page_rotation: Rotation,
) -> Result<Placement> {
    let extent = annotation.extent();
    if !extent.is_valid() {
        return Err(PagesmithError::InvalidGeometry(format!(
            "annotation {} has size {}x{}",
            annotation.id, extent.width, extent.height
        )));
    }
    let size = surface_size_to_document(extent, annotation.surface_zoom)?;
    let origin = surface_to_document(
        annotation.position,
        size.height,
        page_size,
        annotation.surface_zoom,
    )?;
    // Placement rotation is clockwise; PDF angles run counter-clockwise.
    let angle = -placement_rotation(annotation.rotation_degrees, page_rotation);
    Ok(Placement {
        origin,
        size,
        angle,
    })
}

/// The page's resource dictionary as an inline copy, with its XObject and
/// Font sub-dictionaries inlined too. Resource dictionaries may be shared
/// between pages, so they are never edited in place.
fn inline_resources(document: &Document, page: &Dictionary) -> Dictionary {
    let mut resources = page
        .get(b"Resources")
        .ok()
        .and_then(|object| owned_dictionary(document, object))
        .unwrap_or_else(Dictionary::new);
    for key in [b"XObject".as_slice(), b"Font".as_slice()] {
        let inlined = resources
            .get(key)
            .ok()
            .and_then(|object| owned_dictionary(document, object));
        if let Some(dict) = inlined {
            resources.set(key.to_vec(), dict);
        }
    }
    resources
}

fn merge_subdictionary(
    document: &Document,
    resources: &mut Dictionary,
    key: &[u8],
    additions: Dictionary,
) {
    if additions.is_empty() {
        return;
    }
    let mut merged = resources
        .get(key)
        .ok()
        .and_then(|object| owned_dictionary(document, object))
        .unwrap_or_else(Dictionary::new);
    for (name, value) in additions.iter() {
        merged.set(name.clone(), value.clone());
    }
    resources.set(key.to_vec(), merged);
}

/// Embed encoded image bytes as an image XObject. The encoding is taken from
/// the bytes' signature, never from a declared type.
pub(crate) fn embed_image(
    document: &mut Document,
    bytes: &[u8],
) -> std::result::Result<ObjectId, String> {
    match ImageKind::sniff(bytes) {
        Some(ImageKind::Jpeg) => embed_jpeg(document, bytes),
        Some(ImageKind::Png) => embed_png(document, bytes),
        None => Err("unrecognised image data (expected PNG or JPEG)".into()),
    }
}

/// JPEG data goes into the PDF unchanged, decoded by the viewer.
fn embed_jpeg(document: &mut Document, bytes: &[u8]) -> std::result::Result<ObjectId, String> {
    let decoder =
        JpegDecoder::new(Cursor::new(bytes)).map_err(|err| format!("invalid JPEG: {err}"))?;
    let (width, height) = decoder.dimensions();
    let color_space = match decoder.original_color_type() {
        ExtendedColorType::L8 => "DeviceGray",
        ExtendedColorType::Cmyk8 => "DeviceCMYK",
        _ => "DeviceRGB",
    };
    // Decode once so a truncated file fails here, not in the viewer.
    DynamicImage::from_decoder(decoder).map_err(|err| format!("invalid JPEG: {err}"))?;

    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        bytes.to_vec(),
    );
    stream.allows_compression = false;
    Ok(document.add_object(stream))
}

/// PNG data is decoded to raw RGB with an optional soft mask for alpha.
fn embed_png(document: &mut Document, bytes: &[u8]) -> std::result::Result<ObjectId, String> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|err| format!("invalid PNG: {err}"))?;
    let (width, height) = (image.width(), image.height());

    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };

    let rgb = if image.color().has_alpha() {
        let rgba = image.to_rgba8();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in rgba.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }
        let smask_id = document.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        image_dict.set("SMask", smask_id);
        rgb
    } else {
        image.to_rgb8().into_raw()
    };

    Ok(document.add_object(Stream::new(image_dict, rgb)))
}

/// Encode text for a WinAnsi simple font. ASCII and Latin-1 from U+00A0 map
/// to themselves, the 0x80-0x9F block holds WinAnsi's typographic extras, and
/// anything else (C1 controls included) becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(ch: char) -> u8 {
    match ch {
        '\u{00}'..='\u{7F}' | '\u{A0}'..='\u{FF}' => ch as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => b'?',
    }
}

fn real(value: f64) -> Object {
    (value as f32).into()
}

fn cm(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Operation {
    Operation::new("cm", [a, b, c, d, e, f].into_iter().map(real).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::decode::decoded_page_content;
    use crate::testing::{jpeg_bytes, png_bytes};
    use pagesmith_core::PageId;

    const A4: PageSize = PageSize {
        width: 595.0,
        height: 842.0,
    };

    fn annotation(payload: AnnotationPayload, position: Point, size: Size) -> AnnotationObject {
        AnnotationObject::new(PageId::new(), position, size, 1.0, payload)
    }

    #[test]
    fn placement_maps_top_left_to_bottom_left() {
        let object = annotation(
            AnnotationPayload::image(png_bytes(2, 2, false)),
            Point::new(10.0, 20.0),
            Size::new(100.0, 50.0),
        );
        let placement = place(&object, A4, Rotation::NONE).unwrap();
        assert_eq!(placement.origin, Point::new(10.0, 842.0 - 20.0 - 50.0));
        assert_eq!(placement.size, Size::new(100.0, 50.0));
        assert_eq!(placement.angle, 0.0);
    }

    #[test]
    fn placement_divides_by_capture_zoom() {
        let mut object = annotation(
            AnnotationPayload::image(png_bytes(2, 2, false)),
            Point::new(200.0, 100.0),
            Size::new(100.0, 50.0),
        );
        object.surface_zoom = 2.0;
        let placement = place(&object, A4, Rotation::NONE).unwrap();
        assert_eq!(placement.size, Size::new(50.0, 25.0));
        assert_eq!(placement.origin, Point::new(100.0, 842.0 - 50.0 - 25.0));
    }

    #[test]
    fn placement_angle_compensates_page_rotation() {
        let mut object = annotation(
            AnnotationPayload::text("x", 12.0),
            Point::default(),
            Size::default(),
        );
        object.rotation_degrees = 30.0;
        let placement = place(&object, A4, Rotation::from_degrees(90).unwrap()).unwrap();
        // Clockwise 30 - 90 = -60, drawn counter-clockwise as +60.
        assert_eq!(placement.angle, 60.0);
    }

    #[test]
    fn mislabelled_jpeg_is_embedded_as_dct() {
        let mut doc = Document::with_version("1.7");
        // Declared as PNG, but the bytes are JPEG.
        let payload = AnnotationPayload::Image {
            bytes: jpeg_bytes(8, 4),
            format: Some(ImageKind::Png),
        };
        let AnnotationPayload::Image { bytes, .. } = &payload else {
            unreachable!()
        };
        let id = embed_image(&mut doc, bytes).unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 8);
        assert_eq!(stream.content, *bytes);
    }

    #[test]
    fn png_alpha_gets_a_soft_mask() {
        let mut doc = Document::with_version("1.7");
        let id = embed_image(&mut doc, &png_bytes(3, 3, true)).unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.has(b"SMask"));
        assert_eq!(stream.content.len(), 3 * 3 * 3);

        let opaque = embed_image(&mut doc, &png_bytes(3, 3, false)).unwrap();
        let stream = doc.get_object(opaque).unwrap().as_stream().unwrap();
        assert!(!stream.dict.has(b"SMask"));
    }

    #[test]
    fn garbage_image_is_rejected() {
        let mut doc = Document::with_version("1.7");
        assert!(embed_image(&mut doc, b"GIF89a....").is_err());
        // Correct signature, broken body.
        assert!(embed_image(&mut doc, &[0xFF, 0xD8, 0xFF, 0xE0, 0x00]).is_err());
    }

    #[test]
    fn win_ansi_maps_the_typographic_block() {
        assert_eq!(win_ansi("café €"), vec![b'c', b'a', b'f', 0xE9, b' ', 0x80]);
        assert_eq!(
            win_ansi("\u{201C}ok\u{201D} – ™"),
            vec![0x93, b'o', b'k', 0x94, b' ', 0x96, b' ', 0x99]
        );
    }

    #[test]
    fn win_ansi_replaces_unmappable_chars() {
        // C1 controls share byte values with the typographic block but are
        // not WinAnsi characters.
        assert_eq!(win_ansi("\u{0080}\u{0085}\u{009F}"), b"???");
        assert_eq!(win_ansi("Ω→"), b"??");
        assert_eq!(win_ansi("\u{00A0}ÿ"), vec![0xA0, 0xFF]);
    }

    #[test]
    fn referenced_content_array_is_kept_under_overlays() {
        let mut doc = Document::load_mem(&crate::testing::referenced_contents_pdf()).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        let overlay = annotation(
            AnnotationPayload::text("Approved", 14.0),
            Point::new(20.0, 20.0),
            Size::default(),
        );

        let mut painter = OverlayPainter::new();
        painter
            .paint(&mut doc, page_id, PageSize::new(612.0, 792.0), Rotation::NONE, &[&overlay])
            .unwrap();

        // Opening q, both original streams, then the overlay.
        assert_eq!(doc.get_page_contents(page_id).len(), 4);
        let content = decoded_page_content(&doc, page_id).unwrap();
        let text = String::from_utf8_lossy(&content);
        let first = text.find("(Page 1) Tj").unwrap();
        let second = text.find("(second half) Tj").unwrap();
        let stamped = text.find("(Approved) Tj").unwrap();
        assert!(first < second && second < stamped, "{text}");
    }
}
