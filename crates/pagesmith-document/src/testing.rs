// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test fixtures — small PDFs and images built in memory.

use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use crate::image::ImageProcessor;
use crate::pdf::reader::SourceDocument;
use crate::raster::decode::decoded_page_content;

fn text_content(label: &str) -> Vec<u8> {
    Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 72.into()]),
            Operation::new("Tj", vec![Object::string_literal(label)]),
            Operation::new("ET", vec![]),
        ],
    }
    .encode()
    .expect("encode content")
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save fixture");
    out
}

fn finish_tree(
    doc: &mut Document,
    pages_id: ObjectId,
    mut pages: lopdf::Dictionary,
    kids: Vec<ObjectId>,
) {
    pages.set("Type", "Pages");
    pages.set("Count", kids.len() as i64);
    pages.set(
        "Kids",
        kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
    );
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
}

/// A PDF with one page per `(width, height)` entry; page N shows "Page N".
pub(crate) fn sample_pdf(sizes: &[(f64, f64)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for (index, &(width, height)) in sizes.iter().enumerate() {
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            text_content(&format!("Page {}", index + 1)),
        ));
        kids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Integer(width.round() as i64),
                Object::Integer(height.round() as i64),
            ],
            "Contents" => content_id,
            "Resources" => resources_id,
        }));
    }
    finish_tree(&mut doc, pages_id, lopdf::Dictionary::new(), kids);
    save(doc)
}

/// Three US Letter pages; the second has a content stream no reader can
/// decode.
pub(crate) fn corrupt_page_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for index in 0..3 {
        let stream = if index == 1 {
            let mut bad = Stream::new(
                dictionary! { "Filter" => "BogusDecode" },
                vec![0xde, 0xad, 0xbe, 0xef],
            );
            bad.allows_compression = false;
            bad
        } else {
            Stream::new(dictionary! {}, text_content("fine"))
        };
        let content_id = doc.add_object(stream);
        kids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {},
        }));
    }
    finish_tree(&mut doc, pages_id, lopdf::Dictionary::new(), kids);
    save(doc)
}

/// One page whose MediaBox (420 x 595) and /Rotate 90 live on the page tree
/// root rather than the page.
pub(crate) fn inherited_media_box_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, text_content("inherited")));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "MediaBox" => vec![0.into(), 0.into(), 420.into(), 595.into()],
        "Rotate" => 90,
        "Resources" => dictionary! {},
    };
    finish_tree(&mut doc, pages_id, pages, vec![page_id]);
    save(doc)
}

/// One `width` x `height` page drawing the raw content stream `content`.
pub(crate) fn content_pdf((width, height): (i64, i64), content: &[u8]) -> Vec<u8> {
    single_page_pdf(width, height, |doc| {
        Object::Reference(doc.add_object(Stream::new(dictionary! {}, content.to_vec())))
    })
}

/// "Page 1" text whose content stream is ASCIIHex-encoded.
pub(crate) fn hex_content_pdf() -> Vec<u8> {
    let hex: String = text_content("Page 1")
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect();
    single_page_pdf(612, 792, |doc| {
        let mut stream = Stream::new(
            dictionary! { "Filter" => "ASCIIHexDecode" },
            format!("{hex}>").into_bytes(),
        );
        stream.allows_compression = false;
        Object::Reference(doc.add_object(stream))
    })
}

/// A page whose /Contents is a reference to an array of two streams, the
/// first drawing "Page 1" and the second "second half".
pub(crate) fn referenced_contents_pdf() -> Vec<u8> {
    single_page_pdf(612, 792, |doc| {
        let first = doc.add_object(Stream::new(dictionary! {}, text_content("Page 1")));
        let second = doc.add_object(Stream::new(dictionary! {}, text_content("second half")));
        Object::Reference(doc.add_object(vec![
            Object::Reference(first),
            Object::Reference(second),
        ]))
    })
}

/// A page carrying a text annotation and its popup; the popup's /Parent
/// points at the text annotation.
pub(crate) fn popup_annotation_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, text_content("noted")));
    let note_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Text",
        "Rect" => vec![100.into(), 100.into(), 120.into(), 120.into()],
        "Contents" => Object::string_literal("remember"),
    });
    let popup_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Popup",
        "Rect" => vec![120.into(), 100.into(), 220.into(), 160.into()],
        "Parent" => note_id,
    });
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {},
        "Annots" => vec![Object::Reference(note_id), Object::Reference(popup_id)],
    });
    finish_tree(&mut doc, pages_id, lopdf::Dictionary::new(), vec![page_id]);
    save(doc)
}

fn single_page_pdf(
    width: i64,
    height: i64,
    contents: impl FnOnce(&mut Document) -> Object,
) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let contents = contents(&mut doc);
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Contents" => contents,
        "Resources" => dictionary! {
            "Font" => dictionary! {
                "F1" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                },
            },
        },
    });
    finish_tree(&mut doc, pages_id, lopdf::Dictionary::new(), vec![page_id]);
    save(doc)
}

/// Route `tracing` output to the test harness; safe to call from every test.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pagesmith_document=debug")
        .with_test_writer()
        .try_init();
}

/// Decoded content of one page, lossily as text.
pub(crate) fn page_text(source: &SourceDocument, page_index: usize) -> String {
    let page_id = source.page_object_id(page_index).expect("page id");
    let raw = decoded_page_content(source.document(), page_id).expect("decode content");
    String::from_utf8_lossy(&raw).into_owned()
}

pub(crate) fn png_bytes(width: u32, height: u32, with_alpha: bool) -> Vec<u8> {
    let image = if with_alpha {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 128])))
    } else {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 200, 30])))
    };
    ImageProcessor::from_dynamic(image)
        .to_png_bytes()
        .expect("encode png")
}

pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    ImageProcessor::from_dynamic(DynamicImage::ImageRgb8(RgbImage::from_pixel(
        width,
        height,
        Rgb([30, 30, 200]),
    )))
    .to_jpeg_bytes(85)
    .expect("encode jpeg")
}
