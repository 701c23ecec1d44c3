// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vector rasterizer — interprets a page's content stream onto a tiny-skia
// pixmap: paths, clipping, device colours, image and form XObjects.
//
// No font programs are loaded. Text is laid out on approximate Helvetica
// advances and each glyph is painted as a solid box, so runs of text show up
// in the right place, size and colour without being legible.

use std::rc::Rc;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use pagesmith_core::error::{PagesmithError, Result};
use tiny_skia::{
    Color, FillRule, FilterQuality, IntSize, LineCap, LineJoin, Mask, Paint, Path, PathBuilder,
    Pixmap, PixmapPaint, Rect, Stroke, StrokeDash, Transform,
};
use tracing::{debug, instrument, warn};

use super::decode::{decode_stream, decoded_page_content};
use super::{PageRasterizer, RasterImage, scaled_dimensions};
use crate::pdf::reader::{
    SourceDocument, inherited_attribute, media_box_origin, owned_dictionary, resolve,
};

/// Form XObjects nested deeper than this are not drawn.
const MAX_FORM_DEPTH: usize = 8;

/// Glyph advance as a fraction of the font size.
const GLYPH_ADVANCE: f32 = 0.55;
const SPACE_ADVANCE: f32 = 0.28;
/// Glyph box height above the baseline, as a fraction of the font size.
const GLYPH_HEIGHT: f32 = 0.7;

/// Built-in tiny-skia rasterizer. Needs no native library.
#[derive(Debug, Default, Clone, Copy)]
pub struct VectorRasterizer;

impl PageRasterizer for VectorRasterizer {
    fn name(&self) -> &'static str {
        "vector"
    }

    #[instrument(skip(self, source))]
    fn rasterize(
        &self,
        source: &SourceDocument,
        page_index: usize,
        scale: f32,
    ) -> Result<RasterImage> {
        let render_err = |reason: String| PagesmithError::Render { page_index, reason };
        let document = source.document();
        let page_id = source.page_object_id(page_index)?;
        let raw = decoded_page_content(document, page_id).map_err(render_err)?;
        let content = Content::decode(&raw)
            .map_err(|err| render_err(format!("cannot parse content stream: {err}")))?;

        let size = source.page_size(page_index)?;
        let (width, height) = scaled_dimensions(size.width, size.height, scale)?;
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| render_err(format!("cannot allocate a {width}x{height} canvas")))?;
        pixmap.fill(Color::WHITE);

        // PDF space runs bottom-up from the MediaBox corner; pixels run
        // top-down from the canvas corner.
        let (x0, y0) = media_box_origin(document, page_id);
        let base = Transform::from_row(
            scale,
            0.0,
            0.0,
            -scale,
            -(x0 as f32) * scale,
            height as f32 + y0 as f32 * scale,
        );
        let resources = inherited_attribute(document, page_id, b"Resources")
            .and_then(|object| owned_dictionary(document, object))
            .unwrap_or_else(Dictionary::new);

        let mut painter = Painter::new(document, &mut pixmap, base);
        painter.run(&content.operations, &resources, 0);
        debug!(operations = content.operations.len(), "Page painted");

        to_rgba(&pixmap).ok_or_else(|| render_err("canvas has an unexpected size".into()))
    }
}

#[derive(Clone)]
struct GraphicsState {
    ctm: Transform,
    fill: Color,
    stroke: Color,
    fill_alpha: f32,
    stroke_alpha: f32,
    line: Stroke,
    clip: Option<Rc<Mask>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
    render_mode: i64,
}

impl GraphicsState {
    fn new(ctm: Transform) -> Self {
        Self {
            ctm,
            fill: Color::BLACK,
            stroke: Color::BLACK,
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            line: Stroke::default(),
            clip: None,
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
        }
    }
}

struct Painter<'a> {
    document: &'a Document,
    pixmap: &'a mut Pixmap,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    /// `Q` never pops below this depth; a form's saved state sits under it.
    floor: usize,
    path: PathBuilder,
    pending_clip: Option<FillRule>,
    text_matrix: Transform,
    line_matrix: Transform,
}

impl<'a> Painter<'a> {
    fn new(document: &'a Document, pixmap: &'a mut Pixmap, base: Transform) -> Self {
        Self {
            document,
            pixmap,
            state: GraphicsState::new(base),
            stack: Vec::new(),
            floor: 0,
            path: PathBuilder::new(),
            pending_clip: None,
            text_matrix: Transform::identity(),
            line_matrix: Transform::identity(),
        }
    }

    fn run(&mut self, operations: &[Operation], resources: &Dictionary, depth: usize) {
        for operation in operations {
            self.apply(operation, resources, depth);
        }
    }

    fn apply(&mut self, operation: &Operation, resources: &Dictionary, depth: usize) {
        let operands = operation.operands.as_slice();
        match operation.operator.as_str() {
            // Graphics state
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if self.stack.len() > self.floor {
                    if let Some(saved) = self.stack.pop() {
                        self.state = saved;
                    }
                }
            }
            "cm" => {
                if let Some([a, b, c, d, e, f]) = numbers(operands) {
                    let matrix = Transform::from_row(a, b, c, d, e, f);
                    self.state.ctm = self.state.ctm.pre_concat(matrix);
                }
            }
            "w" => {
                if let Some([width]) = numbers(operands) {
                    self.state.line.width = width.abs();
                }
            }
            "J" => {
                self.state.line.line_cap = match integer(operands) {
                    Some(1) => LineCap::Round,
                    Some(2) => LineCap::Square,
                    _ => LineCap::Butt,
                };
            }
            "j" => {
                self.state.line.line_join = match integer(operands) {
                    Some(1) => LineJoin::Round,
                    Some(2) => LineJoin::Bevel,
                    _ => LineJoin::Miter,
                };
            }
            "M" => {
                if let Some([limit]) = numbers(operands) {
                    self.state.line.miter_limit = limit.max(1.0);
                }
            }
            "d" => self.state.line.dash = dash(operands),
            "gs" => {
                if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                    self.apply_ext_state(name, resources);
                }
            }

            // Colour
            "g" => self.state.fill = colour(operands).unwrap_or(Color::BLACK),
            "G" => self.state.stroke = colour(operands).unwrap_or(Color::BLACK),
            "rg" | "k" | "sc" | "scn" => {
                if let Some(colour) = colour(operands) {
                    self.state.fill = colour;
                }
            }
            "RG" | "K" | "SC" | "SCN" => {
                if let Some(colour) = colour(operands) {
                    self.state.stroke = colour;
                }
            }
            // Every device space starts out black.
            "cs" => self.state.fill = Color::BLACK,
            "CS" => self.state.stroke = Color::BLACK,

            // Path construction
            "m" => {
                if let Some([x, y]) = numbers(operands) {
                    self.path.move_to(x, y);
                }
            }
            "l" => {
                if let Some([x, y]) = numbers(operands) {
                    self.path.line_to(x, y);
                }
            }
            "c" => {
                if let Some([x1, y1, x2, y2, x3, y3]) = numbers(operands) {
                    self.path.cubic_to(x1, y1, x2, y2, x3, y3);
                }
            }
            "v" => {
                if let (Some([x2, y2, x3, y3]), Some(current)) =
                    (numbers(operands), self.path.last_point())
                {
                    self.path.cubic_to(current.x, current.y, x2, y2, x3, y3);
                }
            }
            "y" => {
                if let Some([x1, y1, x3, y3]) = numbers(operands) {
                    self.path.cubic_to(x1, y1, x3, y3, x3, y3);
                }
            }
            "h" => self.path.close(),
            "re" => {
                if let Some([x, y, w, h]) = numbers(operands) {
                    self.path.move_to(x, y);
                    self.path.line_to(x + w, y);
                    self.path.line_to(x + w, y + h);
                    self.path.line_to(x, y + h);
                    self.path.close();
                }
            }

            // Path painting
            "S" => self.paint_path(None, true, false),
            "s" => self.paint_path(None, true, true),
            "f" | "F" => self.paint_path(Some(FillRule::Winding), false, false),
            "f*" => self.paint_path(Some(FillRule::EvenOdd), false, false),
            "B" => self.paint_path(Some(FillRule::Winding), true, false),
            "B*" => self.paint_path(Some(FillRule::EvenOdd), true, false),
            "b" => self.paint_path(Some(FillRule::Winding), true, true),
            "b*" => self.paint_path(Some(FillRule::EvenOdd), true, true),
            "n" => self.paint_path(None, false, false),
            "W" => self.pending_clip = Some(FillRule::Winding),
            "W*" => self.pending_clip = Some(FillRule::EvenOdd),

            // Text
            "BT" => {
                self.text_matrix = Transform::identity();
                self.line_matrix = Transform::identity();
            }
            "Tf" => {
                if let Some([size]) = numbers(operands) {
                    self.state.font_size = size;
                }
            }
            "Tc" => {
                if let Some([spacing]) = numbers(operands) {
                    self.state.char_spacing = spacing;
                }
            }
            "Tw" => {
                if let Some([spacing]) = numbers(operands) {
                    self.state.word_spacing = spacing;
                }
            }
            "Tz" => {
                if let Some([percent]) = numbers(operands) {
                    self.state.horizontal_scale = percent / 100.0;
                }
            }
            "TL" => {
                if let Some([leading]) = numbers(operands) {
                    self.state.leading = leading;
                }
            }
            "Ts" => {
                if let Some([rise]) = numbers(operands) {
                    self.state.rise = rise;
                }
            }
            "Tr" => self.state.render_mode = integer(operands).unwrap_or(0),
            "Td" => {
                if let Some([tx, ty]) = numbers(operands) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers(operands) {
                    self.state.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some([a, b, c, d, e, f]) = numbers(operands) {
                    self.text_matrix = Transform::from_row(a, b, c, d, e, f);
                    self.line_matrix = self.text_matrix;
                }
            }
            "T*" => self.next_line(0.0, -self.state.leading),
            "Tj" => {
                if let Some(text) = operands.first().and_then(|o| o.as_str().ok()) {
                    self.show_text(text);
                }
            }
            "'" => {
                self.next_line(0.0, -self.state.leading);
                if let Some(text) = operands.first().and_then(|o| o.as_str().ok()) {
                    self.show_text(text);
                }
            }
            "\"" => {
                if let [word, glyph, text] = operands {
                    self.state.word_spacing = word.as_float().unwrap_or(0.0);
                    self.state.char_spacing = glyph.as_float().unwrap_or(0.0);
                    self.next_line(0.0, -self.state.leading);
                    if let Ok(text) = text.as_str() {
                        self.show_text(text);
                    }
                }
            }
            "TJ" => {
                let Some(items) = operands.first().and_then(|o| o.as_array().ok()) else {
                    return;
                };
                for item in items {
                    match item {
                        Object::String(text, _) => self.show_text(text),
                        other => {
                            if let Ok(adjust) = other.as_float() {
                                self.advance_text(-adjust / 1000.0 * self.state.font_size);
                            }
                        }
                    }
                }
            }

            // External and inline objects
            "Do" => {
                if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                    self.draw_xobject(name, resources, depth);
                }
            }
            "BI" => {
                if let Some(Object::Stream(stream)) = operands.first() {
                    self.draw_image(stream);
                }
            }
            _ => {}
        }
    }

    fn paint_path(&mut self, fill: Option<FillRule>, stroke: bool, close: bool) {
        if close {
            self.path.close();
        }
        let builder = std::mem::replace(&mut self.path, PathBuilder::new());
        let clip_rule = self.pending_clip.take();
        let Some(path) = builder.finish() else {
            return;
        };
        let transform = self.state.ctm;
        if let Some(rule) = fill {
            let paint = solid(self.state.fill, self.state.fill_alpha);
            self.pixmap
                .fill_path(&path, &paint, rule, transform, self.state.clip.as_deref());
        }
        if stroke {
            let paint = solid(self.state.stroke, self.state.stroke_alpha);
            self.pixmap.stroke_path(
                &path,
                &paint,
                &self.state.line,
                transform,
                self.state.clip.as_deref(),
            );
        }
        // A clip set with W takes effect after the painting operator.
        if let Some(rule) = clip_rule {
            self.intersect_clip(&path, rule, transform);
        }
    }

    fn intersect_clip(&mut self, path: &Path, rule: FillRule, transform: Transform) {
        let mut mask = match self.state.clip.as_deref() {
            Some(current) => current.clone(),
            None => {
                let Some(mut full) = Mask::new(self.pixmap.width(), self.pixmap.height()) else {
                    return;
                };
                full.data_mut().fill(255);
                full
            }
        };
        mask.intersect_path(path, rule, true, transform);
        self.state.clip = Some(Rc::new(mask));
    }

    fn apply_ext_state(&mut self, name: &[u8], resources: &Dictionary) {
        let Some(state) = named_resource(self.document, resources, b"ExtGState", name)
            .and_then(|object| object.as_dict().ok())
        else {
            return;
        };
        if let Ok(alpha) = state.get(b"CA").and_then(Object::as_float) {
            self.state.stroke_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Ok(alpha) = state.get(b"ca").and_then(Object::as_float) {
            self.state.fill_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Ok(width) = state.get(b"LW").and_then(Object::as_float) {
            self.state.line.width = width.abs();
        }
    }

    // -- Text -----------------------------------------------------------------

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = self.line_matrix.pre_translate(tx, ty);
        self.text_matrix = self.line_matrix;
    }

    /// Move the text position by `tx` unscaled text-space units.
    fn advance_text(&mut self, tx: f32) {
        self.text_matrix = self
            .text_matrix
            .pre_translate(tx * self.state.horizontal_scale, 0.0);
    }

    fn show_text(&mut self, text: &[u8]) {
        let size = self.state.font_size;
        let visible = !matches!(self.state.render_mode, 3 | 7);
        let mut glyphs = PathBuilder::new();
        let mut x = 0.0;
        for &byte in text {
            let space = byte == b' ';
            let advance = (if space { SPACE_ADVANCE } else { GLYPH_ADVANCE }) * size;
            if visible && !space && !byte.is_ascii_control() {
                let inset = advance * 0.1;
                if let Some(rect) = normalized_rect(
                    x + inset,
                    self.state.rise,
                    advance - 2.0 * inset,
                    GLYPH_HEIGHT * size,
                ) {
                    glyphs.push_rect(rect);
                }
            }
            x += advance + self.state.char_spacing;
            if space {
                x += self.state.word_spacing;
            }
        }

        if let Some(path) = glyphs.finish() {
            let transform = self
                .state
                .ctm
                .pre_concat(self.text_matrix)
                .pre_scale(self.state.horizontal_scale, 1.0);
            let (colour, alpha) = match self.state.render_mode {
                1 | 5 => (self.state.stroke, self.state.stroke_alpha),
                _ => (self.state.fill, self.state.fill_alpha),
            };
            self.pixmap.fill_path(
                &path,
                &solid(colour, alpha),
                FillRule::Winding,
                transform,
                self.state.clip.as_deref(),
            );
        }
        self.advance_text(x);
    }

    // -- XObjects -------------------------------------------------------------

    fn draw_xobject(&mut self, name: &[u8], resources: &Dictionary, depth: usize) {
        let document = self.document;
        let Some(stream) = named_resource(document, resources, b"XObject", name)
            .and_then(|object| object.as_stream().ok())
        else {
            debug!(name = %String::from_utf8_lossy(name), "XObject not found");
            return;
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => self.draw_image(stream),
            Ok(b"Form") => self.draw_form(stream, resources, depth),
            _ => {}
        }
    }

    fn draw_image(&mut self, stream: &Stream) {
        let image = match decode_image(self.document, stream, self.state.fill) {
            Ok(image) => image,
            Err(reason) => {
                warn!(%reason, "Skipping undecodable image");
                return;
            }
        };
        let (width, height) = image.dimensions();
        let Some(size) = IntSize::from_wh(width, height) else {
            return;
        };
        let Some(bitmap) = Pixmap::from_vec(premultiplied(image.into_raw()), size) else {
            return;
        };
        // An image fills the unit square with its first row at the top.
        let transform = self.state.ctm.pre_concat(Transform::from_row(
            1.0 / width as f32,
            0.0,
            0.0,
            -1.0 / height as f32,
            0.0,
            1.0,
        ));
        let paint = PixmapPaint {
            opacity: self.state.fill_alpha,
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(
            0,
            0,
            bitmap.as_ref(),
            &paint,
            transform,
            self.state.clip.as_deref(),
        );
    }

    fn draw_form(&mut self, stream: &Stream, parent_resources: &Dictionary, depth: usize) {
        if depth >= MAX_FORM_DEPTH {
            warn!(depth, "Form XObjects nested too deeply, skipping");
            return;
        }
        let content = match decode_stream(stream)
            .and_then(|raw| Content::decode(&raw).map_err(|err| err.to_string()))
        {
            Ok(content) => content,
            Err(reason) => {
                warn!(%reason, "Skipping unreadable form XObject");
                return;
            }
        };
        let resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|object| owned_dictionary(self.document, object))
            .unwrap_or_else(|| parent_resources.clone());

        self.stack.push(self.state.clone());
        let outer_floor = std::mem::replace(&mut self.floor, self.stack.len());
        if let Some(matrix) = stream.dict.get(b"Matrix").ok().and_then(matrix) {
            self.state.ctm = self.state.ctm.pre_concat(matrix);
        }
        if let Some([x0, y0, x1, y1]) = stream.dict.get(b"BBox").ok().and_then(rectangle) {
            let mut bbox = PathBuilder::new();
            if let Some(rect) = normalized_rect(x0, y0, x1 - x0, y1 - y0) {
                bbox.push_rect(rect);
            }
            if let Some(path) = bbox.finish() {
                self.intersect_clip(&path, FillRule::Winding, self.state.ctm);
            }
        }

        self.run(&content.operations, &resources, depth + 1);

        self.stack.truncate(self.floor);
        self.floor = outer_floor;
        if let Some(saved) = self.stack.pop() {
            self.state = saved;
        }
        self.path = PathBuilder::new();
        self.pending_clip = None;
    }
}

// -- Operands ----------------------------------------------------------------

/// The last `N` operands as numbers.
fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    let start = operands.len().checked_sub(N)?;
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(&operands[start..]) {
        *slot = operand.as_float().ok()?;
    }
    Some(out)
}

fn integer(operands: &[Object]) -> Option<i64> {
    operands.first().and_then(|o| o.as_float().ok()).map(|v| v as i64)
}

fn dash(operands: &[Object]) -> Option<StrokeDash> {
    let [array, phase] = operands else {
        return None;
    };
    let intervals = array
        .as_array()
        .ok()?
        .iter()
        .map(|o| o.as_float().ok())
        .collect::<Option<Vec<f32>>>()?;
    StrokeDash::new(intervals, phase.as_float().unwrap_or(0.0))
}

/// A device colour from 1 (gray), 3 (RGB) or 4 (CMYK) numeric operands.
/// Named pattern operands are ignored.
fn colour(operands: &[Object]) -> Option<Color> {
    let values = operands
        .iter()
        .map(|o| o.as_float().ok())
        .collect::<Option<Vec<f32>>>()?;
    let (r, g, b) = match values.as_slice() {
        [gray] => (*gray, *gray, *gray),
        [r, g, b] => (*r, *g, *b),
        [c, m, y, k] => cmyk_to_rgb(*c, *m, *y, *k),
        _ => return None,
    };
    Color::from_rgba(r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0), 1.0)
}

fn cmyk_to_rgb(c: f32, m: f32, y: f32, k: f32) -> (f32, f32, f32) {
    ((1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k))
}

fn solid(colour: Color, alpha: f32) -> Paint<'static> {
    let mut colour = colour;
    colour.apply_opacity(alpha);
    let mut paint = Paint::default();
    paint.set_color(colour);
    paint.anti_alias = true;
    paint
}

fn normalized_rect(x: f32, y: f32, width: f32, height: f32) -> Option<Rect> {
    Rect::from_ltrb(
        x.min(x + width),
        y.min(y + height),
        x.max(x + width),
        y.max(y + height),
    )
}

fn matrix(object: &Object) -> Option<Transform> {
    let [a, b, c, d, e, f] = numbers(object.as_array().ok()?)?;
    Some(Transform::from_row(a, b, c, d, e, f))
}

fn rectangle(object: &Object) -> Option<[f32; 4]> {
    numbers(object.as_array().ok()?)
}

/// `/category/name` in `resources`, resolved.
fn named_resource<'a>(
    document: &'a Document,
    resources: &'a Dictionary,
    category: &[u8],
    name: &[u8],
) -> Option<&'a Object> {
    let entries = resolve(document, resources.get(category).ok()?).as_dict().ok()?;
    Some(resolve(document, entries.get(name).ok()?))
}

// -- Images ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColourModel {
    Gray,
    Rgb,
    Cmyk,
}

impl ColourModel {
    fn components(self) -> usize {
        match self {
            ColourModel::Gray => 1,
            ColourModel::Rgb => 3,
            ColourModel::Cmyk => 4,
        }
    }

    fn from_components(count: i64) -> Option<Self> {
        match count {
            1 => Some(ColourModel::Gray),
            3 => Some(ColourModel::Rgb),
            4 => Some(ColourModel::Cmyk),
            _ => None,
        }
    }

    fn to_rgb(self, samples: &[u8]) -> [u8; 3] {
        match (self, samples) {
            (ColourModel::Gray, [v, ..]) => [*v, *v, *v],
            (ColourModel::Rgb, [r, g, b, ..]) => [*r, *g, *b],
            (ColourModel::Cmyk, [c, m, y, k, ..]) => {
                let unit = |v: u8| f32::from(v) / 255.0;
                let (r, g, b) = cmyk_to_rgb(unit(*c), unit(*m), unit(*y), unit(*k));
                [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
            }
            _ => [0, 0, 0],
        }
    }
}

enum ImageSpace {
    Direct(ColourModel),
    Indexed { base: ColourModel, lookup: Vec<u8> },
}

fn image_space(document: &Document, object: &Object) -> std::result::Result<ImageSpace, String> {
    match resolve(document, object) {
        Object::Name(name) => colour_model(name).map(ImageSpace::Direct),
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|o| o.as_name().ok())
                .ok_or("colour space array without a family name")?;
            match family {
                b"ICCBased" => {
                    let profile = items
                        .get(1)
                        .map(|o| resolve(document, o))
                        .and_then(|o| o.as_stream().ok())
                        .ok_or("ICCBased colour space without a profile")?;
                    let count = profile.dict.get(b"N").and_then(Object::as_i64).unwrap_or(3);
                    ColourModel::from_components(count)
                        .map(ImageSpace::Direct)
                        .ok_or_else(|| format!("ICC profile with {count} components"))
                }
                b"Indexed" | b"I" => {
                    let ImageSpace::Direct(base) =
                        image_space(document, items.get(1).ok_or("Indexed without a base")?)?
                    else {
                        return Err("nested Indexed colour space".into());
                    };
                    let lookup = match items.get(3).map(|o| resolve(document, o)) {
                        Some(Object::String(bytes, _)) => bytes.clone(),
                        Some(Object::Stream(stream)) => decode_stream(stream)?,
                        _ => return Err("Indexed without a lookup table".into()),
                    };
                    Ok(ImageSpace::Indexed { base, lookup })
                }
                b"CalGray" => Ok(ImageSpace::Direct(ColourModel::Gray)),
                b"CalRGB" => Ok(ImageSpace::Direct(ColourModel::Rgb)),
                other => Err(format!(
                    "unsupported colour space /{}",
                    String::from_utf8_lossy(other)
                )),
            }
        }
        other => Err(format!("malformed colour space {other:?}")),
    }
}

fn colour_model(name: &[u8]) -> std::result::Result<ColourModel, String> {
    match name {
        b"DeviceGray" | b"G" | b"CalGray" => Ok(ColourModel::Gray),
        b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColourModel::Rgb),
        b"DeviceCMYK" | b"CMYK" => Ok(ColourModel::Cmyk),
        other => Err(format!(
            "unsupported colour space /{}",
            String::from_utf8_lossy(other)
        )),
    }
}

/// Look up an image dictionary key under its full or inline-image name.
fn image_key<'a>(dict: &'a Dictionary, full: &[u8], short: &[u8]) -> Option<&'a Object> {
    dict.get(full).or_else(|_| dict.get(short)).ok()
}

fn image_int(dict: &Dictionary, full: &[u8], short: &[u8]) -> Option<i64> {
    image_key(dict, full, short).and_then(|o| o.as_i64().ok())
}

/// Decode an image XObject (or inline image) to straight RGBA.
fn decode_image(
    document: &Document,
    stream: &Stream,
    fill: Color,
) -> std::result::Result<RgbaImage, String> {
    let dict = &stream.dict;
    let width = image_int(dict, b"Width", b"W").ok_or("image without /Width")?;
    let height = image_int(dict, b"Height", b"H").ok_or("image without /Height")?;
    let (width, height) = (
        u32::try_from(width).map_err(|_| format!("image width {width}"))?,
        u32::try_from(height).map_err(|_| format!("image height {height}"))?,
    );

    let last_filter = match image_key(dict, b"Filter", b"F") {
        Some(Object::Name(name)) => Some(name.as_slice()),
        Some(Object::Array(items)) => items.last().and_then(|o| o.as_name().ok()),
        _ => None,
    };
    let mut image = match last_filter {
        Some(b"DCTDecode" | b"DCT") => {
            image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(|err| format!("invalid JPEG image: {err}"))?
                .into_rgba8()
        }
        Some(b"JPXDecode" | b"CCITTFaxDecode" | b"CCF" | b"JBIG2Decode") => {
            return Err("unsupported image codec".into());
        }
        _ => decode_samples(document, stream, width, height, fill)?,
    };

    if let Some(mask) = dict
        .get(b"SMask")
        .ok()
        .map(|o| resolve(document, o))
        .and_then(|o| o.as_stream().ok())
    {
        apply_soft_mask(document, &mut image, mask)?;
    }
    Ok(image)
}

fn decode_samples(
    document: &Document,
    stream: &Stream,
    width: u32,
    height: u32,
    fill: Color,
) -> std::result::Result<RgbaImage, String> {
    let dict = &stream.dict;
    let data = decode_stream(stream)?;
    let stencil = image_key(dict, b"ImageMask", b"IM")
        .and_then(|o| o.as_bool().ok())
        .unwrap_or(false);
    let bits = if stencil {
        1
    } else {
        image_int(dict, b"BitsPerComponent", b"BPC").unwrap_or(8)
    };
    if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
        return Err(format!("unsupported {bits} bits per component"));
    }
    let bits = bits as u32;

    if stencil {
        // Sample 0 paints the fill colour, 1 leaves the page showing.
        let samples = unpack(&data, width, height, 1, bits)?;
        let colour = fill.to_color_u8();
        let pixels = samples
            .iter()
            .flat_map(|&bit| {
                let alpha = if bit == 0 { 255 } else { 0 };
                [colour.red(), colour.green(), colour.blue(), alpha]
            })
            .collect();
        return RgbaImage::from_raw(width, height, pixels).ok_or_else(|| "stencil size".into());
    }

    let space = image_key(dict, b"ColorSpace", b"CS").ok_or("image without /ColorSpace")?;
    let max = ((1u32 << bits) - 1) as f32;
    let scale = |v: u16| (f32::from(v) / max * 255.0).round() as u8;
    let pixels: Vec<u8> = match image_space(document, space)? {
        ImageSpace::Direct(model) => {
            let n = model.components();
            let samples = unpack(&data, width, height, n, bits)?;
            samples
                .chunks_exact(n)
                .flat_map(|pixel| {
                    let bytes: Vec<u8> = pixel.iter().map(|&v| scale(v)).collect();
                    let [r, g, b] = model.to_rgb(&bytes);
                    [r, g, b, 255]
                })
                .collect()
        }
        ImageSpace::Indexed { base, lookup } => {
            let n = base.components();
            let samples = unpack(&data, width, height, 1, bits)?;
            samples
                .iter()
                .flat_map(|&index| {
                    let start = usize::from(index) * n;
                    let [r, g, b] = lookup
                        .get(start..start + n)
                        .map_or([0, 0, 0], |entry| base.to_rgb(entry));
                    [r, g, b, 255]
                })
                .collect()
        }
    };
    RgbaImage::from_raw(width, height, pixels).ok_or_else(|| "image size mismatch".into())
}

/// Unpack `components` samples per pixel of `bits` each, rows padded to a
/// byte boundary.
fn unpack(
    data: &[u8],
    width: u32,
    height: u32,
    components: usize,
    bits: u32,
) -> std::result::Result<Vec<u16>, String> {
    let per_row = width as usize * components;
    let row_bytes = (per_row * bits as usize).div_ceil(8);
    let needed = row_bytes * height as usize;
    if data.len() < needed {
        return Err(format!(
            "image data has {} bytes, expected {needed}",
            data.len()
        ));
    }
    let mut samples = Vec::with_capacity(per_row * height as usize);
    for row in data[..needed].chunks_exact(row_bytes) {
        match bits {
            8 => samples.extend(row[..per_row].iter().map(|&b| u16::from(b))),
            16 => samples.extend(
                row[..per_row * 2]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]])),
            ),
            _ => {
                let mask = (1u16 << bits) - 1;
                for i in 0..per_row {
                    let bit = i * bits as usize;
                    let byte = u16::from(row[bit / 8]);
                    let shift = 8 - bits as usize - bit % 8;
                    samples.push((byte >> shift) & mask);
                }
            }
        }
    }
    Ok(samples)
}

fn apply_soft_mask(
    document: &Document,
    image: &mut RgbaImage,
    mask: &Stream,
) -> std::result::Result<(), String> {
    let width = image_int(&mask.dict, b"Width", b"W").unwrap_or(0);
    let height = image_int(&mask.dict, b"Height", b"H").unwrap_or(0);
    let (width, height) = (
        u32::try_from(width).map_err(|_| "soft mask width")?,
        u32::try_from(height).map_err(|_| "soft mask height")?,
    );
    let alpha = match decode_samples(document, mask, width, height, Color::BLACK) {
        Ok(decoded) => imageops::grayscale(&decoded),
        Err(reason) => {
            debug!(%reason, "Ignoring unreadable soft mask");
            return Ok(());
        }
    };
    let alpha = if alpha.dimensions() == image.dimensions() {
        alpha
    } else {
        imageops::resize(&alpha, image.width(), image.height(), FilterType::Triangle)
    };
    for (pixel, coverage) in image.pixels_mut().zip(alpha.pixels()) {
        pixel.0[3] = coverage.0[0];
    }
    Ok(())
}

/// Straight RGBA to the premultiplied layout tiny-skia expects.
fn premultiplied(mut data: Vec<u8>) -> Vec<u8> {
    for pixel in data.chunks_exact_mut(4) {
        let alpha = u16::from(pixel[3]);
        for channel in &mut pixel[..3] {
            *channel = ((u16::from(*channel) * alpha + 127) / 255) as u8;
        }
    }
    data
}

fn to_rgba(pixmap: &Pixmap) -> Option<RasterImage> {
    let mut data = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let colour = pixel.demultiply();
        data.extend_from_slice(&[colour.red(), colour.green(), colour.blue(), colour.alpha()]);
    }
    RasterImage::from_raw(pixmap.width(), pixmap.height(), data)
}
