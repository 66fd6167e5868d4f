//! Span extraction from PDF using lopdf
//!
//! Walks each page's content stream and emits one `Span` per text-showing
//! operator, with its position converted to top-down page space, font,
//! rendered size and fill colour.

use crate::span::{BBox, Page, Span};
use crate::PdfError;
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::Path;

/// US Letter, used when a page has no usable MediaBox
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Average glyph advance as a fraction of the font size
const GLYPH_WIDTH_RATIO: f32 = 0.5;

/// Fraction of the font size above the baseline
const ASCENT_RATIO: f32 = 0.8;

/// TJ adjustment (thousandths of an em) wide enough to read as a space
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// Extract the spans of every page of a PDF file
pub fn extract_pages<P: AsRef<Path>>(path: P) -> Result<Vec<Page>, PdfError> {
    let buffer = std::fs::read(path)?;
    extract_pages_mem(&buffer)
}

/// Extract the spans of every page from a memory buffer
pub fn extract_pages_mem(buffer: &[u8]) -> Result<Vec<Page>, PdfError> {
    let doc = Document::load_mem(buffer)?;
    if doc.is_encrypted() {
        return Err(PdfError::Encrypted);
    }

    let mut pages = Vec::new();
    for (page_num, &page_id) in doc.get_pages().iter() {
        let index = (*page_num as usize).saturating_sub(1);
        pages.push(extract_page(&doc, page_id, index)?);
    }
    Ok(pages)
}

/// Multiply two 2D transformation matrices
/// Matrix format: [a, b, c, d, e, f] representing:
/// | a  b  0 |
/// | c  d  0 |
/// | e  f  1 |
fn multiply_matrices(m1: &[f32; 6], m2: &[f32; 6]) -> [f32; 6] {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

/// Text and graphics state while walking a content stream
struct TextState {
    ctm: [f32; 6],
    /// Saved (ctm, fill colour) pairs
    stack: Vec<([f32; 6], u32)>,
    fill: u32,
    font: String,
    font_size: f32,
    leading: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    in_text: bool,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: IDENTITY,
            stack: Vec::new(),
            fill: 0,
            font: String::new(),
            font_size: 12.0,
            leading: 0.0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            in_text: false,
        }
    }

    fn next_line(&mut self) {
        let leading = if self.leading > 0.0 {
            self.leading
        } else {
            self.font_size * 1.2
        };
        self.line_matrix[5] -= leading;
        self.text_matrix = self.line_matrix;
    }
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Page geometry in PDF space: origin and size from the MediaBox
struct PageFrame {
    x0: f32,
    y0: f32,
    width: f32,
    height: f32,
}

impl PageFrame {
    /// Span for `text` drawn at baseline origin `(x, y)` (PDF space)
    fn span(&self, text: String, x: f32, y: f32, size: f32, font: &str, color: u32) -> Span {
        let width = text.chars().count() as f32 * size * GLYPH_WIDTH_RATIO;
        let left = x - self.x0;
        let top = self.height - (y - self.y0) - size * ASCENT_RATIO;
        Span::new(
            text,
            BBox::new(left, top, left + width, top + size),
            font,
            size,
            color,
        )
    }
}

fn extract_page(doc: &Document, page_id: ObjectId, index: usize) -> Result<Page, PdfError> {
    let [mx0, my0, mx1, my1] = media_box(doc, page_id).unwrap_or(DEFAULT_MEDIA_BOX);
    let frame = PageFrame {
        x0: mx0.min(mx1),
        y0: my0.min(my1),
        width: (mx1 - mx0).abs(),
        height: (my1 - my0).abs(),
    };

    let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
    let content_data = doc
        .get_page_content(page_id)
        .map_err(|e| PdfError::Parse(e.to_string()))?;
    let content = Content::decode(&content_data).map_err(|e| PdfError::Parse(e.to_string()))?;

    let mut spans = Vec::new();
    let mut state = TextState::new();

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => state.stack.push((state.ctm, state.fill)),
            "Q" => {
                if let Some((ctm, fill)) = state.stack.pop() {
                    state.ctm = ctm;
                    state.fill = fill;
                }
            }
            "cm" if operands.len() >= 6 => {
                let m = matrix_from(operands);
                state.ctm = multiply_matrices(&m, &state.ctm);
            }
            "rg" if operands.len() >= 3 => {
                state.fill = pack_rgb(
                    number(&operands[0]),
                    number(&operands[1]),
                    number(&operands[2]),
                );
            }
            "g" if !operands.is_empty() => {
                let v = number(&operands[0]);
                state.fill = pack_rgb(v, v, v);
            }
            "k" if operands.len() >= 4 => {
                let (c, m, y, k) = (
                    number(&operands[0]),
                    number(&operands[1]),
                    number(&operands[2]),
                    number(&operands[3]),
                );
                state.fill = pack_rgb(
                    (1.0 - c) * (1.0 - k),
                    (1.0 - m) * (1.0 - k),
                    (1.0 - y) * (1.0 - k),
                );
            }
            "BT" => {
                state.in_text = true;
                state.text_matrix = IDENTITY;
                state.line_matrix = IDENTITY;
            }
            "ET" => state.in_text = false,
            "Tf" if operands.len() >= 2 => {
                if let Ok(name) = operands[0].as_name() {
                    state.font = String::from_utf8_lossy(name).to_string();
                }
                if let Some(size) = get_number(&operands[1]) {
                    state.font_size = size;
                }
            }
            "TL" if !operands.is_empty() => state.leading = number(&operands[0]),
            "Td" | "TD" if operands.len() >= 2 => {
                let tx = number(&operands[0]);
                let ty = number(&operands[1]);
                if op.operator == "TD" {
                    state.leading = -ty;
                }
                state.line_matrix[4] += tx * state.line_matrix[0] + ty * state.line_matrix[2];
                state.line_matrix[5] += tx * state.line_matrix[1] + ty * state.line_matrix[3];
                state.text_matrix = state.line_matrix;
            }
            "Tm" if operands.len() >= 6 => {
                state.text_matrix = matrix_from(operands);
                state.line_matrix = state.text_matrix;
            }
            "T*" => state.next_line(),
            "Tj" | "'" | "\"" | "TJ" => {
                if op.operator == "'" || op.operator == "\"" {
                    state.next_line();
                }
                if !state.in_text || operands.is_empty() {
                    continue;
                }
                let shown = operands.last().and_then(|operand| {
                    if op.operator == "TJ" {
                        text_from_array(operand, doc, &fonts, &state.font)
                    } else {
                        text_from_operand(operand, doc, &fonts, &state.font)
                    }
                });
                if let Some(text) = shown {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        let rendered_size =
                            effective_font_size(state.font_size, &state.text_matrix);
                        let combined = multiply_matrices(&state.text_matrix, &state.ctm);
                        spans.push(frame.span(
                            trimmed.to_string(),
                            combined[4],
                            combined[5],
                            rendered_size,
                            &state.font,
                            state.fill,
                        ));
                    }
                    // Advance past the shown text so consecutive Tj do not overlap
                    let advance = text.chars().count() as f32 * state.font_size * GLYPH_WIDTH_RATIO;
                    state.text_matrix[4] += advance * state.text_matrix[0];
                    state.text_matrix[5] += advance * state.text_matrix[1];
                }
            }
            _ => {}
        }
    }

    Ok(Page::new(index, frame.width, frame.height, spans))
}

/// MediaBox of a page, inherited from the page tree when absent
fn media_box(doc: &Document, page_id: ObjectId) -> Option<[f32; 4]> {
    let mut current = Some(page_id);
    // Page trees are shallow; the bound guards against Parent cycles
    for _ in 0..32 {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Ok(object) = dict.get(b"MediaBox") {
            let object = match object {
                Object::Reference(id) => doc.get_object(*id).ok()?,
                other => other,
            };
            let values: Vec<f32> = object.as_array().ok()?.iter().filter_map(get_number).collect();
            return match values.as_slice() {
                [a, b, c, d] => Some([*a, *b, *c, *d]),
                _ => None,
            };
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn matrix_from(operands: &[Object]) -> [f32; 6] {
    let mut m = IDENTITY;
    for (i, operand) in operands.iter().take(6).enumerate() {
        if let Some(v) = get_number(operand) {
            m[i] = v;
        }
    }
    m
}

fn pack_rgb(r: f32, g: f32, b: f32) -> u32 {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (channel(r) << 16) | (channel(g) << 8) | channel(b)
}

/// Helper to get f32 from Object
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn number(obj: &Object) -> f32 {
    get_number(obj).unwrap_or(0.0)
}

/// Compute effective font size from base size and text matrix
/// Text matrix is [a, b, c, d, tx, ty] where a,d are scale factors
fn effective_font_size(base_size: f32, text_matrix: &[f32; 6]) -> f32 {
    let scale_x = (text_matrix[0].powi(2) + text_matrix[1].powi(2)).sqrt();
    let scale_y = (text_matrix[2].powi(2) + text_matrix[3].powi(2)).sqrt();
    base_size * scale_x.max(scale_y)
}

/// Concatenate the strings of a TJ array; large negative adjustments become spaces
fn text_from_array(
    obj: &Object,
    doc: &Document,
    fonts: &BTreeMap<Vec<u8>, &lopdf::Dictionary>,
    current_font: &str,
) -> Option<String> {
    let array = obj.as_array().ok()?;
    let mut combined = String::new();
    for item in array {
        match get_number(item) {
            Some(adjust) if -adjust >= TJ_SPACE_THRESHOLD => {
                if !combined.is_empty() && !combined.ends_with(' ') {
                    combined.push(' ');
                }
            }
            Some(_) => {}
            None => {
                if let Some(text) = text_from_operand(item, doc, fonts, current_font) {
                    combined.push_str(&text);
                }
            }
        }
    }
    Some(combined)
}

/// Decode a string operand through the current font's encoding
fn text_from_operand(
    obj: &Object,
    doc: &Document,
    fonts: &BTreeMap<Vec<u8>, &lopdf::Dictionary>,
    current_font: &str,
) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };

    if let Some(font_dict) = fonts.get(current_font.as_bytes()) {
        if let Ok(encoding) = font_dict.get_font_encoding(doc) {
            if let Ok(text) = Document::decode_text(&encoding, bytes) {
                return Some(text);
            }
        }
    }

    // Fallback: UTF-16BE with BOM, then Latin-1
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&utf16));
    }
    Some(bytes.iter().map(|&b| b as char).collect())
}
