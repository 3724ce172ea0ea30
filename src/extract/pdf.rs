//! Builds the page text model from a PDF document.
//!
//! Only the text-positioning operators and the graphics-state transform
//! (`q`, `Q`, `cm`) are interpreted. Glyph widths and font encodings are
//! ignored: string bytes are decoded as UTF-16BE when they carry a BOM and
//! as Latin-1 otherwise, which is what simple generated rate sheets use.

use crate::core::error::ParseError;
use crate::extract::layout::{PageText, TextFragment, group_rows};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object};
use tracing::{debug, warn};

/// Reads every page of `bytes` in ascending page-number order.
pub fn read_pages(bytes: &[u8]) -> Result<Vec<PageText>, ParseError> {
    let doc = Document::load_mem(bytes).map_err(|e| ParseError::Document(e.to_string()))?;

    let mut pages = Vec::new();
    for (number, page_id) in doc.get_pages() {
        let fragments = match doc
            .get_page_content(page_id)
            .and_then(|content| Content::decode(&content))
        {
            Ok(content) => page_fragments(&content.operations),
            Err(e) => {
                warn!("Skipping unreadable page {}: {}", number, e);
                Vec::new()
            }
        };

        let rows = group_rows(fragments);
        debug!("Page {} has {} text rows", number, rows.len());
        pages.push(PageText { number, rows });
    }

    Ok(pages)
}

/// Affine transform `[a b c d e f]` in PDF's row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translation(tx: f64, ty: f64) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Matrix::IDENTITY
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        Some(Matrix {
            a: number(operands.first())?,
            b: number(operands.get(1))?,
            c: number(operands.get(2))?,
            d: number(operands.get(3))?,
            e: number(operands.get(4))?,
            f: number(operands.get(5))?,
        })
    }

    /// `self` applied first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }
}

struct TextState {
    ctm: Matrix,
    saved: Vec<Matrix>,
    line: Matrix,
    text: Matrix,
    leading: f64,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            ctm: Matrix::IDENTITY,
            saved: Vec::new(),
            line: Matrix::IDENTITY,
            text: Matrix::IDENTITY,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn begin_text(&mut self) {
        self.line = Matrix::IDENTITY;
        self.text = Matrix::IDENTITY;
    }

    fn move_line(&mut self, dx: f64, dy: f64) {
        self.line = Matrix::translation(dx, dy).then(&self.line);
        self.text = self.line;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }

    fn set_matrix(&mut self, m: Matrix) {
        self.line = m;
        self.text = m;
    }

    /// Page-space origin of the next glyph.
    fn origin(&self) -> (f64, f64) {
        let m = self.text.then(&self.ctm);
        (m.e, m.f)
    }
}

fn page_fragments(operations: &[Operation]) -> Vec<TextFragment> {
    let mut state = TextState::default();
    let mut fragments = Vec::new();

    for op in operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => state.saved.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.saved.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.ctm = m.then(&state.ctm);
                }
            }
            "BT" => state.begin_text(),
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.set_matrix(m);
                }
            }
            "Td" | "TD" => {
                if let (Some(dx), Some(dy)) = (number(operands.first()), number(operands.get(1))) {
                    if op.operator == "TD" {
                        state.leading = -dy;
                    }
                    state.move_line(dx, dy);
                }
            }
            "TL" => {
                if let Some(leading) = number(operands.first()) {
                    state.leading = leading;
                }
            }
            "T*" => state.next_line(),
            "Tj" | "TJ" => push_text(&mut fragments, &state, operands.first()),
            "'" => {
                state.next_line();
                push_text(&mut fragments, &state, operands.first());
            }
            "\"" => {
                state.next_line();
                push_text(&mut fragments, &state, operands.get(2));
            }
            _ => {}
        }
    }

    fragments
}

fn push_text(fragments: &mut Vec<TextFragment>, state: &TextState, operand: Option<&Object>) {
    let text = match operand {
        Some(Object::String(bytes, _)) => decode_pdf_string(bytes),
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
                _ => None,
            })
            .collect(),
        _ => return,
    };

    if !text.is_empty() {
        let (x, y) = state.origin();
        fragments.push(TextFragment::new(x, y, text));
    }
}

fn number(object: Option<&Object>) -> Option<f64> {
    match object? {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}
