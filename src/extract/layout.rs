//! Positioned text model for a rendered page

/// A run of text drawn at a single position on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

impl TextFragment {
    pub fn new(x: f64, y: f64, text: impl Into<String>) -> Self {
        Self {
            x,
            y,
            text: text.into(),
        }
    }
}

/// Fragments sharing a baseline, ordered left to right.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextRow {
    pub fragments: Vec<TextFragment>,
}

impl TextRow {
    pub fn new(fragments: Vec<TextFragment>) -> Self {
        Self { fragments }
    }
}

/// Rows of a single page, ordered top to bottom. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageText {
    pub number: u32,
    pub rows: Vec<TextRow>,
}

/// Baselines closer than this (in text space units) belong to the same row.
pub const ROW_TOLERANCE: f64 = 1.0;

/// Groups loose fragments into rows.
///
/// Rows come out top to bottom (descending y, as PDF y grows upwards) and
/// fragments within a row left to right. Fragments with equal x keep their
/// drawing order.
pub fn group_rows(mut fragments: Vec<TextFragment>) -> Vec<TextRow> {
    fragments.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut rows: Vec<(f64, Vec<TextFragment>)> = Vec::new();
    for fragment in fragments {
        match rows.last_mut() {
            Some((baseline, members)) if (*baseline - fragment.y).abs() <= ROW_TOLERANCE => {
                members.push(fragment);
            }
            _ => rows.push((fragment.y, vec![fragment])),
        }
    }

    rows.into_iter()
        .map(|(_, mut members)| {
            members.sort_by(|a, b| a.x.total_cmp(&b.x));
            TextRow::new(members)
        })
        .collect()
}
