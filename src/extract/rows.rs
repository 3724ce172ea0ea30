use crate::extract::layout::{PageText, TextRow};

/// Joins the row's fragments in order. Fragments already carry whatever
/// whitespace the layout had, so nothing is inserted between them.
pub fn flatten_row(row: &TextRow) -> String {
    row.fragments.iter().map(|f| f.text.as_str()).collect()
}

/// Flattens every row, pages first then rows.
pub fn flatten_pages(pages: &[PageText]) -> Vec<String> {
    pages
        .iter()
        .flat_map(|page| page.rows.iter().map(flatten_row))
        .collect()
}
