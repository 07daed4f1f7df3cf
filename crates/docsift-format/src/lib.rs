//! Layout normalization: merge blocks and tables from either
//! extraction path into linear text plus per-field hints.
//!
//! Everything here is pure and deterministic: identical input always
//! yields identical text and hint sets, so the downstream model prompt
//! is reproducible.

use docsift_core::{Block, Page, Table};

pub mod hints;
pub mod table;

pub use table::detect_tables;

/// Byte range of one block's text inside the concatenated document text.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSpan {
    /// Index into the original block slice.
    pub block: usize,
    pub start: usize,
    pub end: usize,
}

/// Concatenated document text plus the spans mapping text offsets back
/// to source blocks. Table text carries no span.
#[derive(Debug, Clone, Default)]
pub struct LayoutText {
    pub text: String,
    pub spans: Vec<BlockSpan>,
}

impl LayoutText {
    /// The block containing the given byte offset, if any.
    pub fn block_at(&self, offset: usize) -> Option<usize> {
        self.spans
            .iter()
            .find(|s| s.start <= offset && offset < s.end)
            .map(|s| s.block)
    }
}

/// Deterministic reading order: page, then top edge, then left edge,
/// then original stream order as the last resort.
pub fn reading_order(blocks: &[Block]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..blocks.len()).collect();
    order.sort_by(|&a, &b| {
        let (ba, bb) = (&blocks[a], &blocks[b]);
        ba.page_index
            .cmp(&bb.page_index)
            .then(ba.bbox.y0.total_cmp(&bb.bbox.y0))
            .then(ba.bbox.x0.total_cmp(&bb.bbox.x0))
            .then(a.cmp(&b))
    });
    order
}

/// Serialize one table: cells joined by " | ", rows by line breaks,
/// preceded by a `[Table N]` marker (1-based, document order).
pub fn serialize_table(table: &Table, number: usize) -> String {
    let mut out = format!("[Table {}]", number);
    for row in &table.rows {
        out.push('\n');
        out.push_str(&row.join(" | "));
    }
    out
}

/// Concatenate block text per page in reading order, blocks separated
/// by line breaks, with each page's tables appended after its text.
pub fn layout_text(pages: &[Page], blocks: &[Block], tables: &[Table]) -> LayoutText {
    let order = reading_order(blocks);
    let mut text = String::new();
    let mut spans = Vec::with_capacity(blocks.len());
    let mut table_number = 0usize;

    let mut page_indices: Vec<usize> = pages.iter().map(|p| p.index).collect();
    page_indices.sort_unstable();

    for (i, &page_index) in page_indices.iter().enumerate() {
        if i > 0 {
            text.push_str("\n\n");
        }
        let mut first_on_page = true;
        for &block_index in &order {
            let block = &blocks[block_index];
            if block.page_index != page_index {
                continue;
            }
            let trimmed = block.text.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !first_on_page {
                text.push('\n');
            }
            let start = text.len();
            text.push_str(trimmed);
            spans.push(BlockSpan {
                block: block_index,
                start,
                end: text.len(),
            });
            first_on_page = false;
        }
        for table in tables.iter().filter(|t| t.page_index == page_index) {
            if table.rows.is_empty() {
                continue;
            }
            table_number += 1;
            if !first_on_page {
                text.push('\n');
            }
            text.push_str(&serialize_table(table, table_number));
            first_on_page = false;
        }
    }

    LayoutText { text, spans }
}
