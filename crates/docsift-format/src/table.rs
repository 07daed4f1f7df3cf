//! Best-effort table detection over positioned line blocks.
//!
//! A table is a run of consecutive visual rows whose cells start at
//! aligned horizontal positions. Pages contributing no detectable
//! structure simply contribute zero tables; that is not an error.

use docsift_core::{Block, Table};

/// Horizontal alignment tolerance, in page units.
const COLUMN_TOLERANCE: f32 = 12.0;

/// Minimum rows and columns for a run to count as a table.
const MIN_ROWS: usize = 2;
const MIN_COLS: usize = 2;

/// Detect tables on every page of the document.
///
/// Works on whichever blocks it is given; for scanned documents the
/// native blocks are usually empty and the result is empty too.
pub fn detect_tables(blocks: &[Block]) -> Vec<Table> {
    let mut page_indices: Vec<usize> = blocks.iter().map(|b| b.page_index).collect();
    page_indices.sort_unstable();
    page_indices.dedup();

    let mut tables = Vec::new();
    for page_index in page_indices {
        let page_blocks: Vec<&Block> = blocks
            .iter()
            .filter(|b| b.page_index == page_index && !b.text.trim().is_empty())
            .collect();
        tables.extend(detect_page_tables(page_index, &page_blocks));
    }
    tables
}

fn detect_page_tables(page_index: usize, blocks: &[&Block]) -> Vec<Table> {
    let rows = visual_rows(blocks);

    let mut tables = Vec::new();
    let mut run: Vec<&[usize]> = Vec::new();
    let mut run_columns: Vec<f32> = Vec::new();

    let mut flush = |run: &mut Vec<&[usize]>, columns: &mut Vec<f32>| {
        if run.len() >= MIN_ROWS {
            tables.push(build_table(page_index, blocks, run, columns));
        }
        run.clear();
        columns.clear();
    };

    for row in &rows {
        if row.len() < MIN_COLS {
            flush(&mut run, &mut run_columns);
            continue;
        }
        let starts: Vec<f32> = row.iter().map(|&i| blocks[i].bbox.x0).collect();
        if run.is_empty() {
            run.push(row);
            run_columns = starts;
        } else if aligned(&run_columns, &starts) {
            run.push(row);
        } else {
            flush(&mut run, &mut run_columns);
            run.push(row);
            run_columns = starts;
        }
    }
    flush(&mut run, &mut run_columns);

    tables
}

/// Group a page's blocks into visual rows by vertical-band overlap,
/// each row sorted left to right. Rows are returned top to bottom.
fn visual_rows(blocks: &[&Block]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..blocks.len()).collect();
    order.sort_by(|&a, &b| {
        blocks[a]
            .bbox
            .y0
            .total_cmp(&blocks[b].bbox.y0)
            .then(blocks[a].bbox.x0.total_cmp(&blocks[b].bbox.x0))
            .then(a.cmp(&b))
    });

    let mut rows: Vec<(docsift_core::BoundingBox, Vec<usize>)> = Vec::new();
    for i in order {
        let bbox = blocks[i].bbox;
        let mut assigned = false;
        for (band, members) in rows.iter_mut() {
            let overlap = band.vertical_overlap(&bbox);
            let min_height = band.height().min(bbox.height()).max(1.0);
            if overlap >= min_height * 0.5 {
                *band = band.union(&bbox);
                members.push(i);
                assigned = true;
                break;
            }
        }
        if !assigned {
            rows.push((bbox, vec![i]));
        }
    }

    rows.into_iter()
        .map(|(_, mut members)| {
            members.sort_by(|&a, &b| {
                blocks[a]
                    .bbox
                    .x0
                    .total_cmp(&blocks[b].bbox.x0)
                    .then(a.cmp(&b))
            });
            members
        })
        .collect()
}

/// Two rows belong to the same table when their cell start positions
/// line up within tolerance.
fn aligned(columns: &[f32], starts: &[f32]) -> bool {
    if columns.len() != starts.len() {
        return false;
    }
    columns
        .iter()
        .zip(starts)
        .all(|(c, s)| (c - s).abs() <= COLUMN_TOLERANCE)
}

fn build_table(
    page_index: usize,
    blocks: &[&Block],
    run: &[&[usize]],
    columns: &[f32],
) -> Table {
    let rows = run
        .iter()
        .map(|row| {
            let mut cells = vec![String::new(); columns.len()];
            for &i in row.iter() {
                let x0 = blocks[i].bbox.x0;
                // Nearest column within tolerance; rows were alignment-checked,
                // so this always finds one.
                if let Some((col, _)) = columns
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| (*a - x0).abs().total_cmp(&(*b - x0).abs()))
                {
                    cells[col] = blocks[i].text.trim().to_string();
                }
            }
            cells
        })
        .collect();

    Table { page_index, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsift_core::{BlockSource, BoundingBox};

    fn block(page: usize, text: &str, x0: f32, y0: f32) -> Block {
        Block {
            page_index: page,
            text: text.into(),
            bbox: BoundingBox {
                x0,
                y0,
                x1: x0 + 60.0,
                y1: y0 + 12.0,
            },
            source: BlockSource::Native,
            confidence: None,
        }
    }

    #[test]
    fn aligned_rows_become_a_table() {
        let blocks = vec![
            block(0, "Item", 50.0, 100.0),
            block(0, "Qty", 250.0, 100.0),
            block(0, "Widget", 51.0, 120.0),
            block(0, "2", 251.0, 120.0),
            block(0, "Gadget", 49.0, 140.0),
            block(0, "5", 250.0, 140.0),
        ];
        let tables = detect_tables(&blocks);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].page_index, 0);
        assert_eq!(
            tables[0].rows,
            vec![
                vec!["Item".to_string(), "Qty".to_string()],
                vec!["Widget".to_string(), "2".to_string()],
                vec!["Gadget".to_string(), "5".to_string()],
            ]
        );
    }

    #[test]
    fn prose_paragraphs_yield_no_tables() {
        let blocks = vec![
            block(0, "This is an ordinary paragraph line.", 50.0, 100.0),
            block(0, "Another paragraph line below it.", 50.0, 120.0),
            block(0, "And a third one.", 50.0, 140.0),
        ];
        assert!(detect_tables(&blocks).is_empty());
    }

    #[test]
    fn misaligned_rows_break_the_run() {
        let blocks = vec![
            block(0, "a", 50.0, 100.0),
            block(0, "b", 250.0, 100.0),
            // Shifted far right: not the same column layout.
            block(0, "c", 150.0, 120.0),
            block(0, "d", 400.0, 120.0),
        ];
        assert!(detect_tables(&blocks).is_empty());
    }

    #[test]
    fn tables_are_detected_per_page() {
        let blocks = vec![
            block(0, "h1", 50.0, 100.0),
            block(0, "h2", 250.0, 100.0),
            block(0, "v1", 50.0, 120.0),
            block(0, "v2", 250.0, 120.0),
            block(2, "x1", 50.0, 100.0),
            block(2, "x2", 250.0, 100.0),
            block(2, "y1", 50.0, 120.0),
            block(2, "y2", 250.0, 120.0),
        ];
        let tables = detect_tables(&blocks);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].page_index, 0);
        assert_eq!(tables[1].page_index, 2);
    }

    #[test]
    fn empty_input_is_fine() {
        assert!(detect_tables(&[]).is_empty());
    }
}
