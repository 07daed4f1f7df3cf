use mupdf::{Document, TextPageFlags};

use docsift_core::{
    BackendError, Block, BlockSource, BoundingBox, NativeExtraction, NativePdfBackend, Page,
    Warning,
};

/// MuPDF-based implementation of [`NativePdfBackend`].
///
/// This crate is the sole AGPL island — it isolates the mupdf dependency
/// (which is AGPL-3.0) so that non-PDF code paths do not transitively
/// depend on it.
#[derive(Debug, Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

fn open(pdf: &[u8]) -> Result<Document, BackendError> {
    Document::from_bytes(pdf, "pdf").map_err(|e| BackendError::OpenError(e.to_string()))
}

impl NativePdfBackend for MupdfBackend {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, BackendError> {
        let document = open(pdf)?;
        let count = document
            .page_count()
            .map_err(|e| BackendError::OpenError(e.to_string()))?;
        Ok(count.max(0) as usize)
    }

    fn probe_page_text(&self, pdf: &[u8], page_index: usize) -> Result<String, BackendError> {
        let document = open(pdf)?;
        let page = document
            .load_page(page_index as i32)
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

        let mut text = String::new();
        for block in text_page.blocks() {
            for line in block.lines() {
                for c in line.chars() {
                    text.push(c.char().unwrap_or('\u{FFFD}'));
                }
                text.push('\n');
            }
        }
        Ok(text)
    }

    fn extract(&self, pdf: &[u8]) -> Result<NativeExtraction, BackendError> {
        let document = open(pdf)?;

        let mut extraction = NativeExtraction::default();
        let mut any_page = false;

        for (page_index, page_result) in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
            .enumerate()
        {
            let page = match page_result {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(page = page_index, error = %e, "skipping unreadable page");
                    extraction.warnings.push(Warning::PageSkipped {
                        page: page_index,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let bounds = match page.bounds() {
                Ok(bounds) => bounds,
                Err(e) => {
                    tracing::warn!(page = page_index, error = %e, "skipping page without bounds");
                    extraction.warnings.push(Warning::PageSkipped {
                        page: page_index,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let text_page = match page.to_text_page(TextPageFlags::empty()) {
                Ok(text_page) => text_page,
                Err(e) => {
                    tracing::warn!(page = page_index, error = %e, "skipping unparseable page");
                    extraction.warnings.push(Warning::PageSkipped {
                        page: page_index,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            extraction.pages.push(Page {
                index: page_index,
                width: bounds.x1 - bounds.x0,
                height: bounds.y1 - bounds.y0,
            });
            any_page = true;

            // One block per visual line: line granularity is what the
            // downstream table detector and reading order expect.
            for block in text_page.blocks() {
                for line in block.lines() {
                    let text: String = line
                        .chars()
                        .map(|c| c.char().unwrap_or('\u{FFFD}'))
                        .collect();
                    if text.trim().is_empty() {
                        continue;
                    }
                    let line_bounds = line.bounds();
                    extraction.blocks.push(Block {
                        page_index,
                        text,
                        bbox: BoundingBox {
                            x0: line_bounds.x0,
                            y0: line_bounds.y0,
                            x1: line_bounds.x1,
                            y1: line_bounds.y1,
                        },
                        source: BlockSource::Native,
                        confidence: None,
                    });
                }
            }
        }

        if !any_page {
            return Err(BackendError::ExtractionError(
                "no readable pages in document".into(),
            ));
        }

        Ok(extraction)
    }
}
