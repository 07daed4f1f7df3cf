//! Scanned-document extraction: rasterize each page, OCR it, and
//! reassemble word-level output into line blocks.
//!
//! Pages are processed independently so one bad page never aborts the
//! document. Parallelism is bounded by `Config::ocr_workers`; page
//! images dominate peak memory, so the default favors memory over
//! latency. Output ordering is reconstructed from page indices and is
//! independent of task completion order.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backend::{OcrEngine, OcrOutput, OcrWord, Rasterizer};
use crate::{Block, BlockSource, BoundingBox, Config, Page, PipelineError, Warning};

/// Result of scanned-path extraction.
#[derive(Debug, Clone, Default)]
pub struct ScanExtraction {
    pub pages: Vec<Page>,
    pub blocks: Vec<Block>,
    pub warnings: Vec<Warning>,
}

enum PageOutcome {
    Done { page: Page, blocks: Vec<Block> },
    Skipped { reason: String },
    Cancelled,
}

/// OCR every page of the document.
///
/// Rasterization failure skips the page; an OCR engine failure is
/// retried once with the same parameters, then the page is skipped.
/// Fails with [`PipelineError::ScanExtractionFailed`] only if every
/// page was skipped.
pub async fn extract_scanned(
    pdf: Arc<Vec<u8>>,
    page_count: usize,
    rasterizer: Arc<dyn Rasterizer>,
    ocr: Arc<dyn OcrEngine>,
    config: &Config,
    cancel: CancellationToken,
) -> Result<ScanExtraction, PipelineError> {
    if page_count == 0 {
        return Err(PipelineError::DocumentUnreadable(
            "document has no pages".into(),
        ));
    }

    tracing::info!(
        pages = page_count,
        dpi = config.ocr_dpi,
        workers = config.ocr_workers,
        "starting scanned extraction"
    );

    let semaphore = Arc::new(Semaphore::new(config.ocr_workers.max(1)));
    let dpi = config.ocr_dpi;
    let merge_gap = config.ocr_merge_gap;

    let mut join_set = JoinSet::new();
    for page_index in 0..page_count {
        let pdf = Arc::clone(&pdf);
        let rasterizer = Arc::clone(&rasterizer);
        let ocr = Arc::clone(&ocr);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();

        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(p) => p,
                Err(_) => return (page_index, PageOutcome::Cancelled),
            };
            if cancel.is_cancelled() {
                return (page_index, PageOutcome::Cancelled);
            }
            let outcome = ocr_one_page(&pdf, page_index, dpi, merge_gap, &*rasterizer, &*ocr).await;
            (page_index, outcome)
        });
    }

    let mut outcomes: Vec<Option<PageOutcome>> = (0..page_count).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((page_index, outcome)) => outcomes[page_index] = Some(outcome),
            // A panicked page task leaves its slot empty; the page is
            // skipped below like any other per-page failure.
            Err(e) => tracing::warn!(error = %e, "OCR page task failed"),
        }
    }

    if cancel.is_cancelled() {
        // Completed pages' partial results are discarded, not returned.
        return Err(PipelineError::ExtractionTimeout);
    }

    let mut pages = Vec::new();
    let mut blocks = Vec::new();
    let mut warnings = Vec::new();
    for (page_index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Some(PageOutcome::Done {
                page,
                blocks: page_blocks,
            }) => {
                pages.push(page);
                blocks.extend(page_blocks);
            }
            Some(PageOutcome::Skipped { reason }) => {
                tracing::warn!(page = page_index, reason = %reason, "OCR page skipped");
                warnings.push(Warning::PageSkipped {
                    page: page_index,
                    reason,
                });
            }
            Some(PageOutcome::Cancelled) => {
                return Err(PipelineError::ExtractionTimeout);
            }
            None => {
                warnings.push(Warning::PageSkipped {
                    page: page_index,
                    reason: "page task failed".into(),
                });
            }
        }
    }

    if pages.is_empty() {
        return Err(PipelineError::ScanExtractionFailed(format!(
            "all {} pages failed OCR",
            page_count
        )));
    }

    tracing::info!(
        pages = pages.len(),
        blocks = blocks.len(),
        skipped = warnings.len(),
        "scanned extraction done"
    );

    Ok(ScanExtraction {
        pages,
        blocks,
        warnings,
    })
}

async fn ocr_one_page(
    pdf: &[u8],
    page_index: usize,
    dpi: u32,
    merge_gap: f32,
    rasterizer: &dyn Rasterizer,
    ocr: &dyn OcrEngine,
) -> PageOutcome {
    let image = match rasterizer.rasterize(pdf, page_index, dpi).await {
        Ok(image) => image,
        Err(e) => {
            return PageOutcome::Skipped {
                reason: format!("rasterization failed: {}", e),
            };
        }
    };

    // One retry with the same parameters, then skip.
    let output = match ocr.recognize(&image).await {
        Ok(output) => output,
        Err(first) => {
            tracing::debug!(page = page_index, error = %first, "OCR failed, retrying once");
            match ocr.recognize(&image).await {
                Ok(output) => output,
                Err(second) => {
                    return PageOutcome::Skipped {
                        reason: format!("OCR failed after retry: {}", second),
                    };
                }
            }
        }
    };

    let page = Page {
        index: page_index,
        width: output.width,
        height: output.height,
    };
    let blocks = group_words(&output, page_index, merge_gap);
    PageOutcome::Done { page, blocks }
}

/// Group OCR words into line blocks by geometric proximity.
///
/// Words whose vertical bands overlap by at least half the smaller
/// word height belong to the same line; within a line, consecutive
/// words merge into one block while the horizontal gap stays below
/// `merge_gap`. Block confidence is the mean of its word confidences.
pub fn group_words(output: &OcrOutput, page_index: usize, merge_gap: f32) -> Vec<Block> {
    let mut order: Vec<usize> = (0..output.words.len())
        .filter(|&i| !output.words[i].text.trim().is_empty())
        .collect();
    // Stable order: top edge, then left edge, then input order.
    order.sort_by(|&a, &b| {
        let (wa, wb) = (&output.words[a], &output.words[b]);
        wa.bbox
            .y0
            .total_cmp(&wb.bbox.y0)
            .then(wa.bbox.x0.total_cmp(&wb.bbox.x0))
            .then(a.cmp(&b))
    });

    // Assign words to lines by vertical-band overlap.
    let mut lines: Vec<(BoundingBox, Vec<usize>)> = Vec::new();
    for &i in &order {
        let word = &output.words[i];
        let mut assigned = false;
        for (band, members) in lines.iter_mut() {
            let overlap = band.vertical_overlap(&word.bbox);
            let min_height = band.height().min(word.bbox.height()).max(1.0);
            if overlap >= min_height * 0.5 {
                *band = band.union(&word.bbox);
                members.push(i);
                assigned = true;
                break;
            }
        }
        if !assigned {
            lines.push((word.bbox, vec![i]));
        }
    }

    let mut blocks = Vec::new();
    for (_, mut members) in lines {
        members.sort_by(|&a, &b| {
            output.words[a]
                .bbox
                .x0
                .total_cmp(&output.words[b].bbox.x0)
                .then(a.cmp(&b))
        });

        let mut run: Vec<&OcrWord> = Vec::new();
        for &i in &members {
            let word = &output.words[i];
            if let Some(last) = run.last() {
                if word.bbox.x0 - last.bbox.x1 > merge_gap {
                    blocks.push(flush_run(&run, page_index));
                    run.clear();
                }
            }
            run.push(word);
        }
        if !run.is_empty() {
            blocks.push(flush_run(&run, page_index));
        }
    }

    blocks
}

fn flush_run(words: &[&OcrWord], page_index: usize) -> Block {
    let mut bbox = words[0].bbox;
    let mut text = String::new();
    let mut confidence_sum = 0.0f32;
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            text.push(' ');
            bbox = bbox.union(&word.bbox);
        }
        text.push_str(word.text.trim());
        confidence_sum += word.confidence;
    }
    Block {
        page_index,
        text,
        bbox,
        source: BlockSource::Ocr,
        confidence: Some(confidence_sum / words.len() as f32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x0: f32, y0: f32, x1: f32, y1: f32, conf: f32) -> OcrWord {
        OcrWord {
            text: text.into(),
            bbox: BoundingBox { x0, y0, x1, y1 },
            confidence: conf,
        }
    }

    #[test]
    fn words_on_one_line_merge_into_one_block() {
        let output = OcrOutput {
            width: 1000.0,
            height: 1000.0,
            words: vec![
                word("Total", 10.0, 100.0, 60.0, 115.0, 0.9),
                word("amount:", 65.0, 101.0, 130.0, 116.0, 0.8),
                word("10.00", 140.0, 100.0, 190.0, 115.0, 1.0),
            ],
        };
        let blocks = group_words(&output, 0, 18.0);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Total amount: 10.00");
        assert_eq!(blocks[0].source, BlockSource::Ocr);
        let conf = blocks[0].confidence.unwrap();
        assert!((conf - 0.9).abs() < 1e-6);
    }

    #[test]
    fn wide_gap_splits_blocks_on_same_line() {
        let output = OcrOutput {
            width: 1000.0,
            height: 1000.0,
            words: vec![
                word("Invoice", 10.0, 100.0, 70.0, 115.0, 0.9),
                word("10.00", 600.0, 100.0, 650.0, 115.0, 0.9),
            ],
        };
        let blocks = group_words(&output, 0, 18.0);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "Invoice");
        assert_eq!(blocks[1].text, "10.00");
    }

    #[test]
    fn separate_lines_stay_separate() {
        let output = OcrOutput {
            width: 1000.0,
            height: 1000.0,
            words: vec![
                word("first", 10.0, 100.0, 50.0, 115.0, 0.9),
                word("second", 10.0, 140.0, 60.0, 155.0, 0.9),
            ],
        };
        let blocks = group_words(&output, 3, 18.0);
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.page_index == 3));
    }

    #[test]
    fn empty_words_are_dropped() {
        let output = OcrOutput {
            width: 100.0,
            height: 100.0,
            words: vec![word("  ", 0.0, 0.0, 5.0, 5.0, 0.0)],
        };
        assert!(group_words(&output, 0, 18.0).is_empty());
    }

    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::backend::{OcrEngineError, RasterizeError};

    struct OkRasterizer;

    impl Rasterizer for OkRasterizer {
        fn rasterize<'a>(
            &'a self,
            _pdf: &'a [u8],
            page_index: usize,
            _dpi: u32,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, RasterizeError>> + Send + 'a>> {
            Box::pin(async move { Ok(vec![page_index as u8]) })
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyOcr {
        failures: usize,
        calls: AtomicUsize,
    }

    impl OcrEngine for FlakyOcr {
        fn name(&self) -> &str {
            "flaky"
        }

        fn recognize<'a>(
            &'a self,
            _image: &'a [u8],
        ) -> Pin<Box<dyn Future<Output = Result<OcrOutput, OcrEngineError>> + Send + 'a>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = call < self.failures;
            Box::pin(async move {
                if fail {
                    Err(OcrEngineError::Failed("transient".into()))
                } else {
                    Ok(OcrOutput {
                        width: 1275.0,
                        height: 1650.0,
                        words: vec![word("hello", 10.0, 100.0, 60.0, 115.0, 0.9)],
                    })
                }
            })
        }
    }

    #[tokio::test]
    async fn transient_ocr_failure_is_retried_once() {
        let ocr = Arc::new(FlakyOcr {
            failures: 1,
            calls: AtomicUsize::new(0),
        });
        let result = extract_scanned(
            Arc::new(vec![0u8]),
            1,
            Arc::new(OkRasterizer),
            Arc::clone(&ocr) as Arc<dyn OcrEngine>,
            &Config::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.pages.len(), 1);
        assert_eq!(result.blocks[0].text, "hello");
        assert!(result.warnings.is_empty());
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);
    }

    /// Panics on page 0, recognizes one word on every other page.
    struct PanickyOcr;

    impl OcrEngine for PanickyOcr {
        fn name(&self) -> &str {
            "panicky"
        }

        fn recognize<'a>(
            &'a self,
            image: &'a [u8],
        ) -> Pin<Box<dyn Future<Output = Result<OcrOutput, OcrEngineError>> + Send + 'a>> {
            let page_index = image[0] as usize;
            Box::pin(async move {
                if page_index == 0 {
                    panic!("engine crash");
                }
                Ok(OcrOutput {
                    width: 1275.0,
                    height: 1650.0,
                    words: vec![word("world", 10.0, 100.0, 60.0, 115.0, 0.9)],
                })
            })
        }
    }

    #[tokio::test]
    async fn panicked_page_task_becomes_a_skip_not_a_timeout() {
        let result = extract_scanned(
            Arc::new(vec![0u8]),
            2,
            Arc::new(OkRasterizer),
            Arc::new(PanickyOcr),
            &Config::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.pages.len(), 1);
        assert_eq!(result.pages[0].index, 1);
        assert_eq!(result.blocks[0].text, "world");
        assert_eq!(result.warnings.len(), 1);
        assert!(matches!(
            result.warnings[0],
            Warning::PageSkipped { page: 0, .. }
        ));
    }

    #[tokio::test]
    async fn persistent_ocr_failure_skips_the_page() {
        let ocr = Arc::new(FlakyOcr {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let err = extract_scanned(
            Arc::new(vec![0u8]),
            1,
            Arc::new(OkRasterizer),
            Arc::clone(&ocr) as Arc<dyn OcrEngine>,
            &Config::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::ScanExtractionFailed(_)));
        // One initial attempt and one retry, nothing more.
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);
    }
}
