//! End-to-end pipeline tests over stub collaborators. No real PDFs,
//! subprocesses or network calls.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use docsift_core::model::{MockModel, MockModelResponse};
use docsift_core::ner::NoopRecognizer;
use docsift_core::{
    BackendError, Block, BlockSource, BoundingBox, Config, DocumentKind, ExtractionRequest,
    ExtractionRows, NativeExtraction, NativePdfBackend, OcrEngine, OcrEngineError, OcrOutput,
    OcrWord, Page, PipelineError, RasterizeError, Rasterizer, Warning,
};
use docsift_ingest::{Backends, build_result, classify_and_extract};
use tokio_util::sync::CancellationToken;

fn block(page: usize, text: &str, x0: f32, y0: f32) -> Block {
    Block {
        page_index: page,
        text: text.into(),
        bbox: BoundingBox {
            x0,
            y0,
            x1: x0 + 100.0,
            y1: y0 + 12.0,
        },
        source: BlockSource::Native,
        confidence: None,
    }
}

/// Canned native backend: per-page probe text plus a fixed extraction.
struct StubNative {
    probe_pages: Vec<String>,
    extraction: NativeExtraction,
}

impl StubNative {
    fn text_native(lines: &[&str]) -> Self {
        let joined = lines.join("\n");
        let blocks = lines
            .iter()
            .enumerate()
            .map(|(i, line)| block(0, line, 50.0, 50.0 + 20.0 * i as f32))
            .collect();
        Self {
            probe_pages: vec![joined],
            extraction: NativeExtraction {
                pages: vec![Page {
                    index: 0,
                    width: 612.0,
                    height: 792.0,
                }],
                blocks,
                warnings: Vec::new(),
            },
        }
    }

    fn scanned(page_count: usize) -> Self {
        Self {
            probe_pages: vec![String::new(); page_count],
            extraction: NativeExtraction::default(),
        }
    }
}

impl NativePdfBackend for StubNative {
    fn page_count(&self, _pdf: &[u8]) -> Result<usize, BackendError> {
        Ok(self.probe_pages.len())
    }

    fn probe_page_text(&self, _pdf: &[u8], page_index: usize) -> Result<String, BackendError> {
        Ok(self.probe_pages[page_index].clone())
    }

    fn extract(&self, _pdf: &[u8]) -> Result<NativeExtraction, BackendError> {
        Ok(self.extraction.clone())
    }
}

/// Rasterizer stub: pages listed in `failing` error out, the rest
/// return the page index as a one-byte image.
struct StubRasterizer {
    failing: Vec<usize>,
}

impl Rasterizer for StubRasterizer {
    fn rasterize<'a>(
        &'a self,
        _pdf: &'a [u8],
        page_index: usize,
        _dpi: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, RasterizeError>> + Send + 'a>> {
        let fail = self.failing.contains(&page_index);
        Box::pin(async move {
            if fail {
                Err(RasterizeError::Failed("render error".into()))
            } else {
                Ok(vec![page_index as u8])
            }
        })
    }
}

/// OCR stub keyed on the one-byte images from [`StubRasterizer`].
struct StubOcr {
    pages: Vec<Vec<OcrWord>>,
}

impl StubOcr {
    fn word(text: &str, x0: f32) -> OcrWord {
        OcrWord {
            text: text.into(),
            bbox: BoundingBox {
                x0,
                y0: 100.0,
                x1: x0 + 50.0,
                y1: 115.0,
            },
            confidence: 0.9,
        }
    }
}

impl OcrEngine for StubOcr {
    fn name(&self) -> &str {
        "stub-ocr"
    }

    fn recognize<'a>(
        &'a self,
        image: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<OcrOutput, OcrEngineError>> + Send + 'a>> {
        Box::pin(async move {
            let page_index = image[0] as usize;
            Ok(OcrOutput {
                width: 1275.0,
                height: 1650.0,
                words: self.pages[page_index].clone(),
            })
        })
    }
}

fn backends(native: StubNative, rasterizer: StubRasterizer, ocr: StubOcr, model: Arc<MockModel>) -> Backends {
    Backends {
        native: Arc::new(native),
        rasterizer: Arc::new(rasterizer),
        ocr: Arc::new(ocr),
        model,
        ner: Arc::new(NoopRecognizer),
        client: reqwest::Client::new(),
    }
}

fn invoice_request() -> ExtractionRequest {
    ExtractionRequest::new(
        "invoice",
        vec![
            "invoice_number".to_string(),
            "invoice_date".to_string(),
            "total_amount".to_string(),
        ],
    )
}

#[tokio::test]
async fn text_native_invoice_extracts_requested_fields() {
    let native = StubNative::text_native(&[
        "ACME Corp Invoice",
        "Invoice number: INV-042",
        "Date: 12/03/2024",
        "Total due: $1,250.00",
    ]);
    let model = Arc::new(MockModel::new(
        "mock",
        MockModelResponse::Text(
            r#"{"invoice_number":"INV-042","invoice_date":"12/03/2024","total_amount":"1,250.00"}"#
                .into(),
        ),
    ));
    let backends = backends(
        native,
        StubRasterizer { failing: vec![] },
        StubOcr { pages: vec![] },
        Arc::clone(&model),
    );

    let outcome = build_result(vec![0u8], &invoice_request(), &backends, &Config::default())
        .await
        .unwrap();

    assert_eq!(outcome.kind, DocumentKind::TextNative);
    assert!(outcome.warnings.is_empty());
    match outcome.result.rows {
        ExtractionRows::Single(row) => {
            assert_eq!(row["invoice_number"], "INV-042");
            assert_eq!(row["invoice_date"], "12/03/2024");
            assert_eq!(row["total_amount"], "1,250.00");
            let keys: Vec<_> = row.keys().cloned().collect();
            assert_eq!(keys, vec!["invoice_number", "invoice_date", "total_amount"]);
        }
        _ => panic!("expected single row"),
    }

    // Pattern hints from the document text reached the prompt.
    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("INV-042"));
    assert!(prompts[0].contains("12/03/2024"));
}

#[tokio::test]
async fn scanned_document_survives_one_failed_page() {
    let native = StubNative::scanned(2);
    let rasterizer = StubRasterizer { failing: vec![0] };
    let ocr = StubOcr {
        pages: vec![
            vec![],
            vec![
                StubOcr::word("Total", 100.0),
                StubOcr::word("amount:", 160.0),
                StubOcr::word("99.00", 220.0),
            ],
        ],
    };
    let model = Arc::new(MockModel::new(
        "mock",
        MockModelResponse::Text(r#"{"total_amount":"99.00"}"#.into()),
    ));
    let backends = backends(native, rasterizer, ocr, Arc::clone(&model));

    let request = ExtractionRequest::new("receipt", vec!["total_amount".to_string()]);
    let outcome = build_result(vec![0u8], &request, &backends, &Config::default())
        .await
        .unwrap();

    assert_eq!(outcome.kind, DocumentKind::Scanned);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(matches!(
        outcome.warnings[0],
        Warning::PageSkipped { page: 0, .. }
    ));
    match outcome.result.rows {
        ExtractionRows::Single(row) => assert_eq!(row["total_amount"], "99.00"),
        _ => panic!("expected single row"),
    }

    // The OCR'd text made it into the prompt.
    assert!(model.prompts()[0].contains("Total amount: 99.00"));
}

#[tokio::test]
async fn multi_row_response_reconciles_each_row() {
    let native = StubNative::text_native(&[
        "Line items",
        "Widget 2 10.00",
        "Gadget 1 25.00",
        "Sprocket 4 8.00",
    ]);
    let model = Arc::new(MockModel::new(
        "mock",
        MockModelResponse::Text(
            r#"[{"item":"Widget","quantity":2},{"item":"Gadget"},{"item":"Sprocket","quantity":4,"extra":"x"}]"#
                .into(),
        ),
    ));
    let backends = backends(
        native,
        StubRasterizer { failing: vec![] },
        StubOcr { pages: vec![] },
        model,
    );

    let request =
        ExtractionRequest::new("invoice", vec!["item".to_string(), "quantity".to_string()]);
    let outcome = build_result(vec![0u8], &request, &backends, &Config::default())
        .await
        .unwrap();

    match outcome.result.rows {
        ExtractionRows::Multi(rows) => {
            assert_eq!(rows.len(), 3);
            assert_eq!(rows[0]["quantity"], 2);
            assert_eq!(rows[1]["quantity"], serde_json::Value::Null);
            assert!(!rows[2].contains_key("extra"));
        }
        _ => panic!("expected multi rows"),
    }
}

#[tokio::test]
async fn classification_stage_exposes_blocks_without_model_call() {
    let native = StubNative::text_native(&[
        "Item          Qty",
        "Widget        2",
        "Invoice number: INV-7",
    ]);
    let model = Arc::new(MockModel::new(
        "mock",
        MockModelResponse::Text("{}".into()),
    ));
    let backends = backends(
        native,
        StubRasterizer { failing: vec![] },
        StubOcr { pages: vec![] },
        Arc::clone(&model),
    );

    let classified = classify_and_extract(
        Arc::new(vec![0u8]),
        &backends,
        &Config::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(classified.kind, DocumentKind::TextNative);
    assert_eq!(classified.pages.len(), 1);
    assert_eq!(classified.blocks.len(), 3);
    assert!(classified.warnings.is_empty());
    // Classification and extraction never touch the model.
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn persistent_model_timeout_fails_after_one_retry() {
    let native = StubNative::text_native(&["Invoice number: INV-1 issued by Acme Corporation"]);
    let model = Arc::new(MockModel::new("mock", MockModelResponse::Timeout));
    let backends = backends(
        native,
        StubRasterizer { failing: vec![] },
        StubOcr { pages: vec![] },
        Arc::clone(&model),
    );

    let err = build_result(
        vec![0u8],
        &invoice_request(),
        &backends,
        &Config::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::LlmTimeout));
    assert_eq!(err.error_code(), "LLM_TIMEOUT");
    // One initial call plus one retry with the same request.
    assert_eq!(model.call_count(), 2);
    let prompts = model.prompts();
    assert_eq!(prompts[0], prompts[1]);
}

#[tokio::test]
async fn transient_model_timeout_recovers_on_retry() {
    let native = StubNative::text_native(&["Invoice number: INV-1 issued by Acme Corporation"]);
    let model = Arc::new(MockModel::with_sequence(
        "mock",
        vec![
            MockModelResponse::Timeout,
            MockModelResponse::Text(r#"{"invoice_number":"INV-1"}"#.into()),
        ],
    ));
    let backends = backends(
        native,
        StubRasterizer { failing: vec![] },
        StubOcr { pages: vec![] },
        Arc::clone(&model),
    );

    let request = ExtractionRequest::new("invoice", vec!["invoice_number".to_string()]);
    let outcome = build_result(vec![0u8], &request, &backends, &Config::default())
        .await
        .unwrap();

    match outcome.result.rows {
        ExtractionRows::Single(row) => assert_eq!(row["invoice_number"], "INV-1"),
        _ => panic!("expected single row"),
    }
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn persistent_non_json_response_fails_after_retry() {
    let native = StubNative::text_native(&["Invoice number: INV-1 issued by Acme Corporation"]);
    let model = Arc::new(MockModel::new(
        "mock",
        MockModelResponse::Text("I could not find structured data, sorry.".into()),
    ));
    let backends = backends(
        native,
        StubRasterizer { failing: vec![] },
        StubOcr { pages: vec![] },
        Arc::clone(&model),
    );

    let err = build_result(
        vec![0u8],
        &invoice_request(),
        &backends,
        &Config::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::LlmResponseInvalid(_)));
    assert_eq!(err.error_code(), "LLM_RESPONSE_INVALID");
    // One initial call plus one strict retry, nothing more.
    assert_eq!(model.call_count(), 2);
    assert!(model.prompts()[1].contains("ONLY valid JSON"));
}

#[tokio::test]
async fn all_pages_failing_ocr_is_a_scan_extraction_failure() {
    let native = StubNative::scanned(2);
    let rasterizer = StubRasterizer {
        failing: vec![0, 1],
    };
    let ocr = StubOcr { pages: vec![] };
    let model = Arc::new(MockModel::new(
        "mock",
        MockModelResponse::Text("{}".into()),
    ));
    let backends = backends(native, rasterizer, ocr, model);

    let err = build_result(
        vec![0u8],
        &invoice_request(),
        &backends,
        &Config::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.error_code(), "SCAN_EXTRACTION_FAILED");
}

#[tokio::test(start_paused = true)]
async fn deadline_expiry_surfaces_extraction_timeout() {
    let native = StubNative::text_native(&["Invoice number: INV-1 issued by Acme Corporation"]);
    let model = Arc::new(
        MockModel::new(
            "mock",
            MockModelResponse::Text(r#"{"invoice_number":"INV-1"}"#.into()),
        )
        .with_delay(std::time::Duration::from_secs(5)),
    );
    let backends = backends(
        native,
        StubRasterizer { failing: vec![] },
        StubOcr { pages: vec![] },
        model,
    );

    let config = Config {
        extraction_deadline_secs: 1,
        ..Config::default()
    };

    let err = build_result(vec![0u8], &invoice_request(), &backends, &config)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ExtractionTimeout));
    assert_eq!(err.error_code(), "EXTRACTION_TIMEOUT");
}
