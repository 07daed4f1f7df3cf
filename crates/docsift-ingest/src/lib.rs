//! Pipeline wiring: classification, the extractor branch, layout and
//! hints, the model call, and final assembly under one deadline.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use docsift_core::model::GeminiModel;
use docsift_core::ner::{HttpEntityRecognizer, NoopRecognizer};
use docsift_core::scan::extract_scanned;
use docsift_core::{
    Block, Config, DocumentKind, EntityRecognizer, ExtractionOutcome, ExtractionRequest,
    FormattedDocument, ModelBackend, NativePdfBackend, OcrEngine, Page, PipelineError, Rasterizer,
    Table, Warning, classify, extract_fields,
};
use docsift_format::hints::build_hints;
use docsift_format::{detect_tables, layout_text};
use docsift_ocr::{PdftoppmRasterizer, TesseractEngine};
use docsift_pdf_mupdf::MupdfBackend;

/// The pipeline's external collaborators, bundled so callers (and
/// tests) can swap any of them.
#[derive(Clone)]
pub struct Backends {
    pub native: Arc<dyn NativePdfBackend>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub ocr: Arc<dyn OcrEngine>,
    pub model: Arc<dyn ModelBackend>,
    pub ner: Arc<dyn EntityRecognizer>,
    pub client: reqwest::Client,
}

impl Backends {
    /// Production wiring: MuPDF parsing, pdftoppm + tesseract for the
    /// scanned path, Gemini for extraction, and the entity service when
    /// one is configured.
    pub fn from_config(config: &Config) -> Self {
        let ner: Arc<dyn EntityRecognizer> = match &config.ner_url {
            Some(url) => Arc::new(HttpEntityRecognizer::new(url.clone())),
            None => Arc::new(NoopRecognizer),
        };
        Self {
            native: Arc::new(MupdfBackend::new()),
            rasterizer: Arc::new(PdftoppmRasterizer::new()),
            ocr: Arc::new(TesseractEngine::new(config.ocr_lang.clone())),
            model: Arc::new(GeminiModel::new(
                config.model_name.clone(),
                config.model_api_key.clone(),
            )),
            ner,
            client: reqwest::Client::new(),
        }
    }
}

/// A classified document and its extraction surface: pages, positioned
/// blocks and detected tables. This is the pipeline state before
/// layout, hints and the model call.
#[derive(Debug, Clone)]
pub struct ClassifiedDocument {
    pub pages: Vec<Page>,
    pub blocks: Vec<Block>,
    pub tables: Vec<Table>,
    pub warnings: Vec<Warning>,
    pub kind: DocumentKind,
}

/// Everything the pipeline knows about a document before the model
/// call. Exposed so callers can inspect text and hints without
/// spending a model request.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub doc: FormattedDocument,
    pub warnings: Vec<Warning>,
    pub kind: DocumentKind,
}

/// Classify the document and run the matching extractor: native text
/// blocks, or per-page OCR for scanned documents, plus best-effort
/// table detection over the extracted blocks. Makes no model call.
pub async fn classify_and_extract(
    pdf: Arc<Vec<u8>>,
    backends: &Backends,
    config: &Config,
    cancel: CancellationToken,
) -> Result<ClassifiedDocument, PipelineError> {
    let kind = classify(&*backends.native, &pdf, config)?;
    tracing::info!(kind = ?kind, "document classified");

    let (pages, blocks, warnings) = match kind {
        DocumentKind::TextNative => {
            let native = Arc::clone(&backends.native);
            let pdf = Arc::clone(&pdf);
            let extraction = tokio::task::spawn_blocking(move || native.extract(&pdf))
                .await
                .map_err(|e| {
                    PipelineError::DocumentUnreadable(format!("extraction task failed: {e}"))
                })?
                .map_err(|e| PipelineError::DocumentUnreadable(e.to_string()))?;
            (extraction.pages, extraction.blocks, extraction.warnings)
        }
        DocumentKind::Scanned => {
            let page_count = backends
                .native
                .page_count(&pdf)
                .map_err(|e| PipelineError::DocumentUnreadable(e.to_string()))?;
            let extraction = extract_scanned(
                Arc::clone(&pdf),
                page_count,
                Arc::clone(&backends.rasterizer),
                Arc::clone(&backends.ocr),
                config,
                cancel,
            )
            .await?;
            (extraction.pages, extraction.blocks, extraction.warnings)
        }
    };

    let tables = detect_tables(&blocks);

    Ok(ClassifiedDocument {
        pages,
        blocks,
        tables,
        warnings,
        kind,
    })
}

/// The pre-model half of the pipeline: classification and extraction
/// via [`classify_and_extract`], then layout and hint generation.
pub async fn prepare(
    pdf: Arc<Vec<u8>>,
    request: &ExtractionRequest,
    backends: &Backends,
    config: &Config,
    cancel: CancellationToken,
) -> Result<PreparedDocument, PipelineError> {
    let ClassifiedDocument {
        pages,
        blocks,
        tables,
        mut warnings,
        kind,
    } = classify_and_extract(pdf, backends, config, cancel).await?;

    let layout = layout_text(&pages, &blocks, &tables);

    // Entity hints are advisory: a failed or unreachable service
    // degrades to pattern-only hints.
    let entities = match backends
        .ner
        .recognize(&layout.text, &backends.client, config.ner_timeout())
        .await
    {
        Ok(entities) => entities,
        Err(e) => {
            tracing::warn!(service = backends.ner.name(), error = %e, "entity layer degraded");
            warnings.push(Warning::HintLayerDegraded {
                layer: "entity".into(),
                reason: e.to_string(),
            });
            Vec::new()
        }
    };

    let hints = build_hints(&layout, &blocks, &entities, request, config.max_hints_per_field);
    let doc = FormattedDocument {
        text: layout.text,
        hints,
        tables,
    };

    Ok(PreparedDocument {
        doc,
        warnings,
        kind,
    })
}

/// Run the whole pipeline under `Config::extraction_deadline`.
///
/// On deadline expiry in-flight work is cancelled and
/// [`PipelineError::ExtractionTimeout`] is returned; partial results
/// are discarded.
pub async fn build_result(
    pdf: Vec<u8>,
    request: &ExtractionRequest,
    backends: &Backends,
    config: &Config,
) -> Result<ExtractionOutcome, PipelineError> {
    let cancel = CancellationToken::new();
    let pdf = Arc::new(pdf);

    match tokio::time::timeout(
        config.extraction_deadline(),
        run_pipeline(pdf, request, backends, config, cancel.clone()),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => {
            cancel.cancel();
            tracing::warn!(
                deadline_secs = config.extraction_deadline_secs,
                "extraction deadline exceeded"
            );
            Err(PipelineError::ExtractionTimeout)
        }
    }
}

async fn run_pipeline(
    pdf: Arc<Vec<u8>>,
    request: &ExtractionRequest,
    backends: &Backends,
    config: &Config,
    cancel: CancellationToken,
) -> Result<ExtractionOutcome, PipelineError> {
    let prepared = prepare(pdf, request, backends, config, cancel).await?;

    let result = extract_fields(
        &prepared.doc,
        request,
        &*backends.model,
        &backends.client,
        config,
    )
    .await?;

    Ok(ExtractionOutcome {
        result,
        warnings: prepared.warnings,
        kind: prepared.kind,
    })
}
