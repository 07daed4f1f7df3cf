use std::time::Duration;

use thiserror::Error;

pub mod backend;
pub mod classify;
pub mod config_file;
pub mod model;
pub mod ner;
pub mod orchestrator;
pub mod scan;

// Re-export for convenience
pub use backend::{
    BackendError, NativeExtraction, NativePdfBackend, OcrEngine, OcrEngineError, OcrOutput,
    OcrWord, RasterizeError, Rasterizer,
};
pub use classify::{DocumentKind, classify};
pub use model::{ModelBackend, ModelError};
pub use ner::{Entity, EntityRecognizer, EntityType};
pub use orchestrator::{CallState, extract_fields, reconcile};

/// A single page of the source document.
///
/// `width`/`height` are in the coordinate space the page's blocks use:
/// PDF points for the native path, image pixels at the configured DPI
/// for the OCR path.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 0-based page ordinal.
    pub index: usize,
    pub width: f32,
    pub height: f32,
}

/// Which extraction path produced a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSource {
    Native,
    Ocr,
}

/// Axis-aligned bounding box in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Vertical overlap in absolute units (0 if the bands are disjoint).
    pub fn vertical_overlap(&self, other: &BoundingBox) -> f32 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }
}

/// A positioned run of recognized text on a page.
///
/// Blocks are produced by exactly one extractor path per document and
/// never mutated after creation, only aggregated.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub page_index: usize,
    pub text: String,
    pub bbox: BoundingBox,
    pub source: BlockSource,
    /// Mean word confidence, 0.0–1.0. OCR path only.
    pub confidence: Option<f32>,
}

/// A detected table: ordered rows of cell strings (empty string for a
/// missing cell). Produced only by the native/table-aware path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub page_index: usize,
    pub rows: Vec<Vec<String>>,
}

/// What the caller asked to extract. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub document_type: String,
    /// Ordered, duplicate-free field names.
    pub requested_fields: Vec<String>,
}

impl ExtractionRequest {
    /// Build a request, collapsing duplicate field names to their first
    /// occurrence and dropping empty names.
    pub fn new(document_type: impl Into<String>, fields: impl IntoIterator<Item = String>) -> Self {
        let mut requested_fields: Vec<String> = Vec::new();
        for field in fields {
            let field = field.trim().to_string();
            if !field.is_empty() && !requested_fields.contains(&field) {
                requested_fields.push(field);
            }
        }
        Self {
            document_type: document_type.into(),
            requested_fields,
        }
    }
}

/// Which heuristic layer produced a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintLayer {
    Pattern,
    Entity,
}

/// A candidate value for a requested field, derived by heuristic
/// rather than by the extraction model.
#[derive(Debug, Clone, PartialEq)]
pub struct Hint {
    pub value: String,
    /// Index into the document's block slice, when the source block is known.
    pub block_index: Option<usize>,
    pub layer: HintLayer,
}

/// The normalized document handed to the extraction model: linear text
/// in reading order plus per-field candidate hints. Derived, never
/// persisted.
#[derive(Debug, Clone)]
pub struct FormattedDocument {
    pub text: String,
    /// One entry per requested field, in request order. Empty hint
    /// lists are valid.
    pub hints: Vec<(String, Vec<Hint>)>,
    pub tables: Vec<Table>,
}

/// A reconciled record: field name → value, insertion-ordered to match
/// the requested field order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Reconciled model output: one record, or an ordered sequence of
/// records for line-item style responses.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionRows {
    Single(Row),
    Multi(Vec<Row>),
}

/// The final structured result of a pipeline run.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub rows: ExtractionRows,
    /// Raw extraction-model response, kept for audit.
    pub raw_response: String,
    /// Name of the model backend that produced the response.
    pub model: String,
}

/// A successful run plus any non-fatal degradations encountered on the way.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub result: ExtractionResult,
    pub warnings: Vec<Warning>,
    pub kind: DocumentKind,
}

/// Non-fatal degradations surfaced alongside a successful result.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A page was skipped during extraction; the rest of the document
    /// was still processed.
    PageSkipped { page: usize, reason: String },
    /// A hint layer failed; hints from that layer are missing.
    HintLayerDegraded { layer: String, reason: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::PageSkipped { page, reason } => {
                write!(f, "page {} skipped: {}", page + 1, reason)
            }
            Warning::HintLayerDegraded { layer, reason } => {
                write!(f, "{} hint layer degraded: {}", layer, reason)
            }
        }
    }
}

/// Fatal pipeline errors. Per-page and per-hint-layer failures are
/// absorbed as [`Warning`]s instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("document unreadable: {0}")]
    DocumentUnreadable(String),
    #[error("scanned extraction failed: {0}")]
    ScanExtractionFailed(String),
    #[error("extraction model returned invalid response: {0}")]
    LlmResponseInvalid(String),
    #[error("extraction model call timed out")]
    LlmTimeout,
    #[error("extraction model request failed: {0}")]
    ModelRequestFailed(String),
    #[error("overall extraction deadline exceeded")]
    ExtractionTimeout,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable machine-readable code for the API surface.
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::DocumentUnreadable(_) => "DOCUMENT_UNREADABLE",
            PipelineError::ScanExtractionFailed(_) => "SCAN_EXTRACTION_FAILED",
            PipelineError::LlmResponseInvalid(_) => "LLM_RESPONSE_INVALID",
            PipelineError::LlmTimeout => "LLM_TIMEOUT",
            PipelineError::ModelRequestFailed(_) => "MODEL_REQUEST_FAILED",
            PipelineError::ExtractionTimeout => "EXTRACTION_TIMEOUT",
            PipelineError::Io(_) => "IO_ERROR",
        }
    }
}

/// Runtime configuration for the pipeline.
#[derive(Clone)]
pub struct Config {
    /// Maximum number of pages probed for extractable text during
    /// classification.
    pub classifier_page_cap: usize,
    /// Minimum non-whitespace character count for a probed page to
    /// count as text-bearing.
    pub classifier_min_text_len: usize,
    /// Rasterization resolution. Lower DPI means smaller images and
    /// much less RAM; 150 is good for OCR accuracy.
    pub ocr_dpi: u32,
    /// Bounded per-page OCR parallelism. Small by default: rasterized
    /// page images dominate peak memory.
    pub ocr_workers: usize,
    /// Maximum horizontal gap (in image pixels) between words merged
    /// into one block.
    pub ocr_merge_gap: f32,
    /// Tesseract language code.
    pub ocr_lang: String,
    pub max_hints_per_field: usize,
    /// Prompt text budget; longer documents keep the head plus a
    /// trailing window.
    pub max_prompt_text_len: usize,
    pub prompt_tail_len: usize,
    pub model_name: String,
    pub model_api_key: Option<String>,
    pub model_timeout_secs: u64,
    /// Overall request deadline. Long, to accommodate OCR.
    pub extraction_deadline_secs: u64,
    /// Base URL of an entity-recognition service. `None` disables the
    /// entity hint layer.
    pub ner_url: Option<String>,
    pub ner_timeout_secs: u64,
}

impl Config {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn extraction_deadline(&self) -> Duration {
        Duration::from_secs(self.extraction_deadline_secs)
    }

    pub fn ner_timeout(&self) -> Duration {
        Duration::from_secs(self.ner_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            classifier_page_cap: 10,
            classifier_min_text_len: 25,
            ocr_dpi: 150,
            ocr_workers: 2,
            ocr_merge_gap: 18.0,
            ocr_lang: "eng".into(),
            max_hints_per_field: 8,
            max_prompt_text_len: 12_000,
            prompt_tail_len: 2_000,
            model_name: "gemini-2.0-flash".into(),
            model_api_key: None,
            model_timeout_secs: 30,
            extraction_deadline_secs: 120,
            ner_url: None,
            ner_timeout_secs: 5,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("classifier_page_cap", &self.classifier_page_cap)
            .field("classifier_min_text_len", &self.classifier_min_text_len)
            .field("ocr_dpi", &self.ocr_dpi)
            .field("ocr_workers", &self.ocr_workers)
            .field("ocr_merge_gap", &self.ocr_merge_gap)
            .field("ocr_lang", &self.ocr_lang)
            .field("max_hints_per_field", &self.max_hints_per_field)
            .field("max_prompt_text_len", &self.max_prompt_text_len)
            .field("prompt_tail_len", &self.prompt_tail_len)
            .field("model_name", &self.model_name)
            .field("model_api_key", &self.model_api_key.as_ref().map(|_| "***"))
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("extraction_deadline_secs", &self.extraction_deadline_secs)
            .field("ner_url", &self.ner_url)
            .field("ner_timeout_secs", &self.ner_timeout_secs)
            .finish()
    }
}
