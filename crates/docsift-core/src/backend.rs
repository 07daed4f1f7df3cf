//! Collaborator traits for the extraction pipeline.
//!
//! The pipeline is generic over how pages are parsed, rasterized and
//! OCR'd; implementations live in their own crates so heavy native
//! dependencies stay isolated.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::{Block, BoundingBox, Page, Warning};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of native extraction: pages and line-level blocks, plus
/// warnings for any pages that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct NativeExtraction {
    pub pages: Vec<Page>,
    pub blocks: Vec<Block>,
    pub warnings: Vec<Warning>,
}

/// Trait for native (text-layer) PDF parsing backends.
///
/// Implementors provide the low-level parsing step; reading order,
/// table detection and hint generation live in `docsift-format`.
pub trait NativePdfBackend: Send + Sync {
    /// Number of pages in the document. Fails if the bytes are not a
    /// readable PDF.
    fn page_count(&self, pdf: &[u8]) -> Result<usize, BackendError>;

    /// Extract the raw text of a single page, without layout. Used by
    /// the classifier probe.
    fn probe_page_text(&self, pdf: &[u8], page_index: usize) -> Result<String, BackendError>;

    /// Extract pages and positioned text blocks from the whole
    /// document. Unparseable pages are skipped with a warning; fails
    /// only if no page yields content.
    fn extract(&self, pdf: &[u8]) -> Result<NativeExtraction, BackendError>;
}

#[derive(Error, Debug)]
pub enum RasterizeError {
    #[error("rasterizer unavailable: {0}")]
    Unavailable(String),
    #[error("rasterization failed: {0}")]
    Failed(String),
    #[error("rasterizer produced no output for page {0}")]
    NoOutput(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders a single PDF page to an encoded image at the given DPI.
pub trait Rasterizer: Send + Sync {
    fn rasterize<'a>(
        &'a self,
        pdf: &'a [u8],
        page_index: usize,
        dpi: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, RasterizeError>> + Send + 'a>>;
}

#[derive(Error, Debug)]
pub enum OcrEngineError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    #[error("OCR failed: {0}")]
    Failed(String),
    #[error("unparseable OCR output: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A recognized word with its position and confidence (0.0–1.0).
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// OCR output for one page image: the image dimensions (the coordinate
/// space of the word boxes) and the recognized words.
#[derive(Debug, Clone, Default)]
pub struct OcrOutput {
    pub width: f32,
    pub height: f32,
    pub words: Vec<OcrWord>,
}

/// Runs OCR over an encoded page image, returning word-level output.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    fn recognize<'a>(
        &'a self,
        image: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<OcrOutput, OcrEngineError>> + Send + 'a>>;
}
