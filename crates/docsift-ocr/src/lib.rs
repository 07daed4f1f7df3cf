//! Subprocess-backed rasterization and OCR.
//!
//! Requires `pdftoppm` (from poppler-utils) and `tesseract` on the
//! system path. Both run as child processes so a crash in either tool
//! cannot take the pipeline down with it.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;

use docsift_core::{OcrEngine, OcrEngineError, OcrOutput, RasterizeError, Rasterizer};

mod tsv;

pub use tsv::parse_tsv;

/// Check that both external tools respond to `--version`/`-v`.
pub async fn tools_available() -> bool {
    let pdftoppm = Command::new("pdftoppm")
        .arg("-v")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false);
    let tesseract = Command::new("tesseract")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false);

    if !pdftoppm {
        tracing::debug!("pdftoppm not found, install poppler-utils for scanned documents");
    }
    if !tesseract {
        tracing::debug!("tesseract not found, install tesseract-ocr for scanned documents");
    }
    pdftoppm && tesseract
}

/// Renders single pages to PNG via `pdftoppm`.
#[derive(Debug, Default)]
pub struct PdftoppmRasterizer;

impl PdftoppmRasterizer {
    pub fn new() -> Self {
        Self
    }

    async fn rasterize_page(
        &self,
        pdf: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, RasterizeError> {
        let temp_dir = tempfile::tempdir()?;
        let pdf_path = temp_dir.path().join("input.pdf");
        tokio::fs::write(&pdf_path, pdf).await?;

        let output_prefix = temp_dir.path().join("page");
        // pdftoppm pages are 1-based.
        let page_number = (page_index + 1).to_string();
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(&page_number)
            .arg("-l")
            .arg(&page_number)
            .arg(&pdf_path)
            .arg(&output_prefix)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RasterizeError::Unavailable("pdftoppm not found on PATH".into())
                } else {
                    RasterizeError::Failed(format!("failed to run pdftoppm: {e}"))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RasterizeError::Failed(format!(
                "pdftoppm failed: {}",
                stderr.trim()
            )));
        }

        // Exactly one page was requested, so exactly one PNG appears.
        let mut entries = tokio::fs::read_dir(temp_dir.path()).await?;
        let mut image_path = None;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "png") {
                image_path = Some(entry.path());
                break;
            }
        }
        let image_path = image_path.ok_or(RasterizeError::NoOutput(page_index))?;
        Ok(tokio::fs::read(&image_path).await?)
    }
}

impl Rasterizer for PdftoppmRasterizer {
    fn rasterize<'a>(
        &'a self,
        pdf: &'a [u8],
        page_index: usize,
        dpi: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, RasterizeError>> + Send + 'a>> {
        Box::pin(self.rasterize_page(pdf, page_index, dpi))
    }
}

/// Word-level OCR via `tesseract` in TSV output mode.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    lang: String,
}

impl TesseractEngine {
    pub fn new(lang: impl Into<String>) -> Self {
        Self { lang: lang.into() }
    }

    async fn run(&self, image: &[u8]) -> Result<OcrOutput, OcrEngineError> {
        let temp_dir = tempfile::tempdir()?;
        let image_path = temp_dir.path().join("page.png");
        tokio::fs::write(&image_path, image).await?;

        let output = Command::new("tesseract")
            .arg(&image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("tsv")
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OcrEngineError::Unavailable("tesseract not found on PATH".into())
                } else {
                    OcrEngineError::Failed(format!("failed to run tesseract: {e}"))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrEngineError::Failed(format!(
                "tesseract failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_tsv(&stdout)
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize<'a>(
        &'a self,
        image: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<OcrOutput, OcrEngineError>> + Send + 'a>> {
        Box::pin(self.run(image))
    }
}
