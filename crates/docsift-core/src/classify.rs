//! Text-native vs. scanned decision.
//!
//! A read-only probe: deterministic and cheap to re-run for the same
//! bytes.

use crate::backend::{BackendError, NativePdfBackend};
use crate::{Config, PipelineError};

/// The binary classification driving extractor selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    TextNative,
    Scanned,
}

/// Classify a document by probing for extractable text.
///
/// Probes up to `classifier_page_cap` pages; any page with more than
/// `classifier_min_text_len` non-whitespace characters classifies the
/// document as [`DocumentKind::TextNative`]. A zero-page or corrupt
/// PDF fails with [`PipelineError::DocumentUnreadable`] before
/// classification is attempted.
pub fn classify(
    backend: &dyn NativePdfBackend,
    pdf: &[u8],
    config: &Config,
) -> Result<DocumentKind, PipelineError> {
    let page_count = backend
        .page_count(pdf)
        .map_err(|e| PipelineError::DocumentUnreadable(e.to_string()))?;
    if page_count == 0 {
        return Err(PipelineError::DocumentUnreadable(
            "document has no pages".into(),
        ));
    }

    let probed = page_count.min(config.classifier_page_cap.max(1));
    for page_index in 0..probed {
        match backend.probe_page_text(pdf, page_index) {
            Ok(text) => {
                let visible = text.chars().filter(|c| !c.is_whitespace()).count();
                if visible > config.classifier_min_text_len {
                    tracing::debug!(page = page_index, chars = visible, "text-native probe hit");
                    return Ok(DocumentKind::TextNative);
                }
            }
            // A single unreadable page does not decide the document.
            Err(BackendError::OpenError(e)) => {
                return Err(PipelineError::DocumentUnreadable(e));
            }
            Err(e) => {
                tracing::debug!(page = page_index, error = %e, "probe failed, continuing");
            }
        }
    }

    Ok(DocumentKind::Scanned)
}
