//! Extraction-model orchestration: prompt construction, the bounded
//! external call, response parsing with retry, and reconciliation of
//! the model's output against the requested fields.

use serde_json::Value;

use crate::model::{ModelBackend, ModelError};
use crate::{
    Config, ExtractionRequest, ExtractionResult, ExtractionRows, FormattedDocument, PipelineError,
    Row,
};

/// Orchestrator state machine:
/// `Pending → ModelCalled → Parsed → Reconciled` on the happy path,
/// with `ParseRetry` between a failed parse and the stricter second
/// call, and `Failed` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Pending,
    ModelCalled,
    Parsed,
    ParseRetry,
    Reconciled,
    Failed,
}

impl CallState {
    fn advance(&mut self, next: CallState) {
        tracing::debug!(from = ?self, to = ?next, "orchestrator state");
        *self = next;
    }
}

/// Run the extraction model over a formatted document and reconcile
/// its output against the requested fields.
///
/// The external call is bounded by `Config::model_timeout`; a timeout
/// is retried once with the same request before surfacing
/// [`PipelineError::LlmTimeout`]. A JSON parse failure triggers one
/// retry with a stricter "return JSON only" instruction before
/// surfacing [`PipelineError::LlmResponseInvalid`].
pub async fn extract_fields(
    doc: &FormattedDocument,
    request: &ExtractionRequest,
    backend: &dyn ModelBackend,
    client: &reqwest::Client,
    config: &Config,
) -> Result<ExtractionResult, PipelineError> {
    let mut state = CallState::Pending;
    let prompt = build_prompt(doc, request, config);

    state.advance(CallState::ModelCalled);
    let raw = match call_model(backend, &prompt, client, config).await {
        Ok(raw) => raw,
        Err(e) => {
            state.advance(CallState::Failed);
            return Err(e);
        }
    };

    let (raw, parsed) = match parse_response(&raw) {
        Ok(value) => {
            state.advance(CallState::Parsed);
            (raw, value)
        }
        Err(parse_err) => {
            state.advance(CallState::ParseRetry);
            tracing::warn!(error = %parse_err, "model response was not JSON, retrying with strict instruction");
            let strict_prompt = format!(
                "{}\nYour previous reply was not valid JSON. Return ONLY valid JSON, with no prose and no code fences.",
                prompt
            );
            let retry_raw = match call_model(backend, &strict_prompt, client, config).await {
                Ok(raw) => raw,
                Err(e) => {
                    state.advance(CallState::Failed);
                    return Err(e);
                }
            };
            match parse_response(&retry_raw) {
                Ok(value) => {
                    state.advance(CallState::Parsed);
                    (retry_raw, value)
                }
                Err(e) => {
                    state.advance(CallState::Failed);
                    return Err(PipelineError::LlmResponseInvalid(e));
                }
            }
        }
    };

    let rows = reconcile(&parsed, &request.requested_fields);
    state.advance(CallState::Reconciled);

    Ok(ExtractionResult {
        rows,
        raw_response: raw,
        model: backend.name().to_string(),
    })
}

async fn call_model(
    backend: &dyn ModelBackend,
    prompt: &str,
    client: &reqwest::Client,
    config: &Config,
) -> Result<String, PipelineError> {
    let timeout = config.model_timeout();
    match backend.generate(prompt, client, timeout).await {
        Ok(raw) => Ok(raw),
        Err(ModelError::Timeout) => {
            tracing::warn!(model = backend.name(), "model call timed out, retrying once");
            match backend.generate(prompt, client, timeout).await {
                Ok(raw) => Ok(raw),
                Err(ModelError::Timeout) => Err(PipelineError::LlmTimeout),
                Err(e) => Err(PipelineError::ModelRequestFailed(e.to_string())),
            }
        }
        Err(e) => Err(PipelineError::ModelRequestFailed(e.to_string())),
    }
}

/// Build the extraction prompt: document type, field list, candidate
/// hints, and the formatted text (truncated to the configured budget).
pub fn build_prompt(doc: &FormattedDocument, request: &ExtractionRequest, config: &Config) -> String {
    let field_list = request
        .requested_fields
        .iter()
        .map(|f| format!("- {}", f))
        .collect::<Vec<_>>()
        .join("\n");

    let mut hints = serde_json::Map::new();
    for (field, field_hints) in &doc.hints {
        if field_hints.is_empty() {
            continue;
        }
        let values: Vec<Value> = field_hints
            .iter()
            .map(|h| Value::String(h.value.clone()))
            .collect();
        hints.insert(field.clone(), Value::Array(values));
    }
    let hints_json =
        serde_json::to_string_pretty(&Value::Object(hints)).unwrap_or_else(|_| "{}".into());

    let text = truncate_text(&doc.text, config.max_prompt_text_len, config.prompt_tail_len);

    format!(
        "You are extracting structured data from a {document_type}.\n\
         Extract ONLY the requested fields.\n\
         Return ONLY valid JSON.\n\
         If a field is missing, return null.\n\
         FIELDS TO EXTRACT:\n{field_list}\n\
         CANDIDATE VALUES:\n{hints_json}\n\
         DOCUMENT TEXT:\n{text}",
        document_type = request.document_type,
    )
}

/// Truncate to `max_len` bytes keeping the head plus a trailing window
/// of `tail_len` bytes. Totals and signatures tend to sit at the end
/// of a document, so the tail is worth keeping.
pub fn truncate_text(text: &str, max_len: usize, tail_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let tail_len = tail_len.min(max_len / 2);
    let head_len = max_len - tail_len;

    let head_end = floor_char_boundary(text, head_len);
    let tail_start = ceil_char_boundary(text, text.len() - tail_len);

    format!("{}\n[...]\n{}", &text[..head_end], &text[tail_start..])
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Parse the model response as JSON, tolerating markdown code fences.
fn parse_response(raw: &str) -> Result<Value, String> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Ok(value);
    }
    let cleaned = raw
        .trim()
        .replace("```json", "")
        .replace("```", "");
    serde_json::from_str::<Value>(cleaned.trim()).map_err(|e| e.to_string())
}

/// Force the model's output to match exactly the requested field set.
///
/// For every requested field absent from a row, insert null; drop every
/// key that was not requested. A top-level array is treated as a
/// multi-row response with each row reconciled independently
/// (non-object elements are dropped). Any other top-level shape
/// reconciles to a single all-null row.
pub fn reconcile(parsed: &Value, requested_fields: &[String]) -> ExtractionRows {
    match parsed {
        Value::Array(items) => {
            let rows = items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(obj) => Some(reconcile_row(obj, requested_fields)),
                    other => {
                        tracing::warn!(value = %other, "dropping non-object row from model response");
                        None
                    }
                })
                .collect();
            ExtractionRows::Multi(rows)
        }
        Value::Object(obj) => ExtractionRows::Single(reconcile_row(obj, requested_fields)),
        other => {
            tracing::warn!(value = %other, "model returned a non-object top level, filling nulls");
            ExtractionRows::Single(reconcile_row(&serde_json::Map::new(), requested_fields))
        }
    }
}

fn reconcile_row(row: &Row, requested_fields: &[String]) -> Row {
    let mut out = Row::new();
    for field in requested_fields {
        out.insert(field.clone(), row.get(field).cloned().unwrap_or(Value::Null));
    }
    out
}
