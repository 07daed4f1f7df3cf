//! Assembly of pipeline output into the caller-facing payload, plus
//! tabular and file export.

use std::io::Write;
use std::path::Path;

use serde_json::{Value, json};

use docsift_core::{DocumentKind, ExtractionOutcome, ExtractionRows, Row};

/// Supported export file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Build the data payload for an extraction result: a flat object for
/// single-record output, `{"extracted": [...]}` for multi-record.
pub fn assemble_rows(rows: &ExtractionRows) -> Value {
    match rows {
        ExtractionRows::Single(row) => Value::Object(row.clone()),
        ExtractionRows::Multi(rows) => json!({
            "extracted": rows.iter().cloned().map(Value::Object).collect::<Vec<_>>(),
        }),
    }
}

/// Build the full response payload: data plus run metadata.
pub fn assemble(outcome: &ExtractionOutcome) -> Value {
    let source = match outcome.kind {
        DocumentKind::TextNative => "text_native",
        DocumentKind::Scanned => "scanned",
    };
    json!({
        "data": assemble_rows(&outcome.result.rows),
        "model": outcome.result.model,
        "source": source,
        "warnings": outcome
            .warnings
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>(),
    })
}

/// Column-oriented view of an extraction result, one row per record.
/// Null values render as empty cells; everything else as its JSON
/// string form (strings unquoted).
#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn to_sheet(rows: &ExtractionRows) -> SheetData {
    let records: Vec<&Row> = match rows {
        ExtractionRows::Single(row) => vec![row],
        ExtractionRows::Multi(rows) => rows.iter().collect(),
    };

    // Reconciled rows all share the requested key order.
    let headers: Vec<String> = records
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();

    let rows = records
        .iter()
        .map(|row| headers.iter().map(|h| cell(row.get(h))).collect())
        .collect();

    SheetData { headers, rows }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Export an extraction outcome to the given path.
pub fn export_results(
    outcome: &ExtractionOutcome,
    format: ExportFormat,
    path: &Path,
) -> Result<(), String> {
    let content = match format {
        ExportFormat::Json => export_json(outcome)?,
        ExportFormat::Csv => export_csv(&outcome.result.rows),
    };

    let mut file =
        std::fs::File::create(path).map_err(|e| format!("Failed to create file: {}", e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| format!("Failed to write: {}", e))?;
    Ok(())
}

fn export_json(outcome: &ExtractionOutcome) -> Result<String, String> {
    serde_json::to_string_pretty(&assemble(outcome))
        .map(|mut s| {
            s.push('\n');
            s
        })
        .map_err(|e| format!("Failed to serialize: {}", e))
}

fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn export_csv(rows: &ExtractionRows) -> String {
    let sheet = to_sheet(rows);
    let mut out = String::new();
    out.push_str(
        &sheet
            .headers
            .iter()
            .map(|h| csv_escape(h))
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push('\n');
    for row in &sheet.rows {
        out.push_str(
            &row.iter()
                .map(|c| csv_escape(c))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
    }
    out
}
