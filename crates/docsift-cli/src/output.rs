use std::io::Write;

use owo_colors::OwoColorize;

use docsift_core::{DocumentKind, ExtractionOutcome, HintLayer, Warning};
use docsift_ingest::PreparedDocument;
use docsift_reporting::to_sheet;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn kind_str(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::TextNative => "text-native",
        DocumentKind::Scanned => "scanned",
    }
}

fn print_warnings(
    w: &mut dyn Write,
    warnings: &[Warning],
    color: ColorMode,
) -> std::io::Result<()> {
    for warning in warnings {
        if color.enabled() {
            writeln!(w, "{}", format!("warning: {}", warning).yellow())?;
        } else {
            writeln!(w, "warning: {}", warning)?;
        }
    }
    Ok(())
}

/// Print the extraction result: one `field: value` line per field, or
/// numbered records for multi-row output.
pub fn print_outcome(
    w: &mut dyn Write,
    file_name: &str,
    outcome: &ExtractionOutcome,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(
        w,
        "Extracted from {} ({} path, model {})",
        file_name,
        kind_str(outcome.kind),
        outcome.result.model
    )?;
    print_warnings(w, &outcome.warnings, color)?;
    writeln!(w)?;

    let sheet = to_sheet(&outcome.result.rows);
    let multi = sheet.rows.len() > 1;
    for (i, row) in sheet.rows.iter().enumerate() {
        if multi {
            writeln!(w, "Record {}:", i + 1)?;
        }
        let indent = if multi { "  " } else { "" };
        for (header, cell) in sheet.headers.iter().zip(row) {
            if color.enabled() {
                if cell.is_empty() {
                    writeln!(w, "{}{}: {}", indent, header.cyan(), "-".dimmed())?;
                } else {
                    writeln!(w, "{}{}: {}", indent, header.cyan(), cell)?;
                }
            } else {
                let display = if cell.is_empty() { "-" } else { cell.as_str() };
                writeln!(w, "{}{}: {}", indent, header, display)?;
            }
        }
    }
    Ok(())
}

/// Print the pre-model view of a document: classification, formatted
/// text, and per-field hints. Used by `--dry-run`.
pub fn print_prepared(
    w: &mut dyn Write,
    file_name: &str,
    prepared: &PreparedDocument,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(
        w,
        "{} classified as {} ({} tables detected)",
        file_name,
        kind_str(prepared.kind),
        prepared.doc.tables.len()
    )?;
    print_warnings(w, &prepared.warnings, color)?;
    writeln!(w)?;

    writeln!(w, "--- document text ---")?;
    writeln!(w, "{}", prepared.doc.text)?;
    writeln!(w)?;

    writeln!(w, "--- hints ---")?;
    for (field, hints) in &prepared.doc.hints {
        let rendered: Vec<String> = hints
            .iter()
            .map(|h| {
                let layer = match h.layer {
                    HintLayer::Pattern => "pattern",
                    HintLayer::Entity => "entity",
                };
                format!("{} ({})", h.value, layer)
            })
            .collect();
        let joined = if rendered.is_empty() {
            "-".to_string()
        } else {
            rendered.join(", ")
        };
        if color.enabled() {
            writeln!(w, "{}: {}", field.cyan(), joined)?;
        } else {
            writeln!(w, "{}: {}", field, joined)?;
        }
    }
    Ok(())
}
