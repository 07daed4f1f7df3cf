use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

mod output;

use docsift_core::config_file::load_config;
use docsift_core::{Config, ExtractionRequest};
use docsift_ingest::{Backends, build_result, prepare};
use docsift_reporting::{ExportFormat, export_results};
use output::ColorMode;

/// Structured data extraction from PDF documents
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract structured fields from a PDF document
    Extract {
        /// Path to the PDF file
        file_path: PathBuf,

        /// Document type used to steer the extraction prompt
        #[arg(long, default_value = "invoice")]
        document_type: String,

        /// Comma-separated field names to extract
        #[arg(
            long,
            value_delimiter = ',',
            default_value = "invoice_number,invoice_date,total_amount"
        )]
        fields: Vec<String>,

        /// Extraction model name
        #[arg(long)]
        model: Option<String>,

        /// Model API key
        #[arg(long)]
        api_key: Option<String>,

        /// Rasterization DPI for scanned documents
        #[arg(long)]
        dpi: Option<u32>,

        /// Parallel OCR workers
        #[arg(long)]
        workers: Option<usize>,

        /// Entity-recognition service URL
        #[arg(long)]
        ner_url: Option<String>,

        /// Also write results to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output file format
        #[arg(long, value_parser = ["json", "csv"], default_value = "json")]
        format: String,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Classify and format only: print text and hints without
        /// calling the extraction model
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Extract {
            file_path,
            document_type,
            fields,
            model,
            api_key,
            dpi,
            workers,
            ner_url,
            output,
            format,
            no_color,
            dry_run,
        } => {
            extract(
                file_path,
                document_type,
                fields,
                model,
                api_key,
                dpi,
                workers,
                ner_url,
                output,
                format,
                no_color,
                dry_run,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn extract(
    file_path: PathBuf,
    document_type: String,
    fields: Vec<String>,
    model: Option<String>,
    api_key: Option<String>,
    dpi: Option<u32>,
    workers: Option<usize>,
    ner_url: Option<String>,
    output: Option<PathBuf>,
    format: String,
    no_color: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    // Resolve configuration: CLI flags > env vars > config file > defaults
    let mut config = load_config().apply(Config::default());
    if let Some(model) = model {
        config.model_name = model;
    }
    if let Some(key) = api_key
        .or_else(|| std::env::var("MODEL_API_KEY").ok())
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
    {
        config.model_api_key = Some(key);
    }
    if let Some(dpi) = dpi {
        config.ocr_dpi = dpi;
    }
    if let Some(workers) = workers {
        config.ocr_workers = workers;
    }
    if let Some(url) = ner_url.or_else(|| std::env::var("NER_URL").ok()) {
        config.ner_url = Some(url);
    }

    let color = ColorMode(!no_color);
    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());

    let pdf = tokio::fs::read(&file_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file_path.display(), e))?;
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.display().to_string());

    let request = ExtractionRequest::new(document_type, fields);
    anyhow::ensure!(
        !request.requested_fields.is_empty(),
        "no fields requested (--fields was empty)"
    );

    let backends = Backends::from_config(&config);

    if !docsift_ocr::tools_available().await {
        writeln!(
            writer,
            "Note: pdftoppm/tesseract not found; scanned documents cannot be processed."
        )?;
    }

    if dry_run {
        let prepared = prepare(
            Arc::new(pdf),
            &request,
            &backends,
            &config,
            CancellationToken::new(),
        )
        .await
        .map_err(|e| anyhow::anyhow!("[{}] {}", e.error_code(), e))?;
        output::print_prepared(&mut writer, &file_name, &prepared, color)?;
        return Ok(());
    }

    let outcome = build_result(pdf, &request, &backends, &config)
        .await
        .map_err(|e| anyhow::anyhow!("[{}] {}", e.error_code(), e))?;

    output::print_outcome(&mut writer, &file_name, &outcome, color)?;

    if let Some(path) = output {
        let export_format = if format == "csv" {
            ExportFormat::Csv
        } else {
            ExportFormat::Json
        };
        export_results(&outcome, export_format, &path).map_err(|e| anyhow::anyhow!(e))?;
        writeln!(writer, "\nResults written to {}", path.display())?;
    }

    Ok(())
}
