//! CLI binary for invoice-extract.
//!
//! A thin shim over the library crate: loads the given files into a session,
//! analyses every document one by one, prints the results and writes the
//! CSV export.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use invoice_extract::{
    build_export_today, resolve_input, write_export, DocumentStatus, ExtractionConfig,
    ExtractionProgressCallback, InvoiceData, LlmExtractor, Orchestrator, ProgressCallback,
    SessionStore, SourceFile, TempFilePreviews,
};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a progress bar plus one log line per document.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} invoices  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total} invoice(s)…"))
        ));
    }

    fn on_document_start(&self, index: usize, _total: usize, file_name: &str) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(index, Instant::now());
        }
        self.bar.set_message(file_name.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, file_name: &str, item_count: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            green("✓"),
            index,
            total,
            file_name,
            dim(&format!("{item_count} item(s)")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, file_name: &str, error: &str) {
        let secs = self.elapsed_secs(index);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            file_name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} invoice(s) extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} invoice(s) extracted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract two invoices and write invoices_<date>.csv to the current directory
  invoice-extract scan1.png invoice.pdf

  # Write the CSV elsewhere and print the extracted fields as JSON
  invoice-extract --output-dir exports --json *.pdf

  # Use a specific model
  invoice-extract --provider gemini --model gemini-2.0-flash receipt.jpg

  # Download from a URL
  invoice-extract https://example.com/invoices/INV-1001.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Extract invoice fields from images and PDFs with Vision LLMs and export them to CSV.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-extract",
    version,
    about = "Extract invoice fields from images and PDFs using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Invoice files (images or PDFs) or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Directory the CSV export is written to.
    #[arg(short, long, env = "INVOICE_EXTRACT_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Skip writing the CSV export.
    #[arg(long)]
    no_export: bool,

    /// LLM model ID (e.g. gpt-4.1-mini, gemini-2.0-flash).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "INVOICE_EXTRACT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per invoice.
    #[arg(long, env = "INVOICE_EXTRACT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Path to a text file containing a custom system instruction.
    #[arg(long, env = "INVOICE_EXTRACT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Message recorded on documents whose analysis failed.
    #[arg(long, env = "INVOICE_EXTRACT_FAILURE_MESSAGE")]
    failure_message: Option<String>,

    /// Print the extracted data of every document as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "INVOICE_EXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE_EXTRACT_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "INVOICE_EXTRACT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

/// One document in `--json` output.
#[derive(Serialize)]
struct DocumentReport<'a> {
    id: &'a str,
    file: &'a str,
    status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a InvoiceData>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters; library INFO
    // logs would only interleave with it.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Upload ───────────────────────────────────────────────────────────
    let files = load_inputs(&cli).await;
    if files.is_empty() {
        anyhow::bail!("None of the {} input(s) could be loaded", cli.inputs.len());
    }

    let previews = TempFilePreviews::new().context("Failed to create preview directory")?;
    let store = Arc::new(SessionStore::new(Arc::new(previews)));
    store.add(files).context("Failed to add documents to the session")?;

    // ── Extract ──────────────────────────────────────────────────────────
    let extractor = LlmExtractor::from_config(&config).context("No LLM provider available")?;
    let orchestrator = Orchestrator::new(store.clone(), Arc::new(extractor), config);
    let summary = orchestrator.analyze_pending().await;

    let snapshot = store.snapshot();

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let reports: Vec<DocumentReport<'_>> = snapshot
            .items
            .iter()
            .map(|item| DocumentReport {
                id: item.id.as_str(),
                file: &item.file.name,
                status: item.status,
                error: item.error.as_deref(),
                data: item.data.as_ref(),
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise results")?
        );
    } else if !cli.quiet {
        for item in &snapshot.items {
            match (&item.status, &item.data) {
                (DocumentStatus::Success, Some(data)) => println!(
                    "{}  {}  #{}  {}  {} {}  {}",
                    green("SUCCESS"),
                    bold(&item.file.name),
                    data.invoice_number,
                    data.invoice_date,
                    data.total_amount,
                    data.currency,
                    dim(&format!("{} item(s)", data.items.len())),
                ),
                (status, _) => println!(
                    "{}  {}  {}",
                    red(&status.to_string()),
                    bold(&item.file.name),
                    item.error.as_deref().unwrap_or(""),
                ),
            }
        }
    }

    // ── Export ───────────────────────────────────────────────────────────
    if !cli.no_export {
        match build_export_today(&snapshot).context("Failed to build CSV export")? {
            Some(export) => {
                let path = write_export(&export, &cli.output_dir)
                    .await
                    .context("Failed to write CSV export")?;
                if !cli.quiet {
                    eprintln!(
                        "{}  {} row(s)  →  {}",
                        green("✔"),
                        export.rows,
                        bold(&path.display().to_string())
                    );
                }
            }
            None => {
                if !cli.quiet {
                    eprintln!("{} nothing to export", cyan("⚠"));
                }
            }
        }
    }

    if !cli.quiet && !show_progress {
        eprintln!(
            "Extracted {}/{} invoice(s) in {}ms",
            summary.succeeded, summary.attempted, summary.duration_ms
        );
    }

    Ok(())
}

/// Load every input, reporting the ones that cannot be read.
async fn load_inputs(cli: &Cli) -> Vec<SourceFile> {
    let mut files = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        match resolve_input(input, cli.download_timeout).await {
            Ok(file) => files.push(file),
            Err(e) => eprintln!("{} {}", red("✗"), e),
        }
    }
    files
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref message) = cli.failure_message {
        builder = builder.failure_message(message.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
