//! CLI binary for pdf2nl.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints per-document results plus a batch summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2nl::{
    collect_documents, BatchProgressCallback, BatchSummary, Credentials, Pipeline, PipelineConfig,
    PipelineResult, TableHeuristic, CONVERT_API_KEY_ENV, PARSE_API_KEY_ENV,
};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and per-document
/// log lines using [indicatif]. Works correctly when documents complete
/// out-of-order (concurrent mode).
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-document wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn on_document_start(&self, index: usize, _total: usize, name: &str) {
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, name: &str, success: bool) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        let tick = if success { green("✓") } else { red("✗") };
        self.bar.println(format!(
            "  {} {:<40} {:>3}/{:<3}  {}",
            tick,
            name,
            index + 1,
            total,
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let failed = total.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} documents converted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every PDF under ./data (sequential)
  pdf2nl

  # Convert one document
  pdf2nl report.pdf

  # Concurrent batch with 8 documents in flight
  pdf2nl ./invoices --concurrent --max-in-flight 8

  # Force the table prompt, skip the markup artifact
  pdf2nl pricing.pdf --table-prompt --no-save-markdown

  # Custom output locations
  pdf2nl ./docs --markdown-dir out/md --nl-dir out/nl

  # Abort the whole batch after 10 minutes
  pdf2nl ./archive --concurrent --batch-timeout 600

  # Structured JSON results on stdout
  pdf2nl ./data --json > results.json

OUTPUT LAYOUT:
  <markdown-dir>/<stem>.md        parsed markup, one file per document
  <nl-dir>/<stem>_nl.txt          natural-language text with a metadata header

PROMPT SELECTION:
  Documents whose markup is dense with table markers (pipe rows, HTML table
  tags) get a table-focused prompt that narrates every cell with its row and
  column context; everything else gets a general prose prompt. Override with
  --table-prompt / --general-prompt, or supply --prompt-file to replace both.

ENVIRONMENT VARIABLES:
  LLAMA_PARSE_API_KEY     Parsing-service key (required)
  ANTHROPIC_API_KEY       Conversion-service key (required)

SETUP:
  1. Set both keys:   export LLAMA_PARSE_API_KEY=llx-... ANTHROPIC_API_KEY=sk-ant-...
  2. Convert:         pdf2nl document.pdf
"#;

/// Convert PDF documents to retrieval-ready natural-language text.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2nl",
    version,
    about = "Convert PDF documents to retrieval-ready natural-language text",
    long_about = "Convert PDF documents into natural-language prose suitable for RAG indexing. \
Each document is parsed into semi-structured markup by a remote parsing service, then rewritten \
as flowing English sentences by an LLM — tables become one statement per cell, so every fact \
carries its own context.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file, or directory whose *.pdf files are processed (non-recursive).
    #[arg(default_value = "data")]
    input: PathBuf,

    /// Force the table-focused prompt for every document.
    #[arg(long, conflicts_with = "general_prompt")]
    table_prompt: bool,

    /// Force the general prose prompt for every document.
    #[arg(long)]
    general_prompt: bool,

    /// Path to a custom prompt template ({markup} is replaced with the markup).
    #[arg(long, env = "PDF2NL_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Table-marker density above which the table prompt is auto-selected.
    #[arg(long, env = "PDF2NL_TABLE_THRESHOLD", default_value_t = 0.05)]
    table_threshold: f32,

    /// Skip writing the parsed markup artifact.
    #[arg(long)]
    no_save_markdown: bool,

    /// Skip writing the natural-language artifact.
    #[arg(long)]
    no_save_nl: bool,

    /// Directory for markup artifacts.
    #[arg(long, env = "PDF2NL_MARKDOWN_DIR", default_value = "output/markdown")]
    markdown_dir: PathBuf,

    /// Directory for natural-language artifacts.
    #[arg(long, env = "PDF2NL_NL_DIR", default_value = "output/natural_language")]
    nl_dir: PathBuf,

    /// Overlap the remote calls of independent documents.
    #[arg(short, long, env = "PDF2NL_CONCURRENT")]
    concurrent: bool,

    /// Documents in flight at once (concurrent mode).
    #[arg(long, env = "PDF2NL_MAX_IN_FLIGHT", default_value_t = 4)]
    max_in_flight: usize,

    /// Abort the batch after this many seconds; unfinished documents are
    /// recorded as cancelled.
    #[arg(long, env = "PDF2NL_BATCH_TIMEOUT")]
    batch_timeout: Option<u64>,

    /// Conversion model ID.
    #[arg(long, env = "PDF2NL_MODEL")]
    model: Option<String>,

    /// Max tokens the conversion model may generate per document.
    #[arg(long, env = "PDF2NL_MAX_TOKENS", default_value_t = 8000)]
    max_tokens: u32,

    /// Retries per service call on transient failure.
    #[arg(long, env = "PDF2NL_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-HTTP-request timeout in seconds.
    #[arg(long, env = "PDF2NL_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Parsing-service API key (overrides LLAMA_PARSE_API_KEY).
    #[arg(long, value_name = "KEY")]
    parse_api_key: Option<String>,

    /// Conversion-service API key (overrides ANTHROPIC_API_KEY).
    #[arg(long, value_name = "KEY")]
    anthropic_api_key: Option<String>,

    /// Output structured JSON results instead of the text summary.
    #[arg(long, env = "PDF2NL_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDF2NL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2NL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2NL_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active; the
    // bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Collect inputs ───────────────────────────────────────────────────
    let documents = collect_documents(&cli.input)
        .with_context(|| format!("Failed to collect documents from {:?}", cli.input))?;
    if documents.is_empty() {
        anyhow::bail!("No PDF documents found under {:?}", cli.input);
    }

    // ── Build config and pipeline ────────────────────────────────────────
    let config = build_config(&cli, show_progress).await?;
    let pipeline = Pipeline::new(config).with_context(|| {
        format!(
            "Pipeline setup failed (are {PARSE_API_KEY_ENV} and {CONVERT_API_KEY_ENV} set?)"
        )
    })?;

    // ── Run ──────────────────────────────────────────────────────────────
    let results = pipeline.process_batch(&documents).await;
    let summary = BatchSummary::from_results(&results);

    if cli.json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            summary: &'a BatchSummary,
            results: &'a [PipelineResult],
        }
        let json = serde_json::to_string_pretty(&JsonOutput {
            summary: &summary,
            results: &results,
        })
        .context("Failed to serialise results")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&results, &summary);
    }

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, show_progress: bool) -> Result<PipelineConfig> {
    let custom_prompt = if let Some(ref path) = cli.prompt_file {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt template from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = PipelineConfig::builder()
        .credentials(Credentials::from_env())
        .force_table_prompt(cli.table_prompt)
        .force_general_prompt(cli.general_prompt)
        .table_heuristic(TableHeuristic {
            threshold: cli.table_threshold,
            ..TableHeuristic::default()
        })
        .save_markdown(!cli.no_save_markdown)
        .save_natural_language(!cli.no_save_nl)
        .markdown_dir(&cli.markdown_dir)
        .natural_language_dir(&cli.nl_dir)
        .concurrent(cli.concurrent)
        .max_in_flight(cli.max_in_flight)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .request_timeout_secs(cli.request_timeout);

    if let Some(ref key) = cli.parse_api_key {
        builder = builder.parse_api_key(key.clone());
    }
    if let Some(ref key) = cli.anthropic_api_key {
        builder = builder.convert_api_key(key.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(prompt) = custom_prompt {
        builder = builder.custom_prompt(prompt);
    }
    if let Some(secs) = cli.batch_timeout {
        builder = builder.batch_timeout_secs(secs);
    }
    if show_progress {
        builder = builder.progress(CliProgressCallback::new());
    }

    builder.build().context("Invalid configuration")
}

/// Per-document lines plus the aggregate block, on stderr.
fn print_summary(results: &[PipelineResult], summary: &BatchSummary) {
    for r in results {
        if let Some(ref err) = r.error {
            eprintln!("  {} {}  {}", red("✗"), r.document, red(&err.to_string()));
        } else if let Some(ref err) = r.persist_error {
            eprintln!(
                "  {} {}  converted, but artifact write failed: {}",
                cyan("⚠"),
                r.document,
                err
            );
        }
        if let Some(ref c) = r.conversion {
            if c.truncated {
                eprintln!(
                    "  {} {}  output truncated at the token cap — consider raising --max-tokens",
                    cyan("⚠"),
                    r.document
                );
            }
        }
    }

    eprintln!(
        "{}  {}/{} documents  {} pages  {} tokens in / {} tokens out",
        if summary.failed == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        summary.succeeded,
        summary.total,
        summary.total_pages,
        dim(&summary.total_input_tokens.to_string()),
        dim(&summary.total_output_tokens.to_string()),
    );
    if summary.persist_failures > 0 {
        eprintln!(
            "   {} artifact write(s) failed — results above are in-memory only",
            red(&summary.persist_failures.to_string())
        );
    }
}
