//! CLI binary for docquest.
//!
//! A thin shim over the library crate: maps CLI flags to `PipelineConfig`,
//! ingests every input, then answers questions from flags or from an
//! interactive prompt.

use anyhow::{Context, Result};
use clap::Parser;
use docquest::{
    CancellationToken, ChainScope, DocQuestError, DocumentRecord, IngestProgressCallback,
    IngestedDocument, Pipeline, PipelineConfig, ProgressCallback, Session,
};
use docquest::pipeline::input;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
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

/// One progress bar shared by every document being ingested. Each document
/// grows the bar's length when its page count becomes known.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Ingesting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_document_start(&self, document: &str, total_pages: usize, batches: usize) {
        self.bar.inc_length(total_pages as u64);
        self.bar.println(format!(
            "{} {}  {}",
            cyan("◆"),
            bold(document),
            dim(&format!("{total_pages} pages in {batches} batches")),
        ));
    }

    fn on_batch_start(&self, document: &str, batch: usize, first_page: usize, last_page: usize) {
        self.bar
            .set_message(format!("{document} batch {batch} (p. {first_page}–{last_page})"));
    }

    fn on_page_complete(&self, _document: &str, _page: usize, _total_pages: usize) {
        self.bar.inc(1);
    }

    fn on_page_error(&self, document: &str, page: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {} p. {:>3}  {}",
            red("✗"),
            document,
            page,
            red(&msg)
        ));
    }

    fn on_document_complete(&self, document: &str, total_pages: usize, degraded_pages: usize) {
        let mark = if degraded_pages == 0 {
            green("✔")
        } else {
            cyan("⚠")
        };
        self.bar.println(format!(
            "{} {}  {} pages  {}",
            mark,
            bold(document),
            total_pages,
            dim(&format!("{degraded_pages} degraded")),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ingest a PDF and ask one question
  docquest report.pdf -q "What were the main risks identified?"

  # Several documents, several questions (history carries over)
  docquest q1.pdf q2.pdf deck.pptx -q "Compare revenue" -q "Which quarter was best?"

  # Interactive session
  docquest handbook.pdf

  # Export the knowledge records, then reuse them without re-ingesting
  docquest report.pdf --output records.json
  docquest --load records.json -q "Summarise page 3"

  # Office documents need a conversion service
  docquest memo.docx --converter-url http://localhost:8080/convert

INTERACTIVE COMMANDS:
  :docs    list ingested documents
  :reset   clear the conversation history
  :quit    leave (also Ctrl-D)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY           OpenAI API key
  ANTHROPIC_API_KEY        Anthropic API key
  GEMINI_API_KEY           Google Gemini API key
  DOCQUEST_LLM_PROVIDER    Override provider (openai, anthropic, gemini, ollama)
  DOCQUEST_MODEL           Override model ID
  DOCQUEST_CONVERTER_URL   Office-to-PDF conversion endpoint
  PDFIUM_LIB_PATH          Path to libpdfium (otherwise the system library is used)
"#;

/// Ingest documents and ask questions about them.
#[derive(Parser, Debug)]
#[command(
    name = "docquest",
    version,
    about = "Ingest PDF and office documents and ask questions about them",
    long_about = "Ingest PDF and office documents (local files or URLs) into page-ordered \
knowledge records: every page is summarised with its predecessor as context, and pages \
dominated by charts, figures or scans are explained by a vision model. Then ask questions \
answered strictly from those records, with page citations.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs (PDF or office documents).
    inputs: Vec<String>,

    /// Previously exported record files (JSON) to add without re-ingesting.
    #[arg(long, value_name = "FILE")]
    load: Vec<PathBuf>,

    /// Question to answer; repeat for a conversation. Omit for interactive mode.
    #[arg(short = 'q', long = "question", value_name = "TEXT")]
    questions: Vec<String>,

    /// Print the document records as JSON to stdout.
    #[arg(long, env = "DOCQUEST_JSON")]
    json: bool,

    /// Write the document records as JSON to this file.
    #[arg(short, long, env = "DOCQUEST_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "DOCQUEST_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "DOCQUEST_LLM_PROVIDER")]
    provider: Option<String>,

    /// Pages per batch.
    #[arg(long, env = "DOCQUEST_BATCH_SIZE", default_value_t = 5)]
    batch_size: usize,

    /// Batches processed concurrently.
    #[arg(short, long, env = "DOCQUEST_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Text coverage below which a page with images/drawings is sent to the vision model.
    #[arg(long, env = "DOCQUEST_IMAGE_THRESHOLD", default_value_t = 0.4)]
    image_threshold: f64,

    /// Reach of the summary context chain.
    #[arg(long, env = "DOCQUEST_CHAIN_SCOPE", value_enum, default_value = "batch")]
    chain_scope: ChainScopeArg,

    /// Use the default summarisation persona instead of inferring one.
    #[arg(long, env = "DOCQUEST_NO_PERSONA")]
    no_persona: bool,

    /// Attempts per LLM call.
    #[arg(long, env = "DOCQUEST_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Delay after the first failed attempt, in milliseconds (doubles each time).
    #[arg(long, env = "DOCQUEST_BACKOFF_MS", default_value_t = 2000)]
    backoff_ms: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "DOCQUEST_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Office-to-PDF conversion endpoint.
    #[arg(long, env = "DOCQUEST_CONVERTER_URL")]
    converter_url: Option<String>,

    /// Conversion request timeout in seconds.
    #[arg(long, env = "DOCQUEST_CONVERSION_TIMEOUT", default_value_t = 120)]
    conversion_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCQUEST_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Longest edge of a rendered page in pixels.
    #[arg(long, env = "DOCQUEST_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCQUEST_PASSWORD")]
    password: Option<String>,

    /// Disable progress bar.
    #[arg(long, env = "DOCQUEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCQUEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(long, env = "DOCQUEST_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ChainScopeArg {
    Batch,
    Document,
}

impl From<ChainScopeArg> for ChainScope {
    fn from(v: ChainScopeArg) -> Self {
        match v {
            ChainScopeArg::Batch => ChainScope::Batch,
            ChainScopeArg::Document => ChainScope::Document,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inputs.is_empty();
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

    // ── Build pipeline ───────────────────────────────────────────────────
    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(&cli, progress.clone().map(|cb| cb as ProgressCallback))?;
    let pipeline = Pipeline::new(config.clone()).context("Failed to initialise the LLM provider")?;
    let mut session = Session::new(pipeline.model(), &config);

    // ── Load exported records ────────────────────────────────────────────
    for path in &cli.load {
        for record in load_records(path).await? {
            if !cli.quiet {
                eprintln!("{} loaded {}", green("✔"), bold(&record.document_name));
            }
            session.add_document(record);
        }
    }

    // ── Ingest inputs ────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} cancelling…", cyan("⚠"));
                cancel.cancel();
            }
        });
    }

    let results = ingest_all(&pipeline, &cli, &cancel).await;
    if let Some(ref cb) = progress {
        cb.finish();
    }

    let mut failures = 0usize;
    for (input, result) in results {
        match result {
            Ok(doc) => {
                if !cli.quiet {
                    print_stats(&doc);
                }
                session.add_document(doc.record);
            }
            Err(DocQuestError::Cancelled { name }) => {
                eprintln!("{} {} cancelled", cyan("⚠"), name);
                failures += 1;
            }
            Err(e) => {
                eprintln!("{} {}: {}", red("✘"), bold(&input), e);
                failures += 1;
            }
        }
    }
    if cancel.is_cancelled() {
        anyhow::bail!("Cancelled");
    }
    pipeline.shutdown();

    // ── Export ───────────────────────────────────────────────────────────
    let records: Vec<&DocumentRecord> = session.documents().values().collect();
    if cli.json {
        let json = serde_json::to_string_pretty(&records).context("Failed to serialise records")?;
        println!("{json}");
    }
    if let Some(ref path) = cli.output {
        write_atomic(path, &records).await?;
        if !cli.quiet {
            eprintln!("{} records written to {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    if session.documents().is_empty() {
        anyhow::bail!("No documents were ingested ({failures} failed)");
    }

    // ── Questions ────────────────────────────────────────────────────────
    if !cli.questions.is_empty() {
        for question in &cli.questions {
            let answer = session
                .ask(question)
                .await
                .with_context(|| format!("Failed to answer: {question}"))?;
            println!("{} {}\n\n{}\n", bold("Q:"), question, answer);
        }
    } else if !cli.json && cli.output.is_none() {
        interactive(&mut session).await?;
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .batch_size(cli.batch_size)
        .concurrency(cli.concurrency)
        .image_text_threshold(cli.image_threshold)
        .chain_scope(cli.chain_scope.into())
        .infer_persona(!cli.no_persona)
        .max_attempts(cli.max_retries)
        .initial_backoff_ms(cli.backoff_ms)
        .api_timeout_secs(cli.api_timeout)
        .conversion_timeout_secs(cli.conversion_timeout)
        .download_timeout_secs(cli.download_timeout)
        .max_rendered_pixels(cli.max_pixels);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref url) = cli.converter_url {
        builder = builder.converter_url(url);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Ingest every input; one failure does not stop the others.
async fn ingest_all(
    pipeline: &Pipeline,
    cli: &Cli,
    cancel: &CancellationToken,
) -> Vec<(String, Result<IngestedDocument, DocQuestError>)> {
    let timeout = cli.download_timeout;
    let mut results: Vec<(usize, String, Result<IngestedDocument, DocQuestError>)> =
        stream::iter(cli.inputs.iter().cloned().enumerate())
            .map(|(i, input)| async move {
                let result = match input::resolve(&input, timeout).await {
                    Ok(upload) => pipeline.ingest_with_cancel(upload, cancel).await,
                    Err(e) => Err(e),
                };
                (i, input, result)
            })
            .buffer_unordered(cli.concurrency.max(1))
            .collect()
            .await;
    results.sort_by_key(|(i, _, _)| *i);
    results.into_iter().map(|(_, input, r)| (input, r)).collect()
}

fn print_stats(doc: &IngestedDocument) {
    let s = &doc.stats;
    eprintln!(
        "   {}  {} pages  {} image  {} failed summaries  {} failed explanations  {}ms",
        bold(&doc.record.document_name),
        s.total_pages,
        s.image_pages,
        s.failed_summaries,
        s.failed_explanations,
        s.prepare_duration_ms + s.process_duration_ms,
    );
}

/// Read a file holding either one record or an array of records.
async fn load_records(path: &Path) -> Result<Vec<DocumentRecord>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&json)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    items
        .into_iter()
        .map(|item| {
            DocumentRecord::from_json(&item.to_string())
                .with_context(|| format!("Invalid record in {}", path.display()))
        })
        .collect()
}

/// Write JSON via a temp file in the target directory, then rename.
async fn write_atomic(path: &Path, records: &[&DocumentRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records).context("Failed to serialise records")?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(&path)
            .map_err(|e| DocQuestError::OutputWriteFailed {
                path: path.clone(),
                source: e.error,
            })?;
        Ok(())
    })
    .await
    .context("Output writer panicked")?
}

/// Read questions from stdin until `:quit` or EOF.
async fn interactive(session: &mut Session) -> Result<()> {
    eprintln!(
        "{} Ask about {} document(s). {}",
        cyan("◆"),
        session.documents().len(),
        dim(":docs  :reset  :quit")
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{} ", bold("›"));
        io::stderr().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":docs" => {
                for (name, record) in session.documents() {
                    eprintln!("  {}  {}", bold(name), dim(&format!("{} pages", record.page_count())));
                }
            }
            ":reset" => {
                session.clear_history();
                eprintln!("  {}", dim("history cleared"));
            }
            question => match session.ask(question).await {
                Ok(answer) => println!("\n{answer}\n"),
                Err(e) => eprintln!("{} {}", red("✘"), e),
            },
        }
    }
    Ok(())
}
