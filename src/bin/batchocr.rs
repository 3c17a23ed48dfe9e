//! CLI binary for batchocr.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, drives a `Pipeline`, and prints results.

use anyhow::{bail, Context, Result};
use batchocr::{
    BatchObserver, BatchStats, ImageSource, ItemId, Pipeline, PipelineConfig, DEFAULT_MODEL,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal observer: a live progress bar plus one log line per resolved
/// item. Items complete out of order under concurrency; the bar only counts
/// terminal events, so it stays correct regardless of ordering.
struct CliObserver {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliObserver {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl BatchObserver for CliObserver {
    fn on_item_started(&self, _id: ItemId, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_item_retry(&self, _id: ItemId, attempt: u32, max_attempts: u32, backoff_ms: u64) {
        self.bar.println(format!(
            "  {} retry {attempt}/{max_attempts} in {:.0}s",
            dim("↻"),
            backoff_ms as f64 / 1000.0
        ));
    }

    fn on_item_completed(&self, _id: ItemId, name: &str, text_len: usize) {
        self.bar.println(format!(
            "  {} {:<30}  {}",
            green("✓"),
            name,
            dim(&format!("{text_len:>6} chars"))
        ));
        self.bar.inc(1);
    }

    fn on_item_failed(&self, _id: ItemId, name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<30}  {}", red("✗"), name, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_settled(&self, stats: BatchStats) {
        self.bar.finish_and_clear();
        if stats.failed == 0 {
            eprintln!(
                "{} {} images extracted successfully",
                green("✔"),
                bold(&stats.completed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images extracted  ({} failed)",
                if stats.completed == 0 { red("✘") } else { bold("⚠") },
                bold(&stats.completed.to_string()),
                stats.total,
                red(&stats.failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract text from a few images (stdout)
  batchocr receipt.jpg invoice.png

  # Whole directory, one .txt per image
  batchocr scans/ -o extracted/

  # More parallel calls, custom model
  batchocr scans/ -c 5 --model @cf/meta/llama-3.2-11b-vision-instruct

  # Only print results whose text matches a query
  batchocr scans/ --filter "total due"

  # Structured JSON for downstream tooling
  batchocr scans/ --json > results.json

ENVIRONMENT VARIABLES:
  CF_ACCOUNT_ID    Workers AI account identifier (required)
  CF_API_TOKEN     Workers AI API token (required)

SETUP:
  1. export CF_ACCOUNT_ID=...  CF_API_TOKEN=...
  2. batchocr scans/ -o extracted/
"#;

/// Extract text from batches of images using Workers AI vision models.
#[derive(Parser, Debug)]
#[command(
    name = "batchocr",
    version,
    about = "Extract text from batches of images using Workers AI vision models",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files or directories (top level only) to process.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write one <name>.txt per extracted image into this directory.
    #[arg(short, long, env = "BATCHOCR_OUTPUT")]
    output: Option<PathBuf>,

    /// Maximum simultaneous extraction calls.
    #[arg(short, long, env = "BATCHOCR_CONCURRENCY", default_value_t = 3)]
    concurrency: usize,

    /// Maximum images per batch; larger submissions are rejected outright.
    #[arg(long, env = "BATCHOCR_MAX_BATCH_SIZE", default_value_t = 100)]
    max_batch_size: usize,

    /// Total attempts per image, including the first.
    #[arg(long, env = "BATCHOCR_ATTEMPTS", default_value_t = 3)]
    attempts: u32,

    /// Workers AI vision model identifier.
    #[arg(long, env = "BATCHOCR_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Custom OCR instruction (replaces the built-in prompt).
    #[arg(long, env = "BATCHOCR_PROMPT")]
    prompt: Option<String>,

    /// Max model output tokens per image.
    #[arg(long, env = "BATCHOCR_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: u32,

    /// Only print items whose extracted text contains this
    /// (case-insensitive) query.
    #[arg(long)]
    filter: Option<String>,

    /// Output structured JSON instead of plain text.
    #[arg(long, env = "BATCHOCR_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "BATCHOCR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BATCHOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "BATCHOCR_QUIET")]
    quiet: bool,
}

/// File extensions accepted as image inputs, mirroring the image-type filter
/// at the submission boundary.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "tif", "tiff"];

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand files and top-level directory listings into image sources,
/// skipping (and reporting) anything that is not an image.
fn collect_sources(inputs: &[PathBuf], quiet: bool) -> Result<Vec<ImageSource>> {
    let mut sources = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read directory '{}'", input.display()))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_image_file(p))
                .collect();
            entries.sort();
            sources.extend(entries.into_iter().map(ImageSource::Path));
        } else if is_image_file(input) {
            sources.push(ImageSource::Path(input.clone()));
        } else if !quiet {
            eprintln!("{} skipping non-image input: {}", dim("·"), input.display());
        }
    }
    Ok(sources)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is active;
    // the bar provides all the feedback that matters to the user.
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

    // ── Gather inputs ────────────────────────────────────────────────────
    let sources = collect_sources(&cli.inputs, cli.quiet)?;
    if sources.is_empty() {
        bail!("No image files found among the given inputs.");
    }

    // ── Build config & pipeline ──────────────────────────────────────────
    let mut builder = PipelineConfig::builder()
        .concurrency(cli.concurrency)
        .max_batch_size(cli.max_batch_size)
        .max_attempts(cli.attempts)
        .max_tokens(cli.max_tokens)
        .model(cli.model.clone());
    if let Some(prompt) = &cli.prompt {
        builder = builder.prompt(prompt.clone());
    }
    if show_progress {
        builder = builder.observer(CliObserver::new(sources.len()));
    }
    let config = builder.build().context("Invalid configuration")?;

    let pipeline =
        Pipeline::with_workers_ai(config).context("Failed to initialise the extractor")?;

    // ── Run ──────────────────────────────────────────────────────────────
    pipeline
        .submit(sources)
        .context("Submission rejected")?;
    pipeline.wait_settled().await;

    let stats = pipeline.stats();
    let items = pipeline.search(cli.filter.as_deref().unwrap_or(""));

    // ── Output ───────────────────────────────────────────────────────────
    if let Some(dir) = &cli.output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory '{}'", dir.display()))?;
        for item in &items {
            if let Some(text) = &item.extracted_text {
                let stem = Path::new(&item.name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| item.id.to_string());
                let path = dir.join(format!("{stem}.txt"));
                std::fs::write(&path, text)
                    .with_context(|| format!("Failed to write '{}'", path.display()))?;
            }
        }
        if !cli.quiet {
            eprintln!("Wrote {} text files to {}", stats.completed, dir.display());
        }
    } else if cli.json {
        let payload = serde_json::json!({ "items": items, "stats": stats });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let mut stdout = io::stdout().lock();
        for item in &items {
            match (&item.extracted_text, &item.error_message) {
                (Some(text), _) => {
                    writeln!(stdout, "{}\n{}\n", bold(&format!("── {} ──", item.name)), text)?
                }
                (None, Some(err)) => {
                    writeln!(stdout, "{}\n{}\n", bold(&format!("── {} ──", item.name)), red(err))?
                }
                (None, None) => {}
            }
        }
        if cli.filter.is_some() && items.is_empty() && !cli.quiet {
            eprintln!("No matching text found.");
        }
    }

    if stats.completed == 0 && stats.total > 0 {
        bail!("All {} images failed to process.", stats.total);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extension_filter() {
        assert!(is_image_file(Path::new("a.PNG")));
        assert!(is_image_file(Path::new("photo.jpeg")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }
}
