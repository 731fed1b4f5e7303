//! CLI binary for pdf2ref.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2ref::{
    build_chunk_references, load_dump, load_dump_stdin, process_document, ChunkIndex,
    DocumentLayout, ExtractionPass, PipelineConfig, PipelineProgressCallback, ProgressCallback,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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

/// Terminal progress callback: renders a live progress bar and per-page log
/// lines using [indicatif]. Designed to work correctly when pages complete
/// out-of-order (concurrent merging).
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-page wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<u32, Instant>>,
    /// Count of pages that degraded.
    degraded: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set dynamically by
    /// `on_document_start` (called before any pages are processed).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_document_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading extraction dump…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            degraded: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Merging");
        self.bar.reset_eta();
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: u32, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: u32, total: usize, element_count: usize) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{element_count:>4} elements")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_page_degraded(&self, page_num: u32, total: usize, error: &str) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.degraded.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let mut m: String = error.chars().take(79).collect();
            m.push('\u{2026}');
            m
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, clean_count: usize) {
        let degraded = total_pages.saturating_sub(clean_count);
        self.bar.finish_and_clear();

        if degraded == 0 {
            eprintln!(
                "{} {} pages merged cleanly",
                green("✔"),
                bold(&clean_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages merged cleanly  ({} degraded)",
                if clean_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&clean_count.to_string()),
                total_pages,
                red(&degraded.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Reconcile and merge a dual-pass extraction dump (layout JSON to stdout)
  pdf2ref process document.json

  # Write the merged layout to a file, tuning the merge thresholds
  pdf2ref process --overlap-threshold 0.4 document.json -o layout.json

  # Read the dump from stdin
  extractor --dual-pass report.pdf | pdf2ref process -

  # Process and index a document's chunks into a store directory
  pdf2ref index document.json --document-id report-2024 --store ./store

  # Resolve [[ref:N]] markers in an answer against the store
  pdf2ref resolve --store ./store --ordinal-map map.json answer.txt

  # Remove a document's chunks from the store
  pdf2ref delete --store ./store report-2024

  # Summarise a dump without merging it
  pdf2ref inspect document.json

ORDINAL MAP FORMAT (for `resolve`):
  JSON object mapping marker ordinals to chunk ids, in the order the
  chunks were presented to the answer generator:
    { "1": "report-2024:3:0", "2": "report-2024:7:2" }

ENVIRONMENT VARIABLES:
  PDF2REF_STORE        Default chunk store directory
  PDF2REF_CONCURRENCY  Pages merged concurrently (default 4)
  RUST_LOG             Tracing filter (e.g. pdf2ref=debug)
"#;

/// Reconcile dual-resolution PDF extraction output and resolve citations.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2ref",
    version,
    about = "Reconcile dual-resolution PDF extraction output and resolve citations",
    long_about = "Merge the hi-res detection pass and the fast text pass of a PDF extraction \
into one canonical layout, index the result as citable chunks, and rewrite [[ref:N]] markers \
in chat answers to numbered citations with page-region highlights.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2REF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2REF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile and merge an extraction dump into a canonical layout.
    Process {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Write the layout JSON to this file instead of stdout.
        #[arg(short, long, env = "PDF2REF_OUTPUT")]
        output: Option<PathBuf>,

        /// Disable the progress bar.
        #[arg(long, env = "PDF2REF_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Process a dump and index its chunks into the store.
    Index {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Identifier the document's chunks are filed under.
        #[arg(long)]
        document_id: String,

        /// Chunk store directory.
        #[arg(long, env = "PDF2REF_STORE")]
        store: PathBuf,

        /// Disable the progress bar.
        #[arg(long, env = "PDF2REF_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Resolve [[ref:N]] markers in an answer against the store.
    Resolve {
        /// Answer text file, or '-' for stdin.
        answer: String,

        /// Chunk store directory.
        #[arg(long, env = "PDF2REF_STORE")]
        store: PathBuf,

        /// JSON file mapping marker ordinals to chunk ids.
        #[arg(long)]
        ordinal_map: PathBuf,
    },

    /// Remove a document's chunks from the store.
    Delete {
        /// Document identifier to remove.
        document_id: String,

        /// Chunk store directory.
        #[arg(long, env = "PDF2REF_STORE")]
        store: PathBuf,
    },

    /// Summarise an extraction dump without merging it.
    Inspect {
        /// Extraction dump path, or '-' for stdin.
        dump: String,
    },
}

/// Flags shared by the subcommands that run the merge pipeline.
#[derive(clap::Args, Debug)]
struct PipelineArgs {
    /// Extraction dump path, or '-' for stdin.
    dump: String,

    /// Number of pages merged concurrently.
    #[arg(short, long, env = "PDF2REF_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Containment ratio above which text inside a figure/table is dropped.
    #[arg(long, default_value_t = 0.9)]
    containment_threshold: f64,

    /// Overlap ratio above which two same-kind elements merge.
    #[arg(long, default_value_t = 0.3)]
    overlap_threshold: f64,

    /// Max horizontal gap (px) for same-line adjacency merging.
    #[arg(long, default_value_t = 100.0)]
    adjacency_gap: f64,

    /// Max vertical distance (px) between a caption and its figure/table.
    #[arg(long, default_value_t = 50.0)]
    caption_gap: f64,

    /// Max relative disagreement between the passes' resolution ratios.
    #[arg(long, default_value_t = 0.01)]
    resolution_tolerance: f64,

    /// Characters of chunk content kept as the preview on a reference.
    #[arg(long, default_value_t = 200)]
    preview_chars: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || matches!(cli.command, Command::Process { .. } | Command::Index { .. }) {
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

    let quiet = cli.quiet;
    match cli.command {
        Command::Process {
            pipeline,
            output,
            no_progress,
        } => {
            let config = build_config(&pipeline, progress(quiet, no_progress))?;
            let passes = load_passes(&pipeline.dump).await?;
            let layout = process_document(passes, &config)
                .await
                .context("Processing failed")?;
            emit_layout(&layout, output.as_deref(), quiet)?;
        }

        Command::Index {
            pipeline,
            document_id,
            store,
            no_progress,
        } => {
            let config = build_config(&pipeline, progress(quiet, no_progress))?;
            let passes = load_passes(&pipeline.dump).await?;
            let layout = process_document(passes, &config)
                .await
                .context("Processing failed")?;
            let chunks = build_chunk_references(&document_id, &layout, &config);
            let chunk_count = chunks.len();

            let index = ChunkIndex::open(&store)
                .await
                .with_context(|| format!("Failed to open store at {}", store.display()))?;
            index
                .put_document(&document_id, chunks)
                .await
                .context("Indexing failed")?;

            if !quiet {
                eprintln!(
                    "{}  {} chunks from {} pages  →  {} {}",
                    green("✔"),
                    bold(&chunk_count.to_string()),
                    layout.stats.total_pages,
                    bold(&document_id),
                    dim(&format!("({})", store.display())),
                );
            }
        }

        Command::Resolve {
            answer,
            store,
            ordinal_map,
        } => {
            let answer_text = read_input(&answer).await?;
            let raw: HashMap<String, String> = serde_json::from_slice(
                &tokio::fs::read(&ordinal_map)
                    .await
                    .with_context(|| format!("Failed to read {}", ordinal_map.display()))?,
            )
            .context("Ordinal map is not a JSON object of ordinal → chunk id")?;
            let ordinals: HashMap<u32, String> = raw
                .into_iter()
                .map(|(k, v)| {
                    k.parse::<u32>()
                        .map(|n| (n, v))
                        .with_context(|| format!("Ordinal '{k}' is not a number"))
                })
                .collect::<Result<_>>()?;

            let index = ChunkIndex::open(&store)
                .await
                .with_context(|| format!("Failed to open store at {}", store.display()))?;
            let resolved = index.resolve_answer(&answer_text, &ordinals).await;

            println!(
                "{}",
                serde_json::to_string_pretty(&resolved).context("Failed to serialise answer")?
            );
            if !quiet {
                eprintln!(
                    "{}  {} references resolved",
                    green("✔"),
                    bold(&resolved.references.len().to_string()),
                );
            }
        }

        Command::Delete { document_id, store } => {
            let index = ChunkIndex::open(&store)
                .await
                .with_context(|| format!("Failed to open store at {}", store.display()))?;
            let existed = index
                .delete_document(&document_id)
                .await
                .context("Deletion failed")?;
            if !quiet {
                if existed {
                    eprintln!("{}  removed {}", green("✔"), bold(&document_id));
                } else {
                    eprintln!("{}  {} was not indexed", cyan("⚠"), bold(&document_id));
                }
            }
        }

        Command::Inspect { dump } => {
            let passes = load_passes(&dump).await?;
            inspect_dump(&passes);
        }
    }

    Ok(())
}

fn progress(quiet: bool, no_progress: bool) -> Option<ProgressCallback> {
    if quiet || no_progress {
        None
    } else {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn PipelineProgressCallback>)
    }
}

/// Map the shared pipeline flags to `PipelineConfig`.
fn build_config(args: &PipelineArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .concurrency(args.concurrency)
        .containment_threshold(args.containment_threshold)
        .overlap_threshold(args.overlap_threshold)
        .adjacency_gap(args.adjacency_gap)
        .caption_gap(args.caption_gap)
        .resolution_tolerance(args.resolution_tolerance)
        .preview_chars(args.preview_chars);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn load_passes(dump: &str) -> Result<Vec<ExtractionPass>> {
    if dump == "-" {
        load_dump_stdin().await.context("Failed to read dump from stdin")
    } else {
        load_dump(dump)
            .await
            .with_context(|| format!("Failed to load dump '{dump}'"))
    }
}

async fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        tokio::task::spawn_blocking(|| {
            let mut buf = String::new();
            io::Read::read_to_string(&mut io::stdin(), &mut buf).map(|_| buf)
        })
        .await
        .context("stdin reader task failed")?
        .context("Failed to read stdin")
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read '{path}'"))
    }
}

fn emit_layout(layout: &DocumentLayout, output: Option<&std::path::Path>, quiet: bool) -> Result<()> {
    let json = serde_json::to_string_pretty(layout).context("Failed to serialise layout")?;
    match output {
        Some(path) => {
            std::fs::write(path, json.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !quiet {
                eprintln!(
                    "{}  {}/{} pages clean  {}ms  →  {}",
                    if layout.stats.degraded_pages == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    layout.stats.clean_pages,
                    layout.stats.total_pages,
                    layout.stats.total_duration_ms,
                    bold(&path.display().to_string()),
                );
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .context("Failed to write to stdout")?;
            handle.write_all(b"\n").ok();
        }
    }
    Ok(())
}

fn inspect_dump(passes: &[ExtractionPass]) {
    let mut pages: Vec<u32> = passes.iter().map(|p| p.page_number).collect();
    pages.sort_unstable();
    pages.dedup();
    let elements: usize = passes.iter().map(|p| p.elements.len()).sum();

    println!("Pages:        {}", pages.len());
    println!("Passes:       {}", passes.len());
    println!("Elements:     {elements}");
    for pass in passes {
        println!(
            "  page {:>3}  {:<4}  {:>6.0}x{:<6.0}  {:>4} elements",
            pass.page_number,
            pass.resolution.to_string(),
            pass.pixel_width,
            pass.pixel_height,
            pass.elements.len()
        );
    }
}
