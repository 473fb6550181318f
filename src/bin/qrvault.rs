//! CLI binary for edgequake-qrvault.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `EncodeConfig` / `DecodeConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_qrvault::{
    decode_to_file, encode_bytes, encode_with_previews, encoded_text, inspect, load_payload,
    preview_pages, write_atomic, DecodeConfig, EncodeConfig, LayoutPolicy, ProgressCallback,
    VaultProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar counting symbols while encoding or
/// pages while scanning. Events may arrive out of order when work runs
/// concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// A spinner until the first `on_*_start` sets the length.
    fn new_dynamic(message: &str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize, prefix: &'static str, unit: &str) {
        let template = format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  \
             [{{bar:42.green/238}}] {{pos:>4}}/{{len}} {unit}  \
             ⏱ {{elapsed_precise}}  ETA {{eta_precise}}"
        );
        let progress_style = ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(progress_style);
        self.bar.set_prefix(prefix);
        self.bar.reset_eta();
    }
}

impl VaultProgressCallback for CliProgressCallback {
    fn on_encode_start(&self, total_chunks: usize) {
        self.activate_bar(total_chunks, "Rendering", "QR codes");
    }

    fn on_symbol_rendered(&self, _index: usize, _total_chunks: usize) {
        self.bar.inc(1);
    }

    fn on_encode_complete(&self, total_chunks: usize, page_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} QR codes on {} pages",
            green("✔"),
            bold(&total_chunks.to_string()),
            bold(&page_count.to_string())
        );
    }

    fn on_scan_start(&self, total_pages: usize) {
        self.activate_bar(total_pages, "Scanning", "pages");
    }

    fn on_page_scanned(&self, page_num: usize, total_pages: usize, symbols_found: usize) {
        if symbols_found > 0 {
            self.bar.println(format!(
                "  {} Page {:>4}/{:<4}  {}",
                green("✓"),
                page_num,
                total_pages,
                dim(&format!("{symbols_found} QR")),
            ));
        }
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['\u{2026}']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>4}/{:<4}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
        ));
    }

    fn on_scan_complete(&self, total_pages: usize, symbols_recovered: usize) {
        self.bar.finish_and_clear();
        let errors = self.errors.load(Ordering::SeqCst);
        eprintln!(
            "{} {} QR codes from {} pages{}",
            if errors == 0 { green("✔") } else { cyan("⚠") },
            bold(&symbols_recovered.to_string()),
            total_pages,
            if errors == 0 {
                String::new()
            } else {
                format!("  ({} page problems)", red(&errors.to_string()))
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Archive a web page (images inlined) on letter paper, two QR codes per page
  qrvault encode https://example.com/article.html article.pdf

  # Archive a local file, one large QR code per 8"x8" page, 4 render threads
  qrvault encode --layout single -t 4 backup.tar.gz backup.pdf

  # Print the base64 text that would be encoded, then exit
  qrvault encode -d notes.txt

  # Recover the payload
  qrvault decode article.pdf article.html

  # Recover from a re-scanned printout (no protocol properties in the PDF)
  qrvault decode --dpi 300 --layout stacked scanned.pdf article.html

  # Show how a document was written
  qrvault inspect article.pdf

RECOVERY WITHOUT THIS TOOL:
  1. Scan all QR codes in page order (top to bottom on each page).
  2. Concatenate the scanned texts.
  3. Base64-decode the result.
  4. zlib-decompress the output.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to an existing libpdfium
  RUST_LOG          Override log filtering (e.g. edgequake_qrvault=debug)
"#;

/// Archive files and web pages as printable QR codes, and recover them.
#[derive(Parser, Debug)]
#[command(
    name = "qrvault",
    version,
    about = "Archive files and web pages as printable QR codes in a PDF, and recover them",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "QRVAULT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "QRVAULT_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "QRVAULT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a file or URL into a QR document.
    Encode(EncodeArgs),
    /// Recover the payload from a QR document.
    Decode(DecodeArgs),
    /// Print the protocol properties recorded in a QR document.
    Inspect(InspectArgs),
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    /// One QR code per 8"x8" page.
    Single,
    /// QR codes stacked on US Letter pages.
    Stacked,
}

fn layout_policy(layout: LayoutArg, rows: usize) -> LayoutPolicy {
    match layout {
        LayoutArg::Single => LayoutPolicy::Single,
        LayoutArg::Stacked => LayoutPolicy::Stacked { rows },
    }
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Local file path or HTTP/HTTPS URL.
    source: String,

    /// Output PDF (omit with --dry-run).
    output: Option<PathBuf>,

    /// Symbol arrangement.
    #[arg(long, env = "QRVAULT_LAYOUT", value_enum, default_value = "stacked")]
    layout: LayoutArg,

    /// QR codes per page for the stacked layout.
    #[arg(long, env = "QRVAULT_ROWS", default_value_t = 2)]
    rows: usize,

    /// Base64 characters per QR code. Default: 1000 single, 800 stacked.
    #[arg(long, env = "QRVAULT_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Protocol resolution (72–600).
    #[arg(long, env = "QRVAULT_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Threads for QR generation.
    #[arg(short = 't', long, env = "QRVAULT_THREADS", default_value_t = 1)]
    threads: usize,

    /// Omit the statistics and instructions page.
    #[arg(long, env = "QRVAULT_NO_METADATA_PAGE", conflicts_with = "metadata_page")]
    no_metadata_page: bool,

    /// Print the statistics and instructions page even for the single layout.
    #[arg(long)]
    metadata_page: bool,

    /// Prefix every QR code with its 6-digit position.
    #[arg(long, env = "QRVAULT_INDEXED")]
    indexed: bool,

    /// Keep <img> tags of fetched pages as links instead of inlining them.
    #[arg(long, env = "QRVAULT_NO_INLINE_IMAGES")]
    no_inline_images: bool,

    /// Print the encoded payload and exit.
    #[arg(short = 'd', long)]
    dry_run: bool,

    /// Also write every page as a PNG into this directory.
    #[arg(long, env = "QRVAULT_PAGES_PNG")]
    pages_png: Option<PathBuf>,

    /// HTTP timeout for the source URL, in seconds.
    #[arg(long, env = "QRVAULT_DOWNLOAD_TIMEOUT", default_value_t = 30)]
    download_timeout: u64,

    /// HTTP timeout for each inlined image, in seconds.
    #[arg(long, env = "QRVAULT_IMAGE_TIMEOUT", default_value_t = 5)]
    image_timeout: u64,

    /// Print run statistics as JSON on stdout.
    #[arg(long, env = "QRVAULT_JSON")]
    json: bool,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// QR document to scan.
    input: PathBuf,

    /// Where to write the recovered payload.
    output: PathBuf,

    /// Scan resolution. Must match the document's recorded DPI when it has one.
    #[arg(long, env = "QRVAULT_DPI",
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: Option<u32>,

    /// Pages decoded in parallel.
    #[arg(short = 't', long, env = "QRVAULT_THREADS", default_value_t = 4)]
    threads: usize,

    /// Layout to assume when the document records none.
    #[arg(long, value_enum, default_value = "stacked")]
    layout: LayoutArg,

    /// QR codes per page to assume for the stacked layout.
    #[arg(long, default_value_t = 2)]
    rows: usize,

    /// Assume page 1 carries data when the document records nothing.
    #[arg(long)]
    no_metadata_page: bool,

    /// Print run statistics and page problems as JSON on stdout.
    #[arg(long, env = "QRVAULT_JSON")]
    json: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// QR document to inspect.
    input: PathBuf,

    /// Print as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let json = match &cli.command {
        Command::Encode(a) => a.json || a.dry_run,
        Command::Decode(a) => a.json,
        Command::Inspect(a) => a.json,
    };
    let show_progress = !cli.quiet && !cli.no_progress && !json;
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

    match &cli.command {
        Command::Encode(args) => run_encode(&cli, args, show_progress).await,
        Command::Decode(args) => run_decode(&cli, args, show_progress).await,
        Command::Inspect(args) => run_inspect(args).await,
    }
}

async fn run_encode(cli: &Cli, args: &EncodeArgs, show_progress: bool) -> Result<()> {
    if !args.dry_run && args.output.is_none() && args.pages_png.is_none() {
        anyhow::bail!("must supply an output PDF (or --pages-png DIR) unless --dry-run");
    }

    let progress: Option<ProgressCallback> = if show_progress && !args.dry_run {
        Some(CliProgressCallback::new_dynamic("Loading payload…") as Arc<dyn VaultProgressCallback>)
    } else {
        None
    };
    let config = build_encode_config(args, progress)?;

    // ── Dry run ──────────────────────────────────────────────────────────
    if args.dry_run {
        let (text, stats) = encoded_text(&args.source, &config)
            .await
            .context("Failed to load payload")?;
        println!("{text}");
        if !cli.quiet {
            eprintln!(
                "{} bytes → {} compressed → {} base64 → {} QR codes",
                stats.raw_size, stats.compressed_size, stats.encoded_size, stats.chunk_count
            );
        }
        return Ok(());
    }

    let payload = load_payload(&args.source, &config)
        .await
        .context("Failed to load payload")?;

    let output = match (&args.output, &args.pages_png) {
        (Some(_), Some(dir)) => {
            let (output, pages) = encode_with_previews(&payload, &config)
                .await
                .context("Encoding failed")?;
            write_previews(dir, &pages)?;
            report_previews(cli, dir, pages.len());
            Some(output)
        }
        (None, Some(dir)) => {
            let pages = preview_pages(&payload, &config)
                .await
                .context("Failed to render page previews")?;
            write_previews(dir, &pages)?;
            report_previews(cli, dir, pages.len());
            None
        }
        (Some(_), None) => Some(
            encode_bytes(&payload, &config)
                .await
                .context("Encoding failed")?,
        ),
        (None, None) => None,
    };

    if let (Some(output), Some(output_path)) = (output, &args.output) {
        write_atomic(output_path, &output.pdf)
            .await
            .context("Failed to write PDF")?;

        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?
            );
        } else if !cli.quiet {
            let s = &output.stats;
            eprintln!(
                "{}  {} bytes → {} QR codes / {} pages  {}ms  →  {}",
                green("✔"),
                s.payload.raw_size,
                s.payload.chunk_count,
                s.page_count,
                s.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    }

    Ok(())
}

async fn run_decode(cli: &Cli, args: &DecodeArgs, show_progress: bool) -> Result<()> {
    let mut builder = DecodeConfig::builder()
        .concurrency(args.threads)
        .fallback_layout(layout_policy(args.layout, args.rows));
    if let Some(dpi) = args.dpi {
        builder = builder.dpi(dpi);
    }
    if args.no_metadata_page {
        builder = builder.fallback_metadata_page(false);
    }
    if show_progress {
        builder = builder.progress_callback(
            CliProgressCallback::new_dynamic("Opening PDF…") as Arc<dyn VaultProgressCallback>
        );
    }
    let config = builder.build().context("Invalid configuration")?;

    let output = decode_to_file(&args.input, &args.output, &config)
        .await
        .context("Decoding failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        let s = &output.stats;
        eprintln!(
            "{}  {} QR codes → {} bytes  {}ms  →  {}",
            if output.page_errors.is_empty() { green("✔") } else { cyan("⚠") },
            s.expected_chunks,
            s.payload_size,
            s.total_duration_ms,
            bold(&args.output.display().to_string()),
        );
        if !show_progress {
            for e in &output.page_errors {
                eprintln!("  {}", dim(&e.to_string()));
            }
        }
    }
    Ok(())
}

async fn run_inspect(args: &InspectArgs) -> Result<()> {
    let info = inspect(&args.input)
        .await
        .context("Failed to inspect PDF")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info).context("Failed to serialise document info")?
        );
        return Ok(());
    }

    println!("File:           {}", args.input.display());
    println!("Pages:          {}", info.page_count);
    println!("PDF Version:    {}", info.pdf_version);
    match info.properties {
        Some(p) => {
            println!("Layout:         {} ({} per page)", p.layout.name(), p.layout.slots_per_page());
            println!("DPI:            {}", p.dpi);
            println!("QR codes:       {}", p.chunk_count);
            println!("Chunk size:     {}", p.chunk_size);
            println!("Metadata page:  {}", p.metadata_page);
            println!("Indexed:        {}", p.indexed);
        }
        None => println!("Properties:     none (not written by qrvault; decode needs --dpi/--layout)"),
    }
    Ok(())
}

/// Map CLI args to `EncodeConfig`.
fn build_encode_config(args: &EncodeArgs, progress: Option<ProgressCallback>) -> Result<EncodeConfig> {
    let mut builder = EncodeConfig::builder()
        .layout(layout_policy(args.layout, args.rows))
        .dpi(args.dpi)
        .concurrency(args.threads)
        .indexed_chunks(args.indexed)
        .inline_images(!args.no_inline_images)
        .download_timeout_secs(args.download_timeout)
        .image_timeout_secs(args.image_timeout);

    if let Some(size) = args.chunk_size {
        builder = builder.chunk_size(size);
    }
    if args.no_metadata_page {
        builder = builder.metadata_page(false);
    } else if args.metadata_page {
        builder = builder.metadata_page(true);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn report_previews(cli: &Cli, dir: &Path, count: usize) {
    if !cli.quiet {
        eprintln!(
            "{} {} page images → {}",
            green("✔"),
            count,
            bold(&dir.display().to_string())
        );
    }
}

fn write_previews(dir: &Path, pages: &[image::GrayImage]) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    for (i, page) in pages.iter().enumerate() {
        let path = dir.join(format!("page-{:04}.png", i + 1));
        page.save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}
