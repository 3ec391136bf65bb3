//! CLI binary for docchain.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `convert` runs the pipeline once on a local file.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use docchain::{
    convert_document, serve, HtmlBackend, PipelineConfig, RunOptions, RunReport, ServerConfig,
    Toolchain,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on the default port
  docchain serve

  # Serve on another address with a custom work directory
  docchain serve --bind 127.0.0.1:9000 --work-dir /var/lib/docchain

  # Convert a file once, results in ./out
  docchain convert slides.pptx -o out

  # Inline pictures as data URIs and print the report as JSON
  docchain convert report.docx --embed-images --json

  # Upload through the service
  curl -c cookies.txt -F file=@report.docx http://localhost:8000/process-document
  curl -b cookies.txt -OJ http://localhost:8000/download/pdf

EXTERNAL TOOLS:
  docling       parsing, tables, OCR             DOCCHAIN_DOCLING
  pandoc        Markdown → HTML (default)        DOCCHAIN_PANDOC
  wkhtmltopdf   HTML → PDF                       DOCCHAIN_WKHTMLTOPDF
  libpdfium     PDF text, pictures, rasterising  DOCCHAIN_PDFIUM_LIB
  Swin ONNX     page embeddings                  DOCCHAIN_MODEL
"#;

/// Convert documents to Markdown, HTML, PDF, page images and embeddings.
#[derive(Parser, Debug)]
#[command(
    name = "docchain",
    version,
    about = "Document conversion service: document → Markdown → HTML → PDF → PNG → embeddings",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCCHAIN_VERBOSE")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Run the pipeline once on a local file.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "DOCCHAIN_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Directory holding one subdirectory per session.
    #[arg(long, env = "DOCCHAIN_WORK_DIR", default_value = "temp")]
    work_dir: PathBuf,

    /// Session lifetime in seconds.
    #[arg(long, env = "DOCCHAIN_SESSION_TTL", default_value_t = 3600)]
    session_ttl: u64,

    /// Seconds between sweeps for expired sessions.
    #[arg(long, env = "DOCCHAIN_SWEEP_INTERVAL", default_value_t = 60)]
    sweep_interval: u64,

    /// Maximum upload size in MiB.
    #[arg(long, env = "DOCCHAIN_MAX_UPLOAD_MB", default_value_t = 100)]
    max_upload_mb: usize,

    #[command(flatten)]
    tools: ToolArgs,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Document to convert (pdf, docx, pptx, xlsx, html, png, jpg, tif, bmp).
    input: PathBuf,

    /// Output directory; the input is copied here and every artifact lands next to it.
    #[arg(short, long, env = "DOCCHAIN_OUTPUT", default_value = "out")]
    output: PathBuf,

    /// Continue with the Markdown that inlines pictures as data URIs.
    #[arg(long)]
    embed_images: bool,

    /// Print the run report as JSON instead of a summary.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    tools: ToolArgs,
}

/// External tools and pipeline tuning, shared by both subcommands.
#[derive(Args, Debug)]
struct ToolArgs {
    #[arg(long, env = "DOCCHAIN_DOCLING", default_value = "docling")]
    docling: PathBuf,

    #[arg(long, env = "DOCCHAIN_PANDOC", default_value = "pandoc")]
    pandoc: PathBuf,

    #[arg(long, env = "DOCCHAIN_WKHTMLTOPDF", default_value = "wkhtmltopdf")]
    wkhtmltopdf: PathBuf,

    /// Directory or file of the pdfium shared library.
    #[arg(long, env = "DOCCHAIN_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Swin transformer ONNX model.
    #[arg(
        long,
        env = "DOCCHAIN_MODEL",
        default_value = "models/swin-base-patch4-window7-224.onnx"
    )]
    model: PathBuf,

    /// Stylesheet linked from the generated HTML.
    #[arg(long, env = "DOCCHAIN_CSS")]
    css: Option<PathBuf>,

    /// Markdown → HTML backend.
    #[arg(long, env = "DOCCHAIN_HTML_BACKEND", value_enum, default_value = "pandoc")]
    html_backend: BackendArg,

    /// Page rasterisation scale (0.5–6.0).
    #[arg(long, env = "DOCCHAIN_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Keep page-break markers as plain comments instead of CSS page breaks.
    #[arg(long, env = "DOCCHAIN_NO_PAGE_BREAKS")]
    no_page_breaks: bool,

    /// Pass --disable-javascript to wkhtmltopdf.
    #[arg(long, env = "DOCCHAIN_DISABLE_JS")]
    disable_javascript: bool,

    /// Kill external tools after this many seconds.
    #[arg(long, env = "DOCCHAIN_TIMEOUT", default_value_t = 300)]
    timeout: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Pandoc,
    Builtin,
}

impl From<BackendArg> for HtmlBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Pandoc => HtmlBackend::Pandoc,
            BackendArg::Builtin => HtmlBackend::Builtin,
        }
    }
}

/// Map tool args to `PipelineConfig`.
fn build_config(args: &ToolArgs) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .docling_path(&args.docling)
        .pandoc_path(&args.pandoc)
        .wkhtmltopdf_path(&args.wkhtmltopdf)
        .model_path(&args.model)
        .html_backend(args.html_backend.into())
        .image_scale(args.scale)
        .page_break_css(!args.no_page_breaks)
        .disable_javascript(args.disable_javascript)
        .process_timeout_secs(args.timeout);
    if let Some(ref lib) = args.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    if let Some(ref css) = args.css {
        builder = builder.css_file(css);
    }
    builder.build().context("Invalid pipeline configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "docchain=debug,tower_http=debug"
    } else {
        "docchain=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Convert(args) => run_convert(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let pipeline = build_config(&args.tools)?;
    let config = ServerConfig {
        bind: args.bind,
        work_dir: args.work_dir,
        session_ttl_secs: args.session_ttl,
        sweep_interval_secs: args.sweep_interval.max(1),
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
    };
    let toolchain = Toolchain::from_config(&pipeline);
    tracing::debug!(?toolchain, "Toolchain ready");

    serve(config, toolchain)
        .await
        .context("HTTP server failed")
}

async fn run_convert(args: ConvertArgs) -> Result<()> {
    let config = build_config(&args.tools)?;
    let options = RunOptions {
        embed_images: args.embed_images,
    };

    let report = convert_document(&args.input, &args.output, &config, options)
        .await
        .with_context(|| format!("Conversion of {} failed", args.input.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    for t in &report.timings {
        eprintln!(
            "  {} {:<16} {:>7}  {}",
            green("✓"),
            t.step.as_str(),
            dim(&format!("{}ms", t.duration_ms)),
            t.output.display()
        );
    }
    let a = &report.artifacts;
    let failed = a.embedding_failures.len();
    eprintln!(
        "{}  {} pages  {} embeddings  {}ms  →  {}",
        if failed == 0 { green("✔") } else { yellow("⚠") },
        a.page_count,
        a.embedding_count,
        report.total_duration_ms,
        bold(&a.pdf_path.display().to_string()),
    );
    for f in &a.embedding_failures {
        eprintln!("   {} {}", yellow("skipped"), f);
    }
}
