//! Pipeline orchestration: run every step in order over one document.
//!
//! A run either completes all seven steps or stops at the first failure and
//! returns a [`PipelineError`] naming that step. Nothing is retried. Files
//! written by steps that completed before the failure stay on disk; the caller
//! decides what to do with the directory.
//!
//! Each external collaborator sits behind a trait object in [`Toolchain`], so
//! the HTTP layer and the tests can run the same orchestration with different
//! implementations.

use crate::config::{HtmlBackend, PipelineConfig};
use crate::error::{ConvertError, PipelineError};
use crate::output::{ArtifactLayout, ArtifactSet, RunReport, StepTiming};
use crate::pipeline::embed::{generate_embeddings, ImageEmbedder, SwinEmbedder};
use crate::pipeline::html::{markdown_to_html, BuiltinRenderer, MarkdownRenderer, PandocRenderer};
use crate::pipeline::parse::{DoclingParser, DocumentParser, ImageMode, PdfiumParser, RoutingParser};
use crate::pipeline::pdf::{html_to_pdf, PdfRenderer, Wkhtmltopdf};
use crate::pipeline::render::{render_pages, PageRasterizer, PdfiumRasterizer};
use crate::pipeline::{input, links, relocate, Step};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Per-run options supplied by the caller (the HTTP form or the CLI).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunOptions {
    /// Continue with the Markdown that inlines pictures as data URIs instead
    /// of the one linking them as files.
    pub embed_images: bool,
}

/// The collaborators a pipeline run uses, one per external concern.
#[derive(Clone)]
pub struct Toolchain {
    pub parser: Arc<dyn DocumentParser>,
    pub html: Arc<dyn MarkdownRenderer>,
    pub pdf: Arc<dyn PdfRenderer>,
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub embedder: Arc<dyn ImageEmbedder>,
    /// Turn page-break markers into CSS page breaks in the HTML.
    pub page_break_css: bool,
}

impl Toolchain {
    /// Build the production toolchain: pdfium/docling parsing, pandoc or
    /// comrak HTML, wkhtmltopdf, pdfium rasterisation, Swin embeddings.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let timeout = config.process_timeout();

        let parser = RoutingParser::new(
            Box::new(PdfiumParser::new(config.pdfium_lib_path.clone())),
            Box::new(DoclingParser::new(&config.docling_path, timeout)),
        );

        let html: Arc<dyn MarkdownRenderer> = match config.html_backend {
            HtmlBackend::Pandoc => Arc::new(PandocRenderer::new(
                &config.pandoc_path,
                config.css_file.clone(),
                timeout,
            )),
            HtmlBackend::Builtin => Arc::new(BuiltinRenderer::new(config.css_file.clone())),
        };

        Self {
            parser: Arc::new(parser),
            html,
            pdf: Arc::new(Wkhtmltopdf::new(
                &config.wkhtmltopdf_path,
                config.disable_javascript,
                timeout,
            )),
            rasterizer: Arc::new(PdfiumRasterizer::new(config)),
            embedder: Arc::new(SwinEmbedder::new(&config.model_path)),
            page_break_css: config.page_break_css,
        }
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain")
            .field("parser", &self.parser.name())
            .field("html", &self.html.name())
            .field("pdf", &self.pdf.name())
            .field("page_break_css", &self.page_break_css)
            .finish_non_exhaustive()
    }
}

/// Wrap a step's error, logging it once here rather than at every call site.
fn at(step: Step) -> impl FnOnce(ConvertError) -> PipelineError {
    move |source| {
        error!("Step '{}' failed: {}", step, source);
        PipelineError { step, source }
    }
}

fn finish(step: Step, started: Instant, output: &Path) -> StepTiming {
    let duration_ms = started.elapsed().as_millis() as u64;
    info!("Step '{}' done in {}ms → {}", step, duration_ms, output.display());
    StepTiming {
        step,
        output: output.to_path_buf(),
        duration_ms,
    }
}

/// Run the full pipeline on `input`, writing every artifact into `work_dir`.
///
/// `input` normally already sits in `work_dir` (the uploaded file), but it
/// does not have to.
///
/// # Errors
/// The first failing step, as a [`PipelineError`]. Per-image embedding
/// failures are not errors; they are listed in
/// [`ArtifactSet::embedding_failures`].
pub async fn run_pipeline(
    input: &Path,
    work_dir: &Path,
    tools: &Toolchain,
    options: RunOptions,
) -> Result<RunReport, PipelineError> {
    let total_start = Instant::now();
    info!("Starting pipeline: {}", input.display());

    let layout = ArtifactLayout::new(work_dir, input::document_stem(input));
    let mode = ImageMode::from_embed_flag(options.embed_images);
    let mut timings = Vec::with_capacity(Step::ALL.len());

    // ── Step 1: Parse document → Markdown ────────────────────────────────
    let started = Instant::now();
    let export = async {
        tokio::fs::create_dir_all(work_dir)
            .await
            .map_err(|e| ConvertError::io(work_dir, e))?;
        let format = input::detect_format(input)?;
        tools.parser.parse(input, format, &layout).await
    }
    .await
    .map_err(at(Step::Parse))?;
    let markdown = export.primary(mode).to_path_buf();
    timings.push(finish(Step::Parse, started, &markdown));

    // ── Step 2: Markdown → HTML ──────────────────────────────────────────
    let started = Instant::now();
    let html = markdown_to_html(Arc::clone(&tools.html), &markdown, tools.page_break_css)
        .await
        .map_err(at(Step::MarkdownToHtml))?;
    timings.push(finish(Step::MarkdownToHtml, started, &html));

    // ── Step 3: Repair image links ───────────────────────────────────────
    let started = Instant::now();
    let html = links::rewrite_file(&html)
        .await
        .map_err(at(Step::RewriteLinks))?;
    timings.push(finish(Step::RewriteLinks, started, &html));

    // ── Step 4: HTML → PDF ───────────────────────────────────────────────
    let started = Instant::now();
    let pdf = html_to_pdf(Arc::clone(&tools.pdf), &html, &layout.pdf())
        .await
        .map_err(at(Step::HtmlToPdf))?;
    timings.push(finish(Step::HtmlToPdf, started, &pdf));

    // ── Step 5: PDF → PNG pages ──────────────────────────────────────────
    let started = Instant::now();
    let images_dir = layout.images_dir();
    let pages = render_pages(Arc::clone(&tools.rasterizer), &pdf, &images_dir)
        .await
        .map_err(at(Step::RenderPages))?;
    timings.push(finish(Step::RenderPages, started, &images_dir));

    // ── Step 6: Embeddings ───────────────────────────────────────────────
    let started = Instant::now();
    let embeddings_dir = layout.embeddings_dir();
    let report = generate_embeddings(Arc::clone(&tools.embedder), &images_dir, &embeddings_dir)
        .await
        .map_err(at(Step::Embed))?;
    timings.push(finish(Step::Embed, started, &embeddings_dir));

    // ── Step 7: Sweep stray .npy files ───────────────────────────────────
    let started = Instant::now();
    let moved = relocate::relocate_embeddings(&images_dir, &embeddings_dir)
        .await
        .map_err(at(Step::Relocate))?;
    timings.push(finish(Step::Relocate, started, &embeddings_dir));

    let artifacts = ArtifactSet {
        stem: layout.stem().to_string(),
        markdown_path: markdown,
        html_path: html,
        pdf_path: pdf,
        images_dir,
        embeddings_dir,
        page_count: pages.len(),
        embedding_count: report
            .written
            .iter()
            .chain(moved.iter())
            .collect::<BTreeSet<_>>()
            .len(),
        embedding_failures: report.failures,
    };

    let total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Pipeline complete: {} pages, {} embeddings, {}ms total",
        artifacts.page_count, artifacts.embedding_count, total_duration_ms
    );

    Ok(RunReport {
        artifacts,
        timings,
        total_duration_ms,
    })
}

/// Convert a local document into `out_dir` with the production toolchain.
///
/// The input is copied into `out_dir` first so every artifact, including the
/// source, ends up in one directory.
///
/// # Example
/// ```rust,no_run
/// use docchain::{convert_document, PipelineConfig, RunOptions};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::default();
/// let report = convert_document("report.docx", "out/", &config, RunOptions::default()).await?;
/// println!("{}", report.artifacts.pdf_path.display());
/// # Ok(())
/// # }
/// ```
pub async fn convert_document(
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: &PipelineConfig,
    options: RunOptions,
) -> Result<RunReport, PipelineError> {
    let input = input.as_ref();
    let out_dir = out_dir.as_ref();

    let staged = stage_input(input, out_dir).await.map_err(at(Step::Parse))?;
    let tools = Toolchain::from_config(config);
    run_pipeline(&staged, out_dir, &tools, options).await
}

async fn stage_input(input: &Path, out_dir: &Path) -> Result<PathBuf, ConvertError> {
    if !input.is_file() {
        return Err(ConvertError::InputNotFound {
            path: input.to_path_buf(),
        });
    }
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| ConvertError::io(out_dir, e))?;

    let name = input
        .file_name()
        .ok_or_else(|| ConvertError::InputNotFound {
            path: input.to_path_buf(),
        })?;
    let staged = out_dir.join(name);

    let same_file = match (input.canonicalize(), staged.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if !same_file {
        tokio::fs::copy(input, &staged)
            .await
            .map_err(|e| ConvertError::io(&staged, e))?;
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolchain_from_config_picks_backends() {
        let config = PipelineConfig::builder()
            .html_backend(HtmlBackend::Builtin)
            .build()
            .unwrap();
        let tools = Toolchain::from_config(&config);
        assert_eq!(tools.parser.name(), "auto");
        assert_eq!(tools.html.name(), "builtin");
        assert_eq!(tools.pdf.name(), "wkhtmltopdf");
        assert!(tools.page_break_css);

        let tools = Toolchain::from_config(&PipelineConfig::default());
        assert_eq!(tools.html.name(), "pandoc");
    }

    #[tokio::test]
    async fn missing_input_fails_at_parse() {
        let dir = tempfile::tempdir().unwrap();
        let err = convert_document(
            dir.path().join("absent.pdf"),
            dir.path().join("out"),
            &PipelineConfig::default(),
            RunOptions::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.step, Step::Parse);
        assert!(matches!(err.source, ConvertError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn staging_copies_into_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.docx");
        std::fs::write(&src, b"PK").unwrap();
        let out = dir.path().join("out");

        let staged = stage_input(&src, &out).await.unwrap();
        assert_eq!(staged, out.join("a.docx"));
        assert!(staged.is_file());

        // Already in place: no copy onto itself.
        let again = stage_input(&staged, &out).await.unwrap();
        assert_eq!(again, staged);
        assert_eq!(std::fs::read(&again).unwrap(), b"PK");
    }
}
