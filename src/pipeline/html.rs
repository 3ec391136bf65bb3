//! Markdown → standalone HTML.
//!
//! The default backend is `pandoc -s`, matching what the PDF step expects:
//! a complete document with `<head>`, relative image links resolved against
//! the HTML file's own directory. [`BuiltinRenderer`] renders with comrak when
//! pandoc is unavailable.
//!
//! After rendering, page-break markers left by the parser become
//! `<div class="page-break">` elements and a small stylesheet forcing a break
//! after each one is injected into `<head>`.

use crate::error::ConvertError;
use crate::output::ArtifactLayout;
use crate::pipeline::parse::PAGE_BREAK_MARKER;
use crate::process::{run_tool, OutputGuard};
use async_trait::async_trait;
use comrak::{markdown_to_html as comrak_to_html, ComrakOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PAGE_BREAK_CSS: &str =
    "<style>.page-break { page-break-after: always; break-after: page; }</style>";

/// Renders one Markdown file to one standalone HTML file.
#[async_trait]
pub trait MarkdownRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn render(&self, markdown: &Path, html: &Path) -> Result<(), ConvertError>;
}

/// `pandoc -s -f markdown -t html [--css FILE]`
#[derive(Debug, Clone)]
pub struct PandocRenderer {
    program: PathBuf,
    css_file: Option<PathBuf>,
    timeout: Duration,
}

impl PandocRenderer {
    pub fn new(program: impl Into<PathBuf>, css_file: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            css_file,
            timeout,
        }
    }

    fn args(&self, markdown: &Path, html: &Path) -> Vec<String> {
        let title = markdown
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let mut args = vec![
            "-s".to_string(),
            "-f".to_string(),
            "markdown".to_string(),
            "-t".to_string(),
            "html".to_string(),
            "--metadata".to_string(),
            format!("pagetitle={title}"),
        ];
        if let Some(ref css) = self.css_file {
            args.push("--css".to_string());
            args.push(css.display().to_string());
        }
        args.push("-o".to_string());
        args.push(html.display().to_string());
        args.push(markdown.display().to_string());
        args
    }
}

#[async_trait]
impl MarkdownRenderer for PandocRenderer {
    fn name(&self) -> &'static str {
        "pandoc"
    }

    async fn render(&self, markdown: &Path, html: &Path) -> Result<(), ConvertError> {
        run_tool("pandoc", &self.program, self.args(markdown, html), self.timeout).await?;
        Ok(())
    }
}

/// In-process renderer built on comrak, wrapped in a minimal HTML5 shell.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRenderer {
    css_file: Option<PathBuf>,
}

impl BuiltinRenderer {
    pub fn new(css_file: Option<PathBuf>) -> Self {
        Self { css_file }
    }

    /// Render Markdown text to a complete HTML document.
    pub fn render_str(&self, markdown: &str, title: &str) -> String {
        let mut options = ComrakOptions::default();
        options.extension.table = true;
        options.extension.strikethrough = true;
        options.extension.autolink = true;
        options.extension.tasklist = true;
        // Raw HTML (page-break comments, inline figures) must survive.
        options.render.unsafe_ = true;

        let body = comrak_to_html(markdown, &options);
        let css_link = self
            .css_file
            .as_ref()
            .map(|css| format!("<link rel=\"stylesheet\" href=\"{}\" />\n", css.display()))
            .unwrap_or_default();

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n<title>{}</title>\n{}</head>\n<body>\n{}</body>\n</html>\n",
            escape_text(title),
            css_link,
            body
        )
    }
}

#[async_trait]
impl MarkdownRenderer for BuiltinRenderer {
    fn name(&self) -> &'static str {
        "builtin"
    }

    async fn render(&self, markdown: &Path, html: &Path) -> Result<(), ConvertError> {
        let text = tokio::fs::read_to_string(markdown)
            .await
            .map_err(|e| ConvertError::io(markdown, e))?;
        let title = markdown
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let rendered = self.render_str(&text, title);
        tokio::fs::write(html, rendered)
            .await
            .map_err(|e| ConvertError::io(html, e))
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

static RE_PAGE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(&regex::escape(PAGE_BREAK_MARKER)).unwrap());

/// Turn every page-break marker into a break element.
pub fn rewrite_page_breaks(html: &str) -> String {
    RE_PAGE_BREAK
        .replace_all(html, r#"<div class="page-break"></div>"#)
        .to_string()
}

/// Insert `css` (a `<style>` or `<link>` element) just before `</head>`.
/// Documents without a head get it prepended.
pub fn inject_head(html: &str, css: &str) -> String {
    match html.find("</head>") {
        Some(pos) => format!("{}{}\n{}", &html[..pos], css, &html[pos..]),
        None => format!("{}\n{}", css, html),
    }
}

/// Render `markdown` to `<markdown stem>.html` next to it.
///
/// The HTML file is removed again if rendering or post-processing fails.
pub async fn markdown_to_html(
    renderer: Arc<dyn MarkdownRenderer>,
    markdown: &Path,
    page_break_css: bool,
) -> Result<PathBuf, ConvertError> {
    if !markdown.is_file() {
        return Err(ConvertError::MissingArtifact {
            path: markdown.to_path_buf(),
        });
    }

    let html = ArtifactLayout::html_for(markdown);
    let guard = OutputGuard::new(&html);
    renderer.render(markdown, &html).await?;

    if !html.is_file() {
        return Err(ConvertError::MissingArtifact { path: html });
    }

    if page_break_css {
        let text = tokio::fs::read_to_string(&html)
            .await
            .map_err(|e| ConvertError::io(&html, e))?;
        let text = inject_head(&rewrite_page_breaks(&text), PAGE_BREAK_CSS);
        tokio::fs::write(&html, text)
            .await
            .map_err(|e| ConvertError::io(&html, e))?;
    }

    debug!("{} rendered {}", renderer.name(), html.display());
    Ok(guard.commit())
}
