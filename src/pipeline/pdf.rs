//! HTML → PDF via `wkhtmltopdf`.
//!
//! `--enable-local-file-access` is always passed so the page can load the
//! picture files sitting next to it. The output is guarded: if the renderer
//! is missing, fails, times out or produces an empty file, no PDF is left in
//! the session directory.

use crate::error::ConvertError;
use crate::process::{run_tool, OutputGuard};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn render(&self, html: &Path, pdf: &Path) -> Result<(), ConvertError>;
}

#[derive(Debug, Clone)]
pub struct Wkhtmltopdf {
    program: PathBuf,
    disable_javascript: bool,
    timeout: Duration,
}

impl Wkhtmltopdf {
    pub fn new(program: impl Into<PathBuf>, disable_javascript: bool, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            disable_javascript,
            timeout,
        }
    }

    fn args<'a>(&self, html: &'a Path, pdf: &'a Path) -> Vec<&'a std::ffi::OsStr> {
        let mut args: Vec<&std::ffi::OsStr> = vec!["--enable-local-file-access".as_ref()];
        if self.disable_javascript {
            args.push("--disable-javascript".as_ref());
        }
        args.push(html.as_os_str());
        args.push(pdf.as_os_str());
        args
    }
}

#[async_trait]
impl PdfRenderer for Wkhtmltopdf {
    fn name(&self) -> &'static str {
        "wkhtmltopdf"
    }

    async fn render(&self, html: &Path, pdf: &Path) -> Result<(), ConvertError> {
        let out = run_tool("wkhtmltopdf", &self.program, self.args(html, pdf), self.timeout).await?;
        debug!("wkhtmltopdf: {}", out.stderr.lines().last().unwrap_or_default());
        Ok(())
    }
}

/// Render `html` to `pdf`, keeping the file only if it is non-empty.
pub async fn html_to_pdf(
    renderer: Arc<dyn PdfRenderer>,
    html: &Path,
    pdf: &Path,
) -> Result<PathBuf, ConvertError> {
    if !html.is_file() {
        return Err(ConvertError::MissingArtifact {
            path: html.to_path_buf(),
        });
    }

    let guard = OutputGuard::new(pdf);
    renderer.render(html, pdf).await?;

    let size = tokio::fs::metadata(pdf)
        .await
        .map(|m| m.len())
        .unwrap_or_default();
    if size == 0 {
        return Err(ConvertError::MissingArtifact {
            path: pdf.to_path_buf(),
        });
    }

    info!("{} wrote {} ({} bytes)", renderer.name(), pdf.display(), size);
    Ok(guard.commit())
}
