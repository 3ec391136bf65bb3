//! Configuration types for the conversion pipeline and the HTTP service.
//!
//! Pipeline behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The service itself (bind address, work
//! directory, session lifetime) lives in [`ServerConfig`]. The binary maps CLI
//! flags and `DOCCHAIN_*` environment variables onto both.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the external tools and models used by a pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use docchain::{HtmlBackend, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .wkhtmltopdf_path("/usr/local/bin/wkhtmltopdf")
///     .html_backend(HtmlBackend::Builtin)
///     .process_timeout_secs(120)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// `docling` executable, tried first for every input. Default: `docling` on `PATH`.
    pub docling_path: PathBuf,

    /// `pandoc` executable for Markdown → HTML. Default: `pandoc` on `PATH`.
    pub pandoc_path: PathBuf,

    /// `wkhtmltopdf` executable for HTML → PDF. Default: `wkhtmltopdf` on `PATH`.
    pub wkhtmltopdf_path: PathBuf,

    /// Directory (or file) holding the pdfium shared library.
    /// If None, `./` is tried first, then the system library search path.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Scale factor applied when rasterising PDF pages. Range: 0.5–6.0. Default: 2.0.
    ///
    /// 1.0 renders at 72 DPI; 2.0 gives 144 DPI, enough for the embedding
    /// model, which downsamples to 224 px anyway.
    pub image_scale: f32,

    /// Longest edge of a rendered page in pixels, regardless of scale. Default: 4000.
    pub max_rendered_pixels: u32,

    /// ONNX export of `microsoft/swin-base-patch4-window7-224`.
    pub model_path: PathBuf,

    /// Optional stylesheet linked from the generated HTML.
    pub css_file: Option<PathBuf>,

    /// Inject page-break CSS and turn page-break markers into break elements. Default: true.
    pub page_break_css: bool,

    /// Pass `--disable-javascript` to wkhtmltopdf. Default: false.
    pub disable_javascript: bool,

    /// Which Markdown → HTML implementation to use. Default: [`HtmlBackend::Pandoc`].
    pub html_backend: HtmlBackend,

    /// Upper bound on any single external process, in seconds. Default: 300.
    pub process_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            docling_path: PathBuf::from("docling"),
            pandoc_path: PathBuf::from("pandoc"),
            wkhtmltopdf_path: PathBuf::from("wkhtmltopdf"),
            pdfium_lib_path: None,
            image_scale: 2.0,
            max_rendered_pixels: 4000,
            model_path: PathBuf::from("models/swin-base-patch4-window7-224.onnx"),
            css_file: None,
            page_break_css: true,
            disable_javascript: false,
            html_backend: HtmlBackend::default(),
            process_timeout_secs: 300,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn docling_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.docling_path = path.into();
        self
    }

    pub fn pandoc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pandoc_path = path.into();
        self
    }

    pub fn wkhtmltopdf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.wkhtmltopdf_path = path.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn image_scale(mut self, scale: f32) -> Self {
        self.config.image_scale = scale.clamp(0.5, 6.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(224);
        self
    }

    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.model_path = path.into();
        self
    }

    pub fn css_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.css_file = Some(path.into());
        self
    }

    pub fn page_break_css(mut self, v: bool) -> Self {
        self.config.page_break_css = v;
        self
    }

    pub fn disable_javascript(mut self, v: bool) -> Self {
        self.config.disable_javascript = v;
        self
    }

    pub fn html_backend(mut self, backend: HtmlBackend) -> Self {
        self.config.html_backend = backend;
        self
    }

    pub fn process_timeout_secs(mut self, secs: u64) -> Self {
        self.config.process_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ConvertError> {
        let c = &self.config;
        if !(0.5..=6.0).contains(&c.image_scale) {
            return Err(ConvertError::InvalidConfig(format!(
                "Image scale must be 0.5–6.0, got {}",
                c.image_scale
            )));
        }
        if c.process_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "Process timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref css) = c.css_file {
            if !css.exists() {
                return Err(ConvertError::InvalidConfig(format!(
                    "CSS file not found: {}",
                    css.display()
                )));
            }
        }
        Ok(self.config)
    }
}

/// Markdown → HTML implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HtmlBackend {
    /// Shell out to `pandoc -s` (default).
    #[default]
    Pandoc,
    /// Render in-process with comrak; no external binary required.
    Builtin,
}

/// Settings for the HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on. Default: `0.0.0.0:8000`.
    pub bind: SocketAddr,

    /// Parent of every per-session directory. Default: `temp`.
    pub work_dir: PathBuf,

    /// How long a session and its files live after upload, in seconds. Default: 3600.
    pub session_ttl_secs: u64,

    /// How often expired sessions are swept, in seconds. Default: 60.
    pub sweep_interval_secs: u64,

    /// Largest accepted request body in bytes. Default: 100 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            work_dir: PathBuf::from("temp"),
            session_ttl_secs: 3600,
            sweep_interval_secs: 60,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.image_scale, 2.0);
        assert_eq!(c.process_timeout_secs, 300);
        assert!(c.page_break_css);
        assert!(!c.disable_javascript);
        assert_eq!(c.html_backend, HtmlBackend::Pandoc);
        assert_eq!(c.wkhtmltopdf_path, PathBuf::from("wkhtmltopdf"));
    }

    #[test]
    fn builder_clamps_scale() {
        let c = PipelineConfig::builder().image_scale(50.0).build().unwrap();
        assert_eq!(c.image_scale, 6.0);
        let c = PipelineConfig::builder().image_scale(0.0).build().unwrap();
        assert_eq!(c.image_scale, 0.5);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = PipelineConfig::builder()
            .process_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
    }

    #[test]
    fn missing_css_is_rejected() {
        let err = PipelineConfig::builder()
            .css_file("/definitely/not/here.css")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("CSS file not found"));
    }

    #[test]
    fn server_defaults() {
        let s = ServerConfig::default();
        assert_eq!(s.bind.port(), 8000);
        assert_eq!(s.work_dir, PathBuf::from("temp"));
        assert_eq!(s.session_ttl(), Duration::from_secs(3600));
    }
}
