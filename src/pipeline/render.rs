//! PDF rasterisation: render every page of the produced PDF to a PNG file.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Why cap pixels as well as scale?
//!
//! Page sizes vary wildly: an A0 poster at scale 2.0 is several thousand
//! pixels on each side. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping memory bounded.

use crate::config::PipelineConfig;
use crate::error::ConvertError;
use crate::output::ArtifactLayout;
use crate::process::OutputGuard;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Bind to a pdfium shared library.
///
/// With an explicit `lib_path` (a directory or the library file itself) only
/// that location is tried. Otherwise the working directory is tried first,
/// then the system library search path.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, ConvertError> {
    let bindings = match lib_path {
        Some(p) if p.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(p))
        }
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ConvertError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Turns a PDF into one PNG per page.
///
/// Implementations are synchronous; [`render_pages`] runs them on the
/// blocking pool.
pub trait PageRasterizer: Send + Sync {
    /// Write `<pdf stem>-<page>.png` for every page into `images_dir` and
    /// return the paths in page order.
    fn rasterize(&self, pdf: &Path, images_dir: &Path) -> Result<Vec<PathBuf>, ConvertError>;
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    lib_path: Option<PathBuf>,
    scale: f32,
    max_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            lib_path: config.pdfium_lib_path.clone(),
            scale: config.image_scale,
            max_pixels: config.max_rendered_pixels,
        }
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &Path, images_dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
        let pdfium = bind_pdfium(self.lib_path.as_deref())?;

        let document =
            pdfium
                .load_pdf_from_file(pdf, None)
                .map_err(|e| ConvertError::CorruptDocument {
                    path: pdf.to_path_buf(),
                    detail: format!("{:?}", e),
                })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.scale)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut written = Vec::with_capacity(pages.len() as usize);

        for (idx, page) in pages.iter().enumerate() {
            let page_no = idx + 1;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                ConvertError::RasterisationFailed {
                    page: page_no,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image().to_rgb8();
            let path = ArtifactLayout::page_image(images_dir, pdf, page_no);
            let guard = OutputGuard::new(&path);
            image
                .save_with_format(guard.path(), image::ImageFormat::Png)
                .map_err(|e| ConvertError::RasterisationFailed {
                    page: page_no,
                    detail: format!("PNG write failed: {}", e),
                })?;
            debug!(
                "Rendered page {} → {}x{} px ({})",
                page_no,
                image.width(),
                image.height(),
                path.display()
            );
            written.push(guard.commit());
        }

        Ok(written)
    }
}

/// Rasterise every page of `pdf` into `images_dir`.
///
/// Creates `images_dir` if needed. Runs the rasterizer inside
/// `spawn_blocking` since pdfium operations are CPU-bound.
pub async fn render_pages(
    rasterizer: Arc<dyn PageRasterizer>,
    pdf: &Path,
    images_dir: &Path,
) -> Result<Vec<PathBuf>, ConvertError> {
    if !pdf.is_file() {
        return Err(ConvertError::MissingArtifact {
            path: pdf.to_path_buf(),
        });
    }
    tokio::fs::create_dir_all(images_dir)
        .await
        .map_err(|e| ConvertError::io(images_dir, e))?;

    let pdf = pdf.to_path_buf();
    let images_dir = images_dir.to_path_buf();
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&pdf, &images_dir))
        .await
        .map_err(|e| ConvertError::Internal(format!("Render task panicked: {}", e)))?
}
