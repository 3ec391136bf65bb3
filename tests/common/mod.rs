//! Stub collaborators so the full pipeline runs without docling, pdfium,
//! wkhtmltopdf or an ONNX model. HTML rendering uses the real comrak backend.

#![allow(dead_code)]

use async_trait::async_trait;
use docchain::pipeline::embed::ImageEmbedder;
use docchain::pipeline::html::BuiltinRenderer;
use docchain::pipeline::input::InputFormat;
use docchain::pipeline::parse::{DocumentParser, MarkdownExport, PAGE_BREAK_MARKER};
use docchain::pipeline::pdf::{PdfRenderer, Wkhtmltopdf};
use docchain::pipeline::render::PageRasterizer;
use docchain::{ArtifactLayout, ConvertError, EmbedError, Toolchain};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::{ArrayD, IxDyn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Writes both Markdown variants from the input's file name. The referenced
/// variant links an image through a Windows-style path to exercise link repair.
pub struct StubParser;

#[async_trait]
impl DocumentParser for StubParser {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn parse(
        &self,
        input: &Path,
        _format: InputFormat,
        layout: &ArtifactLayout,
    ) -> Result<MarkdownExport, ConvertError> {
        let title = input.file_name().unwrap_or_default().to_string_lossy();
        let body = format!(
            "# {title}\n\nFirst page.\n\n{PAGE_BREAK_MARKER}\n\nSecond page.\n\n"
        );
        let referenced = layout.markdown_referenced();
        let embedded = layout.markdown_embedded();
        let picture = layout.picture_name(1);
        tokio::fs::write(
            &referenced,
            format!("{body}![Picture 1](pictures\\{picture})\n"),
        )
        .await
        .map_err(|e| ConvertError::Io { path: referenced.clone(), source: e })?;
        tokio::fs::write(
            &embedded,
            format!("{body}![Picture 1](data:image/png;base64,iVBORw0KGgo=)\n"),
        )
        .await
        .map_err(|e| ConvertError::Io { path: embedded.clone(), source: e })?;

        Ok(MarkdownExport {
            embedded,
            referenced,
            pictures: Vec::new(),
            tables: Vec::new(),
        })
    }
}

/// Writes a tiny but non-empty PDF.
pub struct StubPdf;

#[async_trait]
impl PdfRenderer for StubPdf {
    fn name(&self) -> &'static str {
        "stub-pdf"
    }

    async fn render(&self, _html: &Path, pdf: &Path) -> Result<(), ConvertError> {
        tokio::fs::write(pdf, b"%PDF-1.4\n%stub\n%%EOF\n")
            .await
            .map_err(|e| ConvertError::Io { path: pdf.to_path_buf(), source: e })
    }
}

/// Writes `pages` solid-colour PNGs; the page numbered `corrupt`, if any,
/// gets bytes that are not an image.
pub struct StubRasterizer {
    pub pages: usize,
    pub corrupt: Option<usize>,
}

impl PageRasterizer for StubRasterizer {
    fn rasterize(&self, pdf: &Path, images_dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
        (1..=self.pages)
            .map(|page| {
                let out = ArtifactLayout::page_image(images_dir, pdf, page);
                if self.corrupt == Some(page) {
                    std::fs::write(&out, b"not a png")
                        .map_err(|e| ConvertError::Io { path: out.clone(), source: e })?;
                } else {
                    let shade = (page * 40 % 256) as u8;
                    DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 48, Rgb([shade, 0, 255])))
                        .save(&out)
                        .map_err(|e| ConvertError::RasterisationFailed {
                            page,
                            detail: e.to_string(),
                        })?;
                }
                Ok(out)
            })
            .collect()
    }
}

/// Returns a `[1, 2]` vector of width and height.
pub struct StubEmbedder;

impl ImageEmbedder for StubEmbedder {
    fn prepare(&self) -> Result<(), ConvertError> {
        Ok(())
    }

    fn embed(&self, _path: &Path, image: &DynamicImage) -> Result<ArrayD<f32>, EmbedError> {
        let v = vec![image.width() as f32, image.height() as f32];
        ArrayD::from_shape_vec(IxDyn(&[1, 2]), v).map_err(|e| EmbedError::Inference {
            path: PathBuf::new(),
            detail: e.to_string(),
        })
    }
}

pub fn toolchain(pages: usize, corrupt: Option<usize>) -> Toolchain {
    Toolchain {
        parser: Arc::new(StubParser),
        html: Arc::new(BuiltinRenderer::new(None)),
        pdf: Arc::new(StubPdf),
        rasterizer: Arc::new(StubRasterizer { pages, corrupt }),
        embedder: Arc::new(StubEmbedder),
        page_break_css: true,
    }
}

/// Same as [`toolchain`] but wkhtmltopdf points at a binary that does not exist.
pub fn toolchain_without_pdf_renderer() -> Toolchain {
    Toolchain {
        pdf: Arc::new(Wkhtmltopdf::new(
            "/nonexistent/bin/wkhtmltopdf",
            false,
            Duration::from_secs(5),
        )),
        ..toolchain(2, None)
    }
}
