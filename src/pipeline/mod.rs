//! Pipeline stages for document conversion.
//!
//! Each submodule implements exactly one transformation step, behind a
//! trait where an external collaborator is involved, so the orchestrator in
//! [`crate::convert`] can be driven with stand-ins in tests.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ parse ──▶ html ──▶ links ──▶ pdf ──▶ render ──▶ embed ──▶ relocate
//! (detect)  (→ .md)   (→ .html) (%5C fix) (wkhtml) (pdfium)  (ONNX)    (.npy move)
//! ```
//!
//! 1. [`input`]    — detect the document format and sanitise upload names
//! 2. [`parse`]    — export Markdown (embedded + referenced images) via the
//!    `docling` CLI, falling back to pdfium; [`tables`] crops table images
//! 3. [`html`]     — Markdown → standalone HTML via `pandoc` or comrak
//! 4. [`links`]    — repair `%5C` separators in image `src`/`srcset`
//! 5. [`pdf`]      — HTML → PDF via `wkhtmltopdf`
//! 6. [`render`]   — rasterise every PDF page to PNG; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 7. [`embed`]    — Swin transformer embeddings per PNG, one `.npy` each
//! 8. [`relocate`] — sweep stray `.npy` files into the embeddings directory

pub mod embed;
pub mod encode;
pub mod html;
pub mod input;
pub mod links;
pub mod parse;
pub mod pdf;
pub mod postprocess;
pub mod relocate;
pub mod render;
pub mod tables;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named pipeline step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Parse,
    MarkdownToHtml,
    RewriteLinks,
    HtmlToPdf,
    RenderPages,
    Embed,
    Relocate,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Parse,
        Step::MarkdownToHtml,
        Step::RewriteLinks,
        Step::HtmlToPdf,
        Step::RenderPages,
        Step::Embed,
        Step::Relocate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Parse => "parse",
            Step::MarkdownToHtml => "markdown_to_html",
            Step::RewriteLinks => "rewrite_links",
            Step::HtmlToPdf => "html_to_pdf",
            Step::RenderPages => "render_pages",
            Step::Embed => "embed",
            Step::Relocate => "relocate",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
