//! # docchain
//!
//! Upload a document, get back every representation of it: Markdown, HTML,
//! a re-rendered PDF, one PNG per page, and one image embedding per page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document (pdf, docx, pptx, xlsx, html, image)
//!  │
//!  ├─ 1. Parse      docling (pdfium fallback)           → S-with-image-refs.md, S-table-N.png
//!  ├─ 2. HTML       pandoc or comrak                     → S-with-image-refs.html
//!  ├─ 3. Links      lol_html: `%5C` → `/` in img src
//!  ├─ 4. PDF        wkhtmltopdf                          → S-rendered.pdf
//!  ├─ 5. Pages      pdfium rasterisation (spawn_blocking) → images/S-rendered-N.png
//!  ├─ 6. Embed      Swin transformer via ONNX Runtime     → embeddings/S-rendered-N.npy
//!  └─ 7. Relocate   stray .npy files → embeddings/
//! ```
//!
//! Each run happens in its own directory. The HTTP service in [`server`]
//! gives every upload a session and serves the artifacts back, singly or as
//! zip bundles.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docchain::{convert_document, PipelineConfig, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let report = convert_document("slides.pptx", "out/", &config, RunOptions::default()).await?;
//!     println!("{} pages rendered", report.artifacts.page_count);
//!     Ok(())
//! }
//! ```
//!
//! ## External Tools
//!
//! | Tool | Used by | Needed for |
//! |------|---------|------------|
//! | `docling` | step 1 | Office and HTML inputs; tables and OCR for PDFs and images |
//! | `pandoc` | step 2 | default HTML backend (`builtin` needs nothing) |
//! | `wkhtmltopdf` | step 4 | always |
//! | `libpdfium` | steps 1, 5 | always |
//! | Swin ONNX model | step 6 | always |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docchain` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod server;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{HtmlBackend, PipelineConfig, PipelineConfigBuilder, ServerConfig};
pub use convert::{convert_document, run_pipeline, RunOptions, Toolchain};
pub use error::{ConvertError, EmbedError, PipelineError};
pub use output::{ArtifactKind, ArtifactLayout, ArtifactSet, RunReport, StepTiming};
pub use pipeline::Step;
pub use server::{build_router, serve, AppState};
pub use session::{InMemorySessionStore, Session, SessionId, SessionStore};
