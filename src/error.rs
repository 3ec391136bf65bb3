//! Error types for the docchain library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`] — **Fatal**: a pipeline step cannot produce its
//!   artifact (missing input, external tool absent or failing, corrupt
//!   document, model not loadable). The orchestrator wraps it in a
//!   [`PipelineError`] naming the step and aborts the run.
//!
//! * [`EmbedError`] — **Non-fatal**: a single page image could not be
//!   embedded. It is logged, recorded in
//!   [`crate::pipeline::embed::EmbeddingReport`], and the batch continues.

use crate::pipeline::Step;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors a pipeline step can return.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input document was not found at the given path.
    #[error("Input document not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file extension is not one the parsers understand.
    #[error("Unsupported document format '{extension}' for '{path}'\nSupported: pdf, docx, pptx, xlsx, html, png, jpg, tif, bmp")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// The file claims to be a PDF but lacks the `%PDF` header.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The parsing backend could not make sense of the document.
    #[error("Document '{path}' could not be parsed: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// A step expected the previous step's output and did not find it.
    #[error("Expected artifact is missing: '{path}'")]
    MissingArtifact { path: PathBuf },

    // ── External tool errors ──────────────────────────────────────────────
    /// The external binary could not be spawned because it does not exist.
    #[error("{tool} not found at '{program}'\nInstall it or point the configuration at the binary.")]
    ToolNotFound { tool: String, program: PathBuf },

    /// The external binary ran and exited unsuccessfully.
    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The external binary exceeded the configured timeout and was killed.
    #[error("{tool} timed out after {secs}s and was killed")]
    ToolTimeout { tool: String, secs: u64 },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set DOCCHAIN_PDFIUM_LIB to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Embedding errors ──────────────────────────────────────────────────
    /// The ONNX model could not be loaded; no image can be embedded.
    #[error("Failed to load embedding model '{path}': {detail}")]
    ModelLoadFailed { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when an external binary was missing rather than misbehaving.
    pub fn is_tool_not_found(&self) -> bool {
        matches!(self, ConvertError::ToolNotFound { .. })
    }

    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ConvertError::InputNotFound { .. } => "INPUT_NOT_FOUND",
            ConvertError::PermissionDenied { .. } => "PERMISSION_DENIED",
            ConvertError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            ConvertError::NotAPdf { .. } => "NOT_A_PDF",
            ConvertError::CorruptDocument { .. } => "CORRUPT_DOCUMENT",
            ConvertError::MissingArtifact { .. } => "MISSING_ARTIFACT",
            ConvertError::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            ConvertError::ToolFailed { .. } => "TOOL_FAILED",
            ConvertError::ToolTimeout { .. } => "TOOL_TIMEOUT",
            ConvertError::PdfiumBindingFailed(_) => "PDFIUM_UNAVAILABLE",
            ConvertError::RasterisationFailed { .. } => "RASTERISATION_FAILED",
            ConvertError::ModelLoadFailed { .. } => "MODEL_LOAD_FAILED",
            ConvertError::Io { .. } => "IO_ERROR",
            ConvertError::InvalidConfig(_) => "INVALID_CONFIG",
            ConvertError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// A run aborted at `step`; nothing after it was attempted.
#[derive(Debug, Error)]
#[error("Pipeline step '{step}' failed: {source}")]
pub struct PipelineError {
    pub step: Step,
    #[source]
    pub source: ConvertError,
}

/// A non-fatal error for a single page image in the embedding batch.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum EmbedError {
    /// The PNG could not be opened or decoded.
    #[error("{path}: image could not be read: {detail}")]
    Unreadable { path: PathBuf, detail: String },

    /// The model rejected the tensor or produced no usable output.
    #[error("{path}: inference failed: {detail}")]
    Inference { path: PathBuf, detail: String },

    /// The `.npy` file could not be written.
    #[error("{path}: could not write embedding: {detail}")]
    WriteFailed { path: PathBuf, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_not_found_display_names_tool_and_path() {
        let e = ConvertError::ToolNotFound {
            tool: "wkhtmltopdf".into(),
            program: PathBuf::from("/opt/bin/wkhtmltopdf"),
        };
        let msg = e.to_string();
        assert!(msg.contains("wkhtmltopdf not found"), "got: {msg}");
        assert!(msg.contains("/opt/bin/wkhtmltopdf"));
        assert!(e.is_tool_not_found());
        assert_eq!(e.code(), "TOOL_NOT_FOUND");
    }

    #[test]
    fn tool_timeout_display() {
        let e = ConvertError::ToolTimeout {
            tool: "pandoc".into(),
            secs: 30,
        };
        assert!(e.to_string().contains("30s"));
        assert!(!e.is_tool_not_found());
    }

    #[test]
    fn pipeline_error_names_the_step() {
        let e = PipelineError {
            step: Step::HtmlToPdf,
            source: ConvertError::MissingArtifact {
                path: PathBuf::from("doc.html"),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("html_to_pdf"), "got: {msg}");
        assert!(msg.contains("doc.html"));
    }

    #[test]
    fn embed_error_serialises() {
        let e = EmbedError::Unreadable {
            path: PathBuf::from("images/a-1.png"),
            detail: "truncated".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("Unreadable"));
        assert!(e.to_string().contains("a-1.png"));
    }
}
