//! Output types: artifact naming, the artifact set a run produces, and the
//! run report.
//!
//! Every artifact path is a pure function of the session directory and the
//! input stem, computed by [`ArtifactLayout`]. Nothing else in the crate
//! formats artifact names.

use crate::error::EmbedError;
use crate::pipeline::Step;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Deterministic artifact paths for one document in one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    dir: PathBuf,
    stem: String,
}

impl ArtifactLayout {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// `S-with-image-refs.md`: pictures linked as sibling PNG files.
    pub fn markdown_referenced(&self) -> PathBuf {
        self.dir.join(format!("{}-with-image-refs.md", self.stem))
    }

    /// `S-with-images.md`: pictures inlined as base64 data URIs.
    pub fn markdown_embedded(&self) -> PathBuf {
        self.dir.join(format!("{}-with-images.md", self.stem))
    }

    /// File name (not path) of the `n`th extracted picture, 1-based.
    pub fn picture_name(&self, n: usize) -> String {
        format!("{}-picture-{}.png", self.stem, n)
    }

    /// File name of the `n`th table crop, 1-based.
    pub fn table_name(&self, n: usize) -> String {
        format!("{}-table-{}.png", self.stem, n)
    }

    /// HTML output sits next to the Markdown it was rendered from.
    pub fn html_for(markdown: &Path) -> PathBuf {
        markdown.with_extension("html")
    }

    pub fn pdf(&self) -> PathBuf {
        self.dir.join(format!("{}-rendered.pdf", self.stem))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.dir.join("images")
    }

    pub fn embeddings_dir(&self) -> PathBuf {
        self.dir.join("embeddings")
    }

    /// `images/<pdf stem>-<page>.png`, page 1-based.
    pub fn page_image(images_dir: &Path, pdf: &Path, page: usize) -> PathBuf {
        let pdf_stem = pdf
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        images_dir.join(format!("{pdf_stem}-{page}.png"))
    }

    /// `<embeddings dir>/<png stem>.npy`
    pub fn embedding_for(embeddings_dir: &Path, png: &Path) -> PathBuf {
        let png_stem = png.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
        embeddings_dir.join(format!("{png_stem}.npy"))
    }
}

/// The files a completed run links to its session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSet {
    /// Input file stem every artifact name is derived from.
    pub stem: String,
    pub markdown_path: PathBuf,
    pub html_path: PathBuf,
    pub pdf_path: PathBuf,
    pub images_dir: PathBuf,
    pub embeddings_dir: PathBuf,
    /// Number of PNG pages rendered from the PDF.
    pub page_count: usize,
    /// Number of `.npy` files written.
    pub embedding_count: usize,
    /// Page images that could not be embedded; the run still succeeded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding_failures: Vec<EmbedError>,
}

impl ArtifactSet {
    /// File or directory backing a downloadable artifact kind.
    ///
    /// [`ArtifactKind::All`] resolves to the parent of the Markdown file,
    /// which is the session directory.
    pub fn path_for(&self, kind: ArtifactKind) -> Option<&Path> {
        match kind {
            ArtifactKind::Markdown => Some(&self.markdown_path),
            ArtifactKind::Html => Some(&self.html_path),
            ArtifactKind::Pdf => Some(&self.pdf_path),
            ArtifactKind::Images => Some(&self.images_dir),
            ArtifactKind::Embeddings => Some(&self.embeddings_dir),
            ArtifactKind::All => self.markdown_path.parent(),
        }
    }
}

/// Downloadable artifact kinds, as named in `/download/{kind}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Markdown,
    Html,
    Pdf,
    Images,
    Embeddings,
    All,
}

impl ArtifactKind {
    /// Single files are streamed as-is; directories are zipped.
    pub fn is_bundle(self) -> bool {
        matches!(
            self,
            ArtifactKind::Images | ArtifactKind::Embeddings | ArtifactKind::All
        )
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactKind::Markdown => "text/markdown; charset=utf-8",
            ArtifactKind::Html => "text/html; charset=utf-8",
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Images | ArtifactKind::Embeddings | ArtifactKind::All => {
                "application/zip"
            }
        }
    }

    /// Extensions included when this kind is zipped.
    pub fn bundle_extensions(self) -> &'static [&'static str] {
        match self {
            ArtifactKind::Images => &["png"],
            ArtifactKind::Embeddings => &["npy"],
            ArtifactKind::All => crate::archive::ALLOWED_EXTENSIONS,
            _ => &[],
        }
    }

    /// Download file name for a bundle, e.g. `report-images.zip`.
    pub fn bundle_name(self, stem: &str) -> String {
        match self {
            ArtifactKind::All => format!("{stem}-all.zip"),
            other => format!("{stem}-{other}.zip"),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::Markdown => "markdown",
            ArtifactKind::Html => "html",
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Images => "images",
            ArtifactKind::Embeddings => "embeddings",
            ArtifactKind::All => "all",
        })
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ArtifactKind::Markdown),
            "html" => Ok(ArtifactKind::Html),
            "pdf" => Ok(ArtifactKind::Pdf),
            "images" => Ok(ArtifactKind::Images),
            "embeddings" => Ok(ArtifactKind::Embeddings),
            "all" => Ok(ArtifactKind::All),
            other => Err(format!("unknown artifact kind '{other}'")),
        }
    }
}

/// Wall-clock time spent in one step and the artifact it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: Step,
    pub output: PathBuf,
    pub duration_ms: u64,
}

/// Result of a completed pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub artifacts: ArtifactSet,
    /// In execution order, one entry per step.
    pub timings: Vec<StepTiming>,
    pub total_duration_ms: u64,
}
