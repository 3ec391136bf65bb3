//! Document parsing: input document → Markdown in two image modes.
//!
//! Every parser produces the same files in the session directory:
//!
//! * `S-with-image-refs.md` — pictures linked as sibling `S-picture-N.png`
//! * `S-with-images.md`     — the same Markdown with each picture inlined
//!   as a base64 `data:` URI
//! * `S-picture-N.png`      — one file per extracted picture, N 1-based in
//!   order of appearance
//! * `S-table-N.png`        — one crop per detected table (docling only)
//!
//! [`DoclingParser`] shells out to the `docling` CLI and handles every
//! format, including OCR for raster images. [`PdfiumParser`] extracts PDF
//! text and pictures in-process. [`RoutingParser`] tries docling first and
//! falls back to pdfium for PDFs and images when docling is not installed.
//!
//! Link destinations are percent-encoded, so a stem like `Q1 (draft)` still
//! yields a valid CommonMark image link.

use crate::error::ConvertError;
use crate::output::ArtifactLayout;
use crate::pipeline::encode::{encode_png, png_data_uri};
use crate::pipeline::input::InputFormat;
use crate::pipeline::postprocess::clean_page_text;
use crate::pipeline::render::bind_pdfium;
use crate::pipeline::tables::{export_tables, DoclingDocument};
use crate::process::run_tool;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Inserted between pages; the HTML step turns it into a CSS page break.
pub const PAGE_BREAK_MARKER: &str = "<!-- page-break -->";

/// Which Markdown export a run continues with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageMode {
    /// Pictures inlined as data URIs.
    Embedded,
    /// Pictures linked as sibling files (default).
    #[default]
    Referenced,
}

impl ImageMode {
    pub fn from_embed_flag(embed_images: bool) -> Self {
        if embed_images {
            ImageMode::Embedded
        } else {
            ImageMode::Referenced
        }
    }
}

/// Files written by a parser.
#[derive(Debug, Clone)]
pub struct MarkdownExport {
    pub embedded: PathBuf,
    pub referenced: PathBuf,
    pub pictures: Vec<PathBuf>,
    pub tables: Vec<PathBuf>,
}

impl MarkdownExport {
    pub fn primary(&self, mode: ImageMode) -> &Path {
        match mode {
            ImageMode::Embedded => &self.embedded,
            ImageMode::Referenced => &self.referenced,
        }
    }
}

/// Converts an input document into the Markdown pair described above.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    fn name(&self) -> &'static str;

    async fn parse(
        &self,
        input: &Path,
        format: InputFormat,
        layout: &ArtifactLayout,
    ) -> Result<MarkdownExport, ConvertError>;
}

// ── Shared helpers ──────────────────────────────────────────────────────────

/// `![alt](dest "title")`, where `dest` is either `<any text>` or a run of
/// non-space characters.
static RE_IMAGE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"!\[([^\]]*)\]\(\s*(?:<([^<>\n]*)>|([^)\s]+))(\s+"[^"]*")?\s*\)"#).unwrap()
});

fn link_target<'t>(caps: &regex::Captures<'t>) -> &'t str {
    caps.get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

/// Percent-encode a file name for use as a Markdown link destination.
pub fn encode_destination(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

/// Relative file path a link destination points at.
fn decode_destination(target: &str) -> String {
    urlencoding::decode(target)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| target.to_string())
        .replace('\\', "/")
}

/// Replace links to local PNG files under `base_dir` with data URIs.
///
/// Links that are already absolute URLs, or whose file cannot be read, are
/// left untouched.
pub fn inline_pictures(markdown: &str, base_dir: &Path) -> String {
    RE_IMAGE_LINK
        .replace_all(markdown, |caps: &regex::Captures<'_>| {
            let target = link_target(caps);
            if target.contains("://") || target.starts_with("data:") {
                return caps[0].to_string();
            }
            match std::fs::read(base_dir.join(decode_destination(target))) {
                Ok(bytes) => format!("![{}]({})", &caps[1], png_data_uri(&bytes)),
                Err(e) => {
                    warn!("Could not inline picture '{}': {}", target, e);
                    caps[0].to_string()
                }
            }
        })
        .to_string()
}

/// Write both Markdown variants from the referenced text.
fn write_markdown_pair(
    layout: &ArtifactLayout,
    referenced: &str,
    pictures: Vec<PathBuf>,
    tables: Vec<PathBuf>,
) -> Result<MarkdownExport, ConvertError> {
    let referenced_path = layout.markdown_referenced();
    std::fs::write(&referenced_path, referenced)
        .map_err(|e| ConvertError::io(&referenced_path, e))?;

    let embedded_path = layout.markdown_embedded();
    let embedded = inline_pictures(referenced, layout.dir());
    std::fs::write(&embedded_path, embedded).map_err(|e| ConvertError::io(&embedded_path, e))?;

    debug!(
        "Wrote {} and {} ({} pictures)",
        referenced_path.display(),
        embedded_path.display(),
        pictures.len()
    );
    Ok(MarkdownExport {
        embedded: embedded_path,
        referenced: referenced_path,
        pictures,
        tables,
    })
}

fn save_picture(
    layout: &ArtifactLayout,
    n: usize,
    image: &image::DynamicImage,
) -> Result<(String, PathBuf), ConvertError> {
    let name = layout.picture_name(n);
    let path = layout.dir().join(&name);
    let png = encode_png(image).map_err(|e| ConvertError::Internal(format!("PNG encode: {}", e)))?;
    std::fs::write(&path, png).map_err(|e| ConvertError::io(&path, e))?;
    Ok((name, path))
}

// ── pdfium backend ──────────────────────────────────────────────────────────

/// Extracts page text and embedded pictures with pdfium. Also accepts
/// single raster images, which become a document with one picture.
#[derive(Debug, Clone, Default)]
pub struct PdfiumParser {
    lib_path: Option<PathBuf>,
}

impl PdfiumParser {
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }
}

#[async_trait]
impl DocumentParser for PdfiumParser {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    async fn parse(
        &self,
        input: &Path,
        format: InputFormat,
        layout: &ArtifactLayout,
    ) -> Result<MarkdownExport, ConvertError> {
        let input = input.to_path_buf();
        let layout = layout.clone();
        let lib_path = self.lib_path.clone();

        tokio::task::spawn_blocking(move || match format {
            InputFormat::Pdf => parse_pdf_blocking(&input, lib_path.as_deref(), &layout),
            InputFormat::Image => parse_image_blocking(&input, &layout),
            other => Err(ConvertError::UnsupportedFormat {
                path: input.clone(),
                extension: format!("{:?}", other).to_lowercase(),
            }),
        })
        .await
        .map_err(|e| ConvertError::Internal(format!("Parse task panicked: {}", e)))?
    }
}

fn parse_pdf_blocking(
    input: &Path,
    lib_path: Option<&Path>,
    layout: &ArtifactLayout,
) -> Result<MarkdownExport, ConvertError> {
    let pdfium = bind_pdfium(lib_path)?;
    let document = pdfium
        .load_pdf_from_file(input, None)
        .map_err(|e| ConvertError::CorruptDocument {
            path: input.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let mut pages_md = Vec::new();
    let mut pictures = Vec::new();

    for (idx, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| ConvertError::CorruptDocument {
                path: input.to_path_buf(),
                detail: format!("page {}: {:?}", idx + 1, e),
            })?
            .all();
        let mut page_md = clean_page_text(&text);

        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            match image_object.get_raw_image() {
                Ok(image) => {
                    let (name, path) = save_picture(layout, pictures.len() + 1, &image)?;
                    page_md.push_str(&format!(
                        "\n![Picture {}]({})\n",
                        pictures.len() + 1,
                        encode_destination(&name)
                    ));
                    pictures.push(path);
                }
                Err(e) => warn!("Skipping unreadable picture on page {}: {:?}", idx + 1, e),
            }
        }

        pages_md.push(page_md);
    }

    info!(
        "Parsed {}: {} pages, {} pictures",
        input.display(),
        pages_md.len(),
        pictures.len()
    );

    let separator = format!("\n{}\n\n", PAGE_BREAK_MARKER);
    write_markdown_pair(layout, &pages_md.join(&separator), pictures, Vec::new())
}

fn parse_image_blocking(
    input: &Path,
    layout: &ArtifactLayout,
) -> Result<MarkdownExport, ConvertError> {
    let image = image::open(input).map_err(|e| ConvertError::CorruptDocument {
        path: input.to_path_buf(),
        detail: e.to_string(),
    })?;
    let (name, path) = save_picture(layout, 1, &image)?;
    let markdown = format!("![Picture 1]({})\n", encode_destination(&name));
    write_markdown_pair(layout, &markdown, vec![path], Vec::new())
}

// ── docling backend ─────────────────────────────────────────────────────────

/// Runs `docling --to md --to json --image-export-mode referenced`, renames
/// the pictures it exports to the `S-picture-N.png` scheme and crops table
/// images out of the JSON document's page images.
#[derive(Debug, Clone)]
pub struct DoclingParser {
    program: PathBuf,
    timeout: Duration,
}

impl DoclingParser {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DocumentParser for DoclingParser {
    fn name(&self) -> &'static str {
        "docling"
    }

    async fn parse(
        &self,
        input: &Path,
        _format: InputFormat,
        layout: &ArtifactLayout,
    ) -> Result<MarkdownExport, ConvertError> {
        let scratch = tempfile::Builder::new()
            .prefix(".docling-")
            .tempdir_in(layout.dir())
            .map_err(|e| ConvertError::io(layout.dir(), e))?;

        let args: Vec<&std::ffi::OsStr> = vec![
            "--to".as_ref(),
            "md".as_ref(),
            "--to".as_ref(),
            "json".as_ref(),
            "--image-export-mode".as_ref(),
            "referenced".as_ref(),
            "--output".as_ref(),
            scratch.path().as_os_str(),
            input.as_os_str(),
        ];
        run_tool("docling", &self.program, args, self.timeout).await?;

        let exported = find_export(scratch.path(), "md").ok_or_else(|| {
            ConvertError::MissingArtifact {
                path: scratch.path().join("*.md"),
            }
        })?;
        let raw = tokio::fs::read_to_string(&exported)
            .await
            .map_err(|e| ConvertError::io(&exported, e))?;
        let json = find_export(scratch.path(), "json");

        let scratch_dir = scratch.path().to_path_buf();
        let layout = layout.clone();
        tokio::task::spawn_blocking(move || {
            let tables = match json {
                Some(json) => match DoclingDocument::from_file(&json) {
                    Ok(doc) => export_tables(&doc, &scratch_dir, &layout)?,
                    Err(e) => {
                        warn!("Skipping table images: {}", e);
                        Vec::new()
                    }
                },
                None => {
                    warn!("docling wrote no JSON document; skipping table images");
                    Vec::new()
                }
            };
            let (referenced, pictures) = adopt_pictures(&raw, &scratch_dir, &layout)?;
            write_markdown_pair(&layout, &referenced, pictures, tables)
        })
        .await
        .map_err(|e| ConvertError::Internal(format!("Parse task panicked: {}", e)))?
    }
}

/// First file in `dir` with the given extension, by name.
fn find_export(dir: &Path, extension: &str) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == extension))
        .collect();
    found.sort();
    found.into_iter().next()
}

/// Move every locally linked picture out of `scratch` to `S-picture-N.png`
/// and rewrite its link.
fn adopt_pictures(
    markdown: &str,
    scratch: &Path,
    layout: &ArtifactLayout,
) -> Result<(String, Vec<PathBuf>), ConvertError> {
    let mut pictures = Vec::new();
    let mut adopted: HashMap<String, String> = HashMap::new();
    let mut failure = None;

    let rewritten = RE_IMAGE_LINK.replace_all(markdown, |caps: &regex::Captures<'_>| {
        let target = link_target(caps);
        if let Some(name) = adopted.get(target) {
            return format!("![{}]({})", &caps[1], encode_destination(name));
        }
        let source = scratch.join(decode_destination(target));
        if target.contains("://") || target.starts_with("data:") || !source.is_file() {
            return caps[0].to_string();
        }
        let name = layout.picture_name(pictures.len() + 1);
        let dest = layout.dir().join(&name);
        match std::fs::rename(&source, &dest).or_else(|_| std::fs::copy(&source, &dest).map(|_| ())) {
            Ok(()) => {
                pictures.push(dest);
                let link = format!("![{}]({})", &caps[1], encode_destination(&name));
                adopted.insert(target.to_string(), name);
                link
            }
            Err(e) => {
                failure.get_or_insert(ConvertError::io(&dest, e));
                caps[0].to_string()
            }
        }
    });

    match failure {
        Some(err) => Err(err),
        None => Ok((rewritten.to_string(), pictures)),
    }
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Sends every format to docling. PDFs and raster images fall back to
/// pdfium when the docling binary is missing.
pub struct RoutingParser {
    pdfium: Box<dyn DocumentParser>,
    docling: Box<dyn DocumentParser>,
}

impl RoutingParser {
    pub fn new(pdfium: Box<dyn DocumentParser>, docling: Box<dyn DocumentParser>) -> Self {
        Self { pdfium, docling }
    }

    fn has_fallback(format: InputFormat) -> bool {
        matches!(format, InputFormat::Pdf | InputFormat::Image)
    }
}

#[async_trait]
impl DocumentParser for RoutingParser {
    fn name(&self) -> &'static str {
        "auto"
    }

    async fn parse(
        &self,
        input: &Path,
        format: InputFormat,
        layout: &ArtifactLayout,
    ) -> Result<MarkdownExport, ConvertError> {
        debug!("Parsing {:?} input with {}", format, self.docling.name());
        match self.docling.parse(input, format, layout).await {
            Err(e) if e.is_tool_not_found() && Self::has_fallback(format) => {
                warn!("{}; falling back to {}", e, self.pdfium.name());
                self.pdfium.parse(input, format, layout).await
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn write_png(path: &Path) {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])))
            .save(path)
            .unwrap();
    }

    #[test]
    fn inline_pictures_replaces_local_links_only() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("doc-picture-1.png"));

        let md = "Intro\n![Picture 1](doc-picture-1.png)\n![remote](https://x.org/a.png)\n![gone](missing.png)\n";
        let out = inline_pictures(md, dir.path());

        assert!(out.contains("![Picture 1](data:image/png;base64,"));
        assert!(out.contains("![remote](https://x.org/a.png)"));
        assert!(out.contains("![gone](missing.png)"));
    }

    #[tokio::test]
    async fn image_input_becomes_single_picture() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.png");
        write_png(&input);
        let layout = ArtifactLayout::new(dir.path(), "scan");

        let export = PdfiumParser::default()
            .parse(&input, InputFormat::Image, &layout)
            .await
            .unwrap();

        assert_eq!(export.pictures, vec![dir.path().join("scan-picture-1.png")]);
        let referenced = std::fs::read_to_string(&export.referenced).unwrap();
        assert_eq!(referenced, "![Picture 1](scan-picture-1.png)\n");
        let embedded = std::fs::read_to_string(export.primary(ImageMode::Embedded)).unwrap();
        assert!(embedded.starts_with("![Picture 1](data:image/png;base64,"));
    }

    #[test]
    fn adopt_pictures_renames_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(".docling-x");
        std::fs::create_dir_all(scratch.join("report_artifacts")).unwrap();
        write_png(&scratch.join("report_artifacts/image_000000_aa.png"));
        write_png(&scratch.join("report_artifacts/image_000001_bb.png"));
        let layout = ArtifactLayout::new(dir.path(), "report");

        let md = "# T\n![Image](report_artifacts/image_000000_aa.png)\ntext\n![Image](report_artifacts/image_000001_bb.png)\n";
        let (out, pictures) = adopt_pictures(md, &scratch, &layout).unwrap();

        assert_eq!(
            out,
            "# T\n![Image](report-picture-1.png)\ntext\n![Image](report-picture-2.png)\n"
        );
        assert_eq!(pictures.len(), 2);
        assert!(dir.path().join("report-picture-2.png").is_file());
    }

    #[tokio::test]
    async fn missing_docling_is_tool_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.docx");
        std::fs::write(&input, b"PK").unwrap();
        let layout = ArtifactLayout::new(dir.path(), "a");

        let err = DoclingParser::new("/no/such/docling", Duration::from_secs(5))
            .parse(&input, InputFormat::Docx, &layout)
            .await
            .unwrap_err();
        assert!(err.is_tool_not_found());
        assert!(!layout.markdown_referenced().exists());
    }

    #[tokio::test]
    async fn spaced_stem_yields_valid_links() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Issues - 2025-02-26 (1).png");
        write_png(&input);
        let layout = ArtifactLayout::new(dir.path(), "Issues - 2025-02-26 (1)");

        let export = PdfiumParser::default()
            .parse(&input, InputFormat::Image, &layout)
            .await
            .unwrap();

        assert!(dir.path().join("Issues - 2025-02-26 (1)-picture-1.png").is_file());
        let referenced = std::fs::read_to_string(&export.referenced).unwrap();
        assert_eq!(
            referenced,
            "![Picture 1](Issues%20-%202025-02-26%20%281%29-picture-1.png)\n"
        );
        let embedded = std::fs::read_to_string(&export.embedded).unwrap();
        assert!(embedded.contains("data:image/png;base64,"), "{embedded}");

        let html = crate::pipeline::html::BuiltinRenderer::default().render_str(&referenced, "t");
        assert!(html.contains("<img"), "{html}");
    }

    #[test]
    fn inline_pictures_accepts_pointy_destinations() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("My Report-picture-1.png"));

        let md = "![a](<My Report-picture-1.png>)\n![b](My%20Report-picture-1.png \"t\")\n";
        let out = inline_pictures(md, dir.path());

        assert_eq!(out.matches("data:image/png;base64,").count(), 2, "{out}");
    }

    #[test]
    fn adopt_pictures_handles_spaced_stems() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(".docling-x");
        std::fs::create_dir_all(scratch.join("Q1 (draft)_artifacts")).unwrap();
        write_png(&scratch.join("Q1 (draft)_artifacts/image_000000_aa.png"));
        let layout = ArtifactLayout::new(dir.path(), "Q1 (draft)");

        let md = "![Image](<Q1 (draft)_artifacts/image_000000_aa.png>)\n";
        let (out, pictures) = adopt_pictures(md, &scratch, &layout).unwrap();

        assert_eq!(out, "![Image](Q1%20%28draft%29-picture-1.png)\n");
        assert_eq!(pictures, vec![dir.path().join("Q1 (draft)-picture-1.png")]);
        assert!(inline_pictures(&out, dir.path()).contains("data:image/png;base64,"));
    }

    /// Writes a shell script standing in for `docling`: it drops a Markdown
    /// file, a JSON document with one table and a page image into `--output`.
    #[cfg(unix)]
    fn fake_docling(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let fixtures = dir.join("fixtures");
        std::fs::create_dir_all(&fixtures).unwrap();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([0, 128, 0])))
            .save(fixtures.join("page.png"))
            .unwrap();
        std::fs::write(
            fixtures.join("book.json"),
            r#"{"tables": [{"prov": [{"page_no": 1, "bbox": {"l": 0.0, "t": 50.0, "r": 50.0, "b": 25.0, "coord_origin": "BOTTOMLEFT"}}]}],
                "pages": {"1": {"size": {"width": 100.0, "height": 50.0}, "image": {"uri": "book_artifacts/page_000001.png"}}}}"#,
        )
        .unwrap();

        let script = dir.join("docling");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nwhile [ $# -gt 1 ]; do\n  if [ \"$1\" = \"--output\" ]; then out=\"$2\"; fi\n  shift\ndone\n\
                 mkdir -p \"$out/book_artifacts\"\n\
                 cp '{fx}/page.png' \"$out/book_artifacts/page_000001.png\"\n\
                 cp '{fx}/book.json' \"$out/book.json\"\n\
                 printf '# Book\\n\\n| a | b |\\n|---|---|\\n| 1 | 2 |\\n' > \"$out/book.md\"\n",
                fx = fixtures.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn docling_tables_become_table_images() {
        let dir = tempfile::tempdir().unwrap();
        let docling = fake_docling(dir.path());
        let session = dir.path().join("session");
        std::fs::create_dir_all(&session).unwrap();
        let input = session.join("book.docx");
        std::fs::write(&input, b"PK").unwrap();
        let layout = ArtifactLayout::new(&session, "book");

        let export = DoclingParser::new(docling, Duration::from_secs(10))
            .parse(&input, InputFormat::Docx, &layout)
            .await
            .unwrap();

        assert_eq!(export.tables, vec![session.join("book-table-1.png")]);
        let table = image::open(&export.tables[0]).unwrap();
        assert_eq!((table.width(), table.height()), (100, 50));
        let referenced = std::fs::read_to_string(&export.referenced).unwrap();
        assert!(referenced.contains("| 1 | 2 |"));
        // The scratch directory is gone.
        let leftovers = std::fs::read_dir(&session)
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with(".docling-"));
        assert!(!leftovers);
    }

    struct Fixed {
        name: &'static str,
        missing: bool,
    }

    #[async_trait]
    impl DocumentParser for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn parse(
            &self,
            _input: &Path,
            _format: InputFormat,
            layout: &ArtifactLayout,
        ) -> Result<MarkdownExport, ConvertError> {
            if self.missing {
                return Err(ConvertError::ToolNotFound {
                    tool: self.name.to_string(),
                    program: PathBuf::from(self.name),
                });
            }
            write_markdown_pair(layout, self.name, Vec::new(), Vec::new())
        }
    }

    fn router(docling_missing: bool) -> RoutingParser {
        RoutingParser::new(
            Box::new(Fixed {
                name: "pdfium",
                missing: false,
            }),
            Box::new(Fixed {
                name: "docling",
                missing: docling_missing,
            }),
        )
    }

    #[tokio::test]
    async fn router_prefers_docling_for_every_format() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path(), "a");
        for format in [InputFormat::Pdf, InputFormat::Image, InputFormat::Xlsx] {
            let export = router(false)
                .parse(Path::new("a"), format, &layout)
                .await
                .unwrap();
            assert_eq!(std::fs::read_to_string(&export.referenced).unwrap(), "docling");
        }
    }

    #[tokio::test]
    async fn router_falls_back_to_pdfium_without_docling() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path(), "a");

        let export = router(true)
            .parse(Path::new("a.pdf"), InputFormat::Pdf, &layout)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&export.referenced).unwrap(), "pdfium");

        let err = router(true)
            .parse(Path::new("a.docx"), InputFormat::Docx, &layout)
            .await
            .unwrap_err();
        assert!(err.is_tool_not_found());
    }

    #[test]
    fn image_mode_follows_flag() {
        assert_eq!(ImageMode::from_embed_flag(true), ImageMode::Embedded);
        assert_eq!(ImageMode::from_embed_flag(false), ImageMode::Referenced);
    }
}
