//! Table images from docling's JSON export.
//!
//! docling's Markdown renders tables as text. Its JSON document also records
//! where each table sits (page number and bounding box) and, with referenced
//! image export, a rendered image of every page. Each table is cropped out of
//! its page image and written as `S-table-N.png`.
//!
//! Office formats have no page images; their tables are counted but produce
//! no file.

use crate::error::ConvertError;
use crate::output::ArtifactLayout;
use crate::pipeline::encode::encode_png;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ── docling JSON model (only the fields used here) ──────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct DoclingDocument {
    #[serde(default)]
    pub tables: Vec<TableItem>,
    /// Keyed by 1-based page number, as a string.
    #[serde(default)]
    pub pages: HashMap<String, PageItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TableItem {
    #[serde(default)]
    pub prov: Vec<Provenance>,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Provenance {
    pub page_no: u32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub l: f64,
    pub t: f64,
    pub r: f64,
    pub b: f64,
    #[serde(default)]
    pub coord_origin: CoordOrigin,
}

/// docling writes PDF-style bottom-left boxes unless told otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum CoordOrigin {
    #[serde(rename = "TOPLEFT")]
    TopLeft,
    #[default]
    #[serde(rename = "BOTTOMLEFT")]
    BottomLeft,
}

#[derive(Debug, Deserialize)]
pub struct PageItem {
    pub size: PageSize,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// A file path relative to the export directory, or a `data:` URI.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    pub uri: String,
}

impl DoclingDocument {
    pub fn from_file(path: &Path) -> Result<Self, ConvertError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| ConvertError::CorruptDocument {
            path: path.to_path_buf(),
            detail: format!("docling JSON: {}", e),
        })
    }
}

impl BoundingBox {
    #[must_use]
    pub fn to_top_left_origin(&self, page_height: f64) -> Self {
        if self.coord_origin == CoordOrigin::TopLeft {
            return *self;
        }
        Self {
            l: self.l,
            t: page_height - self.t,
            r: self.r,
            b: page_height - self.b,
            coord_origin: CoordOrigin::TopLeft,
        }
    }
}

// ── Cropping ────────────────────────────────────────────────────────────────

/// Crop `bbox` (in page points) out of a page image rendered at any scale.
pub fn crop_region(page_image: &DynamicImage, page: PageSize, bbox: &BoundingBox) -> Option<DynamicImage> {
    if page.width <= 0.0 || page.height <= 0.0 {
        return None;
    }
    let scale = f64::from(page_image.width()) / page.width;
    let BoundingBox { l, t, r, b, .. } = bbox.to_top_left_origin(page.height);

    let x0 = (l.min(r) * scale).floor().max(0.0) as u32;
    let y0 = (t.min(b) * scale).floor().max(0.0) as u32;
    let x1 = ((l.max(r) * scale).ceil() as u32).min(page_image.width());
    let y1 = ((t.max(b) * scale).ceil() as u32).min(page_image.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(page_image.crop_imm(x0, y0, x1 - x0, y1 - y0))
}

fn load_image(image: &ImageRef, base_dir: &Path) -> Option<DynamicImage> {
    let loaded = match image.uri.split_once("base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => STANDARD
            .decode(data.trim())
            .map_err(|e| e.to_string())
            .and_then(|bytes| image::load_from_memory(&bytes).map_err(|e| e.to_string())),
        _ => {
            let relative = urlencoding::decode(&image.uri)
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| image.uri.clone());
            image::open(base_dir.join(relative)).map_err(|e| e.to_string())
        }
    };
    match loaded {
        Ok(img) => Some(img),
        Err(e) => {
            warn!("Could not load image '{}': {}", truncate_uri(&image.uri), e);
            None
        }
    }
}

fn truncate_uri(uri: &str) -> &str {
    match uri.char_indices().nth(64) {
        Some((idx, _)) => &uri[..idx],
        None => uri,
    }
}

/// Write one `S-table-N.png` per table that has an image, N counting every
/// table in document order. Returns the written paths.
pub fn export_tables(
    doc: &DoclingDocument,
    base_dir: &Path,
    layout: &ArtifactLayout,
) -> Result<Vec<PathBuf>, ConvertError> {
    let mut page_images: HashMap<u32, Option<DynamicImage>> = HashMap::new();
    let mut written = Vec::new();

    for (idx, table) in doc.tables.iter().enumerate() {
        let n = idx + 1;
        let image = match table.image {
            Some(ref own) => load_image(own, base_dir),
            None => table.prov.first().and_then(|prov| {
                let page = doc.pages.get(&prov.page_no.to_string())?;
                let page_image = page_images
                    .entry(prov.page_no)
                    .or_insert_with(|| page.image.as_ref().and_then(|i| load_image(i, base_dir)))
                    .as_ref()?;
                crop_region(page_image, page.size, &prov.bbox)
            }),
        };

        let Some(image) = image else {
            warn!("No image found for table {}", n);
            continue;
        };

        let path = layout.dir().join(layout.table_name(n));
        let png = encode_png(&image).map_err(|e| ConvertError::Internal(format!("PNG encode: {}", e)))?;
        std::fs::write(&path, png).map_err(|e| ConvertError::io(&path, e))?;
        debug!("Wrote {} ({}x{})", path.display(), image.width(), image.height());
        written.push(path);
    }

    if !doc.tables.is_empty() {
        info!("Exported {} of {} table images", written.len(), doc.tables.len());
    }
    Ok(written)
}
