//! Input detection: decide which parser a document goes to, and make
//! client-supplied filenames safe to write inside a session directory.
//!
//! Detection is by extension. PDFs are additionally checked for the `%PDF`
//! magic bytes so a mislabelled upload fails here with a clear message rather
//! than inside pdfium.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Document formats the parse step accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Html,
    Image,
}

impl InputFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(InputFormat::Pdf),
            "docx" => Some(InputFormat::Docx),
            "pptx" => Some(InputFormat::Pptx),
            "xlsx" => Some(InputFormat::Xlsx),
            "html" | "htm" => Some(InputFormat::Html),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" => Some(InputFormat::Image),
            _ => None,
        }
    }
}

/// Detect the format of a local file, validating existence, readability and,
/// for PDFs, the magic bytes.
pub fn detect_format(path: &Path) -> Result<InputFormat, ConvertError> {
    if !path.exists() {
        return Err(ConvertError::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string();
    let format =
        InputFormat::from_extension(&extension).ok_or_else(|| ConvertError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: extension.clone(),
        })?;

    match std::fs::File::open(path) {
        Ok(mut f) => {
            if format == InputFormat::Pdf {
                let mut magic = [0u8; 4];
                if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
                    return Err(ConvertError::NotAPdf {
                        path: path.to_path_buf(),
                        magic,
                    });
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConvertError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(ConvertError::io(path, e)),
    }

    debug!("Detected {:?} input: {}", format, path.display());
    Ok(format)
}

/// Reduce a client-supplied filename to its last path component, without
/// control characters.
///
/// Both `/` and `\` count as separators. Returns `None` unless the result
/// has a non-empty stem and extension (`.pdf`, `..` and `dir/` are rejected).
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let name = cleaned.trim();

    let path = Path::new(name);
    let has_stem = path.file_stem().is_some_and(|s| !s.is_empty());
    let has_extension = path.extension().is_some_and(|e| !e.is_empty());
    if !has_stem || !has_extension {
        return None;
    }
    Some(name.to_string())
}

/// File stem used to derive every artifact name, e.g. `report` for `report.docx`.
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
        .to_string()
}
