//! ZIP bundling of session directories for download.
//!
//! Archives are ZIP64-capable and deflate-compressed. Only regular files with
//! an allow-listed extension are included; entry names are relative to the
//! bundled directory, `/`-separated and sorted, so the same directory always
//! yields the same entry order.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Every extension a bundle may contain.
pub const ALLOWED_EXTENSIONS: &[&str] = &["md", "html", "pdf", "png", "npy"];

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Directory to bundle does not exist: '{0}'")]
    MissingDirectory(PathBuf),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Bundle task panicked: {0}")]
    Join(String),
}

fn has_allowed_extension(path: &Path, allow: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| allow.contains(&e.as_str()))
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true)
}

/// Allow-listed files under `dir`, recursively, as (entry name, path) pairs
/// sorted by entry name.
fn collect_entries(dir: &Path, allow: &[&str]) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| ArchiveError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() || !has_allowed_extension(entry.path(), allow) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push((name, entry.into_path()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Write a ZIP of the allow-listed files under `dir` to `dest`.
/// Returns the number of entries written. Blocking.
pub fn bundle_directory(dir: &Path, dest: &Path, allow: &[&str]) -> Result<usize, ArchiveError> {
    if !dir.is_dir() {
        return Err(ArchiveError::MissingDirectory(dir.to_path_buf()));
    }
    let entries = collect_entries(dir, allow)?;

    let out = File::create(dest).map_err(|source| ArchiveError::Io {
        path: dest.to_path_buf(),
        source,
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(out));

    for (name, path) in &entries {
        zip.start_file(name.as_str(), entry_options())?;
        let mut file = File::open(path).map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;
        io::copy(&mut file, &mut zip).map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;
    }
    zip.finish()?;

    debug!("Bundled {} files from {} into {}", entries.len(), dir.display(), dest.display());
    Ok(entries.len())
}

/// Bundle `dir` into a fresh temporary file on the blocking pool. The file is
/// deleted when the returned handle is dropped.
pub async fn bundle_to_tempfile(
    dir: &Path,
    allow: &'static [&'static str],
) -> Result<NamedTempFile, ArchiveError> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let tmp = tempfile::Builder::new()
            .prefix("bundle-")
            .suffix(".zip")
            .tempfile()
            .map_err(|source| ArchiveError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        bundle_directory(&dir, tmp.path(), allow)?;
        Ok(tmp)
    })
    .await
    .map_err(|e| ArchiveError::Join(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entry_names(zip_path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn only_allow_listed_files_are_bundled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/b-2.png"), b"png2").unwrap();
        std::fs::write(dir.path().join("images/b-1.png"), b"png1").unwrap();
        std::fs::write(dir.path().join("images/stray.npy"), b"npy").unwrap();
        std::fs::write(dir.path().join("b.docx"), b"PK").unwrap();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("images.zip");

        let n = bundle_directory(&dir.path().join("images"), &dest, &["png"]).unwrap();

        assert_eq!(n, 2);
        assert_eq!(entry_names(&dest), vec!["b-1.png", "b-2.png"]);
    }

    #[test]
    fn nested_entries_use_forward_slashes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("embeddings")).unwrap();
        std::fs::write(dir.path().join("a-with-image-refs.md"), b"# a").unwrap();
        std::fs::write(dir.path().join("embeddings/a-rendered-1.npy"), b"npy").unwrap();
        std::fs::write(dir.path().join("a.docx"), b"PK").unwrap();
        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("all.zip");

        bundle_directory(dir.path(), &dest, ALLOWED_EXTENSIONS).unwrap();

        assert_eq!(
            entry_names(&dest),
            vec!["a-with-image-refs.md", "embeddings/a-rendered-1.npy"]
        );
        let mut archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let mut content = String::new();
        archive
            .by_name("a-with-image-refs.md")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "# a");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let out = tempfile::tempdir().unwrap();
        let err = bundle_directory(Path::new("/no/such/dir"), &out.path().join("x.zip"), &["png"])
            .unwrap_err();
        assert!(matches!(err, ArchiveError::MissingDirectory(_)));
    }

    #[tokio::test]
    async fn empty_directory_gives_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = bundle_to_tempfile(dir.path(), &["npy"]).await.unwrap();
        assert!(entry_names(tmp.path()).is_empty());
    }
}
