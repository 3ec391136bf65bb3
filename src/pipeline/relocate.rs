//! Final sweep: move any `.npy` file left in the images directory into the
//! embeddings directory so each bundle holds only its own file type.
//!
//! Non-`.npy` files are left where they are. A file that cannot be moved, or
//! whose name is already taken in the embeddings directory, is logged and
//! skipped; the step itself only fails if a directory is unusable.

use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Move `*.npy` from `images_dir` to `embeddings_dir`; returns the new paths.
pub async fn relocate_embeddings(
    images_dir: &Path,
    embeddings_dir: &Path,
) -> Result<Vec<PathBuf>, ConvertError> {
    tokio::fs::create_dir_all(embeddings_dir)
        .await
        .map_err(|e| ConvertError::io(embeddings_dir, e))?;

    let mut entries = tokio::fs::read_dir(images_dir)
        .await
        .map_err(|e| ConvertError::io(images_dir, e))?;

    let mut moved = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConvertError::io(images_dir, e))?
    {
        let path = entry.path();
        let is_npy = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("npy"));
        if !is_npy {
            continue;
        }

        let dest = embeddings_dir.join(entry.file_name());
        if tokio::fs::try_exists(&dest).await.unwrap_or(true) {
            warn!("Not moving {}: {} already exists", path.display(), dest.display());
            continue;
        }
        match tokio::fs::rename(&path, &dest).await {
            Ok(()) => {
                debug!("Moved {} → {}", path.display(), dest.display());
                moved.push(dest);
            }
            Err(e) => warn!("Could not move {}: {}", path.display(), e),
        }
    }

    moved.sort();
    Ok(moved)
}
