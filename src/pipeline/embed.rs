//! Image embeddings: one `.npy` tensor per rendered page.
//!
//! The model is an ONNX export of `microsoft/swin-base-patch4-window7-224`
//! run through ONNX Runtime (`ort`). Each PNG is preprocessed the way the
//! model was trained:
//!
//! 1. resize so the shorter side is 256 px (bilinear)
//! 2. centre-crop 224 × 224
//! 3. scale to `[0, 1]` and normalise with ImageNet mean / std
//! 4. lay out as NCHW `[1, 3, 224, 224]`
//!
//! The `last_hidden_state` output (`[1, 49, 1024]`) is written with
//! `ndarray-npy`, so the files load directly with `numpy.load`.
//!
//! ## Failure model
//!
//! Not being able to load the model fails the step. A single image that cannot
//! be read, embedded or written is logged at `error`, recorded as an
//! [`EmbedError`], and the batch moves on to the next image.

use crate::error::{ConvertError, EmbedError};
use crate::output::ArtifactLayout;
use crate::process::OutputGuard;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array4, ArrayD, IxDyn};
use once_cell::sync::OnceCell;
use ort::session::Session;
use ort::value::TensorRef;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

const RESIZE_SHORTER: u32 = 256;
const CROP: u32 = 224;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

const INPUT_NAME: &str = "pixel_values";
const OUTPUT_NAME: &str = "last_hidden_state";

/// Produces one embedding tensor per image.
///
/// Synchronous: [`generate_embeddings`] drives it on the blocking pool.
pub trait ImageEmbedder: Send + Sync {
    /// Load whatever the embedder needs. Failure here is fatal to the step.
    fn prepare(&self) -> Result<(), ConvertError>;

    /// Embed one decoded image; `path` is only used for error context.
    fn embed(&self, path: &Path, image: &DynamicImage) -> Result<ArrayD<f32>, EmbedError>;
}

/// Resize, centre-crop and normalise an image into a `[1, 3, 224, 224]` tensor.
pub fn preprocess(image: &DynamicImage) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();

    // Shorter side → 256, longer side scaled and truncated.
    let (rw, rh) = if w <= h {
        (RESIZE_SHORTER, ((h as u64 * RESIZE_SHORTER as u64) / w.max(1) as u64) as u32)
    } else {
        (((w as u64 * RESIZE_SHORTER as u64) / h.max(1) as u64) as u32, RESIZE_SHORTER)
    };
    let resized = image::imageops::resize(&rgb, rw.max(CROP), rh.max(CROP), FilterType::Triangle);

    let left = ((resized.width() - CROP) as f32 / 2.0).round() as u32;
    let top = ((resized.height() - CROP) as f32 / 2.0).round() as u32;
    let cropped = image::imageops::crop_imm(&resized, left, top, CROP, CROP).to_image();

    let mut tensor = Array4::<f32>::zeros((1, 3, CROP as usize, CROP as usize));
    for (x, y, pixel) in cropped.enumerate_pixels() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    tensor
}

/// Swin transformer embedder over ONNX Runtime. The session is loaded on the
/// first [`ImageEmbedder::prepare`] and reused for every later run.
pub struct SwinEmbedder {
    model_path: PathBuf,
    session: OnceCell<Mutex<Session>>,
}

impl SwinEmbedder {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            session: OnceCell::new(),
        }
    }

    fn load(&self) -> Result<Mutex<Session>, ConvertError> {
        if !self.model_path.is_file() {
            return Err(ConvertError::ModelLoadFailed {
                path: self.model_path.clone(),
                detail: "model file not found".into(),
            });
        }
        info!("Loading embedding model from {}", self.model_path.display());
        let session = Session::builder()
            .and_then(|b| b.commit_from_file(&self.model_path))
            .map_err(|e| ConvertError::ModelLoadFailed {
                path: self.model_path.clone(),
                detail: e.to_string(),
            })?;
        Ok(Mutex::new(session))
    }
}

impl ImageEmbedder for SwinEmbedder {
    fn prepare(&self) -> Result<(), ConvertError> {
        self.session.get_or_try_init(|| self.load()).map(|_| ())
    }

    fn embed(&self, path: &Path, image: &DynamicImage) -> Result<ArrayD<f32>, EmbedError> {
        let inference = |detail: String| EmbedError::Inference {
            path: path.to_path_buf(),
            detail,
        };
        let session = self
            .session
            .get()
            .ok_or_else(|| inference("model not loaded".into()))?;

        let input = preprocess(image);
        let tensor = TensorRef::from_array_view(input.view()).map_err(|e| inference(e.to_string()))?;

        let mut session = session.lock();
        let outputs = session
            .run(ort::inputs![INPUT_NAME => tensor])
            .map_err(|e| inference(e.to_string()))?;
        let value = outputs
            .get(OUTPUT_NAME)
            .ok_or_else(|| inference(format!("model has no '{}' output", OUTPUT_NAME)))?;
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| inference(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec()).map_err(|e| inference(e.to_string()))
    }
}

/// Outcome of an embedding batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingReport {
    /// `.npy` files written, in input order.
    pub written: Vec<PathBuf>,
    /// Images that were skipped, with the reason.
    pub failures: Vec<EmbedError>,
}

fn list_pngs(dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    let mut pngs: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| ConvertError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("png"))
        })
        .collect();
    pngs.sort();
    Ok(pngs)
}

fn embed_one(
    embedder: &dyn ImageEmbedder,
    png: &Path,
    embeddings_dir: &Path,
) -> Result<PathBuf, EmbedError> {
    let image = image::open(png).map_err(|e| EmbedError::Unreadable {
        path: png.to_path_buf(),
        detail: e.to_string(),
    })?;
    let embedding = embedder.embed(png, &image)?;

    let out = ArtifactLayout::embedding_for(embeddings_dir, png);
    let guard = OutputGuard::new(&out);
    ndarray_npy::write_npy(guard.path(), &embedding).map_err(|e| EmbedError::WriteFailed {
        path: png.to_path_buf(),
        detail: e.to_string(),
    })?;
    debug!("Embedded {} → {} {:?}", png.display(), out.display(), embedding.shape());
    Ok(guard.commit())
}

/// Embed every `*.png` in `images_dir` (sorted by name) into
/// `embeddings_dir/<png stem>.npy`. Blocking.
pub fn embed_directory(
    embedder: &dyn ImageEmbedder,
    images_dir: &Path,
    embeddings_dir: &Path,
) -> Result<EmbeddingReport, ConvertError> {
    std::fs::create_dir_all(embeddings_dir).map_err(|e| ConvertError::io(embeddings_dir, e))?;
    embedder.prepare()?;

    let pngs = list_pngs(images_dir)?;
    let mut report = EmbeddingReport::default();

    for png in &pngs {
        match embed_one(embedder, png, embeddings_dir) {
            Ok(out) => report.written.push(out),
            Err(e) => {
                error!("Skipping image: {}", e);
                report.failures.push(e);
            }
        }
    }

    info!(
        "Embedded {}/{} images ({} skipped)",
        report.written.len(),
        pngs.len(),
        report.failures.len()
    );
    Ok(report)
}

/// Async wrapper over [`embed_directory`] on the blocking pool.
pub async fn generate_embeddings(
    embedder: Arc<dyn ImageEmbedder>,
    images_dir: &Path,
    embeddings_dir: &Path,
) -> Result<EmbeddingReport, ConvertError> {
    let images_dir = images_dir.to_path_buf();
    let embeddings_dir = embeddings_dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        embed_directory(embedder.as_ref(), &images_dir, &embeddings_dir)
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("Embedding task panicked: {}", e)))?
}
