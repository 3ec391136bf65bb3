//! Route handlers.

use super::error::ApiError;
use super::AppState;
use crate::archive::bundle_to_tempfile;
use crate::convert::{run_pipeline, RunOptions};
use crate::output::{ArtifactKind, ArtifactSet};
use crate::pipeline::input::sanitize_file_name;
use crate::session::{Session, SessionId};
use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path as FsPath, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_id";

// ── Health ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ── Upload ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    embed_images: Option<String>,
}

/// What a client learns about a finished run. Paths are reduced to file
/// names; the session directory layout is not exposed.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub markdown: String,
    pub html: String,
    pub pdf: String,
    pub page_count: usize,
    pub embedding_count: usize,
    pub embedding_failures: usize,
    /// Artifact kind → download URL.
    pub downloads: BTreeMap<String, String>,
}

impl From<&ArtifactSet> for ArtifactSummary {
    fn from(set: &ArtifactSet) -> Self {
        let downloads = [
            ArtifactKind::Markdown,
            ArtifactKind::Html,
            ArtifactKind::Pdf,
            ArtifactKind::Images,
            ArtifactKind::Embeddings,
            ArtifactKind::All,
        ]
        .into_iter()
        .map(|k| (k.to_string(), format!("/download/{k}")))
        .collect();

        Self {
            markdown: file_name(&set.markdown_path),
            html: file_name(&set.html_path),
            pdf: file_name(&set.pdf_path),
            page_count: set.page_count,
            embedding_count: set.embedding_count,
            embedding_failures: set.embedding_failures.len(),
            downloads,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub session_id: SessionId,
    pub artifacts: ArtifactSummary,
}

fn file_name(path: &FsPath) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parse_flag(raw: &str) -> Result<bool, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ApiError::InvalidFlag(raw.to_string())),
    }
}

/// Upload a document, run the whole pipeline on it, and hand back a session
/// cookie for the downloads.
pub async fn process_document(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut embed_images = match query.embed_images.as_deref() {
        Some(raw) => parse_flag(raw)?,
        None => false,
    };

    let session = state.sessions().create(state.work_dir());
    let received = receive_upload(&session, &mut multipart).await;
    let (input, form_flag) = match received {
        Ok(v) => v,
        Err(e) => {
            discard_session(&state, &session).await;
            return Err(e);
        }
    };
    if let Some(flag) = form_flag {
        embed_images = flag;
    }

    tracing::info!(
        session_id = %session.id,
        file = %input.display(),
        embed_images,
        "Processing upload"
    );

    // A failed run keeps its session without artifacts; the sweeper
    // removes the directory once it expires.
    let report = run_pipeline(
        &input,
        &session.dir,
        state.toolchain(),
        RunOptions { embed_images },
    )
    .await?;

    let summary = ArtifactSummary::from(&report.artifacts);
    state
        .sessions()
        .put(&session.id, report.artifacts)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(
        session_id = %session.id,
        pages = summary.page_count,
        embeddings = summary.embedding_count,
        duration_ms = report.total_duration_ms,
        "Upload processed"
    );

    let cookie = format!(
        "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
        session.id
    );
    let body = UploadResponse {
        status: "success".to_string(),
        session_id: session.id,
        artifacts: summary,
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// Stream the `file` field into the session directory. Returns the saved
/// path and the `embed_images` form field, if one was sent.
async fn receive_upload(
    session: &Session,
    multipart: &mut Multipart,
) -> Result<(PathBuf, Option<bool>), ApiError> {
    tokio::fs::create_dir_all(&session.dir).await?;

    let mut saved = None;
    let mut flag = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidUpload(e.to_string()))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" => {
                let name = field
                    .file_name()
                    .and_then(sanitize_file_name)
                    .ok_or(ApiError::InvalidFileName)?;
                let path = session.dir.join(&name);
                let mut file = tokio::fs::File::create(&path).await?;
                let mut size = 0usize;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::InvalidUpload(e.to_string()))?
                {
                    size += chunk.len();
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                tracing::debug!(session_id = %session.id, bytes = size, "Saved upload {}", name);
                saved = Some(path);
            }
            "embed_images" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidUpload(e.to_string()))?;
                flag = Some(parse_flag(&raw)?);
            }
            other => tracing::debug!("Ignoring form field '{}'", other),
        }
    }

    let input = saved.ok_or(ApiError::MissingFile)?;
    Ok((input, flag))
}

async fn discard_session(state: &AppState, session: &Session) {
    state.sessions().remove(&session.id);
    if let Err(e) = tokio::fs::remove_dir_all(&session.dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(session_id = %session.id, "Could not remove session directory: {}", e);
        }
    }
}

// ── Download ─────────────────────────────────────────────────────────────

/// Value of the session cookie, if the request carries one.
fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// Download one artifact of the caller's session.
pub async fn download(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let kind: ArtifactKind = kind
        .parse()
        .map_err(|_| ApiError::ArtifactNotFound(kind.clone()))?;

    let token = session_cookie(&headers).ok_or(ApiError::MissingSession)?;
    let id: SessionId = token.parse().map_err(|_| ApiError::SessionNotFound)?;
    let session = state.sessions().get(&id).ok_or(ApiError::SessionNotFound)?;

    let artifacts = session
        .artifacts
        .as_ref()
        .ok_or_else(|| ApiError::artifact(kind))?;
    let path = artifacts
        .path_for(kind)
        .filter(|p| p.starts_with(&session.dir))
        .ok_or_else(|| ApiError::artifact(kind))?;

    tracing::debug!(session_id = %id, %kind, "Download requested");

    if kind.is_bundle() {
        send_bundle(kind, path, &artifacts.stem).await
    } else {
        send_file(kind, path).await
    }
}

async fn send_file(kind: ArtifactKind, path: &FsPath) -> Result<Response, ApiError> {
    let file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::artifact(kind))
        }
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata().await?.len();
    attachment(kind, &file_name(path), len, file)
}

async fn send_bundle(kind: ArtifactKind, dir: &FsPath, stem: &str) -> Result<Response, ApiError> {
    if !dir.is_dir() {
        return Err(ApiError::artifact(kind));
    }
    let tmp = bundle_to_tempfile(dir, kind.bundle_extensions()).await?;
    // The path is unlinked when `tmp` drops; the reopened handle stays readable.
    let file = tokio::fs::File::from_std(tmp.reopen()?);
    let len = file.metadata().await?.len();
    attachment(kind, &kind.bundle_name(stem), len, file)
}

fn attachment(
    kind: ArtifactKind,
    name: &str,
    len: u64,
    file: tokio::fs::File,
) -> Result<Response, ApiError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, kind.content_type())
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                name.chars()
                    .filter(|c| *c != '"' && !c.is_control())
                    .collect::<String>()
            ),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(e.to_string()))
}
