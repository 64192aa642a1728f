//! `POST /upload`: multipart slide upload.
//!
//! The `file` part is streamed into a temporary file inside the slide
//! directory and renamed onto its sanitized name only after the catalog row
//! is written, so a failed upload leaves neither a partial slide nor a
//! dangling temporary file behind.

use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::handlers::{ApiError, AppState};
use super::metadata::optional_id;
use crate::slide::SlideSource;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub slide_id: i64,
}

/// Handle slide uploads.
///
/// # Form fields
///
/// - `file`: the slide file (required)
/// - `folder_id`: folder to file the slide under (optional integer)
///
/// # Response
///
/// - `200 OK`: `{"status": "ok", "slide_id": <catalog id>}`
/// - `400 Bad Request`: no file, unusable file name, non-integer `folder_id`
/// - `404 Not Found`: `folder_id` names no folder
/// - `413 Payload Too Large`: body exceeds the upload limit
///
/// A file with the same sanitized name replaces the previous one; its
/// pooled handle and cached tiles are discarded.
pub async fn upload_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::InvalidInput(e.body_text()))?;

    let mut upload: Option<(String, NamedTempFile, u64)> = None;
    let mut folder_field: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let original = field.file_name().unwrap_or_default().to_string();
                let (temp, size) = spool(&state.slide_dir, &mut field).await?;
                upload = Some((original, temp, size));
            }
            Some("folder_id") => {
                folder_field = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (original, temp, size) =
        upload.ok_or_else(|| ApiError::InvalidInput("No file".to_string()))?;
    let filename = secure_filename(&original);
    if filename.is_empty() {
        return Err(ApiError::InvalidInput(format!(
            "Unusable file name: {:?}",
            original
        )));
    }
    let folder_id = optional_id("folder_id", folder_field.as_deref())?;

    let slide_id = state.store.insert_slide(&filename, folder_id).await?;

    let target = state.slide_dir.join(&filename);
    tokio::task::spawn_blocking(move || temp.persist(target))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("Failed to store upload: {}", e.error)))?;

    state.tile_service.invalidate_slide(&filename).await;

    info!(
        filename = %filename,
        slide_id,
        folder_id = ?folder_id,
        bytes = size,
        "Slide uploaded"
    );
    Ok(Json(UploadResponse {
        status: "ok",
        slide_id,
    }))
}

/// Stream a multipart field into a fresh temporary file in `dir`.
async fn spool(dir: &Path, field: &mut Field<'_>) -> Result<(NamedTempFile, u64), ApiError> {
    let dir: PathBuf = dir.to_path_buf();
    let temp = tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dir)?;
        tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(".tmp")
            .tempfile_in(&dir)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(io_error)?;

    let mut file = tokio::fs::File::from_std(temp.reopen().map_err(io_error)?);
    let mut size = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        file.write_all(&chunk).await.map_err(io_error)?;
        size += chunk.len() as u64;
    }
    file.flush().await.map_err(io_error)?;

    Ok((temp, size))
}

fn io_error(err: std::io::Error) -> ApiError {
    ApiError::Internal(format!("Upload I/O error: {}", err))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::InvalidInput(err.body_text())
    }
}

/// Reduce an uploaded file name to a safe, flat ASCII name.
///
/// Path separators become spaces, whitespace runs become `_`, only
/// `[A-Za-z0-9_.-]` survives, and leading or trailing `.`/`_` are stripped.
/// The result may be empty.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}
