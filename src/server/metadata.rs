//! Folder, slide listing and report handlers.
//!
//! # Endpoints
//!
//! - `GET  /folders` - List folders with slide counts
//! - `POST /folders` - Create a folder
//! - `PUT  /folders/{id}` - Rename a folder
//! - `GET  /slides?folder_id=` - List uploaded slides
//! - `GET  /report/{slide_id}` - List a slide's reports
//! - `POST /report/{slide_id}` - Create or update a report

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};

use super::handlers::{ApiError, AppState};
use crate::slide::SlideSource;
use crate::store::{Folder, Report, ReportInput, Slide};

#[derive(Debug, Deserialize)]
pub struct FolderInput {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SlidesQueryParams {
    /// Folder to filter by; empty means no filter
    #[serde(default)]
    pub folder_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SavedResponse {
    pub status: &'static str,
    pub id: i64,
}

/// JSON body or `400 invalid_input`, never axum's default 415/422.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::InvalidInput(rejection.body_text()))
}

/// Integer id path segment; anything else names no resource.
fn id_segment(id: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    id.map(|Path(id)| id)
        .map_err(|rejection| ApiError::NotFound(rejection.body_text()))
}

/// Optional integer form/query value: absent or empty is `None`.
pub(crate) fn optional_id(field: &str, value: Option<&str>) -> Result<Option<i64>, ApiError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::InvalidInput(format!("{} must be an integer, got {:?}", field, raw))),
    }
}

pub async fn list_folders_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<Folder>>, ApiError> {
    Ok(Json(state.store.list_folders().await?))
}

/// `POST /folders` with `{"name": ...}`, returns `{"id": ...}`.
pub async fn create_folder_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    body: Result<Json<FolderInput>, JsonRejection>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let input = json_body(body)?;
    let id = state.store.create_folder(&input.name).await?;
    Ok(Json(CreatedResponse { id }))
}

/// `PUT /folders/{id}` with `{"name": ...}`, returns `{"status": "updated"}`.
pub async fn rename_folder_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<FolderInput>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = id_segment(id)?;
    let input = json_body(body)?;
    state.store.rename_folder(id, &input.name).await?;
    Ok(Json(StatusResponse { status: "updated" }))
}

pub async fn list_slides_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Query(query): Query<SlidesQueryParams>,
) -> Result<Json<Vec<Slide>>, ApiError> {
    let folder_id = optional_id("folder_id", query.folder_id.as_deref())?;
    Ok(Json(state.store.list_slides(folder_id).await?))
}

pub async fn list_reports_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    slide_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<Report>>, ApiError> {
    let slide_id = id_segment(slide_id)?;
    Ok(Json(state.store.list_reports(slide_id).await?))
}

/// `POST /report/{slide_id}` with `{"id"?, "title", "content"}`, returns
/// `{"status": "ok", "id": ...}`.
pub async fn save_report_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    slide_id: Result<Path<i64>, PathRejection>,
    body: Result<Json<ReportInput>, JsonRejection>,
) -> Result<Json<SavedResponse>, ApiError> {
    let slide_id = id_segment(slide_id)?;
    let input = json_body(body)?;
    let id = state.store.save_report(slide_id, input).await?;
    Ok(Json(SavedResponse { status: "ok", id }))
}
