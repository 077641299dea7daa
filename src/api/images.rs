//! HTTP handlers for the `/v1/images` resource (spec.md §6).
//!
//! Thin extract-and-delegate handlers, same split as the teacher's
//! `api::media`/`services::media`: request parsing and status codes live
//! here, all business logic lives in `services::images`/`services::revisions`.

use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::models::ImageMetadata;
use crate::error::{AppError, AppResult};
use crate::operation::{OpParams, Operation};
use crate::services::{images as images_svc, revisions as revisions_svc};
use crate::AppState;

// ─── Shared request/response shapes ───────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    #[serde(rename = "imageId")]
    pub image_id: Uuid,
    #[serde(rename = "thumbnailUrl")]
    pub thumbnail_url: String,
    pub size: i64,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
pub struct OperationResponse {
    #[serde(rename = "revisionId")]
    pub revision_id: Uuid,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
    pub operation: &'static str,
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    #[serde(rename = "imageId")]
    pub image_id: Uuid,
    pub revisions: Vec<RevisionView>,
}

#[derive(Debug, Serialize)]
pub struct RevisionView {
    pub id: Uuid,
    #[serde(rename = "parentId")]
    pub parent_id: Option<Uuid>,
    pub operation: &'static str,
    pub params: Value,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::db::models::Revision> for RevisionView {
    fn from(r: crate::db::models::Revision) -> Self {
        RevisionView {
            id: r.id,
            parent_id: r.parent_id,
            operation: op_name(&r.op_params),
            params: serde_json::to_value(r.op_params).expect("OpParams always serializes"),
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RotateRequest {
    pub degrees: u16,
}

#[derive(Debug, Deserialize)]
pub struct FlipRequest {
    pub horizontal: bool,
    pub vertical: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CompressRequest {
    pub quality: u8,
}

fn op_name(params: &OpParams) -> &'static str {
    match params {
        OpParams::Rotate { .. } => "rotate",
        OpParams::Flip { .. } => "flip",
        OpParams::Resize { .. } => "resize",
        OpParams::Compress { .. } => "compress",
    }
}

/// `x-user-id` is optional; a random identifier is assigned when absent
/// (spec.md §6). The core never interprets this value — it's stored
/// opaquely as `images.owner`.
fn owner_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

// ─── Handlers ──────────────────────────────────────────────────────────────────

/// `POST /v1/images` — multipart upload, field `image`.
pub async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<IngestResponse>)> {
    let owner = owner_from_headers(&headers);

    let mut data: Option<Vec<u8>> = None;
    let mut mime: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(e.to_string()))?
    {
        if field.name() == Some("image") {
            mime = field.content_type().map(str::to_string);
            data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::ValidationError(e.to_string()))?
                    .to_vec(),
            );
        }
    }

    let data = data.ok_or_else(|| AppError::ValidationError("missing 'image' field".into()))?;
    let mime = mime.ok_or_else(|| AppError::ValidationError("missing content-type on 'image' field".into()))?;

    let (image, thumbnail_url) =
        images_svc::ingest(&state.db, &state.store, &state.cache, &owner, &mime, data).await?;

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            image_id: image.id,
            thumbnail_url,
            size: image.size_bytes,
            mime_type: image.mime,
        }),
    ))
}

/// `GET /v1/images/:id`
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ImageMetadata>> {
    let metadata = images_svc::get_metadata(&state.db, &state.store, id).await?;
    Ok(Json(metadata))
}

/// `DELETE /v1/images/:id`
pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<StatusCode> {
    images_svc::delete(&state.db, &state.store, &state.cache, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /v1/images/:id/history`
pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<HistoryResponse>> {
    // `get_history` on an unknown image quietly returns an empty list; check
    // existence explicitly so the route's documented 404 actually fires.
    images_svc::get_metadata(&state.db, &state.store, id).await?;

    let revisions = revisions_svc::get_history(&state.db, id).await?;
    Ok(Json(HistoryResponse {
        image_id: id,
        revisions: revisions.into_iter().map(RevisionView::from).collect(),
    }))
}

/// `POST /v1/images/:id/undo`
pub async fn undo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RevisionView>> {
    let revision = revisions_svc::undo(&state.db, &state.cache, id).await?;
    Ok(Json(RevisionView::from(revision)))
}

pub async fn rotate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RotateRequest>,
) -> AppResult<(StatusCode, Json<OperationResponse>)> {
    apply(&state, id, OpParams::Rotate { degrees: req.degrees }).await
}

pub async fn flip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FlipRequest>,
) -> AppResult<(StatusCode, Json<OperationResponse>)> {
    apply(
        &state,
        id,
        OpParams::Flip {
            horizontal: req.horizontal,
            vertical: req.vertical,
        },
    )
    .await
}

pub async fn resize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResizeRequest>,
) -> AppResult<(StatusCode, Json<OperationResponse>)> {
    apply(
        &state,
        id,
        OpParams::Resize {
            width: req.width,
            height: req.height,
        },
    )
    .await
}

pub async fn compress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompressRequest>,
) -> AppResult<(StatusCode, Json<OperationResponse>)> {
    apply(&state, id, OpParams::Compress { quality: req.quality }).await
}

async fn apply(
    state: &AppState,
    image_id: Uuid,
    params: OpParams,
) -> AppResult<(StatusCode, Json<OperationResponse>)> {
    let op = Operation(params);
    let revision = revisions_svc::apply_op(&state.db, &state.store, &state.cache, image_id, op).await?;
    let download_url =
        images_svc::download_url(&state.db, &state.store, image_id, Some(revision.id)).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(OperationResponse {
            revision_id: revision.id,
            download_url,
            operation: op_name(&revision.op_params),
            params: serde_json::to_value(revision.op_params).expect("OpParams always serializes"),
        }),
    ))
}
