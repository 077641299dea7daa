//! Serves the objects `storage::ObjectStore::signed_url` points at. Every
//! `thumbnailUrl`/`downloadUrl` this service hands out is a URL back into this
//! route — local-filesystem mode has no other way for a client to reach the
//! bytes, and GCS mode reuses the same route rather than minting real V4
//! signed URLs (see `storage::signed_url`).

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::storage::Bucket;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: u64,
    pub sig: String,
}

/// `GET /v1/blobs/:bucket/*path?expires=...&sig=...`
pub async fn serve(
    State(state): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
    Query(query): Query<SignedQuery>,
) -> Result<impl IntoResponse, AppError> {
    let bucket = Bucket::parse(&bucket).ok_or(AppError::NotFound)?;
    let bytes = state
        .store
        .get_signed(bucket, &path, query.expires, &query.sig)
        .await?;
    Ok(bytes)
}
