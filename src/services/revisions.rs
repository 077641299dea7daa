//! Revision Service — the core state machine. `apply_op` serializes
//! concurrent transform requests per image, reads the correct source bytes,
//! drives the Pipeline Adapter, persists a new revision, and invalidates the
//! thumbnail cache. `undo` walks one step back by tombstoning the current
//! latest revision. `get_history` returns the active chain.

use futures::future::BoxFuture;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::Cache;
use crate::db::{
    metadata,
    models::{Revision, RevisionRow},
};
use crate::error::{AppError, AppResult};
use crate::operation::Operation;
use crate::storage::{self, Bucket, ObjectStore};

/// Applies `op` to the latest revision of `image_id` (or the original, if
/// none exists yet), producing a new committed revision.
///
/// All of steps 1-8 below run inside `with_image_lock`, which is the total
/// order over successful calls for a given image (spec.md §4.6).
pub async fn apply_op(
    pool: &PgPool,
    store: &ObjectStore,
    cache: &Cache,
    image_id: Uuid,
    op: Operation,
) -> AppResult<Revision> {
    if !op.validate() {
        return Err(AppError::ValidationError(format!(
            "invalid parameters for {:?}",
            op.op_type()
        )));
    }

    let row = metadata::with_image_lock(pool, image_id, move |conn| {
        Box::pin(apply_op_locked(conn, store, image_id, op)) as BoxFuture<'_, AppResult<RevisionRow>>
    })
    .await?;

    // Step 9: best-effort; a cache miss on next read is acceptable, the
    // committed revision above is the source of truth.
    if let Err(e) = cache.invalidate_thumb(image_id).await {
        tracing::warn!(image_id = %image_id, error = %e, "failed to invalidate thumbnail cache after apply_op");
    }

    Ok(row.into())
}

async fn apply_op_locked(
    conn: &mut sqlx::PgConnection,
    store: &ObjectStore,
    image_id: Uuid,
    op: Operation,
) -> AppResult<RevisionRow> {
    // Step 1: re-read the image row.
    let image = metadata::get_image(&mut *conn, image_id)
        .await?
        .ok_or(AppError::NotFound)?;

    // Step 2: latest active revision, if any.
    let parent = metadata::get_latest_revision(&mut *conn, image_id).await?;

    // Step 3: select source.
    let (source_bucket, source_path) = match &parent {
        Some(p) => (Bucket::Results, p.storage_path.clone()),
        None => (Bucket::Raw, image.original_path.clone()),
    };
    let source_bytes = store.get(source_bucket, &source_path).await?;

    // Step 4: drive the Pipeline Adapter. Single decode, single encode.
    // CPU-bound, so it runs on the blocking pool rather than tying up the
    // async executor while the transaction is held open.
    let output = tokio::task::spawn_blocking(move || op.apply(&source_bytes))
        .await
        .map_err(|e| AppError::CodecError(format!("image processing task panicked: {e}")))??;

    // Steps 5-6: output mime is already resolved by the adapter; mint the
    // revision id and compute its deterministic results path.
    let revision_id = Uuid::new_v4();
    let results_path = storage::results_path(image_id, revision_id, output.mime.ext());

    // Step 7: write the blob. A failure here leaves no metadata trace.
    store.put(Bucket::Results, &results_path, output.bytes).await?;

    // Step 8: insert the revision row, committed by `with_image_lock` on
    // successful return. A crash between this line and the commit leaves an
    // orphaned but harmless blob, swept by the bucket's lifecycle policy.
    metadata::create_revision(
        conn,
        revision_id,
        image_id,
        parent.as_ref().map(|p| p.id),
        &op,
        &results_path,
    )
    .await
}

/// Walks one step back in the history: tombstones the current latest
/// revision and returns its parent as the now-active revision. Does not
/// delete the tombstoned row or its blob — both remain reachable by id, just
/// excluded from "latest"/"history" queries.
pub async fn undo(pool: &PgPool, cache: &Cache, image_id: Uuid) -> AppResult<Revision> {
    let row = metadata::with_image_lock(pool, image_id, move |conn| {
        Box::pin(undo_locked(conn, image_id)) as BoxFuture<'_, AppResult<RevisionRow>>
    })
    .await?;

    if let Err(e) = cache.invalidate_thumb(image_id).await {
        tracing::warn!(image_id = %image_id, error = %e, "failed to invalidate thumbnail cache after undo");
    }

    Ok(row.into())
}

async fn undo_locked(conn: &mut sqlx::PgConnection, image_id: Uuid) -> AppResult<RevisionRow> {
    let current = metadata::get_latest_revision(&mut *conn, image_id)
        .await?
        .ok_or(AppError::NothingToUndo)?;

    let parent_id = current.parent_id.ok_or(AppError::CannotUndoOriginal)?;

    let parent = metadata::get_revision(&mut *conn, parent_id)
        .await?
        .ok_or_else(|| AppError::Corrupted(format!("revision {parent_id} referenced but missing")))?;

    metadata::tombstone_revision(conn, current.id).await?;

    Ok(parent)
}

/// All non-tombstoned revisions of `image_id`, oldest first. A read-only
/// path: does not acquire the per-image lock (spec.md §5).
pub async fn get_history(pool: &PgPool, image_id: Uuid) -> AppResult<Vec<Revision>> {
    let rows = metadata::get_history(pool, image_id).await?;
    Ok(rows.into_iter().map(Revision::from).collect())
}
