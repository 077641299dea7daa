//! Metadata Store — the Images and Revisions relations, plus the per-image
//! advisory lock that serializes the transform pipeline.
//!
//! Functions are generic over `sqlx::Executor` so the same query works
//! whether called against the pool directly (read paths) or against the
//! locked transaction handed to `with_image_lock`'s closure (write paths).

use chrono::Utc;
use futures::future::BoxFuture;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::operation::Operation;

use super::models::{Image, RevisionRow};

const IMAGE_COLS: &str = "id, owner, original_path, size_bytes, mime, created_at, updated_at";
const REVISION_COLS: &str =
    "id, image_id, parent_id, op_type, op_params, storage_path, created_at, tombstoned_at";

pub async fn create_image(
    pool: &PgPool,
    id: Uuid,
    owner: &str,
    original_path: &str,
    size_bytes: i64,
    mime: &str,
) -> AppResult<Image> {
    sqlx::query(
        "INSERT INTO images (id, owner, original_path, size_bytes, mime) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(owner)
    .bind(original_path)
    .bind(size_bytes)
    .bind(mime)
    .execute(pool)
    .await?;

    get_image(pool, id)
        .await?
        .ok_or(AppError::Corrupted("image vanished immediately after insert".into()))
}

pub async fn get_image<'e, E>(executor: E, id: Uuid) -> AppResult<Option<Image>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, Image>(&format!(
        "SELECT {IMAGE_COLS} FROM images WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

/// Deletes the image row. Revisions cascade via the `revisions.image_id`
/// foreign key's `ON DELETE CASCADE`. Blob cleanup is the caller's
/// responsibility (`ObjectStore::delete_all_for_image` plus the raw blob) —
/// the metadata store only owns the rows.
pub async fn delete_image(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM images WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub async fn create_revision(
    conn: &mut sqlx::PgConnection,
    id: Uuid,
    image_id: Uuid,
    parent_id: Option<Uuid>,
    op: &Operation,
    storage_path: &str,
) -> AppResult<RevisionRow> {
    sqlx::query(
        "INSERT INTO revisions (id, image_id, parent_id, op_type, op_params, storage_path) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(image_id)
    .bind(parent_id)
    .bind(op.op_type().tag() as i16)
    .bind(op.to_params())
    .bind(storage_path)
    .execute(&mut *conn)
    .await?;

    get_revision(&mut *conn, id)
        .await?
        .ok_or(AppError::Corrupted("revision vanished immediately after insert".into()))
}

pub async fn get_revision<'e, E>(executor: E, id: Uuid) -> AppResult<Option<RevisionRow>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, RevisionRow>(&format!(
        "SELECT {REVISION_COLS} FROM revisions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

/// The non-tombstoned revision of `image_id` with the greatest `created_at`,
/// or `None` when the image has no active revisions yet.
pub async fn get_latest_revision<'e, E>(executor: E, image_id: Uuid) -> AppResult<Option<RevisionRow>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, RevisionRow>(&format!(
        "SELECT {REVISION_COLS} FROM revisions \
         WHERE image_id = $1 AND tombstoned_at IS NULL \
         ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(image_id)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

/// All non-tombstoned revisions of `image_id`, oldest first.
pub async fn get_history(pool: &PgPool, image_id: Uuid) -> AppResult<Vec<RevisionRow>> {
    let rows = sqlx::query_as::<_, RevisionRow>(&format!(
        "SELECT {REVISION_COLS} FROM revisions \
         WHERE image_id = $1 AND tombstoned_at IS NULL \
         ORDER BY created_at ASC"
    ))
    .bind(image_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Marks a revision tombstoned so `get_latest_revision`/`get_history` skip
/// it — the resolution spec.md §4.6/§9 chose for undo's ambiguity.
pub async fn tombstone_revision(conn: &mut sqlx::PgConnection, id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE revisions SET tombstoned_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// The serialization point of the transform pipeline: acquires an exclusive
/// row lock on `images` for `image_id` inside a transaction, runs `f`, and
/// commits on success or rolls back on failure. This is a `SELECT ... FOR
/// UPDATE` rather than an in-process lock map, so it serializes correctly
/// across horizontally scaled workers (spec.md §9).
///
/// Locking a row that does not exist is a no-op (no rows to lock); `f` is
/// still responsible for re-reading the image and failing `NotFound` per the
/// `apply_op`/`undo` contracts.
pub async fn with_image_lock<T, F>(pool: &PgPool, image_id: Uuid, f: F) -> AppResult<T>
where
    F: for<'c> FnOnce(&'c mut sqlx::PgConnection) -> BoxFuture<'c, AppResult<T>>,
{
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT id FROM images WHERE id = $1 FOR UPDATE")
        .bind(image_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(lock_error)?;

    match f(&mut tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            let _ = tx.rollback().await;
            Err(e)
        }
    }
}

fn lock_error(e: sqlx::Error) -> AppError {
    match &e {
        // 55P03 = lock_not_available (statement_timeout while waiting for
        // the row lock); surfaced as the spec's ConcurrencyError rather than
        // a generic 5xx.
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("55P03") => {
            AppError::ConcurrencyError
        }
        _ => AppError::MetadataError(e),
    }
}
