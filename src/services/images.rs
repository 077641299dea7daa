//! Image Service — ingest, thumbnail derivation, metadata, and deletion.
//!
//! Unlike the Revision Service, none of these operations need the per-image
//! lock: ingest only ever creates a brand-new row, and the read paths
//! (`metadata`, `download_url`) tolerate observing state committed just
//! before or after a concurrent write (spec.md §5).

use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::{self, Cache};
use crate::db::{
    metadata,
    models::{Image, ImageMetadata},
};
use crate::error::{AppError, AppResult};
use crate::pipeline::{self, Mime};
use crate::storage::{self, Bucket, ObjectStore};

/// Hard ingest cap (spec.md §4.7): bounds both the `TooLarge` check and the
/// in-memory decode/encode budget the Pipeline Adapter relies on.
pub const MAX_INGEST_BYTES: usize = 10 * 1024 * 1024;

const THUMB_MAX_DIM: u32 = 400;
const THUMB_QUALITY: f32 = 80.0;

/// Buffers `data`, validates size/mime, writes the raw blob, inserts the
/// image row, then synchronously derives the thumbnail.
pub async fn ingest(
    pool: &PgPool,
    store: &ObjectStore,
    cache: &Cache,
    owner: &str,
    mime: &str,
    data: Vec<u8>,
) -> AppResult<(Image, String)> {
    if data.len() > MAX_INGEST_BYTES {
        return Err(AppError::TooLarge);
    }
    let mime_enum =
        Mime::from_str(mime).ok_or_else(|| AppError::UnsupportedMime(mime.to_string()))?;

    let id = Uuid::new_v4();
    let raw_path = storage::raw_path(owner, id, mime_enum.ext());
    store.put(Bucket::Raw, &raw_path, data.clone()).await?;

    // Store the canonical mime string, not whatever variant the client sent
    // (e.g. "image/jpg") — `images.mime` is constrained to exactly these two
    // values.
    let image = metadata::create_image(
        pool,
        id,
        owner,
        &raw_path,
        data.len() as i64,
        mime_enum.as_str(),
    )
    .await?;

    let thumbnail_url = derive_thumbnail(store, cache, id, &data).await?;

    Ok((image, thumbnail_url))
}

/// Resizes `raw_bytes` to fit inside 400x400, encodes WebP at quality 80,
/// writes it to the thumb bucket, populates the cache (best-effort), and
/// returns a signed URL.
pub async fn derive_thumbnail(
    store: &ObjectStore,
    cache: &Cache,
    image_id: Uuid,
    raw_bytes: &[u8],
) -> AppResult<String> {
    let owned = raw_bytes.to_vec();
    let thumb_bytes = tokio::task::spawn_blocking(move || {
        pipeline::derive_thumbnail(&owned, THUMB_MAX_DIM, THUMB_MAX_DIM, THUMB_QUALITY)
    })
    .await
    .map_err(|e| AppError::CodecError(format!("thumbnail task panicked: {e}")))??;
    let path = storage::thumb_path(image_id);
    store.put(Bucket::Thumb, &path, thumb_bytes.clone()).await?;

    if let Err(e) = cache.set_thumb(image_id, &thumb_bytes, cache::DEFAULT_THUMB_TTL).await {
        tracing::warn!(image_id = %image_id, error = %e, "failed to populate thumbnail cache");
    }

    store
        .signed_url(Bucket::Thumb, &path, storage::DEFAULT_SIGNED_URL_TTL)
        .await
}

pub async fn get_metadata(pool: &PgPool, store: &ObjectStore, image_id: Uuid) -> AppResult<ImageMetadata> {
    let image = metadata::get_image(pool, image_id).await?.ok_or(AppError::NotFound)?;
    let url = download_url(pool, store, image_id, None).await?;

    Ok(ImageMetadata {
        id: image.id,
        owner: image.owner,
        size_bytes: image.size_bytes,
        mime: image.mime,
        created_at: image.created_at,
        updated_at: image.updated_at,
        download_url: url,
    })
}

/// Deletes the image row (cascades revisions via FK), then every blob
/// reachable from it: the original, every results blob, and the thumbnail
/// (spec.md §3 invariant 5 / §8 testable property 4).
pub async fn delete(pool: &PgPool, store: &ObjectStore, cache: &Cache, image_id: Uuid) -> AppResult<()> {
    let image = metadata::get_image(pool, image_id).await?.ok_or(AppError::NotFound)?;

    metadata::delete_image(pool, image_id).await?;

    store.delete(Bucket::Raw, &image.original_path).await?;
    store.delete_all_for_image(image_id).await?;

    if let Err(e) = cache.invalidate_thumb(image_id).await {
        tracing::warn!(image_id = %image_id, error = %e, "failed to invalidate thumbnail cache on delete");
    }

    Ok(())
}

/// Signed URL for either a specific revision's result blob, the latest
/// active revision, or (with no revisions yet) the original.
pub async fn download_url(
    pool: &PgPool,
    store: &ObjectStore,
    image_id: Uuid,
    revision_id: Option<Uuid>,
) -> AppResult<String> {
    let image = metadata::get_image(pool, image_id).await?.ok_or(AppError::NotFound)?;

    let (bucket, path) = match revision_id {
        Some(rid) => {
            let revision = metadata::get_revision(pool, rid).await?.ok_or(AppError::NotFound)?;
            if revision.image_id != image_id {
                return Err(AppError::NotFound);
            }
            (Bucket::Results, revision.storage_path)
        }
        None => match metadata::get_latest_revision(pool, image_id).await? {
            Some(revision) => (Bucket::Results, revision.storage_path),
            None => (Bucket::Raw, image.original_path),
        },
    };

    store.signed_url(bucket, &path, storage::DEFAULT_SIGNED_URL_TTL).await
}
