//! Object Store — three logical buckets (`raw`, `results`, `thumb`) backed by
//! either Google Cloud Storage or the local filesystem, selected at startup
//! by whether `GCP_PROJECT_ID` is configured. Both backends implement the
//! same `object_store::ObjectStore` trait, so the rest of the service never
//! branches on which one is active.

mod signed_url;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore as _;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

pub use signed_url::SignedUrlSigner;

/// The three logical namespaces named in spec.md §4.3. Each maps to its own
/// bucket (GCS) or subdirectory (local filesystem).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Raw,
    Results,
    Thumb,
}

impl Bucket {
    fn name(self) -> &'static str {
        match self {
            Bucket::Raw => "raw",
            Bucket::Results => "results",
            Bucket::Thumb => "thumb",
        }
    }

    /// Inverse of `name`, for the blob-serving route's path segment.
    pub fn parse(s: &str) -> Option<Bucket> {
        match s {
            "raw" => Some(Bucket::Raw),
            "results" => Some(Bucket::Results),
            "thumb" => Some(Bucket::Thumb),
            _ => None,
        }
    }
}

/// Default signed-URL TTL and the hard cap imposed by the bucket lifecycle
/// policy (spec.md §4.3: "at most the bucket lifecycle TTL").
pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(60 * 60);
pub const BUCKET_LIFECYCLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct ObjectStore {
    stores: [Arc<dyn object_store::ObjectStore>; 3],
    signer: SignedUrlSigner,
    local_mode: bool,
}

impl ObjectStore {
    /// Builds the store from config: local-filesystem mode when
    /// `gcp_project_id` is unset, GCS otherwise. One underlying store per
    /// logical bucket, each rooted at `{prefix}{bucket_name}`.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let local_mode = config.local_storage_mode();

        let build_one = |bucket: Bucket| -> AppResult<Arc<dyn object_store::ObjectStore>> {
            if local_mode {
                let root = format!("./data/{}{}", config.gcs_bucket_prefix, bucket.name());
                std::fs::create_dir_all(&root).map_err(|e| {
                    AppError::StorageError(format!("failed to create local bucket dir: {e}"))
                })?;
                let fs = LocalFileSystem::new_with_prefix(&root).map_err(|e| {
                    AppError::StorageError(format!("failed to open local bucket: {e}"))
                })?;
                Ok(Arc::new(fs))
            } else {
                // `GCP_PROJECT_ID` only toggles local-vs-GCS mode (spec.md
                // §6); it is not a credential. Actual service-account
                // credentials come from the ambient environment
                // (`GOOGLE_APPLICATION_CREDENTIALS` or the GCE/GKE metadata
                // server), which `from_env` reads the same way `gcloud`/the
                // official GCS clients do.
                let bucket_name = format!("{}{}", config.gcs_bucket_prefix, bucket.name());
                let gcs = GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket_name)
                    .build()
                    .map_err(|e| AppError::StorageError(format!("failed to open GCS bucket: {e}")))?;
                Ok(Arc::new(gcs))
            }
        };

        Ok(ObjectStore {
            stores: [
                build_one(Bucket::Raw)?,
                build_one(Bucket::Results)?,
                build_one(Bucket::Thumb)?,
            ],
            signer: SignedUrlSigner::from_config(config),
            local_mode,
        })
    }

    fn store(&self, bucket: Bucket) -> &Arc<dyn object_store::ObjectStore> {
        match bucket {
            Bucket::Raw => &self.stores[0],
            Bucket::Results => &self.stores[1],
            Bucket::Thumb => &self.stores[2],
        }
    }

    pub async fn put(&self, bucket: Bucket, path: &str, bytes: Vec<u8>) -> AppResult<()> {
        self.store(bucket)
            .put(&ObjectPath::from(path), Bytes::from(bytes).into())
            .await
            .map_err(|e| AppError::StorageError(format!("put {path} failed: {e}")))?;
        Ok(())
    }

    pub async fn get(&self, bucket: Bucket, path: &str) -> AppResult<Vec<u8>> {
        let result = self
            .store(bucket)
            .get(&ObjectPath::from(path))
            .await
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => AppError::SourceMissing,
                other => AppError::StorageError(format!("get {path} failed: {other}")),
            })?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| AppError::StorageError(format!("read body for {path} failed: {e}")))?;
        Ok(bytes.to_vec())
    }

    pub async fn exists(&self, bucket: Bucket, path: &str) -> AppResult<bool> {
        match self.store(bucket).head(&ObjectPath::from(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(AppError::StorageError(format!(
                "exists check for {path} failed: {e}"
            ))),
        }
    }

    /// Idempotent: deleting a missing object is not an error.
    pub async fn delete(&self, bucket: Bucket, path: &str) -> AppResult<()> {
        match self.store(bucket).delete(&ObjectPath::from(path)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(AppError::StorageError(format!(
                "delete {path} failed: {e}"
            ))),
        }
    }

    /// Deletes every object in `results` whose path begins with `image_id`,
    /// plus `thumb/<image_id>.webp` — the full blob fallout of deleting an
    /// Image (spec.md §3 invariant 5).
    pub async fn delete_all_for_image(&self, image_id: Uuid) -> AppResult<()> {
        use futures::StreamExt;

        let prefix = ObjectPath::from(image_id.to_string());
        let mut listing = self.store(Bucket::Results).list(Some(&prefix));
        while let Some(meta) = listing.next().await {
            let meta = meta
                .map_err(|e| AppError::StorageError(format!("list results for {image_id} failed: {e}")))?;
            self.delete(Bucket::Results, meta.location.as_ref()).await?;
        }

        self.delete(Bucket::Thumb, &thumb_path(image_id)).await
    }

    /// Time-limited, read-only URL. `ttl` is clamped to
    /// `BUCKET_LIFECYCLE_TTL`.
    pub async fn signed_url(&self, bucket: Bucket, path: &str, ttl: Duration) -> AppResult<String> {
        let ttl = ttl.min(BUCKET_LIFECYCLE_TTL);
        if self.local_mode {
            Ok(self.signer.sign_local(bucket, path, ttl))
        } else {
            self.signer.sign_gcs(bucket, path, ttl).await
        }
    }

    /// Validates a signature minted by `signed_url` and, if valid, returns
    /// the object's bytes. The only thing that makes a `signed_url` actually
    /// fetchable — backs the `/v1/blobs/:bucket/*path` route.
    pub async fn get_signed(
        &self,
        bucket: Bucket,
        path: &str,
        expires_at: u64,
        sig: &str,
    ) -> AppResult<Vec<u8>> {
        self.signer.verify(bucket, path, expires_at, sig)?;
        self.get(bucket, path).await
    }
}

// ─── Path conventions (spec.md §4.3) ──────────────────────────────────────────

pub fn raw_path(owner: &str, image_id: Uuid, ext: &str) -> String {
    format!("{owner}/{image_id}.{ext}")
}

pub fn results_path(image_id: Uuid, revision_id: Uuid, ext: &str) -> String {
    format!("{image_id}_{revision_id}.{ext}")
}

pub fn thumb_path(image_id: Uuid) -> String {
    format!("{image_id}.webp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn path_conventions_match_spec() {
        let image_id = Uuid::nil();
        let rev_id = Uuid::nil();
        assert_eq!(raw_path("owner-1", image_id, "png"), format!("owner-1/{image_id}.png"));
        assert_eq!(
            results_path(image_id, rev_id, "jpg"),
            format!("{image_id}_{rev_id}.jpg")
        );
        assert_eq!(thumb_path(image_id), format!("{image_id}.webp"));
    }

    fn local_store(dir: &TempDir) -> Arc<dyn object_store::ObjectStore> {
        Arc::new(LocalFileSystem::new_with_prefix(dir.path()).expect("open local store"))
    }

    #[tokio::test]
    async fn put_get_exists_delete_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let store = ObjectStore {
            stores: [local_store(&dir), local_store(&dir), local_store(&dir)],
            signer: SignedUrlSigner::from_config(&Config {
                port: 8080,
                postgres_host: "localhost".into(),
                postgres_port: 5432,
                postgres_db: "test".into(),
                postgres_user: "test".into(),
                postgres_password: "test".into(),
                redis_url: "redis://localhost".into(),
                gcp_project_id: None,
                gcs_bucket_prefix: "pixelrev-".into(),
                cors_origin: "*".into(),
                skip_db_check: false,
            }),
            local_mode: true,
        };

        let path = "owner-1/deadbeef.png";
        assert!(!store.exists(Bucket::Raw, path).await.unwrap());

        store.put(Bucket::Raw, path, vec![1, 2, 3, 4]).await.unwrap();
        assert!(store.exists(Bucket::Raw, path).await.unwrap());
        assert_eq!(store.get(Bucket::Raw, path).await.unwrap(), vec![1, 2, 3, 4]);

        store.delete(Bucket::Raw, path).await.unwrap();
        assert!(!store.exists(Bucket::Raw, path).await.unwrap());
        // Deleting again is a no-op, not an error.
        store.delete(Bucket::Raw, path).await.unwrap();
    }

    #[tokio::test]
    async fn missing_object_is_source_missing_not_storage_error() {
        let dir = TempDir::new().expect("tempdir");
        let store = ObjectStore {
            stores: [local_store(&dir), local_store(&dir), local_store(&dir)],
            signer: SignedUrlSigner::from_config(&Config {
                port: 8080,
                postgres_host: "localhost".into(),
                postgres_port: 5432,
                postgres_db: "test".into(),
                postgres_user: "test".into(),
                postgres_password: "test".into(),
                redis_url: "redis://localhost".into(),
                gcp_project_id: None,
                gcs_bucket_prefix: "pixelrev-".into(),
                cors_origin: "*".into(),
                skip_db_check: false,
            }),
            local_mode: true,
        };

        let err = store.get(Bucket::Raw, "nope.png").await.unwrap_err();
        assert!(matches!(err, AppError::SourceMissing));
    }
}
