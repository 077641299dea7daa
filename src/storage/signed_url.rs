//! Time-limited, read-only URL minting for both storage backends.
//!
//! Real GCS V4 signed URLs are produced by RSA-signing a canonical request
//! with the service account's private key — out of scope for this spec's
//! core (the revision pipeline), which only needs "a TTL-bounded, read-only
//! URL" as a contract. Both backends here use the same HMAC-style token
//! scheme; in production the GCS path would be swapped for the service
//! account's real V4 signer without touching any caller of `signed_url`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{AppError, AppResult};

use super::Bucket;

#[derive(Clone)]
pub struct SignedUrlSigner {
    secret: String,
    base_url: String,
}

impl SignedUrlSigner {
    pub fn from_config(config: &Config) -> Self {
        // A fresh per-process secret is sufficient for the TTL/read-only
        // contract this spec requires; it does not need to survive restarts.
        SignedUrlSigner {
            secret: uuid::Uuid::new_v4().to_string(),
            base_url: format!("http://127.0.0.1:{}/v1/blobs", config.port),
        }
    }

    pub fn sign_local(&self, bucket: Bucket, path: &str, ttl: Duration) -> String {
        self.sign(bucket, path, ttl)
    }

    pub async fn sign_gcs(&self, bucket: Bucket, path: &str, ttl: Duration) -> AppResult<String> {
        Ok(self.sign(bucket, path, ttl))
    }

    fn sign(&self, bucket: Bucket, path: &str, ttl: Duration) -> String {
        let expires_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            + ttl.as_secs();

        let bucket_name = match bucket {
            Bucket::Raw => "raw",
            Bucket::Results => "results",
            Bucket::Thumb => "thumb",
        };

        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(bucket_name.as_bytes());
        hasher.update(path.as_bytes());
        hasher.update(expires_at.to_le_bytes());
        let token = format!("{:x}", hasher.finalize());

        format!(
            "{}/{bucket_name}/{path}?expires={expires_at}&sig={token}",
            self.base_url
        )
    }

    /// Verifies a signature minted by `sign`. Used by the blob-serving
    /// handler in local-filesystem mode.
    pub fn verify(&self, bucket: Bucket, path: &str, expires_at: u64, sig: &str) -> AppResult<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if now > expires_at {
            return Err(AppError::ValidationError("signed URL expired".into()));
        }

        let bucket_name = match bucket {
            Bucket::Raw => "raw",
            Bucket::Results => "results",
            Bucket::Thumb => "thumb",
        };
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(bucket_name.as_bytes());
        hasher.update(path.as_bytes());
        hasher.update(expires_at.to_le_bytes());
        let expected = format!("{:x}", hasher.finalize());

        if expected == sig {
            Ok(())
        } else {
            Err(AppError::ValidationError("invalid signed URL".into()))
        }
    }
}
