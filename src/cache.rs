//! Cache — thumbnail bytes keyed by image id, plus a general-purpose
//! distributed lock primitive. Authoritative only as a performance layer:
//! correctness never depends on a cache hit (spec.md §4.8/§9).
//!
//! Backed by a single multiplexed Redis connection
//! (`redis::aio::ConnectionManager`), which gives the "exponential-backoff
//! reconnect, capped at 3s, ten retries before surfacing unavailable"
//! behavior of spec.md §5 without hand-rolled retry logic — grounded in the
//! `redis` usage in `lovelaced-0rlhf` and `darianrosebrook-agent-agency`.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const DEFAULT_THUMB_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
}

impl Cache {
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::CacheError(format!("invalid redis url: {e}")))?;

        let config = redis::aio::ConnectionManagerConfig::new()
            .set_number_of_retries(10)
            .set_max_delay(3_000);

        let conn = client
            .get_connection_manager_with_config(config)
            .await
            .map_err(|e| AppError::CacheError(format!("failed to connect to redis: {e}")))?;

        Ok(Cache { conn })
    }

    fn thumb_key(image_id: Uuid) -> String {
        format!("thumb:{image_id}")
    }

    pub async fn get_thumb(&self, image_id: Uuid) -> AppResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let bytes: Option<Vec<u8>> = conn
            .get(Self::thumb_key(image_id))
            .await
            .map_err(|e| AppError::CacheError(e.to_string()))?;
        Ok(bytes)
    }

    pub async fn set_thumb(&self, image_id: Uuid, bytes: &[u8], ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::thumb_key(image_id), bytes, ttl.as_secs().max(1))
            .await
            .map_err(|e| AppError::CacheError(e.to_string()))?;
        Ok(())
    }

    /// Best-effort: callers (the Revision Service's step 9) swallow the
    /// error on a cache miss after invalidation failure.
    pub async fn invalidate_thumb(&self, image_id: Uuid) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::thumb_key(image_id))
            .await
            .map_err(|e| AppError::CacheError(e.to_string()))?;
        Ok(())
    }

    /// Atomic set-if-absent with TTL (`SET key token NX PX ttl_ms`). The
    /// value written is a random token, not a fixed sentinel — `release_lock`
    /// needs it to tell its own lock apart from one a later caller acquired
    /// after this one's TTL expired. Returns the token on success.
    pub async fn acquire_lock(&self, key: &str, ttl: Duration) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        let token = Uuid::new_v4().to_string();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::CacheError(e.to_string()))?;
        Ok(acquired.map(|_| token))
    }

    /// Compare-and-delete: only removes `key` if it still holds `token`, the
    /// standard single-instance Redlock-safe release. Without this check, a
    /// caller whose TTL expired mid-critical-section could delete a different
    /// caller's live lock on the same key.
    pub async fn release_lock(&self, key: &str, token: &str) -> AppResult<()> {
        const RELEASE_SCRIPT: &str = r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#;

        let mut conn = self.conn.clone();
        redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| AppError::CacheError(e.to_string()))?;
        Ok(())
    }

    /// Runs `f` while holding `key`'s lock, releasing it on every exit path.
    /// Returns `None` if the lock could not be acquired.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, ttl: Duration, f: F) -> AppResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = AppResult<T>>,
    {
        let token = match self.acquire_lock(key, ttl).await? {
            Some(token) => token,
            None => return Ok(None),
        };
        let result = f().await;
        self.release_lock(key, &token).await?;
        result.map(Some)
    }
}
