use serde::Deserialize;

/// Application configuration loaded from environment variables via `envy`.
///
/// All fields map directly to environment variable names (uppercased by
/// envy). Provide defaults via `.env` for local development; override via
/// real env vars in production.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// TCP port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    pub postgres_host: String,
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,
    pub postgres_db: String,
    pub postgres_user: String,
    pub postgres_password: String,

    /// Cache / distributed-lock endpoint, e.g. `redis://127.0.0.1:6379`.
    pub redis_url: String,

    /// GCP project owning the object-store buckets. Its absence toggles
    /// local-filesystem mode (see `crate::storage`).
    pub gcp_project_id: Option<String>,
    /// Prefix applied to the three logical bucket names (`raw`, `results`,
    /// `thumb`) to get real bucket names, e.g. `pixelrev-prod-`.
    #[serde(default = "default_bucket_prefix")]
    pub gcs_bucket_prefix: String,

    /// Allowed CORS origin for the browser UI (an external collaborator).
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,

    /// Degraded, DB-less operating mode from the reference implementation.
    /// Parsed for configuration-surface completeness but intentionally
    /// unimplemented — see DESIGN.md.
    #[serde(default)]
    pub skip_db_check: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_bucket_prefix() -> String {
    "pixelrev-".to_string()
}

fn default_cors_origin() -> String {
    "*".to_string()
}

impl Config {
    /// Load configuration from the current process environment.
    ///
    /// Panics with a clear message if any required variable is missing.
    pub fn from_env() -> Self {
        envy::from_env::<Config>().unwrap_or_else(|err| {
            panic!("configuration error: {err}\nCheck that all required environment variables are set (see .env.example).");
        })
    }

    /// Whether object storage should use the local-filesystem backend
    /// instead of Google Cloud Storage (see §6: "absence of the first
    /// toggles local-filesystem mode").
    pub fn local_storage_mode(&self) -> bool {
        self.gcp_project_id.is_none()
    }

    pub fn postgres_dsn(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_host,
            self.postgres_port,
            self.postgres_db
        )
    }
}
