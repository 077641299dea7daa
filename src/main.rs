mod api;
mod cache;
mod config;
mod db;
mod error;
mod operation;
mod pipeline;
mod services;
mod storage;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cache::Cache;
use storage::ObjectStore;

/// Shared application state passed to every handler via Axum's `State`
/// extractor. Must be `Clone` — Axum clones it once per request.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub store: ObjectStore,
    pub cache: Cache,
    pub config: config::Config,
}

const MAX_INGEST_BODY_BYTES: usize = 10 * 1024 * 1024 + 4096; // multipart overhead above services::images::MAX_INGEST_BYTES

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok(); // .ok() — missing file is fine in production

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env();

    let pool: PgPool = db::create_pool(&config.postgres_dsn(), 20)
        .await
        .expect("failed to connect to database and run migrations");

    let store = ObjectStore::from_config(&config).expect("failed to initialize object store");

    let cache = Cache::connect(&config.redis_url)
        .await
        .expect("failed to connect to redis");

    let cors_origin = config.cors_origin.clone();
    let port = config.port;

    let state = AppState {
        db: pool,
        store,
        cache,
        config,
    };

    let cors = if cors_origin == "*" {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(cors_origin.parse::<axum::http::HeaderValue>().expect("invalid CORS_ORIGIN"))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let image_routes = Router::new()
        .route("/v1/images", post(api::images::ingest))
        .route(
            "/v1/images/{id}",
            get(api::images::get_metadata).delete(api::images::delete),
        )
        .route("/v1/images/{id}/history", get(api::images::history))
        .route("/v1/images/{id}/undo", post(api::images::undo))
        .route("/v1/images/{id}/rotate", post(api::images::rotate))
        .route("/v1/images/{id}/flip", post(api::images::flip))
        .route("/v1/images/{id}/resize", post(api::images::resize))
        .route("/v1/images/{id}/compress", post(api::images::compress))
        .layer(DefaultBodyLimit::max(MAX_INGEST_BODY_BYTES));

    let app = Router::new()
        .route("/health", get(api::health::health_check))
        .route("/v1/blobs/{bucket}/{*path}", get(api::blobs::serve))
        .merge(image_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind TCP listener");

    axum::serve(listener, app).await.expect("server error");
}
