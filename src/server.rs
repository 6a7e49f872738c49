//! HTTP API server.
//!
//! Every module contributes a `routes()` router; they are merged here under
//! one shared [`AppState`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/auth/register` | Create an account, returns a token |
//! | `POST` | `/api/auth/login` | Exchange credentials for a token |
//! | `GET`  | `/api/auth/me` | Current user |
//! | `GET` `POST` | `/api/bikes` | List / create bikes |
//! | `GET` `PUT` `DELETE` | `/api/bikes/{bike_id}` | Single bike |
//! | `POST` | `/api/bikes/{bike_id}/photo` | Multipart photo upload |
//! | `GET` `POST` | `/api/bikes/{bike_id}/services` | Service history |
//! | `PUT` `DELETE` | `/api/bikes/{bike_id}/services/{service_id}` | Single service |
//! | `GET` `POST` | `/api/bikes/{bike_id}/mileage` | Mileage log (upsert per day) |
//! | `DELETE` | `/api/bikes/{bike_id}/mileage/{log_id}` | Single log |
//! | `GET` `POST` | `/api/bikes/{bike_id}/expenses` | Expenses |
//! | `PUT` `DELETE` | `/api/bikes/{bike_id}/expenses/{expense_id}` | Single expense |
//! | `GET`  | `/api/dashboard/stats` | Aggregated dashboard |
//! | `POST` | `/api/fred/ask` | Ask Fred |
//! | `GET`  | `/api/health` | Health check (returns version) |
//! | `GET`  | `/uploads/*` | Uploaded bike photos |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Bike not found" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser client can
//! be served from a different origin.

use axum::{extract::DefaultBodyLimit, routing::get, Json, Router};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{Config, DEV_JWT_SECRET};
use crate::fred::Fred;
use crate::{auth, bikes, dashboard, db, expenses, fred, migrate, mileage, services};

/// Multipart framing overhead allowed on top of the photo size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub fred: Arc<Fred>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config, fred: Fred) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            fred: Arc::new(fred),
        }
    }
}

/// Assemble the full API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.server.max_upload_bytes + MULTIPART_OVERHEAD;
    let uploads = ServeDir::new(&state.config.server.uploads_dir);

    Router::new()
        .route("/api/health", get(handle_health))
        .merge(auth::routes())
        .merge(bikes::routes())
        .merge(services::routes())
        .merge(mileage::routes())
        .merge(expenses::routes())
        .merge(dashboard::routes())
        .merge(fred::routes())
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Opens the database (creating the schema if needed), builds Fred from the
/// `[embedding]` and `[chat]` sections, and serves on `[server].bind` until
/// the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    if config.auth.jwt_secret == DEV_JWT_SECRET {
        tracing::warn!("Using the development JWT secret; set JWT_SECRET or [auth] jwt_secret");
    }
    if !config.embedding.is_enabled() {
        tracing::warn!("Embeddings disabled; Fred will answer without retrieved context");
    }

    std::fs::create_dir_all(&config.server.uploads_dir)?;

    let fred = Fred::from_config(config)?;
    let bind_addr = config.server.bind.clone();
    let app = build_router(AppState::new(pool, config.clone(), fred));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        addr = %bind_addr,
        embedding = %config.embedding.provider,
        chat_model = %config.chat.model,
        "MotoCare API listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ GET /api/health ============

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
