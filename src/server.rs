use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use chrono::Duration;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{PasswordHasher, SessionService, TokenSigner};
use crate::config::{AppConfig, DevUserConfig};
use crate::database::memory::{MemoryProductRepository, MemoryRevocationStore, MemoryUserRepository};
use crate::database::repository::{PgProductRepository, PgRevocationStore, PgUserRepository};
use crate::database::{DatabaseError, DatabaseManager, ProductRepository, RevocationStore, UserRepository};
use crate::error::ApiError;
use crate::handlers;
use crate::middleware::{require_auth, ApiResponse, ApiResult};
use crate::storage::{ImageStore, LocalImageStore, MemoryImageStore, UploadGuard};

/// Collaborators handed to every request. Cloning only bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub products: Arc<dyn ProductRepository>,
    pub images: Arc<dyn ImageStore>,
    pub uploads: Arc<UploadGuard>,
}

/// Persistence handles behind the session service and product routes
pub struct Backend {
    pub users: Arc<dyn UserRepository>,
    pub revocations: Arc<dyn RevocationStore>,
    pub products: Arc<dyn ProductRepository>,
    pub images: Arc<dyn ImageStore>,
}

impl Backend {
    /// Everything in process memory; nothing survives a restart.
    pub fn in_memory(image_dir: &str) -> Self {
        Self {
            users: Arc::new(MemoryUserRepository::new()),
            revocations: Arc::new(MemoryRevocationStore::new()),
            products: Arc::new(MemoryProductRepository::new()),
            images: Arc::new(MemoryImageStore::new(image_dir)),
        }
    }

    /// Postgres for records, local disk for images. Runs migrations.
    pub async fn postgres(config: &AppConfig) -> Result<Self, DatabaseError> {
        let pool = DatabaseManager::connect(&config.database).await?;
        DatabaseManager::migrate(&pool).await?;

        Ok(Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            revocations: Arc::new(PgRevocationStore::new(pool.clone())),
            products: Arc::new(PgProductRepository::new(pool)),
            images: Arc::new(LocalImageStore::new(&config.storage.root, config.storage.image_dir.clone())),
        })
    }

    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        if config.database.url.is_some() {
            Ok(Self::postgres(config).await.context("failed to initialize database")?)
        } else {
            tracing::warn!("DATABASE_URL not set; using in-memory storage");
            Ok(Self::in_memory(&config.storage.image_dir))
        }
    }
}

impl AppState {
    pub fn new(backend: Backend, config: &AppConfig, hasher: PasswordHasher) -> anyhow::Result<Self> {
        let ttl = i64::try_from(config.security.jwt_expiry_hours)
            .ok()
            .and_then(Duration::try_hours)
            .context("jwt_expiry_hours is too large")?;
        let signer = TokenSigner::new(&config.security.jwt_secret, ttl)?;
        let sessions = SessionService::new(backend.users, backend.revocations, signer, hasher)?;

        Ok(Self {
            sessions: Arc::new(sessions),
            products: backend.products,
            images: backend.images,
            uploads: Arc::new(UploadGuard::new(&config.storage.allowed_extensions)),
        })
    }

    /// Create the development account unless it already exists.
    pub async fn seed_user(&self, seed: &DevUserConfig) -> anyhow::Result<()> {
        match self.sessions.register(&seed.name, &seed.email, &seed.password).await {
            Ok(_) => Ok(()),
            Err(crate::auth::AuthError::Database(DatabaseError::Conflict(_))) => {
                tracing::debug!("Development user {} already present", seed.email);
                Ok(())
            }
            Err(e) => Err(e).context("failed to seed development user"),
        }
    }
}

pub fn app(state: AppState, config: &AppConfig) -> Router {
    let router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_routes())
        // Bearer token required
        .merge(product_routes(state.clone()))
        .fallback(fallback)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes)),
        );

    let router = match cors_layer(config) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.with_state(state)
}

fn auth_routes() -> Router<AppState> {
    use handlers::auth;

    Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/refresh", post(auth::refresh))
}

fn product_routes(state: AppState) -> Router<AppState> {
    use handlers::products;

    Router::new()
        .route("/products", get(products::index).post(products::store))
        .route(
            "/products/:id",
            get(products::show).put(products::update).delete(products::destroy),
        )
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

fn cors_layer(config: &AppConfig) -> Option<CorsLayer> {
    if !config.security.enable_cors {
        return None;
    }

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.security.cors_origins.iter().any(|origin| origin == "*") {
        return Some(layer.allow_origin(Any));
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    Some(layer.allow_origin(AllowOrigin::list(origins)))
}

async fn root() -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "name": "Product API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": "POST /login, GET /me, POST /logout, POST /refresh",
            "products": "GET|POST /products, GET|PUT|DELETE /products/:id (bearer token)",
            "health": "GET /health",
        }
    }))
}

async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    state.products.ping().await.map_err(|e| {
        tracing::error!("Health check failed: {}", e);
        ApiError::service_unavailable("Database unavailable")
    })?;

    Ok(ApiResponse::success(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "database": "ok",
    })))
}

async fn fallback() -> ApiError {
    ApiError::not_found("Route not found.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_expiry(hours: u64) -> anyhow::Result<AppState> {
        let mut config = AppConfig::development();
        config.security.jwt_expiry_hours = hours;
        let hasher = PasswordHasher::new(1024, 1, 1)?;
        AppState::new(Backend::in_memory("public/images"), &config, hasher)
    }

    #[test]
    fn oversized_token_lifetime_is_an_error() {
        assert!(state_with_expiry(u64::MAX).is_err());
        assert!(state_with_expiry(i64::MAX as u64).is_err());
        assert!(state_with_expiry(24).is_ok());
    }
}
