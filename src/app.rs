use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::Engine;
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::routes::{auth, bitacora, estudiantes, health, rbac};
use crate::tokens::TokenService;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub engine: Engine,
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        Self {
            engine: Engine::new(pool.clone()),
            tokens: TokenService::new(pool.clone()),
            config: Arc::new(config),
            pool,
        }
    }
}

pub async fn create_app(pool: SqlitePool, config: AppConfig) -> Result<Router, AppError> {
    let state = AppState::new(pool, config);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/perfil", get(auth::perfil));

    let router = Router::new()
        .nest("/auth", auth_routes)
        .nest("/rbac", rbac::routes())
        .nest("/estudiantes", estudiantes::routes())
        .route("/bitacoras", get(bitacora::listar))
        .route("/api/health", get(health::health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
