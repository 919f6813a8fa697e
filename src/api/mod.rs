use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    CommandEngine, IdentityService, SessionService, TranslationEngine, TranslationService,
};
use crate::workspace::WorkspaceManager;

pub mod auth;
mod error;
pub mod settings;
pub mod translate;
mod types;

pub use error::ApiError;
pub use types::*;

pub struct AppState {
    pub config: Config,

    pub identity: IdentityService,

    pub workspaces: Arc<WorkspaceManager>,

    pub translations: Arc<TranslationService>,
}

pub async fn create_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let engine: Arc<dyn TranslationEngine> =
        Arc::new(CommandEngine::new(config.translation.clone()));
    create_app_state_with_engine(config, engine).await
}

/// Like [`create_app_state`] but with a caller-supplied engine, so tests
/// can substitute a fixture without shelling out.
pub async fn create_app_state_with_engine(
    config: Config,
    engine: Arc<dyn TranslationEngine>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.security.clone(),
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let sessions = match &config.security.token_secret {
        Some(secret) => SessionService::from_secret(secret.as_bytes()),
        None => SessionService::load_or_generate(&config.token_secret_path())?,
    };

    let identity = IdentityService::new(store, sessions);
    let workspaces = Arc::new(WorkspaceManager::new(config.users_dir()));
    let translations = Arc::new(TranslationService::new(engine, workspaces.clone()));

    Ok(Arc::new(AppState {
        config,
        identity,
        workspaces,
        translations,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();
    let static_path = state.config.server.static_path.clone();
    let max_upload = state.config.server.max_upload_mb * 1024 * 1024;

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/auth/status", get(auth::get_status))
        .route("/auth/setup", post(auth::setup))
        .route("/auth/login", post(auth::login))
        .layer(DefaultBodyLimit::max(max_upload))
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    let mut router = Router::new().nest("/api", api_router);

    // Serve the built frontend when one is present; API-only otherwise.
    if Path::new(&static_path).is_dir() {
        router = router.fallback_service(ServeDir::new(&static_path));
    }

    router
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::get_current_user))
        .route("/auth/register", post(auth::register))
        .route("/auth/users", get(auth::list_users))
        .route("/auth/users/{username}", delete(auth::delete_user))
        .route("/settings", get(settings::get_settings))
        .route("/settings", post(settings::update_settings))
        .route("/settings/reset", post(settings::reset_settings))
        .route("/settings/password", post(settings::change_password))
        .route("/upload", post(translate::upload))
        .route("/translate", post(translate::start_translation))
        .route("/translate/status/{task_id}", get(translate::get_status))
        .route("/translate/history", get(translate::get_history))
        .route(
            "/translate/history/{task_id}",
            delete(translate::delete_history_item),
        )
        .route("/translate/download/{task_id}", get(translate::download))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
