//! REST APIハンドラー
//!
//! ルーティング表とアクセス区分（public / user / admin）

pub mod config;
pub mod error;
pub mod models;
pub mod proxy;

use crate::auth::middleware::{require_admin_middleware, require_user_middleware};
use crate::AppState;
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// アプリケーションのルーターを作成
pub fn create_app(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(config::get_status))
        .route("/health", get(config::get_status))
        .route("/api/version", get(models::get_version))
        .route("/api/version/{idx}", get(models::get_version_for_backend));

    let user = Router::new()
        .route("/api/tags", get(models::get_tags))
        .route("/api/tags/{idx}", get(models::get_tags_for_backend))
        .route("/api/show", post(models::show_model))
        .route("/api/chat", post(proxy::chat))
        .route("/api/chat/{idx}", post(proxy::chat_for_backend))
        .route("/api/generate", post(proxy::generate))
        .route("/api/generate/{idx}", post(proxy::generate_for_backend))
        .route("/api/embed", post(proxy::embed))
        .route("/api/embed/{idx}", post(proxy::embed_for_backend))
        .route("/api/embeddings", post(proxy::embeddings))
        .route("/api/embeddings/{idx}", post(proxy::embeddings_for_backend))
        .route_layer(axum_middleware::from_fn_with_state(
            state.api_keys.clone(),
            require_user_middleware,
        ));

    let admin = Router::new()
        .route("/verify", post(config::verify_connection))
        .route("/config", get(config::get_config))
        .route("/config/update", post(config::update_config))
        .route("/api/ps", get(models::get_loaded_models))
        .route("/api/pull", post(models::pull_model))
        .route("/api/pull/{idx}", post(models::pull_model_for_backend))
        .route("/api/delete", delete(models::delete_model))
        .route("/api/delete/{idx}", delete(models::delete_model_for_backend))
        .route_layer(axum_middleware::from_fn_with_state(
            state.api_keys.clone(),
            require_admin_middleware,
        ));

    Router::new()
        .merge(public)
        .merge(user)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
