//! 路由配置
//!
//! 定义所有 REST API 路由

use std::time::Duration;

use achievement_shared::observability::middleware as obs_middleware;
use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::api::state::AppState;
use crate::repository::AchievementStore;

/// 构建 API 路由（挂载在 /api 下）
pub fn api_routes<S: AchievementStore + 'static>() -> Router<AppState<S>> {
    Router::new()
        .merge(achievement_routes())
        .merge(award_routes())
        .merge(user_routes())
        .route(
            "/leaderboard",
            get(handlers::leaderboard::get_leaderboard::<S>),
        )
}

/// 成就目录路由
fn achievement_routes<S: AchievementStore + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/achievements",
            get(handlers::achievement::list_achievements::<S>)
                .post(handlers::achievement::create_achievement::<S>),
        )
        .route(
            "/achievements/{id}",
            get(handlers::achievement::get_achievement::<S>)
                .put(handlers::achievement::update_achievement::<S>)
                .delete(handlers::achievement::delete_achievement::<S>),
        )
        .route(
            "/achievements/{id}/prerequisites",
            post(handlers::achievement::add_prerequisite::<S>),
        )
        .route(
            "/achievements/{id}/prerequisites/{prerequisite_id}",
            delete(handlers::achievement::remove_prerequisite::<S>),
        )
        .route(
            "/achievements/{id}/statistics",
            get(handlers::achievement::get_statistics::<S>),
        )
}

/// 颁发、撤销与进度路由
fn award_routes<S: AchievementStore + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route("/awards", post(handlers::award::award::<S>))
        .route(
            "/awards/{user_achievement_id}",
            delete(handlers::award::revoke::<S>),
        )
        .route("/progress", post(handlers::award::update_progress::<S>))
}

/// 用户维度查询路由
fn user_routes<S: AchievementStore + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/users/{user_id}/achievements",
            get(handlers::user::list_user_achievements::<S>),
        )
        .route(
            "/users/{user_id}/progress",
            get(handlers::user::get_user_progress::<S>),
        )
        .route(
            "/users/{user_id}/summary",
            get(handlers::user::get_user_summary::<S>),
        )
        .route(
            "/users/{user_id}/available",
            get(handlers::user::list_available_achievements::<S>),
        )
        .route(
            "/users/{user_id}/prerequisites/{achievement_id}",
            get(handlers::user::check_prerequisites::<S>),
        )
}

/// 完整应用路由：API、健康检查与通用中间件
pub fn build_router<S: AchievementStore + 'static>(
    state: AppState<S>,
    request_timeout: Duration,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes())
        .route("/health", get(handlers::health::health_check::<S>))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
