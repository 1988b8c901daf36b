//! 用户维度查询 API 处理器

use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::extract::TenantId;
use crate::api::request::{AvailableQuery, ProgressQuery, SummaryQuery, UserAchievementsQuery};
use crate::api::response::ApiResponse;
use crate::api::state::AppState;
use crate::models::Achievement;
use crate::repository::AchievementStore;
use crate::service::{PageResponse, PrerequisiteCheck, ProgressView, UserAchievementView, UserSummary};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// 用户已获得的成就
///
/// GET /api/users/{user_id}/achievements
pub async fn list_user_achievements<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Path(user_id): Path<String>,
    Query(query): Query<UserAchievementsQuery>,
) -> ApiResult<PageResponse<UserAchievementView>> {
    query.validate()?;

    let page = state
        .engine
        .list_user_achievements(
            &tenant_id,
            &user_id,
            &query.filter(),
            query.sort.unwrap_or_default(),
            query.direction.unwrap_or_default(),
            query.page_request(),
        )
        .await?;

    Ok(Json(ApiResponse::success(page)))
}

/// 用户进度
///
/// GET /api/users/{user_id}/progress
pub async fn get_user_progress<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Path(user_id): Path<String>,
    Query(query): Query<ProgressQuery>,
) -> ApiResult<Vec<ProgressView>> {
    let progress = state
        .engine
        .get_user_progress(&tenant_id, &user_id, &query.filter())
        .await?;

    Ok(Json(ApiResponse::success(progress)))
}

/// 用户汇总
///
/// GET /api/users/{user_id}/summary
pub async fn get_user_summary<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Path(user_id): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<UserSummary> {
    query.validate()?;

    let summary = state
        .engine
        .get_user_summary(
            &tenant_id,
            &user_id,
            query.recent_limit,
            query.near_completion_pct,
        )
        .await?;

    Ok(Json(ApiResponse::success(summary)))
}

/// 用户尚未获得且仍可获得的成就
///
/// GET /api/users/{user_id}/available
pub async fn list_available_achievements<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Path(user_id): Path<String>,
    Query(query): Query<AvailableQuery>,
) -> ApiResult<PageResponse<Achievement>> {
    query.validate()?;

    let page = state
        .engine
        .list_available_achievements(&tenant_id, &user_id, &query.filter(), query.page_request())
        .await?;

    Ok(Json(ApiResponse::success(page)))
}

/// 前置条件检查
///
/// GET /api/users/{user_id}/prerequisites/{achievement_id}
pub async fn check_prerequisites<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Path((user_id, achievement_id)): Path<(String, Uuid)>,
) -> ApiResult<PrerequisiteCheck> {
    let check = state
        .engine
        .check_prerequisites(&tenant_id, &user_id, achievement_id)
        .await?;

    Ok(Json(ApiResponse::success(check)))
}
