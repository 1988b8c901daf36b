//! 成就目录 API 处理器
//!
//! 成就的增删改查、前置条件维护与单个成就的统计。

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::extract::{Actor, TenantId};
use crate::api::request::{
    AddPrerequisiteRequest, CreateAchievementRequest, GetAchievementQuery, ListAchievementsQuery,
    UpdateAchievementRequest,
};
use crate::api::response::ApiResponse;
use crate::api::state::AppState;
use crate::models::{Achievement, AchievementPrerequisite};
use crate::repository::AchievementStore;
use crate::service::{AchievementDetail, AchievementStatistics, PageResponse, RemovalOutcome};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalResponse {
    pub outcome: RemovalOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteRemovedResponse {
    pub removed: bool,
}

/// 创建成就
///
/// POST /api/achievements
pub async fn create_achievement<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    actor: Actor,
    Json(req): Json<CreateAchievementRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AchievementDetail>>), ApiError> {
    req.validate()?;

    let detail = state
        .engine
        .create_achievement(&tenant_id, req.into(), actor.as_deref())
        .await?;

    info!(
        tenant_id = %tenant_id,
        achievement_id = %detail.achievement.id,
        "Achievement created"
    );
    Ok((StatusCode::CREATED, Json(ApiResponse::success(detail))))
}

/// 成就列表
///
/// GET /api/achievements
pub async fn list_achievements<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Query(query): Query<ListAchievementsQuery>,
) -> ApiResult<PageResponse<Achievement>> {
    query.validate()?;

    let page = state
        .engine
        .list_achievements(
            &tenant_id,
            &query.filter(),
            query.sort.unwrap_or_default(),
            query.direction.unwrap_or_default(),
            query.page_request(),
        )
        .await?;

    Ok(Json(ApiResponse::success(page)))
}

/// 成就详情，默认附带等级与前置条件
///
/// GET /api/achievements/{id}
pub async fn get_achievement<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
    Query(query): Query<GetAchievementQuery>,
) -> ApiResult<AchievementDetail> {
    let detail = state
        .engine
        .get_achievement(
            &tenant_id,
            id,
            query.include_levels.unwrap_or(true),
            query.include_prerequisites.unwrap_or(true),
        )
        .await?;

    Ok(Json(ApiResponse::success(detail)))
}

/// 更新成就
///
/// PUT /api/achievements/{id}
pub async fn update_achievement<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAchievementRequest>,
) -> ApiResult<Achievement> {
    req.validate()?;

    let achievement = state
        .engine
        .update_achievement(&tenant_id, id, req.into(), actor.as_deref())
        .await?;

    Ok(Json(ApiResponse::success(achievement)))
}

/// 删除成就，曾被获得过则改为停用
///
/// DELETE /api/achievements/{id}
pub async fn delete_achievement<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<RemovalResponse> {
    let outcome = state
        .engine
        .deactivate_or_delete_achievement(&tenant_id, id, actor.as_deref())
        .await?;

    let message = match outcome {
        RemovalOutcome::Deleted => "成就已删除",
        RemovalOutcome::Deactivated => "成就已有颁发记录，已停用",
    };
    Ok(Json(ApiResponse::success_with_message(
        RemovalResponse { outcome },
        message,
    )))
}

/// 添加前置条件
///
/// POST /api/achievements/{id}/prerequisites
pub async fn add_prerequisite<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
    Json(req): Json<AddPrerequisiteRequest>,
) -> ApiResult<AchievementPrerequisite> {
    req.validate()?;

    let edge = state
        .engine
        .add_prerequisite(&tenant_id, id, req.prerequisite_id, req.requires_completion)
        .await?;

    Ok(Json(ApiResponse::success(edge)))
}

/// 移除前置条件
///
/// DELETE /api/achievements/{id}/prerequisites/{prerequisite_id}
pub async fn remove_prerequisite<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Path((id, prerequisite_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<PrerequisiteRemovedResponse> {
    let removed = state
        .engine
        .remove_prerequisite(&tenant_id, id, prerequisite_id)
        .await?;

    Ok(Json(ApiResponse::success(PrerequisiteRemovedResponse {
        removed,
    })))
}

/// 成就统计
///
/// GET /api/achievements/{id}/statistics
pub async fn get_statistics<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
) -> ApiResult<AchievementStatistics> {
    let stats = state.engine.get_statistics(&tenant_id, id).await?;
    Ok(Json(ApiResponse::success(stats)))
}
