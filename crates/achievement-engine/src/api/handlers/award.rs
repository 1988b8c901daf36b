//! 颁发与进度 API 处理器
//!
//! 手动颁发、撤销以及进度上报（可选跨阈值自动颁发）。

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::extract::{Actor, TenantId};
use crate::api::request::{AwardRequest, ProgressRequest, RevokeQuery};
use crate::api::response::ApiResponse;
use crate::api::state::AppState;
use crate::models::UserAchievement;
use crate::repository::AchievementStore;
use crate::service::ProgressOutcome;

/// 手动颁发
///
/// POST /api/awards
pub async fn award<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Actor(actor): Actor,
    Json(req): Json<AwardRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserAchievement>>), ApiError> {
    req.validate()?;

    let cmd = req.into_command(&tenant_id, actor);
    let award = state.engine.award(&cmd).await?;

    info!(
        tenant_id = %tenant_id,
        user_id = %award.user_id,
        achievement_id = %award.achievement_id,
        earn_count = award.earn_count,
        "Achievement awarded via API"
    );
    Ok((StatusCode::CREATED, Json(ApiResponse::success(award))))
}

/// 撤销颁发记录
///
/// DELETE /api/awards/{user_achievement_id}
pub async fn revoke<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    actor: Actor,
    Path(user_achievement_id): Path<Uuid>,
    Query(query): Query<RevokeQuery>,
) -> Result<Json<ApiResponse<UserAchievement>>, ApiError> {
    query.validate()?;

    let revoked = state
        .engine
        .revoke(
            &tenant_id,
            user_achievement_id,
            query.reason.as_deref(),
            actor.as_deref(),
        )
        .await?;

    Ok(Json(ApiResponse::success(revoked)))
}

/// 上报进度
///
/// POST /api/progress
pub async fn update_progress<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Actor(actor): Actor,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<ApiResponse<ProgressOutcome>>, ApiError> {
    req.validate()?;

    let cmd = req.into_command(&tenant_id, actor);
    let outcome = state.engine.update_progress(&cmd).await?;

    Ok(Json(ApiResponse::success(outcome)))
}
