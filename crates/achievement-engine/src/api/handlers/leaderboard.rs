//! 排行榜 API 处理器

use axum::{
    Json,
    extract::{Query, State},
};
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::extract::TenantId;
use crate::api::request::LeaderboardQuery;
use crate::api::response::ApiResponse;
use crate::api::state::AppState;
use crate::repository::AchievementStore;
use crate::service::LeaderboardEntry;

/// 排行榜
///
/// GET /api/leaderboard
pub async fn get_leaderboard<S: AchievementStore + 'static>(
    State(state): State<AppState<S>>,
    TenantId(tenant_id): TenantId,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<ApiResponse<Vec<LeaderboardEntry>>>, ApiError> {
    query.validate()?;

    let entries = state
        .engine
        .get_leaderboard(&tenant_id, &query.filter(), query.limit())
        .await?;

    Ok(Json(ApiResponse::success(entries)))
}
