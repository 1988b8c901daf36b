//! 成就查询服务
//!
//! 只读操作，全部由存储内容推导：目录与用户成就列表、用户汇总、
//! 可获得成就、排行榜与单个成就统计。排行榜可选 Redis 缓存，
//! 缓存故障只记录警告，数据源始终是存储。

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use achievement_shared::cache::{Cache, CacheKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{AchievementError, Result};
use crate::models::{Achievement, LeaderboardFilter, UserAchievement, UserPoints};
use crate::repository::AchievementStore;
use crate::service::dto::{
    AchievementFilter, AchievementSort, AchievementStatistics, LeaderboardEntry, PageRequest,
    PageResponse, ProgressFilter, ProgressView, SortDirection, UserAchievementFilter,
    UserAchievementSort, UserAchievementView, UserSummary,
};

/// 成就查询服务
pub struct QueryService<S: AchievementStore> {
    store: Arc<S>,
    cache: Option<Arc<Cache>>,
    leaderboard_ttl: Option<Duration>,
}

impl<S: AchievementStore> QueryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: None,
            leaderboard_ttl: None,
        }
    }

    /// 启用排行榜缓存
    pub fn with_cache(mut self, cache: Arc<Cache>, leaderboard_ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.leaderboard_ttl = Some(leaderboard_ttl);
        self
    }

    /// 通用的缓存读取逻辑
    ///
    /// 缓存命中直接返回；未命中或缓存不可用时从存储获取并回填。
    async fn get_cached_or_fetch<T, F, Fut>(&self, key: &str, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (Some(cache), Some(ttl)) = (&self.cache, self.leaderboard_ttl) else {
            return fetch().await;
        };

        match cache.get::<T>(key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "缓存读取失败，回退到存储");
            }
        }

        let data = fetch().await?;

        if let Err(e) = cache.set(key, &data, ttl).await {
            warn!(key = %key, error = %e, "缓存写入失败");
        }

        Ok(data)
    }

    async fn achievement_map(&self, tenant_id: &str) -> Result<HashMap<Uuid, Achievement>> {
        Ok(self
            .store
            .list_achievements(tenant_id)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect())
    }

    // ==================== 目录 ====================

    /// 分页查询成就目录
    #[instrument(skip(self, filter))]
    pub async fn list_achievements(
        &self,
        tenant_id: &str,
        filter: &AchievementFilter,
        sort: AchievementSort,
        direction: SortDirection,
        page: PageRequest,
    ) -> Result<PageResponse<Achievement>> {
        let mut items: Vec<Achievement> = self
            .store
            .list_achievements(tenant_id)
            .await?
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect();

        items.sort_by(|a, b| directed(compare_achievements(a, b, sort), direction));
        Ok(PageResponse::paginate(items, page))
    }

    /// 用户可获得的成就：启用中、未被完成（可重复成就始终可获得）
    #[instrument(skip(self, filter))]
    pub async fn list_available_achievements(
        &self,
        tenant_id: &str,
        user_id: &str,
        filter: &AchievementFilter,
        page: PageRequest,
    ) -> Result<PageResponse<Achievement>> {
        let completed: HashSet<Uuid> = self
            .store
            .list_user_achievements(tenant_id, user_id)
            .await?
            .into_iter()
            .filter(|a| a.is_completed)
            .map(|a| a.achievement_id)
            .collect();

        let filter = AchievementFilter {
            is_active: Some(true),
            ..filter.clone()
        };

        let mut items: Vec<Achievement> = self
            .store
            .list_achievements(tenant_id)
            .await?
            .into_iter()
            .filter(|a| filter.matches(a))
            .filter(|a| a.is_repeatable || !completed.contains(&a.id))
            .collect();

        items.sort_by(|a, b| compare_achievements(a, b, AchievementSort::DisplayOrder));
        Ok(PageResponse::paginate(items, page))
    }

    // ==================== 用户成就 ====================

    /// 分页查询用户成就
    #[instrument(skip(self, filter))]
    pub async fn list_user_achievements(
        &self,
        tenant_id: &str,
        user_id: &str,
        filter: &UserAchievementFilter,
        sort: UserAchievementSort,
        direction: SortDirection,
        page: PageRequest,
    ) -> Result<PageResponse<UserAchievementView>> {
        let catalog = self.achievement_map(tenant_id).await?;
        let awards = self.store.list_user_achievements(tenant_id, user_id).await?;

        let mut items: Vec<UserAchievementView> = awards
            .iter()
            .filter_map(|award| {
                let achievement = catalog.get(&award.achievement_id)?;
                matches_award(filter, award, achievement)
                    .then(|| UserAchievementView::new(award, achievement))
            })
            .collect();

        items.sort_by(|a, b| {
            let ord = match sort {
                UserAchievementSort::Points => a.points_earned.cmp(&b.points_earned),
                UserAchievementSort::Name => a.name.cmp(&b.name),
                UserAchievementSort::EarnedAt => a.earned_at.cmp(&b.earned_at),
            };
            directed(ord.then_with(|| a.id.cmp(&b.id)), direction)
        });

        Ok(PageResponse::paginate(items, page))
    }

    /// 用户进度列表，按最近更新排序
    #[instrument(skip(self, filter))]
    pub async fn get_user_progress(
        &self,
        tenant_id: &str,
        user_id: &str,
        filter: &ProgressFilter,
    ) -> Result<Vec<ProgressView>> {
        let catalog = self.achievement_map(tenant_id).await?;
        let mut progress = self.store.list_user_progress(tenant_id, user_id).await?;
        progress.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));

        Ok(progress
            .iter()
            .filter(|p| !filter.in_progress_only || p.is_in_progress())
            .filter_map(|p| {
                let achievement = catalog.get(&p.achievement_id)?;
                filter
                    .category
                    .as_deref()
                    .is_none_or(|c| achievement.category == c)
                    .then(|| ProgressView::new(p, achievement))
            })
            .collect())
    }

    /// 用户汇总
    ///
    /// `near_completion_pct` 为接近完成的百分比阈值，未完成且达到阈值的进度会列出。
    #[instrument(skip(self))]
    pub async fn get_user_summary(
        &self,
        tenant_id: &str,
        user_id: &str,
        recent_limit: usize,
        near_completion_pct: u8,
    ) -> Result<UserSummary> {
        let catalog = self.achievement_map(tenant_id).await?;
        let awards = self.store.list_user_achievements(tenant_id, user_id).await?;
        let progress = self.store.list_user_progress(tenant_id, user_id).await?;

        let total_points = awards.iter().map(|a| i64::from(a.points_earned)).sum();
        let completed: Vec<&UserAchievement> = awards.iter().filter(|a| a.is_completed).collect();

        let mut category_breakdown = BTreeMap::new();
        for award in &completed {
            if let Some(achievement) = catalog.get(&award.achievement_id) {
                *category_breakdown
                    .entry(achievement.category.clone())
                    .or_insert(0u64) += 1;
            }
        }

        let mut recent: Vec<&UserAchievement> = completed.clone();
        recent.sort_by(|a, b| b.earned_at.cmp(&a.earned_at));
        let recent_achievements = recent
            .into_iter()
            .filter_map(|award| {
                catalog
                    .get(&award.achievement_id)
                    .map(|a| UserAchievementView::new(award, a))
            })
            .take(recent_limit)
            .collect();

        let threshold = f64::from(near_completion_pct.min(100));
        let mut near_completion: Vec<ProgressView> = progress
            .iter()
            .filter(|p| !p.is_completed && p.percentage() >= threshold)
            .filter_map(|p| {
                catalog
                    .get(&p.achievement_id)
                    .map(|a| ProgressView::new(p, a))
            })
            .collect();
        near_completion.sort_by(|a, b| {
            b.percentage
                .partial_cmp(&a.percentage)
                .unwrap_or(Ordering::Equal)
        });

        Ok(UserSummary {
            user_id: user_id.to_string(),
            total_achievements: awards.len() as u64,
            total_points,
            completed_count: completed.len() as u64,
            in_progress_count: progress.iter().filter(|p| p.is_in_progress()).count() as u64,
            recent_achievements,
            near_completion,
            category_breakdown,
        })
    }

    // ==================== 排行榜与统计 ====================

    /// 排行榜：总分降序，其次成就数降序，用户 id 升序保证结果稳定
    #[instrument(skip(self, filter))]
    pub async fn get_leaderboard(
        &self,
        tenant_id: &str,
        filter: &LeaderboardFilter,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>> {
        let limit = limit.max(1);
        let key = CacheKey::leaderboard(tenant_id, &filter.cache_variant(limit));

        self.get_cached_or_fetch(&key, || async {
            let points = self.store.aggregate_user_points(tenant_id, filter).await?;
            Ok(rank_users(points, limit))
        })
        .await
    }

    /// 清除租户的排行榜缓存
    pub async fn invalidate_leaderboard(&self, tenant_id: &str) {
        let Some(cache) = &self.cache else {
            return;
        };
        match cache
            .delete_pattern(&CacheKey::leaderboard_pattern(tenant_id))
            .await
        {
            Ok(count) => debug!(tenant_id, count, "排行榜缓存已清除"),
            Err(e) => warn!(tenant_id, error = %e, "排行榜缓存清除失败"),
        }
    }

    /// 单个成就统计
    ///
    /// 合格用户为有进度行或颁发记录的不同用户，完成率 = 获得过的不同用户数 / 合格用户数。
    #[instrument(skip(self))]
    pub async fn get_statistics(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<AchievementStatistics> {
        let achievement = self
            .store
            .get_achievement(tenant_id, achievement_id)
            .await?
            .ok_or(AchievementError::AchievementNotFound(achievement_id))?;

        let awards = self
            .store
            .list_achievement_awards(tenant_id, achievement_id)
            .await?;
        let progress = self
            .store
            .list_achievement_progress(tenant_id, achievement_id)
            .await?;

        let earners: HashSet<&str> = awards.iter().map(|a| a.user_id.as_str()).collect();
        let eligible: HashSet<&str> = earners
            .iter()
            .copied()
            .chain(progress.iter().map(|p| p.user_id.as_str()))
            .collect();

        let completion_rate = if eligible.is_empty() {
            0.0
        } else {
            earners.len() as f64 / eligible.len() as f64
        };

        Ok(AchievementStatistics {
            achievement_id,
            name: achievement.name,
            total_earned: awards.len() as u64,
            unique_earners: earners.len() as u64,
            eligible_users: eligible.len() as u64,
            in_progress: progress.iter().filter(|p| p.is_in_progress()).count() as u64,
            completion_rate,
            first_earned_at: awards.iter().map(|a| a.earned_at).min(),
            last_earned_at: awards.iter().map(|a| a.earned_at).max(),
        })
    }
}

fn directed(ord: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

fn compare_achievements(a: &Achievement, b: &Achievement, sort: AchievementSort) -> Ordering {
    let primary = match sort {
        AchievementSort::Name => a.name.cmp(&b.name),
        AchievementSort::Points => a.points.cmp(&b.points),
        AchievementSort::CreatedAt => a.created_at.cmp(&b.created_at),
        AchievementSort::DisplayOrder => a.display_order.cmp(&b.display_order),
    };
    primary
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

fn matches_award(
    filter: &UserAchievementFilter,
    award: &UserAchievement,
    achievement: &Achievement,
) -> bool {
    filter
        .category
        .as_deref()
        .is_none_or(|c| achievement.category == c)
        && filter
            .achievement_type
            .as_deref()
            .is_none_or(|t| achievement.achievement_type == t)
        && filter.is_completed.is_none_or(|c| award.is_completed == c)
        && filter.earned_from.is_none_or(|from| award.earned_at >= from)
        && filter.earned_to.is_none_or(|to| award.earned_at <= to)
}

/// 排序并截取前 `limit` 名，名次从 1 开始
pub fn rank_users(mut points: Vec<UserPoints>, limit: usize) -> Vec<LeaderboardEntry> {
    points.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| b.total_achievements.cmp(&a.total_achievements))
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    points
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, p)| LeaderboardEntry {
            rank: i as u32 + 1,
            user_id: p.user_id,
            total_points: p.total_points,
            total_achievements: p.total_achievements,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(user: &str, total_points: i64, total_achievements: i64) -> UserPoints {
        UserPoints {
            user_id: user.to_string(),
            total_points,
            total_achievements,
        }
    }

    #[test]
    fn test_rank_orders_by_points_then_count() {
        let ranked = rank_users(
            vec![
                points("a", 10, 1),
                points("b", 30, 2),
                points("c", 10, 3),
                points("d", 5, 9),
            ],
            10,
        );

        let order: Vec<&str> = ranked.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, ["b", "c", "a", "d"]);
        assert_eq!(
            ranked.iter().map(|e| e.rank).collect::<Vec<_>>(),
            [1, 2, 3, 4]
        );
    }

    #[test]
    fn test_rank_respects_limit() {
        let ranked = rank_users(vec![points("a", 1, 1), points("b", 2, 1)], 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].user_id, "b");
    }

    #[test]
    fn test_directed_reverses() {
        assert_eq!(directed(Ordering::Less, SortDirection::Desc), Ordering::Greater);
        assert_eq!(directed(Ordering::Less, SortDirection::Asc), Ordering::Less);
    }
}
