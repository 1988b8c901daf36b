//! 服务层数据传输对象
//!
//! 命令、过滤条件与查询视图，与内部存储模型解耦

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Achievement, AchievementLevel, AchievementProgress, ContextValue, UserAchievement,
};

// ==================== 命令 ====================

/// 颁发命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardCommand {
    pub tenant_id: String,
    pub user_id: String,
    pub achievement_id: Uuid,
    pub progress: i64,
    pub max_progress: i64,
    pub level: Option<i32>,
    #[serde(default)]
    pub context: ContextValue,
    pub notify_user: bool,
    pub awarded_by: Option<String>,
}

impl AwardCommand {
    /// 进度即满的单次颁发
    pub fn simple(tenant_id: &str, user_id: &str, achievement_id: Uuid) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            achievement_id,
            progress: 1,
            max_progress: 1,
            level: None,
            context: ContextValue::Null,
            notify_user: true,
            awarded_by: None,
        }
    }
}

/// 进度更新命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressCommand {
    pub tenant_id: String,
    pub user_id: String,
    pub achievement_id: Uuid,
    pub increment: i64,
    #[serde(default)]
    pub context: ContextValue,
    /// 跨过完成阈值时自动颁发
    pub auto_award: bool,
    pub actor: Option<String>,
}

impl UpdateProgressCommand {
    pub fn new(tenant_id: &str, user_id: &str, achievement_id: Uuid, increment: i64) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            achievement_id,
            increment,
            context: ContextValue::Null,
            auto_award: false,
            actor: None,
        }
    }

    pub fn with_auto_award(mut self) -> Self {
        self.auto_award = true;
        self
    }
}

/// 进度更新结果
///
/// `crossed` 为本次更新是否由未完成变为完成，这是唯一可观测到"跨阈值"的地方。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOutcome {
    pub previous_progress: i64,
    pub current_progress: i64,
    pub target_progress: i64,
    pub percentage: f64,
    pub is_completed: bool,
    pub crossed: bool,
    /// 自动颁发产生的记录
    #[serde(skip_serializing_if = "Option::is_none")]
    pub award: Option<UserAchievement>,
}

/// 新建成就命令
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateAchievementCommand {
    pub name: String,
    pub description: String,
    pub category: String,
    pub achievement_type: String,
    pub points: i32,
    pub is_active: bool,
    pub is_secret: bool,
    pub is_repeatable: bool,
    pub conditions: ContextValue,
    pub display_order: i32,
    pub levels: Vec<LevelSpec>,
}

/// 等级定义
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelSpec {
    pub level: i32,
    pub name: String,
    pub description: Option<String>,
    pub required_progress: i64,
    pub points: i32,
    pub icon_url: Option<String>,
    pub badge_color: Option<String>,
}

impl LevelSpec {
    pub fn into_level(self, achievement_id: Uuid) -> AchievementLevel {
        AchievementLevel {
            id: Uuid::now_v7(),
            achievement_id,
            level: self.level,
            name: self.name,
            description: self.description,
            required_progress: self.required_progress,
            points: self.points,
            icon_url: self.icon_url,
            badge_color: self.badge_color,
        }
    }
}

/// 成就部分更新，None 表示不修改
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateAchievementCommand {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub achievement_type: Option<String>,
    pub points: Option<i32>,
    pub is_active: Option<bool>,
    pub is_secret: Option<bool>,
    pub is_repeatable: Option<bool>,
    pub conditions: Option<ContextValue>,
    pub display_order: Option<i32>,
    /// Some 时整体替换等级列表
    pub levels: Option<Vec<LevelSpec>>,
}

/// 停用或删除的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalOutcome {
    Deleted,
    Deactivated,
}

// ==================== 分页 ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }.normalized()
    }

    /// page 最小为 1，page_size 限制在 1..=100
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, 100),
        }
    }

    fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size as usize
    }
}

/// 分页结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T> PageResponse<T> {
    /// 对已过滤、排序的完整结果切页
    pub fn paginate(all: Vec<T>, request: PageRequest) -> Self {
        let request = request.normalized();
        let total = all.len() as u64;
        let total_pages = total.div_ceil(request.page_size as u64) as u32;
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.page_size as usize)
            .collect();

        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
            total_pages,
        }
    }
}

// ==================== 过滤与排序 ====================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// 成就目录过滤
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AchievementFilter {
    pub category: Option<String>,
    pub achievement_type: Option<String>,
    pub is_active: Option<bool>,
    /// 默认不展示隐藏成就
    pub include_secret: bool,
    pub search: Option<String>,
}

impl AchievementFilter {
    pub fn matches(&self, achievement: &Achievement) -> bool {
        self.category
            .as_deref()
            .is_none_or(|c| achievement.category == c)
            && self
                .achievement_type
                .as_deref()
                .is_none_or(|t| achievement.achievement_type == t)
            && self.is_active.is_none_or(|a| achievement.is_active == a)
            && (self.include_secret || !achievement.is_secret)
            && self
                .search
                .as_deref()
                .is_none_or(|s| achievement.matches_search(s))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AchievementSort {
    Name,
    Points,
    CreatedAt,
    #[default]
    DisplayOrder,
}

/// 用户成就过滤
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserAchievementFilter {
    pub category: Option<String>,
    pub achievement_type: Option<String>,
    pub is_completed: Option<bool>,
    pub earned_from: Option<DateTime<Utc>>,
    pub earned_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserAchievementSort {
    Points,
    Name,
    #[default]
    EarnedAt,
}

/// 用户进度过滤
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressFilter {
    pub category: Option<String>,
    /// 只返回进行中（有进度且未完成）的记录
    pub in_progress_only: bool,
}

// ==================== 视图 ====================

/// 用户成就视图，附带成就名称等目录字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievementView {
    pub id: Uuid,
    pub achievement_id: Uuid,
    pub name: String,
    pub category: String,
    pub achievement_type: String,
    pub earned_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    pub progress: i64,
    pub max_progress: i64,
    pub is_completed: bool,
    pub points_earned: i32,
    pub earn_count: i32,
    pub context: ContextValue,
}

impl UserAchievementView {
    pub fn new(award: &UserAchievement, achievement: &Achievement) -> Self {
        Self {
            id: award.id,
            achievement_id: award.achievement_id,
            name: achievement.name.clone(),
            category: achievement.category.clone(),
            achievement_type: achievement.achievement_type.clone(),
            earned_at: award.earned_at,
            level: award.level,
            progress: award.progress,
            max_progress: award.max_progress,
            is_completed: award.is_completed,
            points_earned: award.points_earned,
            earn_count: award.earn_count,
            context: award.context.clone(),
        }
    }
}

/// 进度视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub achievement_id: Uuid,
    pub name: String,
    pub category: String,
    pub current_progress: i64,
    pub target_progress: i64,
    pub percentage: f64,
    pub is_completed: bool,
    pub last_updated: DateTime<Utc>,
}

impl ProgressView {
    pub fn new(progress: &AchievementProgress, achievement: &Achievement) -> Self {
        Self {
            achievement_id: progress.achievement_id,
            name: achievement.name.clone(),
            category: achievement.category.clone(),
            current_progress: progress.current_progress,
            target_progress: progress.target_progress,
            percentage: progress.percentage(),
            is_completed: progress.is_completed,
            last_updated: progress.last_updated,
        }
    }
}

/// 用户汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: String,
    pub total_achievements: u64,
    pub total_points: i64,
    pub completed_count: u64,
    pub in_progress_count: u64,
    pub recent_achievements: Vec<UserAchievementView>,
    pub near_completion: Vec<ProgressView>,
    /// 分类 -> 已完成成就数
    pub category_breakdown: BTreeMap<String, u64>,
}

/// 排行榜条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 从 1 开始
    pub rank: u32,
    pub user_id: String,
    pub total_points: i64,
    pub total_achievements: i64,
}

/// 单个成就的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementStatistics {
    pub achievement_id: Uuid,
    pub name: String,
    /// 累计颁发次数（可重复成就每次都计）
    pub total_earned: u64,
    /// 获得过该成就的不同用户数
    pub unique_earners: u64,
    /// 有进度或有颁发记录的不同用户数
    pub eligible_users: u64,
    pub in_progress: u64,
    /// unique_earners / eligible_users，无合格用户时为 0
    pub completion_rate: f64,
    pub first_earned_at: Option<DateTime<Utc>>,
    pub last_earned_at: Option<DateTime<Utc>>,
}

/// 前置条件检查结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteCheck {
    pub achievement_id: Uuid,
    pub can_earn: bool,
    pub prerequisites: Vec<PrerequisiteStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteStatus {
    pub id: Uuid,
    pub name: String,
    pub is_met: bool,
    pub requires_completion: bool,
}

/// 前置成就摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteSummary {
    pub id: Uuid,
    pub name: String,
    pub requires_completion: bool,
}

/// 成就详情
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDetail {
    #[serde(flatten)]
    pub achievement: Achievement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<AchievementLevel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerequisites: Option<Vec<PrerequisiteSummary>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_normalization() {
        assert_eq!(PageRequest::new(0, 0), PageRequest { page: 1, page_size: 1 });
        assert_eq!(PageRequest::new(3, 500).page_size, 100);
    }

    #[test]
    fn test_paginate() {
        let page = PageResponse::paginate((1..=45).collect::<Vec<_>>(), PageRequest::new(3, 20));
        assert_eq!(page.items, (41..=45).collect::<Vec<_>>());
        assert_eq!(page.total, 45);
        assert_eq!(page.total_pages, 3);

        let empty = PageResponse::paginate(Vec::<i32>::new(), PageRequest::default());
        assert_eq!(empty.total_pages, 0);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_progress_outcome_serializes_camel_case() {
        let outcome = ProgressOutcome {
            previous_progress: 4,
            current_progress: 10,
            target_progress: 10,
            percentage: 100.0,
            is_completed: true,
            crossed: true,
            award: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["previousProgress"], 4);
        assert_eq!(json["crossed"], true);
        assert!(json.get("award").is_none());
    }
}
