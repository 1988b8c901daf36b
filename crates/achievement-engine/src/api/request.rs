//! 请求 DTO 定义
//!
//! 请求体与查询参数，使用 validator 做基础校验后再交给引擎。

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::{ContextValue, LeaderboardFilter};
use crate::service::{
    AchievementFilter, AchievementSort, AwardCommand, CreateAchievementCommand, LevelSpec,
    PageRequest, ProgressFilter, SortDirection, UpdateAchievementCommand, UpdateProgressCommand,
    UserAchievementFilter, UserAchievementSort,
};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

fn default_true() -> bool {
    true
}

fn page_request(page: Option<u32>, page_size: Option<u32>) -> PageRequest {
    let defaults = PageRequest::default();
    PageRequest::new(
        page.unwrap_or(defaults.page),
        page_size.unwrap_or(defaults.page_size),
    )
}

// ==================== 成就目录 ====================

/// 等级定义请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LevelRequest {
    #[validate(range(min = 1, message = "等级必须从 1 开始"))]
    pub level: i32,

    #[validate(length(min = 1, max = 100, message = "等级名称长度必须在1-100个字符之间"))]
    pub name: String,

    pub description: Option<String>,

    #[validate(range(min = 1, message = "requiredProgress 必须大于 0"))]
    pub required_progress: i64,

    #[validate(range(min = 0, message = "分值不能为负数"))]
    pub points: i32,

    #[validate(length(max = 512))]
    pub icon_url: Option<String>,

    #[validate(length(max = 32))]
    pub badge_color: Option<String>,
}

impl From<LevelRequest> for LevelSpec {
    fn from(req: LevelRequest) -> Self {
        Self {
            level: req.level,
            name: req.name,
            description: req.description,
            required_progress: req.required_progress,
            points: req.points,
            icon_url: req.icon_url,
            badge_color: req.badge_color,
        }
    }
}

/// 创建成就请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAchievementRequest {
    #[validate(length(min = 1, max = 200, message = "成就名称长度必须在1-200个字符之间"))]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,

    #[validate(length(min = 1, max = 64, message = "分类长度必须在1-64个字符之间"))]
    pub category: String,

    #[validate(length(min = 1, max = 64, message = "类型长度必须在1-64个字符之间"))]
    pub achievement_type: String,

    #[serde(default)]
    #[validate(range(min = 0, message = "分值不能为负数"))]
    pub points: i32,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub is_secret: bool,

    #[serde(default)]
    pub is_repeatable: bool,

    #[serde(default)]
    pub conditions: ContextValue,

    #[serde(default)]
    pub display_order: i32,

    #[serde(default)]
    #[validate(nested)]
    pub levels: Vec<LevelRequest>,
}

impl From<CreateAchievementRequest> for CreateAchievementCommand {
    fn from(req: CreateAchievementRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            category: req.category,
            achievement_type: req.achievement_type,
            points: req.points,
            is_active: req.is_active,
            is_secret: req.is_secret,
            is_repeatable: req.is_repeatable,
            conditions: req.conditions,
            display_order: req.display_order,
            levels: req.levels.into_iter().map(LevelSpec::from).collect(),
        }
    }
}

/// 更新成就请求，未传字段保持不变
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateAchievementRequest {
    #[validate(length(min = 1, max = 200, message = "成就名称长度必须在1-200个字符之间"))]
    pub name: Option<String>,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 64))]
    pub category: Option<String>,

    #[validate(length(min = 1, max = 64))]
    pub achievement_type: Option<String>,

    #[validate(range(min = 0, message = "分值不能为负数"))]
    pub points: Option<i32>,

    pub is_active: Option<bool>,
    pub is_secret: Option<bool>,
    pub is_repeatable: Option<bool>,
    pub conditions: Option<ContextValue>,
    pub display_order: Option<i32>,

    #[validate(nested)]
    pub levels: Option<Vec<LevelRequest>>,
}

impl From<UpdateAchievementRequest> for UpdateAchievementCommand {
    fn from(req: UpdateAchievementRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            category: req.category,
            achievement_type: req.achievement_type,
            points: req.points,
            is_active: req.is_active,
            is_secret: req.is_secret,
            is_repeatable: req.is_repeatable,
            conditions: req.conditions,
            display_order: req.display_order,
            levels: req
                .levels
                .map(|levels| levels.into_iter().map(LevelSpec::from).collect()),
        }
    }
}

/// 成就列表查询参数
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct ListAchievementsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<String>,
    pub achievement_type: Option<String>,
    pub is_active: Option<bool>,
    pub include_secret: Option<bool>,
    #[validate(length(max = 100))]
    pub search: Option<String>,
    pub sort: Option<AchievementSort>,
    pub direction: Option<SortDirection>,
}

impl ListAchievementsQuery {
    pub fn filter(&self) -> AchievementFilter {
        AchievementFilter {
            category: self.category.clone(),
            achievement_type: self.achievement_type.clone(),
            is_active: self.is_active,
            // 管理端列表默认包含隐藏成就
            include_secret: self.include_secret.unwrap_or(true),
            search: self.search.clone(),
        }
    }

    pub fn page_request(&self) -> PageRequest {
        page_request(self.page, self.page_size)
    }
}

/// 成就详情查询参数
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetAchievementQuery {
    pub include_levels: Option<bool>,
    pub include_prerequisites: Option<bool>,
}

// ==================== 前置条件 ====================

/// 添加前置条件请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddPrerequisiteRequest {
    pub prerequisite_id: Uuid,

    #[serde(default = "default_true")]
    pub requires_completion: bool,
}

// ==================== 颁发、进度与撤销 ====================

/// 手动颁发请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AwardRequest {
    #[validate(length(min = 1, max = 128, message = "用户ID长度必须在1-128个字符之间"))]
    pub user_id: String,

    pub achievement_id: Uuid,

    #[validate(range(min = 0, message = "进度不能为负数"))]
    pub progress: Option<i64>,

    #[validate(range(min = 1, message = "maxProgress 必须大于 0"))]
    pub max_progress: Option<i64>,

    pub level: Option<i32>,

    #[serde(default)]
    pub context: ContextValue,

    #[serde(default = "default_true")]
    pub notify_user: bool,
}

impl AwardRequest {
    pub fn into_command(self, tenant_id: &str, awarded_by: Option<String>) -> AwardCommand {
        let max_progress = self.max_progress.unwrap_or(1);
        AwardCommand {
            tenant_id: tenant_id.to_string(),
            user_id: self.user_id,
            achievement_id: self.achievement_id,
            progress: self.progress.unwrap_or(max_progress),
            max_progress,
            level: self.level,
            context: self.context,
            notify_user: self.notify_user,
            awarded_by,
        }
    }
}

/// 进度更新请求
///
/// 负增量不在此处拦截，由引擎统一返回 NEGATIVE_INCREMENT。
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    #[validate(length(min = 1, max = 128, message = "用户ID长度必须在1-128个字符之间"))]
    pub user_id: String,

    pub achievement_id: Uuid,

    pub increment: i64,

    #[serde(default)]
    pub context: ContextValue,

    #[serde(default)]
    pub auto_award: bool,
}

impl ProgressRequest {
    pub fn into_command(self, tenant_id: &str, actor: Option<String>) -> UpdateProgressCommand {
        UpdateProgressCommand {
            tenant_id: tenant_id.to_string(),
            user_id: self.user_id,
            achievement_id: self.achievement_id,
            increment: self.increment,
            context: self.context,
            auto_award: self.auto_award,
            actor,
        }
    }
}

/// 撤销查询参数
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct RevokeQuery {
    #[validate(length(max = 500, message = "撤销原因不能超过500个字符"))]
    pub reason: Option<String>,
}

// ==================== 用户查询 ====================

/// 用户成就列表查询参数
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct UserAchievementsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<String>,
    pub achievement_type: Option<String>,
    pub is_completed: Option<bool>,
    pub earned_from: Option<DateTime<Utc>>,
    pub earned_to: Option<DateTime<Utc>>,
    pub sort: Option<UserAchievementSort>,
    pub direction: Option<SortDirection>,
}

impl UserAchievementsQuery {
    pub fn filter(&self) -> UserAchievementFilter {
        UserAchievementFilter {
            category: self.category.clone(),
            achievement_type: self.achievement_type.clone(),
            is_completed: self.is_completed,
            earned_from: self.earned_from,
            earned_to: self.earned_to,
        }
    }

    pub fn page_request(&self) -> PageRequest {
        page_request(self.page, self.page_size)
    }
}

/// 用户进度查询参数
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressQuery {
    pub category: Option<String>,
    pub in_progress_only: Option<bool>,
}

impl ProgressQuery {
    pub fn filter(&self) -> ProgressFilter {
        ProgressFilter {
            category: self.category.clone(),
            in_progress_only: self.in_progress_only.unwrap_or(false),
        }
    }
}

/// 用户汇总查询参数
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryQuery {
    #[validate(range(min = 1, max = 50, message = "recentLimit 必须在1-50之间"))]
    pub recent_limit: Option<usize>,

    #[validate(range(max = 100, message = "nearCompletionPct 不能超过100"))]
    pub near_completion_pct: Option<u8>,
}

/// 可获得成就查询参数
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct AvailableQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<String>,
    pub achievement_type: Option<String>,
    pub include_secret: Option<bool>,
    #[validate(length(max = 100))]
    pub search: Option<String>,
}

impl AvailableQuery {
    pub fn filter(&self) -> AchievementFilter {
        AchievementFilter {
            category: self.category.clone(),
            achievement_type: self.achievement_type.clone(),
            is_active: Some(true),
            include_secret: self.include_secret.unwrap_or(false),
            search: self.search.clone(),
        }
    }

    pub fn page_request(&self) -> PageRequest {
        page_request(self.page, self.page_size)
    }
}

// ==================== 排行榜 ====================

/// 排行榜查询参数
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaderboardQuery {
    #[validate(range(min = 1, max = 100, message = "limit 必须在1-100之间"))]
    pub limit: Option<usize>,
    pub category: Option<String>,
    pub achievement_type: Option<String>,
    pub earned_from: Option<DateTime<Utc>>,
    pub earned_to: Option<DateTime<Utc>>,
}

impl LeaderboardQuery {
    pub fn filter(&self) -> LeaderboardFilter {
        LeaderboardFilter {
            category: self.category.clone(),
            achievement_type: self.achievement_type.clone(),
            earned_from: self.earned_from,
            earned_to: self.earned_to,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
    }
}
