//! 进度与颁发记录模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ContextValue;

/// 进度累加器
///
/// 每个 (tenant, user, achievement) 一行，每次进度信号到达都会更新。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementProgress {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: String,
    pub achievement_id: Uuid,
    pub current_progress: i64,
    pub target_progress: i64,
    pub is_completed: bool,
    pub last_updated: DateTime<Utc>,
    pub context: ContextValue,
}

impl AchievementProgress {
    /// 首次收到进度时创建的空行，目标默认为 1
    pub fn new(tenant_id: &str, user_id: &str, achievement_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            achievement_id,
            current_progress: 0,
            target_progress: 1,
            is_completed: false,
            last_updated: Utc::now(),
            context: ContextValue::Null,
        }
    }

    /// 完成百分比，0..=100
    pub fn percentage(&self) -> f64 {
        progress_percentage(self.current_progress, self.target_progress)
    }

    /// 进行中：已有进度但未完成
    pub fn is_in_progress(&self) -> bool {
        self.current_progress > 0 && !self.is_completed
    }
}

/// 完成百分比，目标非正时视为已满
pub fn progress_percentage(current: i64, target: i64) -> f64 {
    if target <= 0 {
        return 100.0;
    }
    ((current.max(0) as f64 / target as f64) * 100.0).min(100.0)
}

/// 用户成就（颁发记录）
///
/// 创建后不再修改，`points_earned` 固定为颁发时的分值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievement {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: String,
    pub achievement_id: Uuid,
    pub earned_at: DateTime<Utc>,
    pub level: Option<i32>,
    /// 颁发时的进度快照
    pub progress: i64,
    pub max_progress: i64,
    pub is_completed: bool,
    pub is_notified: bool,
    pub context: ContextValue,
    pub points_earned: i32,
    /// 第几次获得（可重复成就递增，不可重复成就恒为 1）
    pub earn_count: i32,
    pub awarded_by: Option<String>,
}
