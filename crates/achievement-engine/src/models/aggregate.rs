//! 聚合查询模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 排行榜过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardFilter {
    pub category: Option<String>,
    pub achievement_type: Option<String>,
    /// 只统计该时间之后（含）获得的成就
    pub earned_from: Option<DateTime<Utc>>,
    pub earned_to: Option<DateTime<Utc>>,
}

impl LeaderboardFilter {
    /// 缓存键片段，相同过滤条件得到相同片段
    pub fn cache_variant(&self, limit: usize) -> String {
        format!(
            "c={}|t={}|f={}|u={}|n={}",
            self.category.as_deref().unwrap_or("*"),
            self.achievement_type.as_deref().unwrap_or("*"),
            self.earned_from.map(|t| t.timestamp()).unwrap_or_default(),
            self.earned_to.map(|t| t.timestamp()).unwrap_or_default(),
            limit
        )
    }

    pub fn accepts_earned_at(&self, earned_at: DateTime<Utc>) -> bool {
        self.earned_from.is_none_or(|from| earned_at >= from)
            && self.earned_to.is_none_or(|to| earned_at <= to)
    }
}

/// 按用户聚合的分值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPoints {
    pub user_id: String,
    pub total_points: i64,
    pub total_achievements: i64,
}
