//! 成就目录模型
//!
//! 成就、等级与前置条件各自独立存储，关系只通过 id 引用表达。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ContextValue;

/// 成就定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: Uuid,
    pub tenant_id: String,
    /// 租户内唯一
    pub name: String,
    pub description: String,
    pub category: String,
    pub achievement_type: String,
    /// 基础分值
    pub points: i32,
    pub is_active: bool,
    /// 隐藏成就不出现在发现类列表中
    pub is_secret: bool,
    pub is_repeatable: bool,
    /// 条件描述，引擎不解析
    pub conditions: ContextValue,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Achievement {
    /// 文本检索（名称或描述，大小写不敏感）
    pub fn matches_search(&self, keyword: &str) -> bool {
        let keyword = keyword.trim().to_lowercase();
        keyword.is_empty()
            || self.name.to_lowercase().contains(&keyword)
            || self.description.to_lowercase().contains(&keyword)
    }
}

/// 成就等级
///
/// 带等级的颁发使用等级分值覆盖成就基础分值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementLevel {
    pub id: Uuid,
    pub achievement_id: Uuid,
    pub level: i32,
    pub name: String,
    pub description: Option<String>,
    pub required_progress: i64,
    pub points: i32,
    pub icon_url: Option<String>,
    pub badge_color: Option<String>,
}

/// 前置条件边：`achievement_id` 依赖 `prerequisite_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementPrerequisite {
    pub id: Uuid,
    pub tenant_id: String,
    pub achievement_id: Uuid,
    pub prerequisite_id: Uuid,
    /// 为 true 时前置成就必须已完成才算满足
    pub requires_completion: bool,
    pub created_at: DateTime<Utc>,
}
