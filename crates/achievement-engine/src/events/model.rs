//! 成就领域事件
//!
//! 事件与状态变更写入同一事务（outbox），由 `OutboxDispatcher` 异步投递。
//! 每个负载都携带名称、分类、分值等反规范化字段，消费者无需回查。

use achievement_shared::events::{EventEnvelope, EventType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Achievement, AchievementProgress, ContextValue, UserAchievement};

/// 事件来源标识
pub const EVENT_SOURCE: &str = "achievement-engine";

/// 目录变更（创建/更新/删除）负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementChanged {
    pub achievement_id: Uuid,
    pub name: String,
    pub category: String,
    pub achievement_type: String,
    pub points: i32,
    pub is_active: bool,
    pub is_repeatable: bool,
}

impl From<&Achievement> for AchievementChanged {
    fn from(a: &Achievement) -> Self {
        Self {
            achievement_id: a.id,
            name: a.name.clone(),
            category: a.category.clone(),
            achievement_type: a.achievement_type.clone(),
            points: a.points,
            is_active: a.is_active,
            is_repeatable: a.is_repeatable,
        }
    }
}

/// 获得成就负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementEarned {
    pub user_achievement_id: Uuid,
    pub user_id: String,
    pub achievement_id: Uuid,
    pub name: String,
    pub category: String,
    pub points: i32,
    pub level: Option<i32>,
    pub earn_count: i32,
    pub context: ContextValue,
    pub notify_user: bool,
    pub earned_at: DateTime<Utc>,
}

/// 进度更新负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdated {
    pub user_id: String,
    pub achievement_id: Uuid,
    pub name: String,
    pub category: String,
    pub previous_progress: i64,
    pub current_progress: i64,
    pub target_progress: i64,
    pub percentage: f64,
    pub is_completed: bool,
    /// 本次更新是否跨过完成阈值
    pub crossed: bool,
    pub context: ContextValue,
}

/// 撤销负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementRevoked {
    pub user_achievement_id: Uuid,
    pub user_id: String,
    pub achievement_id: Uuid,
    pub name: String,
    pub category: String,
    /// 下游据此重算总分
    pub points_lost: i32,
    pub earn_count: i32,
    pub reason: Option<String>,
}

/// 领域事件
#[derive(Debug, Clone, PartialEq)]
pub enum AchievementEvent {
    Created(AchievementChanged),
    Updated(AchievementChanged),
    Deleted(AchievementChanged),
    Earned(AchievementEarned),
    ProgressUpdated(ProgressUpdated),
    Revoked(AchievementRevoked),
}

impl AchievementEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Created(_) => EventType::AchievementCreated,
            Self::Updated(_) => EventType::AchievementUpdated,
            Self::Deleted(_) => EventType::AchievementDeleted,
            Self::Earned(_) => EventType::AchievementEarned,
            Self::ProgressUpdated(_) => EventType::AchievementProgressUpdated,
            Self::Revoked(_) => EventType::AchievementRevoked,
        }
    }

    /// 分区键：用户事件按用户，目录事件按成就
    pub fn partition_key(&self) -> String {
        match self {
            Self::Created(e) | Self::Updated(e) | Self::Deleted(e) => e.achievement_id.to_string(),
            Self::Earned(e) => e.user_id.clone(),
            Self::ProgressUpdated(e) => e.user_id.clone(),
            Self::Revoked(e) => e.user_id.clone(),
        }
    }

    fn data(&self) -> Result<serde_json::Value> {
        let value = match self {
            Self::Created(e) | Self::Updated(e) | Self::Deleted(e) => serde_json::to_value(e)?,
            Self::Earned(e) => serde_json::to_value(e)?,
            Self::ProgressUpdated(e) => serde_json::to_value(e)?,
            Self::Revoked(e) => serde_json::to_value(e)?,
        };
        Ok(value)
    }

    /// 构建待写入 outbox 的记录
    pub fn into_outbox(self, tenant_id: &str, actor: Option<&str>) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: Uuid::now_v7(),
            tenant_id: tenant_id.to_string(),
            event_type: self.event_type(),
            partition_key: self.partition_key(),
            actor: actor.map(str::to_string),
            payload: self.data()?,
            created_at: Utc::now(),
        })
    }

    pub fn earned(award: &UserAchievement, achievement: &Achievement, notify_user: bool) -> Self {
        Self::Earned(AchievementEarned {
            user_achievement_id: award.id,
            user_id: award.user_id.clone(),
            achievement_id: achievement.id,
            name: achievement.name.clone(),
            category: achievement.category.clone(),
            points: award.points_earned,
            level: award.level,
            earn_count: award.earn_count,
            context: award.context.clone(),
            notify_user,
            earned_at: award.earned_at,
        })
    }

    pub fn progress_updated(
        achievement: &Achievement,
        progress: &AchievementProgress,
        previous_progress: i64,
        crossed: bool,
    ) -> Self {
        Self::ProgressUpdated(ProgressUpdated {
            user_id: progress.user_id.clone(),
            achievement_id: achievement.id,
            name: achievement.name.clone(),
            category: achievement.category.clone(),
            previous_progress,
            current_progress: progress.current_progress,
            target_progress: progress.target_progress,
            percentage: progress.percentage(),
            is_completed: progress.is_completed,
            crossed,
            context: progress.context.clone(),
        })
    }

    pub fn revoked(
        award: &UserAchievement,
        achievement: Option<&Achievement>,
        reason: Option<&str>,
    ) -> Self {
        Self::Revoked(AchievementRevoked {
            user_achievement_id: award.id,
            user_id: award.user_id.clone(),
            achievement_id: award.achievement_id,
            name: achievement.map(|a| a.name.clone()).unwrap_or_default(),
            category: achievement.map(|a| a.category.clone()).unwrap_or_default(),
            points_lost: award.points_earned,
            earn_count: award.earn_count,
            reason: reason.map(str::to_string),
        })
    }
}

/// outbox 记录
///
/// 与状态变更同事务写入，投递成功后标记为已发布。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEvent {
    pub id: Uuid,
    pub tenant_id: String,
    pub event_type: EventType,
    pub partition_key: String,
    pub actor: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// 转换为传输信封，outbox id 即事件 id，重复投递时消费者可据此去重
    pub fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope {
            event_id: self.id,
            event_type: self.event_type,
            tenant_id: self.tenant_id.clone(),
            partition_key: self.partition_key.clone(),
            occurred_at: self.created_at,
            actor: self.actor.clone(),
            source: EVENT_SOURCE.to_string(),
            data: self.payload.clone(),
        }
    }
}
