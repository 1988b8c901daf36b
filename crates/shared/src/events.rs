//! 事件信封模型
//!
//! 成就系统对外发布的所有事件都包装在统一信封中，下游（通知、审计、
//! 排行榜缓存）只依赖信封格式与 `data` 中的反规范化字段，无需回查引擎。

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InfraError;

// ---------------------------------------------------------------------------
// EventType 事件类型枚举
// ---------------------------------------------------------------------------

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    AchievementCreated,
    AchievementUpdated,
    AchievementDeleted,
    AchievementEarned,
    AchievementProgressUpdated,
    AchievementRevoked,
}

impl EventType {
    /// 与用户相关的事件按用户分区，目录事件按成就分区
    pub fn is_user_scoped(&self) -> bool {
        matches!(
            self,
            Self::AchievementEarned | Self::AchievementProgressUpdated | Self::AchievementRevoked
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AchievementCreated => "ACHIEVEMENT_CREATED",
            Self::AchievementUpdated => "ACHIEVEMENT_UPDATED",
            Self::AchievementDeleted => "ACHIEVEMENT_DELETED",
            Self::AchievementEarned => "ACHIEVEMENT_EARNED",
            Self::AchievementProgressUpdated => "ACHIEVEMENT_PROGRESS_UPDATED",
            Self::AchievementRevoked => "ACHIEVEMENT_REVOKED",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = InfraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACHIEVEMENT_CREATED" => Ok(Self::AchievementCreated),
            "ACHIEVEMENT_UPDATED" => Ok(Self::AchievementUpdated),
            "ACHIEVEMENT_DELETED" => Ok(Self::AchievementDeleted),
            "ACHIEVEMENT_EARNED" => Ok(Self::AchievementEarned),
            "ACHIEVEMENT_PROGRESS_UPDATED" => Ok(Self::AchievementProgressUpdated),
            "ACHIEVEMENT_REVOKED" => Ok(Self::AchievementRevoked),
            other => Err(InfraError::Internal(format!("未知事件类型: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// EventEnvelope 通用事件信封
// ---------------------------------------------------------------------------

/// 通用事件信封
///
/// - `event_id`（UUID v7）供消费者去重，投递语义为至少一次
/// - `partition_key` 作为 Kafka 消息 key，保证同一用户的事件有序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub tenant_id: String,
    pub partition_key: String,
    pub occurred_at: DateTime<Utc>,
    /// 触发事件的操作者（管理员、系统任务等）
    pub actor: Option<String>,
    pub source: String,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// 将 `data` 解析为具体的事件负载类型
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, InfraError> {
        serde_json::from_value(self.data.clone()).map_err(InfraError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_serialization_matches_display() {
        let all = [
            EventType::AchievementCreated,
            EventType::AchievementUpdated,
            EventType::AchievementDeleted,
            EventType::AchievementEarned,
            EventType::AchievementProgressUpdated,
            EventType::AchievementRevoked,
        ];
        for event_type in all {
            let json = serde_json::to_string(&event_type).unwrap();
            assert_eq!(json, format!("\"{}\"", event_type));
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), event_type);
        }
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        assert!("BADGE_GRANTED".parse::<EventType>().is_err());
    }

    #[test]
    fn test_user_scoped_classification() {
        assert!(EventType::AchievementEarned.is_user_scoped());
        assert!(EventType::AchievementRevoked.is_user_scoped());
        assert!(!EventType::AchievementCreated.is_user_scoped());
    }

    #[test]
    fn test_envelope_camel_case_and_decode() {
        #[derive(Debug, Deserialize, PartialEq)]
        #[serde(rename_all = "camelCase")]
        struct Payload {
            points_lost: i32,
        }

        let envelope = EventEnvelope {
            event_id: Uuid::now_v7(),
            event_type: EventType::AchievementRevoked,
            tenant_id: "t1".to_string(),
            partition_key: "u1".to_string(),
            occurred_at: Utc::now(),
            actor: Some("admin".to_string()),
            source: "achievement-engine".to_string(),
            data: serde_json::json!({ "pointsLost": 10 }),
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["eventType"], "ACHIEVEMENT_REVOKED");
        assert_eq!(json["partitionKey"], "u1");

        let payload: Payload = envelope.decode().unwrap();
        assert_eq!(payload, Payload { points_lost: 10 });
    }
}
