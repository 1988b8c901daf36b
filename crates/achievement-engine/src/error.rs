//! 成就引擎错误类型
//!
//! 每个具体错误都归入四类之一：未找到、冲突、参数非法、失败。
//! 调用方对前三类视为本次事件的终态，对失败类可按自身策略重试。

use achievement_shared::error::InfraError;
use thiserror::Error;
use uuid::Uuid;

/// 错误大类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Invalid,
    Failure,
}

/// 成就引擎错误类型
#[derive(Debug, Error)]
pub enum AchievementError {
    // === 成就目录 ===
    #[error("成就不存在: {0}")]
    AchievementNotFound(Uuid),

    #[error("成就已停用: {0}")]
    AchievementInactive(Uuid),

    #[error("成就名称已存在: {0}")]
    DuplicateName(String),

    #[error("前置条件会形成循环: achievement_id={achievement_id}, prerequisite_id={prerequisite_id}")]
    PrerequisiteCycle {
        achievement_id: Uuid,
        prerequisite_id: Uuid,
    },

    // === 用户成就 ===
    #[error("用户成就不存在: {0}")]
    UserAchievementNotFound(Uuid),

    #[error("用户已拥有该成就: user_id={user_id}, achievement_id={achievement_id}")]
    AlreadyEarned {
        user_id: String,
        achievement_id: Uuid,
    },

    // === 参数错误 ===
    #[error("进度增量不能为负数: {0}")]
    NegativeIncrement(i64),

    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("存储数据损坏: {0}")]
    CorruptData(String),

    #[error("缓存错误: {0}")]
    Cache(String),

    #[error("事件发布失败: {0}")]
    EventPublish(String),

    #[error("操作超时: {operation}")]
    Timeout { operation: String },

    #[error("资源正被其他请求处理，请重试: {resource}")]
    LockConflict { resource: String },

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 成就引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, AchievementError>;

impl AchievementError {
    /// 错误大类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AchievementNotFound(_)
            | Self::AchievementInactive(_)
            | Self::UserAchievementNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyEarned { .. } | Self::DuplicateName(_) => ErrorKind::Conflict,
            Self::NegativeIncrement(_) | Self::Validation(_) | Self::PrerequisiteCycle { .. } => {
                ErrorKind::Invalid
            }
            Self::Database(_)
            | Self::Serialization(_)
            | Self::CorruptData(_)
            | Self::Cache(_)
            | Self::EventPublish(_)
            | Self::Timeout { .. }
            | Self::LockConflict { .. }
            | Self::Internal(_) => ErrorKind::Failure,
        }
    }

    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Failure
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        self.kind() != ErrorKind::Failure
    }

    /// 瞬时故障：存储/传输暂不可用，稍后重试大概率成功
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Cache(_)
                | Self::EventPublish(_)
                | Self::Timeout { .. }
                | Self::LockConflict { .. }
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AchievementNotFound(_) => "ACHIEVEMENT_NOT_FOUND",
            Self::AchievementInactive(_) => "ACHIEVEMENT_INACTIVE",
            Self::DuplicateName(_) => "DUPLICATE_NAME",
            Self::PrerequisiteCycle { .. } => "PREREQUISITE_CYCLE",
            Self::UserAchievementNotFound(_) => "USER_ACHIEVEMENT_NOT_FOUND",
            Self::AlreadyEarned { .. } => "ALREADY_EARNED",
            Self::NegativeIncrement(_) => "NEGATIVE_INCREMENT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::CorruptData(_) => "CORRUPT_DATA",
            Self::Cache(_) => "CACHE_ERROR",
            Self::EventPublish(_) => "EVENT_PUBLISH_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::LockConflict { .. } => "LOCK_CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<InfraError> for AchievementError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::Database(e) => Self::Database(e),
            InfraError::Serialization(e) => Self::Serialization(e),
            InfraError::Redis(e) => Self::Cache(e.to_string()),
            InfraError::Kafka(msg) => Self::EventPublish(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
