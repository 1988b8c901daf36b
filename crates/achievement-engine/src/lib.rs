//! 成就进度与颁发引擎
//!
//! 跟踪用户在成就上的进度，跨过完成阈值时颁发成就，并提供撤销、
//! 前置条件检查与汇总查询。
//!
//! ## 核心功能
//!
//! - **进度跟踪**：按 (租户, 用户, 成就) 累加进度，检测由未完成到完成的跨越
//! - **颁发**：手动颁发与跨阈值自动颁发，不可重复成就至多一条记录
//! - **撤销**：删除颁发记录并重置完成状态，之后可再次获得
//! - **查询**：用户成就、进度、汇总、可获得列表、排行榜与统计
//! - **事件**：状态变更与 outbox 事件同事务写入，提交后投递
//!
//! ## 模块结构
//!
//! - `models`: 领域模型
//! - `repository`: 存储接口与 PostgreSQL / 内存实现
//! - `lock`: 按键加锁（本地 + 可选 Redis）
//! - `events`: 领域事件、outbox 投递与事件通道
//! - `service`: 各业务组件
//! - `engine`: 对外门面
//! - `api`: HTTP 接口
//! - `error`: 错误类型定义

pub mod api;
pub mod engine;
pub mod error;
pub mod events;
pub mod lock;
pub mod models;
pub mod repository;
pub mod service;

pub use engine::AchievementEngine;
pub use error::{AchievementError, ErrorKind, Result};
