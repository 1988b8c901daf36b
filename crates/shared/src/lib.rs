//! 共享基础设施库
//!
//! 包含配置、错误处理、数据库连接、缓存、Kafka、事件信封与可观测性等
//! 与业务无关的基础设施代码。

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod kafka;
pub mod observability;
