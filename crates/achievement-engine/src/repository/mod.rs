//! 存储层
//!
//! `AchievementStore` 定义引擎需要的全部持久化契约，提供内存与 PostgreSQL 两种实现，
//! 以及统一施加调用超时的装饰器。

mod memory_store;
mod pg_store;
mod timeout_store;
mod traits;

pub use memory_store::MemoryStore;
pub use pg_store::PgStore;
pub use timeout_store::TimeoutStore;
pub use traits::AchievementStore;

#[cfg(test)]
pub use traits::MockAchievementStore;

/// 数据库迁移
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
