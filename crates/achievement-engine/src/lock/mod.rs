//! 锁模块
//!
//! 同一 (租户, 用户, 成就) 的所有写操作在锁内串行执行。
//!
//! ```ignore
//! let key = LockManager::progress_key(tenant_id, user_id, achievement_id);
//! let guard = lock_manager.acquire(&key).await?;
//! do_critical_work().await?;
//! guard.release().await?;
//! ```

mod lock_manager;

pub use lock_manager::{LockConfig, LockGuard, LockManager};
