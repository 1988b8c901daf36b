//! 成就引擎领域模型
//!
//! 每类记录独立成表，关系只保存 id，通过仓储显式查找。

pub mod achievement;
pub mod aggregate;
pub mod context;
pub mod progress;

pub use achievement::{Achievement, AchievementLevel, AchievementPrerequisite};
pub use aggregate::{LeaderboardFilter, UserPoints};
pub use context::ContextValue;
pub use progress::{AchievementProgress, UserAchievement, progress_percentage};
