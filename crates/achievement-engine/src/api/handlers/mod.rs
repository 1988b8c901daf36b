//! API 处理器
//!
//! ## 模块结构
//!
//! - `achievement`: 成就目录、前置条件维护与统计
//! - `award`: 颁发、撤销与进度上报
//! - `user`: 用户维度查询
//! - `leaderboard`: 排行榜
//! - `health`: 健康检查

pub mod achievement;
pub mod award;
pub mod health;
pub mod leaderboard;
pub mod user;
