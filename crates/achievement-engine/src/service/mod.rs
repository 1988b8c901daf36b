//! 服务层
//!
//! ## 模块结构
//!
//! - `dto`: 命令、过滤条件与视图
//! - `progress_service`: 进度累加与阈值检测
//! - `award_service`: 颁发与自动颁发
//! - `prerequisite_service`: 前置条件检查与维护
//! - `revoke_service`: 撤销
//! - `query_service`: 只读查询（列表、汇总、排行榜、统计）
//! - `catalog_service`: 成就目录管理

pub mod award_service;
pub mod catalog_service;
pub mod dto;
pub mod prerequisite_service;
pub mod progress_service;
pub mod query_service;
pub mod revoke_service;

pub use award_service::AwardService;
pub use catalog_service::CatalogService;
pub use dto::*;
pub use prerequisite_service::{PrerequisiteGraph, PrerequisiteResolver};
pub use progress_service::{ProgressStep, ProgressTracker};
pub use query_service::QueryService;
pub use revoke_service::RevokeService;
