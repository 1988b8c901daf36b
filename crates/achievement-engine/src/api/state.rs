//! 应用状态
//!
//! 在所有 handler 之间共享的引擎实例

use std::sync::Arc;

use crate::engine::AchievementEngine;
use crate::repository::AchievementStore;

/// 应用共享状态
pub struct AppState<S: AchievementStore + 'static> {
    pub engine: Arc<AchievementEngine<S>>,
    pub service_name: String,
}

impl<S: AchievementStore + 'static> AppState<S> {
    pub fn new(engine: Arc<AchievementEngine<S>>, service_name: impl Into<String>) -> Self {
        Self {
            engine,
            service_name: service_name.into(),
        }
    }
}

// 派生 Clone 会要求 S: Clone，这里只克隆 Arc
impl<S: AchievementStore + 'static> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            service_name: self.service_name.clone(),
        }
    }
}
