//! 集成测试公共工具

#![allow(dead_code)]

use std::sync::Arc;

use achievement_engine::AchievementEngine;
use achievement_engine::events::InMemoryEventSink;
use achievement_engine::models::{Achievement, AchievementProgress};
use achievement_engine::repository::{AchievementStore, MemoryStore};
use achievement_engine::service::CreateAchievementCommand;
use achievement_shared::config::EngineConfig;
use uuid::Uuid;

pub const TENANT: &str = "tenant-a";

pub struct TestContext {
    pub engine: Arc<AchievementEngine<MemoryStore>>,
    pub sink: Arc<InMemoryEventSink>,
}

impl TestContext {
    pub fn new() -> Self {
        let config = EngineConfig {
            max_progress: 1_000_000,
            ..EngineConfig::default()
        };
        let sink = Arc::new(InMemoryEventSink::new());
        let engine = AchievementEngine::local(Arc::new(MemoryStore::new()), sink.clone(), &config);
        Self {
            engine: Arc::new(engine),
            sink,
        }
    }

    pub async fn create(&self, name: &str, points: i32, repeatable: bool) -> Achievement {
        self.create_with(CreateAchievementCommand {
            name: name.to_string(),
            category: "general".to_string(),
            achievement_type: "milestone".to_string(),
            points,
            is_active: true,
            is_repeatable: repeatable,
            ..Default::default()
        })
        .await
    }

    pub async fn create_with(&self, cmd: CreateAchievementCommand) -> Achievement {
        self.engine
            .create_achievement(TENANT, cmd, Some("admin"))
            .await
            .unwrap()
            .achievement
    }

    /// 预先写入进度行以设定完成阈值
    pub async fn seed_target(&self, user_id: &str, achievement_id: Uuid, target: i64) {
        let mut progress = AchievementProgress::new(TENANT, user_id, achievement_id);
        progress.target_progress = target;
        self.engine
            .store()
            .save_progress(&progress, &[])
            .await
            .unwrap();
    }

    pub async fn stored_progress(&self, user_id: &str, achievement_id: Uuid) -> AchievementProgress {
        self.engine
            .store()
            .get_progress(TENANT, user_id, achievement_id)
            .await
            .unwrap()
            .unwrap()
    }

    /// 等待提交后的后台投递结束并投递剩余事件
    pub async fn flush(&self) {
        self.engine.dispatcher().dispatch_pending().await.unwrap();
    }

    pub async fn total_points(&self, user_id: &str) -> i64 {
        self.engine
            .get_user_summary(TENANT, user_id, None, None)
            .await
            .unwrap()
            .total_points
    }
}
