//! 成就目录管理服务
//!
//! 创建、更新、停用或删除成就。曾被获得过的成就只能停用，不能删除；
//! 修改基础分值不影响已有颁发记录。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AchievementError, Result};
use crate::events::{AchievementChanged, AchievementEvent};
use crate::models::Achievement;
use crate::repository::AchievementStore;
use crate::service::dto::{
    AchievementDetail, CreateAchievementCommand, LevelSpec, PrerequisiteSummary, RemovalOutcome,
    UpdateAchievementCommand,
};

const MAX_NAME_LEN: usize = 200;

/// 成就目录管理服务
pub struct CatalogService<S: AchievementStore> {
    store: Arc<S>,
}

impl<S: AchievementStore> CatalogService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// 创建成就
    #[instrument(skip(self, cmd), fields(name = %cmd.name))]
    pub async fn create_achievement(
        &self,
        tenant_id: &str,
        cmd: CreateAchievementCommand,
        actor: Option<&str>,
    ) -> Result<AchievementDetail> {
        let name = validate_name(&cmd.name)?;
        validate_points(cmd.points)?;
        validate_levels(&cmd.levels)?;

        if self
            .store
            .find_achievement_by_name(tenant_id, &name)
            .await?
            .is_some()
        {
            return Err(AchievementError::DuplicateName(name));
        }

        let now = Utc::now();
        let achievement = Achievement {
            id: Uuid::now_v7(),
            tenant_id: tenant_id.to_string(),
            name,
            description: cmd.description,
            category: cmd.category,
            achievement_type: cmd.achievement_type,
            points: cmd.points,
            is_active: cmd.is_active,
            is_secret: cmd.is_secret,
            is_repeatable: cmd.is_repeatable,
            conditions: cmd.conditions,
            display_order: cmd.display_order,
            created_at: now,
            updated_at: now,
        };

        let mut levels: Vec<_> = cmd
            .levels
            .into_iter()
            .map(|l| l.into_level(achievement.id))
            .collect();
        levels.sort_by_key(|l| l.level);

        let events = [AchievementEvent::Created(AchievementChanged::from(&achievement))
            .into_outbox(tenant_id, actor)?];
        self.store
            .insert_achievement(&achievement, &levels, &events)
            .await?;

        info!(achievement_id = %achievement.id, "成就已创建");
        Ok(AchievementDetail {
            achievement,
            levels: Some(levels),
            prerequisites: None,
        })
    }

    /// 部分更新成就
    #[instrument(skip(self, cmd))]
    pub async fn update_achievement(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        cmd: UpdateAchievementCommand,
        actor: Option<&str>,
    ) -> Result<Achievement> {
        let mut achievement = self.load(tenant_id, achievement_id).await?;

        if let Some(name) = cmd.name {
            let name = validate_name(&name)?;
            if name != achievement.name
                && self
                    .store
                    .find_achievement_by_name(tenant_id, &name)
                    .await?
                    .is_some_and(|other| other.id != achievement_id)
            {
                return Err(AchievementError::DuplicateName(name));
            }
            achievement.name = name;
        }
        if let Some(points) = cmd.points {
            validate_points(points)?;
            achievement.points = points;
        }
        if let Some(levels) = &cmd.levels {
            validate_levels(levels)?;
        }

        if let Some(description) = cmd.description {
            achievement.description = description;
        }
        if let Some(category) = cmd.category {
            achievement.category = category;
        }
        if let Some(achievement_type) = cmd.achievement_type {
            achievement.achievement_type = achievement_type;
        }
        if let Some(is_active) = cmd.is_active {
            achievement.is_active = is_active;
        }
        if let Some(is_secret) = cmd.is_secret {
            achievement.is_secret = is_secret;
        }
        if let Some(is_repeatable) = cmd.is_repeatable {
            achievement.is_repeatable = is_repeatable;
        }
        if let Some(conditions) = cmd.conditions {
            achievement.conditions = conditions;
        }
        if let Some(display_order) = cmd.display_order {
            achievement.display_order = display_order;
        }
        achievement.updated_at = Utc::now();

        let levels = cmd.levels.map(|specs| {
            let mut levels: Vec<_> = specs
                .into_iter()
                .map(|l| l.into_level(achievement_id))
                .collect();
            levels.sort_by_key(|l| l.level);
            levels
        });

        let events = [AchievementEvent::Updated(AchievementChanged::from(&achievement))
            .into_outbox(tenant_id, actor)?];
        self.store
            .update_achievement(&achievement, levels, &events)
            .await?;

        info!("成就已更新");
        Ok(achievement)
    }

    /// 从未被获得过则删除，否则停用
    #[instrument(skip(self))]
    pub async fn deactivate_or_delete(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        actor: Option<&str>,
    ) -> Result<RemovalOutcome> {
        let mut achievement = self.load(tenant_id, achievement_id).await?;

        let deleted_event = AchievementEvent::Deleted(AchievementChanged::from(&achievement))
            .into_outbox(tenant_id, actor)?;
        if self
            .store
            .delete_achievement_if_unearned(tenant_id, achievement_id, &[deleted_event])
            .await?
        {
            info!("成就从未被获得，已删除");
            return Ok(RemovalOutcome::Deleted);
        }

        if !achievement.is_active {
            return Ok(RemovalOutcome::Deactivated);
        }

        achievement.is_active = false;
        achievement.updated_at = Utc::now();
        let events = [AchievementEvent::Updated(AchievementChanged::from(&achievement))
            .into_outbox(tenant_id, actor)?];
        self.store
            .update_achievement(&achievement, None, &events)
            .await?;

        info!("成就已有颁发记录，已停用");
        Ok(RemovalOutcome::Deactivated)
    }

    /// 成就详情，可选附带等级与前置条件
    #[instrument(skip(self))]
    pub async fn get_achievement(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        include_levels: bool,
        include_prerequisites: bool,
    ) -> Result<AchievementDetail> {
        let achievement = self.load(tenant_id, achievement_id).await?;

        let levels = if include_levels {
            Some(self.store.list_levels(tenant_id, achievement_id).await?)
        } else {
            None
        };

        let prerequisites = if include_prerequisites {
            let edges = self
                .store
                .list_prerequisites(tenant_id, achievement_id)
                .await?;
            let names: HashMap<Uuid, String> = if edges.is_empty() {
                HashMap::new()
            } else {
                self.store
                    .list_achievements(tenant_id)
                    .await?
                    .into_iter()
                    .map(|a| (a.id, a.name))
                    .collect()
            };
            Some(
                edges
                    .into_iter()
                    .map(|e| PrerequisiteSummary {
                        id: e.prerequisite_id,
                        name: names.get(&e.prerequisite_id).cloned().unwrap_or_default(),
                        requires_completion: e.requires_completion,
                    })
                    .collect(),
            )
        } else {
            None
        };

        Ok(AchievementDetail {
            achievement,
            levels,
            prerequisites,
        })
    }

    async fn load(&self, tenant_id: &str, achievement_id: Uuid) -> Result<Achievement> {
        self.store
            .get_achievement(tenant_id, achievement_id)
            .await?
            .ok_or(AchievementError::AchievementNotFound(achievement_id))
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AchievementError::Validation("名称不能为空".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AchievementError::Validation(format!(
            "名称长度不能超过 {MAX_NAME_LEN} 个字符"
        )));
    }
    Ok(name.to_string())
}

fn validate_points(points: i32) -> Result<()> {
    if points < 0 {
        return Err(AchievementError::Validation(format!(
            "分值不能为负数: {points}"
        )));
    }
    Ok(())
}

fn validate_levels(levels: &[LevelSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for level in levels {
        if !seen.insert(level.level) {
            return Err(AchievementError::Validation(format!(
                "等级重复: {}",
                level.level
            )));
        }
        if level.required_progress < 1 {
            return Err(AchievementError::Validation(format!(
                "等级 {} 的 requiredProgress 必须大于 0",
                level.level
            )));
        }
        validate_points(level.points)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::repository::MemoryStore;

    fn create_cmd(name: &str) -> CreateAchievementCommand {
        CreateAchievementCommand {
            name: name.to_string(),
            category: "learning".to_string(),
            achievement_type: "milestone".to_string(),
            points: 10,
            is_active: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("  ").is_err());
        assert_eq!(validate_name("  First  ").unwrap(), "First");
        assert!(validate_name(&"x".repeat(201)).is_err());
        assert!(validate_name(&"成".repeat(200)).is_ok());
    }

    #[test]
    fn test_validate_levels() {
        let level = |n: i32, required: i64| LevelSpec {
            level: n,
            name: format!("L{n}"),
            required_progress: required,
            points: 5,
            ..Default::default()
        };
        assert!(validate_levels(&[level(1, 5), level(2, 10)]).is_ok());
        assert!(validate_levels(&[level(1, 5), level(1, 10)]).is_err());
        assert!(validate_levels(&[level(1, 0)]).is_err());
    }

    #[tokio::test]
    async fn test_create_sorts_levels_and_emits_event() {
        let store = Arc::new(MemoryStore::new());
        let service = CatalogService::new(store.clone());
        let mut cmd = create_cmd("Scholar");
        cmd.levels = vec![
            LevelSpec {
                level: 2,
                name: "Silver".to_string(),
                required_progress: 10,
                points: 20,
                ..Default::default()
            },
            LevelSpec {
                level: 1,
                name: "Bronze".to_string(),
                required_progress: 5,
                points: 10,
                ..Default::default()
            },
        ];

        let detail = service.create_achievement("t1", cmd, Some("admin")).await.unwrap();

        let levels = detail.levels.unwrap();
        assert_eq!(levels[0].level, 1);
        assert_eq!(levels[1].level, 2);
        assert_eq!(store.pending_event_count(), 1);
    }

    #[tokio::test]
    async fn test_rename_to_existing_name_conflicts() {
        let service = CatalogService::new(Arc::new(MemoryStore::new()));
        service
            .create_achievement("t1", create_cmd("A"), None)
            .await
            .unwrap();
        let b = service
            .create_achievement("t1", create_cmd("B"), None)
            .await
            .unwrap();

        let err = service
            .update_achievement(
                "t1",
                b.achievement.id,
                UpdateAchievementCommand {
                    name: Some("A".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_unearned_achievement_is_deleted() {
        let service = CatalogService::new(Arc::new(MemoryStore::new()));
        let a = service
            .create_achievement("t1", create_cmd("A"), None)
            .await
            .unwrap();

        let outcome = service
            .deactivate_or_delete("t1", a.achievement.id, None)
            .await
            .unwrap();
        assert_eq!(outcome, RemovalOutcome::Deleted);

        let err = service
            .get_achievement("t1", a.achievement.id, false, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
