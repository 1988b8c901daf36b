//! 内存存储实现
//!
//! 每类记录一个以 id 为键的集合，另建唯一索引模拟数据库约束。
//! 所有集合由同一把读写锁保护，因此每个写操作天然是原子的。
//! 用于单进程部署、测试与基准。

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::traits::AchievementStore;
use crate::error::{AchievementError, Result};
use crate::events::OutboxEvent;
use crate::models::{
    Achievement, AchievementLevel, AchievementPrerequisite, AchievementProgress,
    LeaderboardFilter, UserAchievement, UserPoints,
};

type ProgressKey = (String, String, Uuid);
type AwardKey = (String, String, Uuid, i32);

#[derive(Default)]
struct Collections {
    achievements: HashMap<Uuid, Achievement>,
    levels: HashMap<Uuid, AchievementLevel>,
    prerequisites: HashMap<Uuid, AchievementPrerequisite>,
    progress: HashMap<Uuid, AchievementProgress>,
    progress_index: HashMap<ProgressKey, Uuid>,
    awards: HashMap<Uuid, UserAchievement>,
    award_index: HashMap<AwardKey, Uuid>,
    /// 未发布事件，按写入顺序排列
    outbox: Vec<OutboxEvent>,
}

impl Collections {
    fn name_taken(&self, tenant_id: &str, name: &str, except: Uuid) -> bool {
        self.achievements
            .values()
            .any(|a| a.tenant_id == tenant_id && a.name == name && a.id != except)
    }

    fn upsert_progress(&mut self, progress: &AchievementProgress) {
        let key = progress_key(progress);
        if let Some(existing_id) = self.progress_index.insert(key, progress.id)
            && existing_id != progress.id
        {
            self.progress.remove(&existing_id);
        }
        self.progress.insert(progress.id, progress.clone());
    }

    fn push_events(&mut self, events: &[OutboxEvent]) {
        self.outbox.extend_from_slice(events);
    }
}

fn progress_key(p: &AchievementProgress) -> ProgressKey {
    (p.tenant_id.clone(), p.user_id.clone(), p.achievement_id)
}

fn award_key(a: &UserAchievement) -> AwardKey {
    (
        a.tenant_id.clone(),
        a.user_id.clone(),
        a.achievement_id,
        a.earn_count,
    )
}

/// 内存存储
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未发布事件数量
    pub fn pending_event_count(&self) -> usize {
        self.inner.read().outbox.len()
    }
}

#[async_trait]
impl AchievementStore for MemoryStore {
    // ==================== 成就目录 ====================

    async fn get_achievement(&self, tenant_id: &str, id: Uuid) -> Result<Option<Achievement>> {
        Ok(self
            .inner
            .read()
            .achievements
            .get(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_achievements(&self, tenant_id: &str) -> Result<Vec<Achievement>> {
        Ok(self
            .inner
            .read()
            .achievements
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn find_achievement_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<Achievement>> {
        Ok(self
            .inner
            .read()
            .achievements
            .values()
            .find(|a| a.tenant_id == tenant_id && a.name == name)
            .cloned())
    }

    async fn insert_achievement(
        &self,
        achievement: &Achievement,
        levels: &[AchievementLevel],
        events: &[OutboxEvent],
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.name_taken(&achievement.tenant_id, &achievement.name, achievement.id) {
            return Err(AchievementError::DuplicateName(achievement.name.clone()));
        }
        inner
            .achievements
            .insert(achievement.id, achievement.clone());
        for level in levels {
            inner.levels.insert(level.id, level.clone());
        }
        inner.push_events(events);
        Ok(())
    }

    async fn update_achievement(
        &self,
        achievement: &Achievement,
        levels: Option<Vec<AchievementLevel>>,
        events: &[OutboxEvent],
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let exists = inner
            .achievements
            .get(&achievement.id)
            .is_some_and(|a| a.tenant_id == achievement.tenant_id);
        if !exists {
            return Err(AchievementError::AchievementNotFound(achievement.id));
        }
        if inner.name_taken(&achievement.tenant_id, &achievement.name, achievement.id) {
            return Err(AchievementError::DuplicateName(achievement.name.clone()));
        }
        inner
            .achievements
            .insert(achievement.id, achievement.clone());
        if let Some(levels) = levels {
            inner
                .levels
                .retain(|_, l| l.achievement_id != achievement.id);
            for level in levels {
                inner.levels.insert(level.id, level);
            }
        }
        inner.push_events(events);
        Ok(())
    }

    async fn delete_achievement_if_unearned(
        &self,
        tenant_id: &str,
        id: Uuid,
        events: &[OutboxEvent],
    ) -> Result<bool> {
        let mut inner = self.inner.write();
        let exists = inner
            .achievements
            .get(&id)
            .is_some_and(|a| a.tenant_id == tenant_id);
        let earned = inner
            .awards
            .values()
            .any(|a| a.tenant_id == tenant_id && a.achievement_id == id);
        if !exists || earned {
            return Ok(false);
        }

        inner.achievements.remove(&id);
        inner.levels.retain(|_, l| l.achievement_id != id);
        inner
            .prerequisites
            .retain(|_, e| e.achievement_id != id && e.prerequisite_id != id);
        let progress_ids: Vec<Uuid> = inner
            .progress
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.achievement_id == id)
            .map(|p| p.id)
            .collect();
        for progress_id in progress_ids {
            if let Some(p) = inner.progress.remove(&progress_id) {
                inner.progress_index.remove(&progress_key(&p));
            }
        }
        inner.push_events(events);
        Ok(true)
    }

    // ==================== 等级与前置条件 ====================

    async fn list_levels(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<AchievementLevel>> {
        let inner = self.inner.read();
        let owned = inner
            .achievements
            .get(&achievement_id)
            .is_some_and(|a| a.tenant_id == tenant_id);
        if !owned {
            return Ok(Vec::new());
        }
        let mut levels: Vec<AchievementLevel> = inner
            .levels
            .values()
            .filter(|l| l.achievement_id == achievement_id)
            .cloned()
            .collect();
        levels.sort_by_key(|l| l.level);
        Ok(levels)
    }

    async fn list_prerequisites(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<AchievementPrerequisite>> {
        let mut edges: Vec<AchievementPrerequisite> = self
            .inner
            .read()
            .prerequisites
            .values()
            .filter(|e| e.tenant_id == tenant_id && e.achievement_id == achievement_id)
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.created_at);
        Ok(edges)
    }

    async fn list_all_prerequisites(&self, tenant_id: &str) -> Result<Vec<AchievementPrerequisite>> {
        Ok(self
            .inner
            .read()
            .prerequisites
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_prerequisite(&self, edge: &AchievementPrerequisite) -> Result<()> {
        let mut inner = self.inner.write();
        let duplicate = inner.prerequisites.values().any(|e| {
            e.tenant_id == edge.tenant_id
                && e.achievement_id == edge.achievement_id
                && e.prerequisite_id == edge.prerequisite_id
        });
        if !duplicate {
            inner.prerequisites.insert(edge.id, edge.clone());
        }
        Ok(())
    }

    async fn delete_prerequisite(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        prerequisite_id: Uuid,
    ) -> Result<bool> {
        let mut inner = self.inner.write();
        let before = inner.prerequisites.len();
        inner.prerequisites.retain(|_, e| {
            !(e.tenant_id == tenant_id
                && e.achievement_id == achievement_id
                && e.prerequisite_id == prerequisite_id)
        });
        Ok(inner.prerequisites.len() < before)
    }

    // ==================== 进度 ====================

    async fn get_progress(
        &self,
        tenant_id: &str,
        user_id: &str,
        achievement_id: Uuid,
    ) -> Result<Option<AchievementProgress>> {
        let inner = self.inner.read();
        let key = (tenant_id.to_string(), user_id.to_string(), achievement_id);
        Ok(inner
            .progress_index
            .get(&key)
            .and_then(|id| inner.progress.get(id))
            .cloned())
    }

    async fn list_user_progress(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<AchievementProgress>> {
        Ok(self
            .inner
            .read()
            .progress
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_achievement_progress(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<AchievementProgress>> {
        Ok(self
            .inner
            .read()
            .progress
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.achievement_id == achievement_id)
            .cloned()
            .collect())
    }

    async fn save_progress(
        &self,
        progress: &AchievementProgress,
        events: &[OutboxEvent],
    ) -> Result<()> {
        let mut inner = self.inner.write();
        inner.upsert_progress(progress);
        inner.push_events(events);
        Ok(())
    }

    // ==================== 颁发记录 ====================

    async fn get_user_achievement(
        &self,
        tenant_id: &str,
        id: Uuid,
    ) -> Result<Option<UserAchievement>> {
        Ok(self
            .inner
            .read()
            .awards
            .get(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_awards_for(
        &self,
        tenant_id: &str,
        user_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<UserAchievement>> {
        let mut awards: Vec<UserAchievement> = self
            .inner
            .read()
            .awards
            .values()
            .filter(|a| {
                a.tenant_id == tenant_id
                    && a.user_id == user_id
                    && a.achievement_id == achievement_id
            })
            .cloned()
            .collect();
        awards.sort_by_key(|a| a.earn_count);
        Ok(awards)
    }

    async fn list_user_achievements(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<UserAchievement>> {
        Ok(self
            .inner
            .read()
            .awards
            .values()
            .filter(|a| a.tenant_id == tenant_id && a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_achievement_awards(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<UserAchievement>> {
        Ok(self
            .inner
            .read()
            .awards
            .values()
            .filter(|a| a.tenant_id == tenant_id && a.achievement_id == achievement_id)
            .cloned()
            .collect())
    }

    async fn commit_award(
        &self,
        award: &UserAchievement,
        progress: &AchievementProgress,
        events: &[OutboxEvent],
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let key = award_key(award);
        if inner.award_index.contains_key(&key) {
            return Err(AchievementError::AlreadyEarned {
                user_id: award.user_id.clone(),
                achievement_id: award.achievement_id,
            });
        }
        inner.award_index.insert(key, award.id);
        inner.awards.insert(award.id, award.clone());
        inner.upsert_progress(progress);
        inner.push_events(events);
        Ok(())
    }

    async fn commit_revoke(
        &self,
        award: &UserAchievement,
        progress: Option<AchievementProgress>,
        events: &[OutboxEvent],
    ) -> Result<bool> {
        let mut inner = self.inner.write();
        let owned = inner
            .awards
            .get(&award.id)
            .is_some_and(|a| a.tenant_id == award.tenant_id);
        if !owned {
            return Ok(false);
        }
        if let Some(removed) = inner.awards.remove(&award.id) {
            inner.award_index.remove(&award_key(&removed));
        }
        if let Some(progress) = progress {
            inner.upsert_progress(&progress);
        }
        inner.push_events(events);
        Ok(true)
    }

    async fn aggregate_user_points(
        &self,
        tenant_id: &str,
        filter: &LeaderboardFilter,
    ) -> Result<Vec<UserPoints>> {
        let inner = self.inner.read();
        let mut totals: HashMap<&str, (i64, i64)> = HashMap::new();

        for award in inner.awards.values() {
            if award.tenant_id != tenant_id || !filter.accepts_earned_at(award.earned_at) {
                continue;
            }
            if filter.category.is_some() || filter.achievement_type.is_some() {
                let Some(achievement) = inner.achievements.get(&award.achievement_id) else {
                    continue;
                };
                if filter
                    .category
                    .as_ref()
                    .is_some_and(|c| &achievement.category != c)
                    || filter
                        .achievement_type
                        .as_ref()
                        .is_some_and(|t| &achievement.achievement_type != t)
                {
                    continue;
                }
            }
            let entry = totals.entry(award.user_id.as_str()).or_default();
            entry.0 += i64::from(award.points_earned);
            entry.1 += 1;
        }

        Ok(totals
            .into_iter()
            .map(|(user_id, (total_points, total_achievements))| UserPoints {
                user_id: user_id.to_string(),
                total_points,
                total_achievements,
            })
            .collect())
    }

    // ==================== Outbox ====================

    async fn fetch_pending_events(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self.inner.read().outbox.iter().take(limit).cloned().collect())
    }

    async fn mark_events_published(&self, ids: &[Uuid]) -> Result<()> {
        self.inner.write().outbox.retain(|e| !ids.contains(&e.id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextValue;
    use chrono::Utc;

    fn achievement(tenant: &str, name: &str) -> Achievement {
        Achievement {
            id: Uuid::now_v7(),
            tenant_id: tenant.to_string(),
            name: name.to_string(),
            description: String::new(),
            category: "learning".to_string(),
            achievement_type: "milestone".to_string(),
            points: 10,
            is_active: true,
            is_secret: false,
            is_repeatable: false,
            conditions: ContextValue::Null,
            display_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn award(a: &Achievement, user: &str, earn_count: i32) -> UserAchievement {
        UserAchievement {
            id: Uuid::now_v7(),
            tenant_id: a.tenant_id.clone(),
            user_id: user.to_string(),
            achievement_id: a.id,
            earned_at: Utc::now(),
            level: None,
            progress: 1,
            max_progress: 1,
            is_completed: true,
            is_notified: true,
            context: ContextValue::Null,
            points_earned: a.points,
            earn_count,
            awarded_by: None,
        }
    }

    #[tokio::test]
    async fn test_names_unique_per_tenant() {
        let store = MemoryStore::new();
        store
            .insert_achievement(&achievement("t1", "FirstWin"), &[], &[])
            .await
            .unwrap();

        let err = store
            .insert_achievement(&achievement("t1", "FirstWin"), &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AchievementError::DuplicateName(_)));

        // 其他租户可以使用同名成就
        store
            .insert_achievement(&achievement("t2", "FirstWin"), &[], &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_award_unique_key_enforced() {
        let store = MemoryStore::new();
        let a = achievement("t1", "FirstWin");
        store.insert_achievement(&a, &[], &[]).await.unwrap();
        let progress = AchievementProgress::new("t1", "u1", a.id);

        store
            .commit_award(&award(&a, "u1", 1), &progress, &[])
            .await
            .unwrap();
        let err = store
            .commit_award(&award(&a, "u1", 1), &progress, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AchievementError::AlreadyEarned { .. }));
        assert_eq!(store.list_awards_for("t1", "u1", a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_refused_when_earned() {
        let store = MemoryStore::new();
        let a = achievement("t1", "FirstWin");
        store.insert_achievement(&a, &[], &[]).await.unwrap();
        store
            .commit_award(
                &award(&a, "u1", 1),
                &AchievementProgress::new("t1", "u1", a.id),
                &[],
            )
            .await
            .unwrap();

        assert!(!store.delete_achievement_if_unearned("t1", a.id, &[]).await.unwrap());
        assert!(store.get_achievement("t1", a.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_edges_and_progress() {
        let store = MemoryStore::new();
        let a = achievement("t1", "A");
        let b = achievement("t1", "B");
        store.insert_achievement(&a, &[], &[]).await.unwrap();
        store.insert_achievement(&b, &[], &[]).await.unwrap();
        store
            .insert_prerequisite(&AchievementPrerequisite {
                id: Uuid::now_v7(),
                tenant_id: "t1".to_string(),
                achievement_id: b.id,
                prerequisite_id: a.id,
                requires_completion: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .save_progress(&AchievementProgress::new("t1", "u1", a.id), &[])
            .await
            .unwrap();

        assert!(store.delete_achievement_if_unearned("t1", a.id, &[]).await.unwrap());
        assert!(store.list_prerequisites("t1", b.id).await.unwrap().is_empty());
        assert!(store.get_progress("t1", "u1", a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tenant_isolation_on_reads() {
        let store = MemoryStore::new();
        let a = achievement("t1", "A");
        store.insert_achievement(&a, &[], &[]).await.unwrap();
        assert!(store.get_achievement("t2", a.id).await.unwrap().is_none());
        assert!(store.list_achievements("t2").await.unwrap().is_empty());
    }
}
