//! 前置条件服务
//!
//! 前置检查是建议性的：颁发流程本身不强制，调用方在颁发前自行查询。
//! `can_earn` 要求全部前置边均已满足；`requires_completion` 只作为展示信息返回。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AchievementError, Result};
use crate::models::AchievementPrerequisite;
use crate::repository::AchievementStore;
use crate::service::dto::{PrerequisiteCheck, PrerequisiteStatus};

/// 前置条件图
///
/// achievement_id -> 其前置成就列表
#[derive(Debug, Default, Clone)]
pub struct PrerequisiteGraph {
    prerequisites: HashMap<Uuid, Vec<Uuid>>,
}

impl PrerequisiteGraph {
    pub fn from_edges(edges: &[AchievementPrerequisite]) -> Self {
        let mut graph = Self::default();
        for edge in edges {
            graph
                .prerequisites
                .entry(edge.achievement_id)
                .or_default()
                .push(edge.prerequisite_id);
        }
        graph
    }

    pub fn prerequisites_of(&self, achievement_id: Uuid) -> &[Uuid] {
        self.prerequisites
            .get(&achievement_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// 沿前置边从 `from` 出发能否到达 `to`
    pub fn reaches(&self, from: Uuid, to: Uuid) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.prerequisites_of(current).iter().copied());
        }
        false
    }

    /// 添加边 achievement -> prerequisite 后是否成环
    pub fn would_cycle(&self, achievement_id: Uuid, prerequisite_id: Uuid) -> bool {
        achievement_id == prerequisite_id || self.reaches(prerequisite_id, achievement_id)
    }
}

/// 前置条件服务
pub struct PrerequisiteResolver<S: AchievementStore> {
    store: Arc<S>,
}

impl<S: AchievementStore> PrerequisiteResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// 检查用户是否满足成就的全部前置条件
    #[instrument(skip(self))]
    pub async fn check_prerequisites(
        &self,
        tenant_id: &str,
        user_id: &str,
        achievement_id: Uuid,
    ) -> Result<PrerequisiteCheck> {
        self.store
            .get_achievement(tenant_id, achievement_id)
            .await?
            .ok_or(AchievementError::AchievementNotFound(achievement_id))?;

        let edges = self
            .store
            .list_prerequisites(tenant_id, achievement_id)
            .await?;

        if edges.is_empty() {
            return Ok(PrerequisiteCheck {
                achievement_id,
                can_earn: true,
                prerequisites: Vec::new(),
            });
        }

        let completed: HashSet<Uuid> = self
            .store
            .list_user_achievements(tenant_id, user_id)
            .await?
            .into_iter()
            .filter(|a| a.is_completed)
            .map(|a| a.achievement_id)
            .collect();

        let names: HashMap<Uuid, String> = self
            .store
            .list_achievements(tenant_id)
            .await?
            .into_iter()
            .map(|a| (a.id, a.name))
            .collect();

        let prerequisites: Vec<PrerequisiteStatus> = edges
            .iter()
            .map(|edge| PrerequisiteStatus {
                id: edge.prerequisite_id,
                name: names
                    .get(&edge.prerequisite_id)
                    .cloned()
                    .unwrap_or_default(),
                is_met: completed.contains(&edge.prerequisite_id),
                requires_completion: edge.requires_completion,
            })
            .collect();

        let can_earn = prerequisites.iter().all(|p| p.is_met);

        Ok(PrerequisiteCheck {
            achievement_id,
            can_earn,
            prerequisites,
        })
    }

    /// 添加前置条件，重复添加返回已有边
    #[instrument(skip(self))]
    pub async fn add_prerequisite(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        prerequisite_id: Uuid,
        requires_completion: bool,
    ) -> Result<AchievementPrerequisite> {
        if achievement_id == prerequisite_id {
            return Err(AchievementError::PrerequisiteCycle {
                achievement_id,
                prerequisite_id,
            });
        }

        for id in [achievement_id, prerequisite_id] {
            self.store
                .get_achievement(tenant_id, id)
                .await?
                .ok_or(AchievementError::AchievementNotFound(id))?;
        }

        let edges = self.store.list_all_prerequisites(tenant_id).await?;
        if let Some(existing) = edges
            .iter()
            .find(|e| e.achievement_id == achievement_id && e.prerequisite_id == prerequisite_id)
        {
            return Ok(existing.clone());
        }

        if PrerequisiteGraph::from_edges(&edges).would_cycle(achievement_id, prerequisite_id) {
            return Err(AchievementError::PrerequisiteCycle {
                achievement_id,
                prerequisite_id,
            });
        }

        let edge = AchievementPrerequisite {
            id: Uuid::now_v7(),
            tenant_id: tenant_id.to_string(),
            achievement_id,
            prerequisite_id,
            requires_completion,
            created_at: Utc::now(),
        };
        self.store.insert_prerequisite(&edge).await?;

        info!("前置条件已添加");
        Ok(edge)
    }

    /// 删除前置条件，返回是否存在
    #[instrument(skip(self))]
    pub async fn remove_prerequisite(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        prerequisite_id: Uuid,
    ) -> Result<bool> {
        let removed = self
            .store
            .delete_prerequisite(tenant_id, achievement_id, prerequisite_id)
            .await?;
        if removed {
            info!("前置条件已删除");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(achievement_id: Uuid, prerequisite_id: Uuid) -> AchievementPrerequisite {
        AchievementPrerequisite {
            id: Uuid::now_v7(),
            tenant_id: "t1".to_string(),
            achievement_id,
            prerequisite_id,
            requires_completion: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_graph() {
        let graph = PrerequisiteGraph::default();
        assert!(graph.prerequisites_of(Uuid::now_v7()).is_empty());
    }

    #[test]
    fn test_transitive_cycle_detected() {
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        // a 依赖 b，b 依赖 c
        let graph = PrerequisiteGraph::from_edges(&[edge(a, b), edge(b, c)]);

        assert!(graph.would_cycle(c, a));
        assert!(graph.would_cycle(b, a));
        assert!(graph.would_cycle(a, a));
        assert!(!graph.would_cycle(a, c));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let (top, left, right, bottom) =
            (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let graph = PrerequisiteGraph::from_edges(&[
            edge(top, left),
            edge(top, right),
            edge(left, bottom),
            edge(right, bottom),
        ]);
        assert!(!graph.would_cycle(top, bottom));
        assert!(graph.would_cycle(bottom, top));
    }
}
