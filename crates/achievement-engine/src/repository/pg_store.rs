//! PostgreSQL 存储实现
//!
//! 多行写操作在同一事务中完成，事件写入 `achievement_outbox` 与状态同事务提交。
//! 条件与上下文以序列化文本保存，读取时解码失败返回 `CorruptData`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::traits::AchievementStore;
use crate::error::{AchievementError, Result};
use crate::events::OutboxEvent;
use crate::models::{
    Achievement, AchievementLevel, AchievementPrerequisite, AchievementProgress, ContextValue,
    LeaderboardFilter, UserAchievement, UserPoints,
};

const UNIQUE_ACHIEVEMENT_NAME: &str = "uq_achievements_tenant_name";
const UNIQUE_EARN_COUNT: &str = "uq_user_achievements_earn";

// ==================== 行类型 ====================

#[derive(sqlx::FromRow)]
struct AchievementRow {
    id: Uuid,
    tenant_id: String,
    name: String,
    description: String,
    category: String,
    achievement_type: String,
    points: i32,
    is_active: bool,
    is_secret: bool,
    is_repeatable: bool,
    conditions: String,
    display_order: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AchievementRow> for Achievement {
    type Error = AchievementError;

    fn try_from(row: AchievementRow) -> Result<Self> {
        Ok(Self {
            conditions: ContextValue::parse_stored(&row.conditions)?,
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            description: row.description,
            category: row.category,
            achievement_type: row.achievement_type,
            points: row.points,
            is_active: row.is_active,
            is_secret: row.is_secret,
            is_repeatable: row.is_repeatable,
            display_order: row.display_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LevelRow {
    id: Uuid,
    achievement_id: Uuid,
    level: i32,
    name: String,
    description: Option<String>,
    required_progress: i64,
    points: i32,
    icon_url: Option<String>,
    badge_color: Option<String>,
}

impl From<LevelRow> for AchievementLevel {
    fn from(row: LevelRow) -> Self {
        Self {
            id: row.id,
            achievement_id: row.achievement_id,
            level: row.level,
            name: row.name,
            description: row.description,
            required_progress: row.required_progress,
            points: row.points,
            icon_url: row.icon_url,
            badge_color: row.badge_color,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PrerequisiteRow {
    id: Uuid,
    tenant_id: String,
    achievement_id: Uuid,
    prerequisite_id: Uuid,
    requires_completion: bool,
    created_at: DateTime<Utc>,
}

impl From<PrerequisiteRow> for AchievementPrerequisite {
    fn from(row: PrerequisiteRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            achievement_id: row.achievement_id,
            prerequisite_id: row.prerequisite_id,
            requires_completion: row.requires_completion,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    id: Uuid,
    tenant_id: String,
    user_id: String,
    achievement_id: Uuid,
    current_progress: i64,
    target_progress: i64,
    is_completed: bool,
    last_updated: DateTime<Utc>,
    context: String,
}

impl TryFrom<ProgressRow> for AchievementProgress {
    type Error = AchievementError;

    fn try_from(row: ProgressRow) -> Result<Self> {
        Ok(Self {
            context: ContextValue::parse_stored(&row.context)?,
            id: row.id,
            tenant_id: row.tenant_id,
            user_id: row.user_id,
            achievement_id: row.achievement_id,
            current_progress: row.current_progress,
            target_progress: row.target_progress,
            is_completed: row.is_completed,
            last_updated: row.last_updated,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AwardRow {
    id: Uuid,
    tenant_id: String,
    user_id: String,
    achievement_id: Uuid,
    earned_at: DateTime<Utc>,
    level: Option<i32>,
    progress: i64,
    max_progress: i64,
    is_completed: bool,
    is_notified: bool,
    context: String,
    points_earned: i32,
    earn_count: i32,
    awarded_by: Option<String>,
}

impl TryFrom<AwardRow> for UserAchievement {
    type Error = AchievementError;

    fn try_from(row: AwardRow) -> Result<Self> {
        Ok(Self {
            context: ContextValue::parse_stored(&row.context)?,
            id: row.id,
            tenant_id: row.tenant_id,
            user_id: row.user_id,
            achievement_id: row.achievement_id,
            earned_at: row.earned_at,
            level: row.level,
            progress: row.progress,
            max_progress: row.max_progress,
            is_completed: row.is_completed,
            is_notified: row.is_notified,
            points_earned: row.points_earned,
            earn_count: row.earn_count,
            awarded_by: row.awarded_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    tenant_id: String,
    event_type: String,
    partition_key: String,
    actor: Option<String>,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<OutboxRow> for OutboxEvent {
    type Error = AchievementError;

    fn try_from(row: OutboxRow) -> Result<Self> {
        let event_type = row
            .event_type
            .parse()
            .map_err(|e| AchievementError::CorruptData(format!("outbox {}: {e}", row.id)))?;
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            event_type,
            partition_key: row.partition_key,
            actor: row.actor,
            payload: row.payload,
            created_at: row.created_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = AchievementError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn serialize_context(value: &ContextValue) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// 唯一约束冲突映射为业务冲突，其余数据库错误原样返回
fn map_unique_violation(err: sqlx::Error, on_conflict: impl FnOnce(&str) -> AchievementError) -> AchievementError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        return on_conflict(db_err.constraint().unwrap_or_default());
    }
    AchievementError::Database(err)
}

const ACHIEVEMENT_COLUMNS: &str = r#"
    id, tenant_id, name, description, category, achievement_type, points,
    is_active, is_secret, is_repeatable, conditions, display_order, created_at, updated_at
"#;

const PROGRESS_COLUMNS: &str = r#"
    id, tenant_id, user_id, achievement_id, current_progress, target_progress,
    is_completed, last_updated, context
"#;

const AWARD_COLUMNS: &str = r#"
    id, tenant_id, user_id, achievement_id, earned_at, level, progress, max_progress,
    is_completed, is_notified, context, points_earned, earn_count, awarded_by
"#;

/// PostgreSQL 存储
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 事务内辅助操作 ====================

    async fn insert_events(conn: &mut PgConnection, events: &[OutboxEvent]) -> Result<()> {
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO achievement_outbox
                    (id, tenant_id, event_type, partition_key, actor, payload, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event.id)
            .bind(&event.tenant_id)
            .bind(event.event_type.as_str())
            .bind(&event.partition_key)
            .bind(&event.actor)
            .bind(&event.payload)
            .bind(event.created_at)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn insert_levels(conn: &mut PgConnection, levels: &[AchievementLevel]) -> Result<()> {
        for level in levels {
            sqlx::query(
                r#"
                INSERT INTO achievement_levels
                    (id, achievement_id, level, name, description, required_progress,
                     points, icon_url, badge_color)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(level.id)
            .bind(level.achievement_id)
            .bind(level.level)
            .bind(&level.name)
            .bind(&level.description)
            .bind(level.required_progress)
            .bind(level.points)
            .bind(&level.icon_url)
            .bind(&level.badge_color)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn upsert_progress(conn: &mut PgConnection, progress: &AchievementProgress) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO achievement_progress
                (id, tenant_id, user_id, achievement_id, current_progress, target_progress,
                 is_completed, last_updated, context)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tenant_id, user_id, achievement_id) DO UPDATE SET
                current_progress = EXCLUDED.current_progress,
                target_progress = EXCLUDED.target_progress,
                is_completed = EXCLUDED.is_completed,
                last_updated = EXCLUDED.last_updated,
                context = EXCLUDED.context
            "#,
        )
        .bind(progress.id)
        .bind(&progress.tenant_id)
        .bind(&progress.user_id)
        .bind(progress.achievement_id)
        .bind(progress.current_progress)
        .bind(progress.target_progress)
        .bind(progress.is_completed)
        .bind(progress.last_updated)
        .bind(serialize_context(&progress.context)?)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AchievementStore for PgStore {
    // ==================== 成就目录 ====================

    async fn get_achievement(&self, tenant_id: &str, id: Uuid) -> Result<Option<Achievement>> {
        let row = sqlx::query_as::<_, AchievementRow>(&format!(
            "SELECT {ACHIEVEMENT_COLUMNS} FROM achievements WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Achievement::try_from).transpose()
    }

    async fn list_achievements(&self, tenant_id: &str) -> Result<Vec<Achievement>> {
        let rows = sqlx::query_as::<_, AchievementRow>(&format!(
            "SELECT {ACHIEVEMENT_COLUMNS} FROM achievements WHERE tenant_id = $1 \
             ORDER BY display_order, name"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn find_achievement_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<Achievement>> {
        let row = sqlx::query_as::<_, AchievementRow>(&format!(
            "SELECT {ACHIEVEMENT_COLUMNS} FROM achievements WHERE tenant_id = $1 AND name = $2"
        ))
        .bind(tenant_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Achievement::try_from).transpose()
    }

    async fn insert_achievement(
        &self,
        achievement: &Achievement,
        levels: &[AchievementLevel],
        events: &[OutboxEvent],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO achievements
                (id, tenant_id, name, description, category, achievement_type, points,
                 is_active, is_secret, is_repeatable, conditions, display_order,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(achievement.id)
        .bind(&achievement.tenant_id)
        .bind(&achievement.name)
        .bind(&achievement.description)
        .bind(&achievement.category)
        .bind(&achievement.achievement_type)
        .bind(achievement.points)
        .bind(achievement.is_active)
        .bind(achievement.is_secret)
        .bind(achievement.is_repeatable)
        .bind(serialize_context(&achievement.conditions)?)
        .bind(achievement.display_order)
        .bind(achievement.created_at)
        .bind(achievement.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            map_unique_violation(e, |constraint| {
                if constraint == UNIQUE_ACHIEVEMENT_NAME {
                    AchievementError::DuplicateName(achievement.name.clone())
                } else {
                    AchievementError::Internal(format!("唯一约束冲突: {constraint}"))
                }
            })
        })?;

        Self::insert_levels(&mut tx, levels).await?;
        Self::insert_events(&mut tx, events).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_achievement(
        &self,
        achievement: &Achievement,
        levels: Option<Vec<AchievementLevel>>,
        events: &[OutboxEvent],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE achievements
            SET name = $3, description = $4, category = $5, achievement_type = $6,
                points = $7, is_active = $8, is_secret = $9, is_repeatable = $10,
                conditions = $11, display_order = $12, updated_at = $13
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(&achievement.tenant_id)
        .bind(achievement.id)
        .bind(&achievement.name)
        .bind(&achievement.description)
        .bind(&achievement.category)
        .bind(&achievement.achievement_type)
        .bind(achievement.points)
        .bind(achievement.is_active)
        .bind(achievement.is_secret)
        .bind(achievement.is_repeatable)
        .bind(serialize_context(&achievement.conditions)?)
        .bind(achievement.display_order)
        .bind(achievement.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            map_unique_violation(e, |_| AchievementError::DuplicateName(achievement.name.clone()))
        })?;

        if result.rows_affected() == 0 {
            return Err(AchievementError::AchievementNotFound(achievement.id));
        }

        if let Some(levels) = levels {
            sqlx::query("DELETE FROM achievement_levels WHERE achievement_id = $1")
                .bind(achievement.id)
                .execute(&mut *tx)
                .await?;
            Self::insert_levels(&mut tx, &levels).await?;
        }

        Self::insert_events(&mut tx, events).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_achievement_if_unearned(
        &self,
        tenant_id: &str,
        id: Uuid,
        events: &[OutboxEvent],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // 锁定成就行，阻止并发颁发在检查与删除之间插入记录
        let locked: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM achievements WHERE tenant_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if locked.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        let earned: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_achievements WHERE tenant_id = $1 AND achievement_id = $2)",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if earned {
            tx.rollback().await?;
            return Ok(false);
        }

        // 等级、前置边、进度通过外键级联删除
        sqlx::query("DELETE FROM achievements WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        Self::insert_events(&mut tx, events).await?;

        tx.commit().await?;
        Ok(true)
    }

    // ==================== 等级与前置条件 ====================

    async fn list_levels(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<AchievementLevel>> {
        let rows = sqlx::query_as::<_, LevelRow>(
            r#"
            SELECT l.id, l.achievement_id, l.level, l.name, l.description,
                   l.required_progress, l.points, l.icon_url, l.badge_color
            FROM achievement_levels l
            JOIN achievements a ON a.id = l.achievement_id
            WHERE a.tenant_id = $1 AND l.achievement_id = $2
            ORDER BY l.level
            "#,
        )
        .bind(tenant_id)
        .bind(achievement_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AchievementLevel::from).collect())
    }

    async fn list_prerequisites(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<AchievementPrerequisite>> {
        let rows = sqlx::query_as::<_, PrerequisiteRow>(
            r#"
            SELECT id, tenant_id, achievement_id, prerequisite_id, requires_completion, created_at
            FROM achievement_prerequisites
            WHERE tenant_id = $1 AND achievement_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(tenant_id)
        .bind(achievement_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AchievementPrerequisite::from).collect())
    }

    async fn list_all_prerequisites(&self, tenant_id: &str) -> Result<Vec<AchievementPrerequisite>> {
        let rows = sqlx::query_as::<_, PrerequisiteRow>(
            r#"
            SELECT id, tenant_id, achievement_id, prerequisite_id, requires_completion, created_at
            FROM achievement_prerequisites
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AchievementPrerequisite::from).collect())
    }

    async fn insert_prerequisite(&self, edge: &AchievementPrerequisite) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO achievement_prerequisites
                (id, tenant_id, achievement_id, prerequisite_id, requires_completion, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, achievement_id, prerequisite_id) DO NOTHING
            "#,
        )
        .bind(edge.id)
        .bind(&edge.tenant_id)
        .bind(edge.achievement_id)
        .bind(edge.prerequisite_id)
        .bind(edge.requires_completion)
        .bind(edge.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_prerequisite(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
        prerequisite_id: Uuid,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM achievement_prerequisites
            WHERE tenant_id = $1 AND achievement_id = $2 AND prerequisite_id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(achievement_id)
        .bind(prerequisite_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== 进度 ====================

    async fn get_progress(
        &self,
        tenant_id: &str,
        user_id: &str,
        achievement_id: Uuid,
    ) -> Result<Option<AchievementProgress>> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM achievement_progress \
             WHERE tenant_id = $1 AND user_id = $2 AND achievement_id = $3"
        ))
        .bind(tenant_id)
        .bind(user_id)
        .bind(achievement_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AchievementProgress::try_from).transpose()
    }

    async fn list_user_progress(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<AchievementProgress>> {
        let rows = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM achievement_progress \
             WHERE tenant_id = $1 AND user_id = $2 ORDER BY last_updated DESC"
        ))
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn list_achievement_progress(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<AchievementProgress>> {
        let rows = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM achievement_progress \
             WHERE tenant_id = $1 AND achievement_id = $2"
        ))
        .bind(tenant_id)
        .bind(achievement_id)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn save_progress(
        &self,
        progress: &AchievementProgress,
        events: &[OutboxEvent],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_progress(&mut tx, progress).await?;
        Self::insert_events(&mut tx, events).await?;
        tx.commit().await?;
        Ok(())
    }

    // ==================== 颁发记录 ====================

    async fn get_user_achievement(
        &self,
        tenant_id: &str,
        id: Uuid,
    ) -> Result<Option<UserAchievement>> {
        let row = sqlx::query_as::<_, AwardRow>(&format!(
            "SELECT {AWARD_COLUMNS} FROM user_achievements WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserAchievement::try_from).transpose()
    }

    async fn list_awards_for(
        &self,
        tenant_id: &str,
        user_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<UserAchievement>> {
        let rows = sqlx::query_as::<_, AwardRow>(&format!(
            "SELECT {AWARD_COLUMNS} FROM user_achievements \
             WHERE tenant_id = $1 AND user_id = $2 AND achievement_id = $3 ORDER BY earn_count"
        ))
        .bind(tenant_id)
        .bind(user_id)
        .bind(achievement_id)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn list_user_achievements(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<UserAchievement>> {
        let rows = sqlx::query_as::<_, AwardRow>(&format!(
            "SELECT {AWARD_COLUMNS} FROM user_achievements \
             WHERE tenant_id = $1 AND user_id = $2 ORDER BY earned_at DESC"
        ))
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn list_achievement_awards(
        &self,
        tenant_id: &str,
        achievement_id: Uuid,
    ) -> Result<Vec<UserAchievement>> {
        let rows = sqlx::query_as::<_, AwardRow>(&format!(
            "SELECT {AWARD_COLUMNS} FROM user_achievements \
             WHERE tenant_id = $1 AND achievement_id = $2 ORDER BY earned_at"
        ))
        .bind(tenant_id)
        .bind(achievement_id)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn commit_award(
        &self,
        award: &UserAchievement,
        progress: &AchievementProgress,
        events: &[OutboxEvent],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_achievements
                (id, tenant_id, user_id, achievement_id, earned_at, level, progress,
                 max_progress, is_completed, is_notified, context, points_earned,
                 earn_count, awarded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(award.id)
        .bind(&award.tenant_id)
        .bind(&award.user_id)
        .bind(award.achievement_id)
        .bind(award.earned_at)
        .bind(award.level)
        .bind(award.progress)
        .bind(award.max_progress)
        .bind(award.is_completed)
        .bind(award.is_notified)
        .bind(serialize_context(&award.context)?)
        .bind(award.points_earned)
        .bind(award.earn_count)
        .bind(&award.awarded_by)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            map_unique_violation(e, |constraint| {
                if constraint == UNIQUE_EARN_COUNT {
                    AchievementError::AlreadyEarned {
                        user_id: award.user_id.clone(),
                        achievement_id: award.achievement_id,
                    }
                } else {
                    AchievementError::Internal(format!("唯一约束冲突: {constraint}"))
                }
            })
        })?;

        Self::upsert_progress(&mut tx, progress).await?;
        Self::insert_events(&mut tx, events).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn commit_revoke(
        &self,
        award: &UserAchievement,
        progress: Option<AchievementProgress>,
        events: &[OutboxEvent],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM user_achievements WHERE tenant_id = $1 AND id = $2")
            .bind(&award.tenant_id)
            .bind(award.id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(progress) = progress {
            Self::upsert_progress(&mut tx, &progress).await?;
        }
        Self::insert_events(&mut tx, events).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn aggregate_user_points(
        &self,
        tenant_id: &str,
        filter: &LeaderboardFilter,
    ) -> Result<Vec<UserPoints>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT ua.user_id,
                   COALESCE(SUM(ua.points_earned), 0)::BIGINT AS total_points,
                   COUNT(*)::BIGINT AS total_achievements
            FROM user_achievements ua
            JOIN achievements a ON a.id = ua.achievement_id
            WHERE ua.tenant_id = $1
              AND ($2::TEXT IS NULL OR a.category = $2)
              AND ($3::TEXT IS NULL OR a.achievement_type = $3)
              AND ($4::TIMESTAMPTZ IS NULL OR ua.earned_at >= $4)
              AND ($5::TIMESTAMPTZ IS NULL OR ua.earned_at <= $5)
            GROUP BY ua.user_id
            "#,
        )
        .bind(tenant_id)
        .bind(&filter.category)
        .bind(&filter.achievement_type)
        .bind(filter.earned_from)
        .bind(filter.earned_to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, total_points, total_achievements)| UserPoints {
                user_id,
                total_points,
                total_achievements,
            })
            .collect())
    }

    // ==================== Outbox ====================

    async fn fetch_pending_events(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, tenant_id, event_type, partition_key, actor, payload, created_at
            FROM achievement_outbox
            WHERE published_at IS NULL
            ORDER BY created_at, id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn mark_events_published(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE achievement_outbox SET published_at = NOW() WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
