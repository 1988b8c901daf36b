//! 按键串行化的锁管理器
//!
//! 本地层：每个键一把 tokio 互斥锁，保证同一进程内对同一 (用户, 成就) 的写操作串行。
//! 分布式层（可选）：Redis `SET NX PX`，保证多实例部署时仍然串行。
//! Redis 不可用时降级为仅本地锁，唯一约束仍是最终防线。

use std::sync::Arc;
use std::time::Duration;

use achievement_shared::config::EngineConfig;
use dashmap::DashMap;
use redis::Client as RedisClient;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{AchievementError, Result};

/// 锁配置
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Redis 锁超时时间
    pub default_ttl: Duration,
    /// 等待本地锁的最长时间
    pub wait_timeout: Duration,
    /// 获取 Redis 锁重试次数
    pub retry_count: u32,
    /// 重试间隔
    pub retry_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(5),
            retry_count: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl From<&EngineConfig> for LockConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            default_ttl: Duration::from_millis(config.lock_ttl_ms),
            wait_timeout: Duration::from_millis(config.lock_wait_timeout_ms),
            retry_count: config.lock_retry_count,
            retry_delay: Duration::from_millis(config.lock_retry_delay_ms),
        }
    }
}

type LocalLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// 锁管理器
pub struct LockManager {
    local: LocalLocks,
    redis_client: Option<RedisClient>,
    config: LockConfig,
    /// 实例唯一标识，用于区分不同服务实例持有的锁
    instance_id: String,
}

impl LockManager {
    /// `redis_client` 为 None 时只使用本地锁
    pub fn new(redis_client: Option<RedisClient>, config: LockConfig) -> Self {
        Self {
            local: Arc::new(DashMap::new()),
            redis_client,
            config,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn local_only(config: LockConfig) -> Self {
        Self::new(None, config)
    }

    /// (tenant, user, achievement) 的锁键
    pub fn progress_key(tenant_id: &str, user_id: &str, achievement_id: Uuid) -> String {
        format!("achievement:{tenant_id}:{user_id}:{achievement_id}")
    }

    /// 当前登记的本地锁数量
    pub fn local_entries(&self) -> usize {
        self.local.len()
    }

    /// 获取锁
    ///
    /// 本地锁等待超过 `wait_timeout` 或 Redis 锁在重试次数内仍被占用时返回 `LockConflict`。
    #[instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn acquire(&self, key: &str) -> Result<LockGuard> {
        let mutex = self.local.entry(key.to_string()).or_default().clone();

        let local_guard = match tokio::time::timeout(self.config.wait_timeout, mutex.lock_owned())
            .await
        {
            Ok(guard) => guard,
            Err(_) => {
                warn!(key = %key, "等待本地锁超时");
                self.cleanup(key);
                return Err(AchievementError::LockConflict {
                    resource: key.to_string(),
                });
            }
        };

        let mut guard = LockGuard {
            key: key.to_string(),
            owner: format!("{}:{}", self.instance_id, Uuid::new_v4()),
            local_guard: Some(local_guard),
            registry: self.local.clone(),
            redis_client: None,
            released: false,
        };

        let Some(client) = &self.redis_client else {
            return Ok(guard);
        };

        for attempt in 0..self.config.retry_count.max(1) {
            match self.try_redis_lock(client, key, &guard.owner).await {
                Ok(true) => {
                    debug!(key = %key, owner = %guard.owner, "Redis 锁获取成功");
                    guard.redis_client = Some(client.clone());
                    return Ok(guard);
                }
                Ok(false) => {
                    debug!(key = %key, attempt, "Redis 锁被占用，稍后重试");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Redis 锁不可用，降级为本地锁");
                    return Ok(guard);
                }
            }
        }

        guard.released = true;
        Err(AchievementError::LockConflict {
            resource: key.to_string(),
        })
    }

    /// 使用 SET NX PX 原子操作，确保只有一个客户端能获取锁
    async fn try_redis_lock(
        &self,
        client: &RedisClient,
        key: &str,
        owner: &str,
    ) -> std::result::Result<bool, redis::RedisError> {
        let lock_key = format!("lock:{key}");
        let ttl_ms = self.config.default_ttl.as_millis() as u64;

        let mut conn = client.get_multiplexed_async_connection().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(&lock_key)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    fn cleanup(&self, key: &str) {
        self.local
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// 锁守卫
///
/// 本地锁随 drop 释放；Redis 锁需要调用 `release()`，否则只能等 TTL 过期。
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    owner: String,
    local_guard: Option<OwnedMutexGuard<()>>,
    registry: LocalLocks,
    redis_client: Option<RedisClient>,
    /// 标记锁是否已被释放，避免重复释放
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 是否同时持有 Redis 锁
    pub fn is_distributed(&self) -> bool {
        self.redis_client.is_some()
    }

    /// 显式释放锁
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match self.redis_client.take() {
            Some(client) => self.release_redis(&client).await,
            None => Ok(()),
        }
    }

    /// 使用 Lua 脚本原子验证 owner 并删除，防止误删其他客户端的锁
    async fn release_redis(&self, client: &RedisClient) -> Result<()> {
        let lock_key = format!("lock:{}", self.key);

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AchievementError::Cache(e.to_string()))?;

        let script = r#"
            if redis.call("get", KEYS[1]) == ARGV[1] then
                return redis.call("del", KEYS[1])
            else
                return 0
            end
        "#;

        let result: i32 = redis::Script::new(script)
            .key(&lock_key)
            .arg(&self.owner)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AchievementError::Cache(e.to_string()))?;

        if result == 0 {
            warn!(
                key = %self.key,
                owner = %self.owner,
                "锁已过期或被其他客户端持有"
            );
        } else {
            debug!(key = %self.key, "Redis 锁已释放");
        }

        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released && self.redis_client.is_some() {
            warn!(
                lock_key = %self.key,
                owner = %self.owner,
                "LockGuard 未显式释放，Redis 锁将等待 TTL 过期"
            );
        }

        drop(self.local_guard.take());
        self.registry
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> LockConfig {
        LockConfig {
            wait_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[test]
    fn test_lock_config_default() {
        let config = LockConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(30));
        assert_eq!(config.wait_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_lock_config_from_engine_config() {
        let engine = EngineConfig {
            lock_ttl_ms: 1_000,
            lock_wait_timeout_ms: 200,
            ..Default::default()
        };
        let config = LockConfig::from(&engine);
        assert_eq!(config.default_ttl, Duration::from_secs(1));
        assert_eq!(config.wait_timeout, Duration::from_millis(200));
    }

    #[test]
    fn test_progress_key_format() {
        let id = Uuid::now_v7();
        assert_eq!(
            LockManager::progress_key("t1", "u1", id),
            format!("achievement:t1:u1:{id}")
        );
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let manager = LockManager::local_only(quick_config());

        let guard = manager.acquire("k").await.unwrap();
        assert!(!guard.is_distributed());

        let err = manager.acquire("k").await.unwrap_err();
        assert!(matches!(err, AchievementError::LockConflict { .. }));

        guard.release().await.unwrap();
        let again = manager.acquire("k").await.unwrap();
        again.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_waiter_is_woken_on_drop() {
        let manager = LockManager::local_only(LockConfig::default());
        let guard = manager.acquire("k").await.unwrap();

        let mut waiter = tokio_test::task::spawn(manager.acquire("k"));
        tokio_test::assert_pending!(waiter.poll());

        drop(guard);
        assert!(waiter.is_woken());
        let second = tokio_test::assert_ready_ok!(waiter.poll());
        assert_eq!(second.key(), "k");
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let manager = LockManager::local_only(quick_config());
        let a = manager.acquire("a").await.unwrap();
        let b = manager.acquire("b").await.unwrap();
        assert_eq!(manager.local_entries(), 2);
        a.release().await.unwrap();
        b.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_registry_cleaned_after_release() {
        let manager = LockManager::local_only(quick_config());
        let guard = manager.acquire("k").await.unwrap();
        assert_eq!(manager.local_entries(), 1);
        drop(guard);
        assert_eq!(manager.local_entries(), 0);
    }

    #[tokio::test]
    async fn test_waiter_acquires_after_holder_releases() {
        let manager = Arc::new(LockManager::local_only(LockConfig::default()));
        let guard = manager.acquire("k").await.unwrap();

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire("k").await.map(|g| g.key().to_string()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        guard.release().await.unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), "k");
    }
}
