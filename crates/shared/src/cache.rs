//! Redis 缓存管理模块
//!
//! 提供 Redis 连接管理和常用缓存操作封装。值统一以 JSON 序列化存储。

use crate::config::RedisConfig;
use crate::error::{InfraError, Result};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{info, instrument};

/// Redis 缓存客户端
#[derive(Clone)]
pub struct Cache {
    client: Client,
}

impl Cache {
    /// 创建 Redis 客户端
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!("Redis client created");
        Ok(Self { client })
    }

    /// 底层客户端（分布式锁复用同一连接配置）
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(InfraError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(InfraError::from)
    }

    /// 获取值
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn.get(key).await?;

        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    /// 设置值
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let serialized = serde_json::to_string(value)?;

        let _: () = conn.set_ex(key, serialized, ttl.as_secs()).await?;
        Ok(())
    }

    /// 删除值
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    /// 批量删除（按模式）
    #[instrument(skip(self))]
    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.get_conn().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let count: u64 = conn.del(keys).await?;
        Ok(count)
    }
}

/// 缓存键生成器
pub struct CacheKey;

impl CacheKey {
    /// 排行榜缓存键，`variant` 区分过滤条件与条数
    pub fn leaderboard(tenant_id: &str, variant: &str) -> String {
        format!("achievement:leaderboard:{}:{}", tenant_id, variant)
    }

    /// 租户下所有排行榜缓存键的匹配模式
    pub fn leaderboard_pattern(tenant_id: &str) -> String {
        format!("achievement:leaderboard:{}:*", tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_generation() {
        assert_eq!(
            CacheKey::leaderboard("t1", "all:10"),
            "achievement:leaderboard:t1:all:10"
        );
        assert_eq!(
            CacheKey::leaderboard_pattern("t1"),
            "achievement:leaderboard:t1:*"
        );
    }

    #[tokio::test]
    #[ignore] // 需要 Redis
    async fn test_set_get_roundtrip() {
        let cache = Cache::new(&RedisConfig::default()).unwrap();
        cache
            .set("achievement:test:key", &vec![1, 2, 3], Duration::from_secs(5))
            .await
            .unwrap();
        let value: Option<Vec<i32>> = cache.get("achievement:test:key").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
        cache.delete("achievement:test:key").await.unwrap();
    }
}
