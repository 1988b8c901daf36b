//! 成就引擎服务
//!
//! 提供成就目录管理、进度上报、颁发撤销与查询的 REST API，
//! 并在后台持续投递 outbox 事件。

use std::sync::Arc;
use std::time::Duration;

use achievement_engine::api::{AppState, build_router};
use achievement_engine::engine::AchievementEngine;
use achievement_engine::events::{EventSink, KafkaEventSink, LogEventSink};
use achievement_engine::lock::{LockConfig, LockManager};
use achievement_engine::repository::{
    AchievementStore, MIGRATOR, MemoryStore, PgStore, TimeoutStore,
};
use achievement_shared::{
    cache::Cache,
    config::{AppConfig, EventSinkKind, RedisConfig, StoreBackend},
    database::Database,
    kafka::KafkaProducer,
    observability,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "achievement-engine";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：从 config/{service_name}.toml 加载，包含可观测性配置
    let config = AppConfig::load(SERVICE_NAME)?;
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(
        environment = %config.environment,
        store = ?config.engine.store,
        "Starting {} on {}",
        SERVICE_NAME,
        config.server_addr()
    );

    // Redis 不可用时降级为本地锁、不缓存排行榜
    let cache = connect_redis(&config.redis).await;
    let redis_client = if config.engine.distributed_lock {
        cache.as_ref().map(|c| c.client().clone())
    } else {
        None
    };
    let locks = Arc::new(LockManager::new(
        redis_client,
        LockConfig::from(&config.engine),
    ));

    let sink = build_event_sink(&config);
    let store_timeout = config.engine.store_timeout();

    match config.engine.store {
        StoreBackend::Postgres => {
            let db = Database::connect(&config.database).await?;
            db.run_migrations(&MIGRATOR).await?;

            let store = TimeoutStore::new(PgStore::new(db.pool().clone()), store_timeout);
            serve(&config, store, sink, locks, cache).await?;

            db.close().await;
        }
        StoreBackend::Memory => {
            warn!("使用内存存储，进程退出后数据不保留");
            let store = TimeoutStore::new(MemoryStore::new(), store_timeout);
            serve(&config, store, sink, locks, cache).await?;
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// 组装引擎并提供 HTTP 服务，直到收到关闭信号
async fn serve<S: AchievementStore + 'static>(
    config: &AppConfig,
    store: S,
    sink: Arc<dyn EventSink>,
    locks: Arc<LockManager>,
    cache: Option<Arc<Cache>>,
) -> anyhow::Result<()> {
    let mut engine = AchievementEngine::new(Arc::new(store), sink, locks, &config.engine);
    if let Some(cache) = cache {
        engine = engine.with_leaderboard_cache(cache, &config.engine);
    }
    let engine = Arc::new(engine);

    // 启动 outbox 后台投递
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = engine.dispatcher();
    let relay = tokio::spawn(dispatcher.clone().run(shutdown_rx));

    let state = AppState::new(engine, config.service_name.clone());
    let app = build_router(
        state,
        Duration::from_secs(config.server.request_timeout_seconds),
    );

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：停止接收新连接并等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if shutdown_tx.send(true).is_err() {
        warn!("outbox 投递器已提前退出");
    }
    if let Err(e) = relay.await {
        error!(error = %e, "outbox 投递任务异常结束");
    }

    // 关闭前最后一次投递
    match dispatcher.dispatch_pending().await {
        Ok(count) => info!(count, "关闭前 outbox 投递完成"),
        Err(e) => warn!(error = %e, "关闭前 outbox 投递失败，事件将在下次启动后补投"),
    }

    Ok(())
}

async fn connect_redis(config: &RedisConfig) -> Option<Arc<Cache>> {
    if !config.is_enabled() {
        info!("Redis 未配置，使用本地锁且不缓存排行榜");
        return None;
    }

    let cache = match Cache::new(config) {
        Ok(cache) => cache,
        Err(e) => {
            warn!(error = %e, "Redis 客户端创建失败，降级为本地锁");
            return None;
        }
    };

    match cache.health_check().await {
        Ok(()) => Some(Arc::new(cache)),
        Err(e) => {
            warn!(error = %e, "Redis 连接失败，降级为本地锁且不缓存排行榜");
            None
        }
    }
}

fn build_event_sink(config: &AppConfig) -> Arc<dyn EventSink> {
    match config.engine.event_sink {
        EventSinkKind::Kafka => match KafkaProducer::new(&config.kafka) {
            Ok(producer) => Arc::new(KafkaEventSink::new(producer)),
            Err(e) => {
                warn!(error = %e, "Kafka 生产者创建失败，事件改为输出到日志");
                Arc::new(LogEventSink::default())
            }
        },
        EventSinkKind::Log => Arc::new(LogEventSink::default()),
    }
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
