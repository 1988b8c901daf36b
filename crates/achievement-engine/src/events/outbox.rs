//! Outbox 投递器
//!
//! 按写入顺序取出未发布事件投递到 `EventSink`，成功后标记为已发布。
//! 遇到第一个失败即停止本轮，保证同一批内的顺序；剩余事件留给下一轮。

use std::sync::Arc;
use std::time::Duration;

use achievement_shared::observability::metrics as app_metrics;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, instrument, warn};

use super::sink::EventSink;
use crate::error::Result;
use crate::repository::AchievementStore;

pub struct OutboxDispatcher<S: AchievementStore> {
    store: Arc<S>,
    sink: Arc<dyn EventSink>,
    batch_size: i64,
    poll_interval: Duration,
    /// 同一时刻只允许一个投递循环，避免提交后触发与后台轮询重复投递
    drain_lock: Mutex<()>,
}

impl<S: AchievementStore> OutboxDispatcher<S> {
    pub fn new(
        store: Arc<S>,
        sink: Arc<dyn EventSink>,
        batch_size: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            sink,
            batch_size: batch_size.max(1),
            poll_interval,
            drain_lock: Mutex::new(()),
        }
    }

    /// 投递所有未发布事件，返回本次成功投递的数量
    ///
    /// 已有投递在进行时等待其结束后继续。
    #[instrument(skip(self))]
    pub async fn dispatch_pending(&self) -> Result<usize> {
        let _drain = self.drain_lock.lock().await;
        self.drain().await
    }

    /// 提交后的顺带投递
    ///
    /// 已有投递在进行时直接跳过，新事件由进行中的投递或后台轮询补上，
    /// 下游变慢时写请求不会在投递锁上排队。
    #[instrument(skip(self))]
    pub async fn try_dispatch_pending(&self) -> Result<usize> {
        let Ok(_drain) = self.drain_lock.try_lock() else {
            debug!("已有投递在进行，跳过");
            return Ok(0);
        };
        self.drain().await
    }

    async fn drain(&self) -> Result<usize> {
        let mut total = 0usize;

        loop {
            let batch = self.store.fetch_pending_events(self.batch_size).await?;
            if batch.is_empty() {
                break;
            }

            let mut published = Vec::with_capacity(batch.len());
            let mut stalled = false;

            for event in &batch {
                match self.sink.publish(&event.to_envelope()).await {
                    Ok(()) => published.push(event.id),
                    Err(e) => {
                        warn!(
                            event_id = %event.id,
                            event_type = %event.event_type,
                            error = %e,
                            "事件投递失败，等待下一轮重试"
                        );
                        app_metrics::record_outbox_publish("failure", 1);
                        stalled = true;
                        break;
                    }
                }
            }

            if !published.is_empty() {
                self.store.mark_events_published(&published).await?;
                app_metrics::record_outbox_publish("success", published.len() as u64);
                total += published.len();
            }

            if stalled || (batch.len() as i64) < self.batch_size {
                break;
            }
        }

        if total > 0 {
            debug!(count = total, "outbox 事件已投递");
        }
        Ok(total)
    }

    /// 后台轮询，收到关闭信号后退出
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.batch_size,
            "outbox 投递器已启动"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(e) = self.dispatch_pending().await {
                        error!(error = %e, "outbox 投递失败");
                    }
                }
            }
        }

        info!("outbox 投递器已停止");
    }
}
