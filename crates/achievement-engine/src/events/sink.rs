//! 事件投递通道
//!
//! 投递语义为至少一次，消费者根据 `eventId` 去重。

use std::sync::atomic::{AtomicBool, Ordering};

use achievement_shared::events::{EventEnvelope, EventType};
use achievement_shared::kafka::{KafkaProducer, topics};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{AchievementError, Result};

/// 事件投递通道
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()>;
}

/// Kafka 投递，消息 key 为分区键
pub struct KafkaEventSink {
    producer: KafkaProducer,
    topic: String,
}

impl KafkaEventSink {
    pub fn new(producer: KafkaProducer) -> Self {
        Self {
            producer,
            topic: topics::ACHIEVEMENT_EVENTS.to_string(),
        }
    }
}

#[async_trait]
impl EventSink for KafkaEventSink {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        let (partition, offset) = self
            .producer
            .send_json(&self.topic, &envelope.partition_key, envelope)
            .await?;
        debug!(
            event_id = %envelope.event_id,
            event_type = %envelope.event_type,
            partition,
            offset,
            "事件已投递到 Kafka"
        );
        Ok(())
    }
}

/// 以结构化日志输出事件，未配置 Kafka 时使用
#[derive(Default)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        info!(
            event_id = %envelope.event_id,
            event_type = %envelope.event_type,
            tenant_id = %envelope.tenant_id,
            partition_key = %envelope.partition_key,
            actor = envelope.actor.as_deref().unwrap_or("-"),
            data = %envelope.data,
            "成就事件"
        );
        Ok(())
    }
}

/// 内存收集，测试与嵌入式使用
#[derive(Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<EventEnvelope>>,
    failing: AtomicBool,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().clone()
    }

    pub fn events_of(&self, event_type: EventType) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// 模拟下游不可用
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AchievementError::EventPublish("sink unavailable".to_string()));
        }
        self.events.lock().push(envelope.clone());
        Ok(())
    }
}
