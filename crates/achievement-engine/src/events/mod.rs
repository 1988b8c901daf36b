//! 事件模块
//!
//! 领域事件随状态变更写入 outbox，由 `OutboxDispatcher` 投递到 `EventSink`。

mod model;
mod outbox;
mod sink;

pub use model::{
    AchievementChanged, AchievementEarned, AchievementEvent, AchievementRevoked, EVENT_SOURCE,
    OutboxEvent, ProgressUpdated,
};
pub use outbox::OutboxDispatcher;
pub use sink::{EventSink, InMemoryEventSink, KafkaEventSink, LogEventSink};

#[cfg(test)]
pub use sink::MockEventSink;
