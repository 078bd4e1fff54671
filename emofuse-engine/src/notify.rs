//! Live result notification
//!
//! Fans fusion events out to subscribers over the [`EventBus`]. Publishing
//! never waits on subscribers. A subscriber that keeps falling behind is
//! dropped after `max_lag_events` lag incidents; a subscriber that goes away
//! is released when its [`Subscription`] is dropped.

use emofuse_common::config::NotifyConfig;
use emofuse_common::events::{EventBus, FusionEvent};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    connections: AtomicU64,
    disconnections: AtomicU64,
    lag_incidents: AtomicU64,
    skipped_events: AtomicU64,
    pruned: AtomicU64,
}

/// Subscriber bookkeeping exposed through the stats endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifierStats {
    pub active_subscribers: usize,
    pub events_published: u64,
    pub total_connections: u64,
    pub total_disconnections: u64,
    pub lag_incidents: u64,
    pub skipped_events: u64,
    pub pruned_subscribers: u64,
}

/// Publisher side of live notifications
#[derive(Debug)]
pub struct ResultNotifier {
    bus: EventBus,
    max_lag_events: u32,
    counters: Arc<Counters>,
}

impl ResultNotifier {
    pub fn new(config: &NotifyConfig) -> Self {
        Self {
            bus: EventBus::new(config.capacity),
            max_lag_events: config.max_lag_events,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Fire-and-forget publish
    pub fn publish(&self, event: FusionEvent) {
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        self.bus.emit_lossy(event);
    }

    /// Subscribe to one room's events, or to everything with `None`
    ///
    /// Engine-wide events (config updates, global resets) reach every
    /// subscriber regardless of the room filter.
    pub fn subscribe(&self, room: Option<String>) -> Subscription {
        let id = Uuid::new_v4();
        self.counters.connections.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Subscriber {} connected (room filter: {})",
            id,
            room.as_deref().unwrap_or("*")
        );
        Subscription {
            id,
            room,
            events: BroadcastStream::new(self.bus.subscribe()),
            lag_incidents: 0,
            max_lag_events: self.max_lag_events,
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    pub fn stats(&self) -> NotifierStats {
        let c = &self.counters;
        NotifierStats {
            active_subscribers: self.bus.subscriber_count(),
            events_published: c.published.load(Ordering::Relaxed),
            total_connections: c.connections.load(Ordering::Relaxed),
            total_disconnections: c.disconnections.load(Ordering::Relaxed),
            lag_incidents: c.lag_incidents.load(Ordering::Relaxed),
            skipped_events: c.skipped_events.load(Ordering::Relaxed),
            pruned_subscribers: c.pruned.load(Ordering::Relaxed),
        }
    }
}

/// Receiving side of one live subscriber
pub struct Subscription {
    id: Uuid,
    room: Option<String>,
    events: BroadcastStream<FusionEvent>,
    lag_incidents: u32,
    max_lag_events: u32,
    counters: Arc<Counters>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    fn wants(&self, event: &FusionEvent) -> bool {
        match (&self.room, event.room()) {
            (Some(filter), Some(room)) => filter == room,
            _ => true,
        }
    }

    /// Next matching event
    ///
    /// Returns `None` once the bus is closed or this subscriber has lagged
    /// too often and is being pruned.
    pub async fn next(&mut self) -> Option<FusionEvent> {
        loop {
            match self.events.next().await? {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    self.lag_incidents += 1;
                    self.counters.lag_incidents.fetch_add(1, Ordering::Relaxed);
                    self.counters.skipped_events.fetch_add(skipped, Ordering::Relaxed);
                    warn!(
                        "Subscriber {} lagged, skipped {} events ({}/{})",
                        self.id, skipped, self.lag_incidents, self.max_lag_events
                    );
                    if self.lag_incidents > self.max_lag_events {
                        self.counters.pruned.fetch_add(1, Ordering::Relaxed);
                        warn!("Dropping slow subscriber {}", self.id);
                        return None;
                    }
                }
            }
        }
    }

    /// Adapt into a stream that ends when [`Subscription::next`] does
    pub fn into_stream(self) -> impl Stream<Item = FusionEvent> + Send + 'static {
        stream::unfold(self, |mut sub| async move {
            let event = sub.next().await?;
            Some((event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.counters.disconnections.fetch_add(1, Ordering::Relaxed);
        debug!("Subscriber {} disconnected", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn notifier(capacity: usize, max_lag_events: u32) -> ResultNotifier {
        ResultNotifier::new(&NotifyConfig {
            capacity,
            max_lag_events,
            ..NotifyConfig::default()
        })
    }

    fn reset(room: &str) -> FusionEvent {
        FusionEvent::RoomReset {
            room: room.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_room_filter() {
        let notifier = notifier(16, 3);
        let mut sub = notifier.subscribe(Some("kitchen".to_string()));

        notifier.publish(reset("lab"));
        notifier.publish(reset("kitchen"));
        notifier.publish(FusionEvent::AllRoomsReset {
            rooms_cleared: 2,
            timestamp: Utc::now(),
        });

        let first = sub.next().await.expect("kitchen event");
        assert_eq!(first.room(), Some("kitchen"));
        let second = sub.next().await.expect("global event");
        assert_eq!(second.event_type(), "AllRoomsReset");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let notifier = notifier(4, 3);
        notifier.publish(reset("lab"));
        assert_eq!(notifier.stats().events_published, 1);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_pruned() {
        let notifier = notifier(2, 1);
        let mut sub = notifier.subscribe(None);

        for _ in 0..6 {
            notifier.publish(reset("lab"));
        }
        // First lag is tolerated; the buffered tail is still delivered.
        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_some());

        for _ in 0..6 {
            notifier.publish(reset("lab"));
        }
        assert!(sub.next().await.is_none());

        let stats = notifier.stats();
        assert_eq!(stats.lag_incidents, 2);
        assert_eq!(stats.pruned_subscribers, 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_counted() {
        let notifier = notifier(4, 3);
        let sub = notifier.subscribe(None);
        assert_eq!(notifier.stats().active_subscribers, 1);
        drop(sub);

        let stats = notifier.stats();
        assert_eq!(stats.active_subscribers, 0);
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.total_disconnections, 1);
    }

    #[tokio::test]
    async fn test_stream_adapter() {
        let notifier = notifier(8, 3);
        let mut events = Box::pin(notifier.subscribe(None).into_stream());
        notifier.publish(reset("lab"));
        let event = events.next().await.expect("event");
        assert_eq!(event.event_type(), "RoomReset");
    }
}
