//! Event types and EventBus for live fusion notifications
//!
//! The engine publishes every fusion result and room lifecycle change on an
//! [`EventBus`]. Delivery is fire-and-forget: publishing never blocks and
//! never fails the operation that produced the event.

use crate::emotion::Category;
use crate::fusion::{Channel, FusionResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Which parameter group a config update touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigScope {
    Fusion,
    Temporal,
}

/// Events published by the fusion engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum FusionEvent {
    /// A classifier observation was accepted into a room's buffer
    ObservationReceived {
        room: String,
        channel: Channel,
        emotion: Category,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// A fusion completed for a room
    FusionCompleted { room: String, result: FusionResult },

    /// One room's state was cleared
    RoomReset {
        room: String,
        timestamp: DateTime<Utc>,
    },

    /// Every room was cleared
    AllRoomsReset {
        rooms_cleared: usize,
        timestamp: DateTime<Utc>,
    },

    /// Hot-swappable parameters were replaced
    ConfigUpdated {
        scope: ConfigScope,
        timestamp: DateTime<Utc>,
    },
}

impl FusionEvent {
    /// Room the event belongs to; `None` for engine-wide events
    pub fn room(&self) -> Option<&str> {
        match self {
            FusionEvent::ObservationReceived { room, .. }
            | FusionEvent::FusionCompleted { room, .. }
            | FusionEvent::RoomReset { room, .. } => Some(room),
            FusionEvent::AllRoomsReset { .. } | FusionEvent::ConfigUpdated { .. } => None,
        }
    }

    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            FusionEvent::ObservationReceived { .. } => "ObservationReceived",
            FusionEvent::FusionCompleted { .. } => "FusionCompleted",
            FusionEvent::RoomReset { .. } => "RoomReset",
            FusionEvent::AllRoomsReset { .. } => "AllRoomsReset",
            FusionEvent::ConfigUpdated { .. } => "ConfigUpdated",
        }
    }
}

/// Broadcast channel wrapper shared by publishers and subscribers
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<FusionEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given per-subscriber buffer
    ///
    /// A subscriber falling more than `capacity` events behind observes a
    /// lag error and skips ahead.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<FusionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning how many subscribers received it
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FusionEvent,
    ) -> Result<usize, broadcast::error::SendError<FusionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, logging instead of failing when nobody listens
    ///
    /// Returns how many subscribers received it.
    pub fn emit_lossy(&self, event: FusionEvent) -> usize {
        match self.emit(event) {
            Ok(receivers) => receivers,
            Err(e) => {
                trace!("No subscribers for {} event", e.0.event_type());
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_event(room: &str) -> FusionEvent {
        FusionEvent::RoomReset {
            room: room.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(8);
        assert!(bus.emit(reset_event("lab")).is_err());
        assert_eq!(bus.emit_lossy(reset_event("lab")), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.emit_lossy(reset_event("hall")), 1);
        assert_eq!(rx.recv().await.expect("event").room(), Some("hall"));

        bus.emit(reset_event("lab")).expect("one subscriber");
        let event = rx.recv().await.expect("event");
        assert_eq!(event.room(), Some("lab"));
        assert_eq!(event.event_type(), "RoomReset");
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.emit_lossy(reset_event("lab"));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = FusionEvent::ConfigUpdated {
            scope: ConfigScope::Temporal,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "ConfigUpdated");
        assert_eq!(json["scope"], "temporal");
        assert_eq!(event.room(), None);
    }
}
