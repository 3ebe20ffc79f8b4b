//! Internal event topics
//!
//! Components publish coarse-grained events on a broadcast channel after
//! the update lock is released. Subscribers must not re-enter the update
//! pipeline synchronously from a handler.

use tokio::sync::broadcast;

use crate::config::versions::VersionSource;
use crate::health::ProviderStatus;

/// Events observable by embedders and the control surface
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    ConfigUpdated {
        version_id: String,
        ordinal: u64,
        source: VersionSource,
    },
    UpdateFailed {
        reason: String,
        rollback_performed: bool,
    },
    GroupSwitched {
        from: Option<String>,
        to: String,
    },
    HealthChanged {
        provider: String,
        from: ProviderStatus,
        to: ProviderStatus,
    },
    RollbackCompleted {
        version_id: String,
    },
    RestartRequested,
}

/// Thin wrapper around a broadcast sender; sending never fails even with
/// no subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: GatewayEvent) {
        tracing::debug!(event = ?event, "Gateway event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(GatewayEvent::RestartRequested);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, GatewayEvent::RestartRequested));
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new(8);
        bus.emit(GatewayEvent::RestartRequested);
    }
}
