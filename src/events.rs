//! Event publishing for allocation and lifecycle changes.
//!
//! This module provides a publish/subscribe bus built on a Tokio broadcast
//! channel. Every port allocation, port release, lifecycle transition and
//! health downgrade is published as an [`Event`]. Subscribers receive events
//! as they happen; the bus also keeps a bounded history so a UI that attaches
//! late can render what already happened.
//!
//! Events can carry an educational annotation. The text itself is produced
//! outside this crate by an [`EventAnnotator`] injected into the bus.

use crate::server::ServiceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Kind of event published on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A port was committed to a service
    PortAllocated,
    /// A port was returned to the free pool
    PortReleased,
    /// A server was registered and is starting
    ServerStarting,
    /// A simulated bundler build finished
    BuildCompleted,
    /// A server is running and listening
    ServerStarted,
    /// A server is shutting down
    ServerStopping,
    /// A server has stopped
    ServerStopped,
    /// A server began restarting
    ServerRestarting,
    /// A server came back up after a restart
    ServerRestarted,
    /// A server entered the error state
    ServerError,
    /// A server record was purged
    ServerRemoved,
    /// A health check downgraded a server
    HealthCheck,
}

impl EventKind {
    /// Wire name of the event kind, e.g. `port-released`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PortAllocated => "port-allocated",
            EventKind::PortReleased => "port-released",
            EventKind::ServerStarting => "server-starting",
            EventKind::BuildCompleted => "build-completed",
            EventKind::ServerStarted => "server-started",
            EventKind::ServerStopping => "server-stopping",
            EventKind::ServerStopped => "server-stopped",
            EventKind::ServerRestarting => "server-restarting",
            EventKind::ServerRestarted => "server-restarted",
            EventKind::ServerError => "server-error",
            EventKind::ServerRemoved => "server-removed",
            EventKind::HealthCheck => "health-check",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A published event. Immutable once it leaves the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event kind
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Port the event concerns, if any
    pub port: Option<u16>,
    /// Service the event concerns, if any
    pub service_id: Option<ServiceId>,
    /// Time the event was created
    pub timestamp: DateTime<Utc>,
    /// Kind-specific details
    pub payload: Value,
    /// Advisory text attached by an [`EventAnnotator`]
    pub educational_context: Option<String>,
}

impl Event {
    /// Create an event with the given kind and payload.
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            port: None,
            service_id: None,
            timestamp: Utc::now(),
            payload,
            educational_context: None,
        }
    }

    /// Attach the port this event concerns.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Attach the service this event concerns.
    pub fn with_service(mut self, id: ServiceId) -> Self {
        self.service_id = Some(id);
        self
    }
}

/// Produces educational annotations for events.
///
/// Implementations live outside this crate; the bus only attaches whatever
/// text they return.
pub trait EventAnnotator: Send + Sync {
    /// Return advisory text for `event`, or `None` to leave it unannotated.
    fn annotate(&self, event: &Event) -> Option<String>;
}

impl<F> EventAnnotator for F
where
    F: Fn(&Event) -> Option<String> + Send + Sync,
{
    fn annotate(&self, event: &Event) -> Option<String> {
        self(event)
    }
}

/// Largest accepted channel and history capacity.
pub const MAX_EVENT_CAPACITY: usize = 65_536;

/// Broadcasts events to every subscriber and keeps a bounded history.
pub struct EventBus {
    /// Broadcast channel for live subscribers
    sender: broadcast::Sender<Event>,
    /// Most recent events, oldest first
    history: Mutex<VecDeque<Event>>,
    /// Maximum history length
    capacity: usize,
    /// Optional annotation source
    annotator: Option<Arc<dyn EventAnnotator>>,
}

impl EventBus {
    /// Create a new bus with the specified channel and history capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_EVENT_CAPACITY);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            annotator: None,
        }
    }

    /// Attach an annotator whose output becomes `educational_context`.
    pub fn with_annotator(mut self, annotator: Arc<dyn EventAnnotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    /// Get a new receiver for live events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish an event. Never fails: with no subscribers the event is only
    /// recorded in history.
    pub fn publish(&self, mut event: Event) -> Event {
        if event.educational_context.is_none() {
            if let Some(annotator) = &self.annotator {
                event.educational_context = annotator.annotate(&event);
            }
        }

        match self.history.lock() {
            Ok(mut history) => {
                if history.len() >= self.capacity {
                    history.pop_front();
                }
                history.push_back(event.clone());
            }
            Err(_) => tracing::warn!(kind = %event.kind, "Event history lock poisoned, event not recorded"),
        }

        if self.sender.receiver_count() > 0 {
            if let Err(e) = self.sender.send(event.clone()) {
                tracing::debug!(error = %e, kind = %event.kind, "Event receivers went away during send");
            }
        } else {
            tracing::debug!(kind = %event.kind, "No event receivers, event only recorded");
        }

        event
    }

    /// Recent events, newest first.
    pub fn recent(&self, limit: Option<usize>) -> Vec<Event> {
        let history = match self.history.lock() {
            Ok(history) => history,
            Err(_) => {
                tracing::warn!("Event history lock poisoned");
                return Vec::new();
            }
        };

        let take = limit.unwrap_or(history.len());
        history.iter().rev().take(take).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_history_is_bounded() {
        let bus = EventBus::new(2);
        for port in [3000, 3001, 3002] {
            bus.publish(Event::new(EventKind::PortAllocated, json!({})).with_port(port));
        }

        let recent = bus.recent(None);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].port, Some(3002));
        assert_eq!(recent[1].port, Some(3001));
    }

    #[test]
    fn test_capacity_is_capped() {
        let bus = EventBus::new(usize::MAX);
        assert_eq!(bus.capacity, MAX_EVENT_CAPACITY);
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let event = Event::new(EventKind::PortReleased, json!({"port": 3000}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "port-released");
        assert_eq!(EventKind::HealthCheck.to_string(), "health-check");
    }
}
