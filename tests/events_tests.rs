use devport::config::{ManagerConfig, ServerRequest};
use devport::error::Result;
use devport::events::{Event, EventAnnotator, EventBus, EventKind};
use devport::port::AssumeAvailable;
use devport::{Framework, ServiceLifecycleManager};
use serde_json::json;
use std::sync::Arc;

fn explain(event: &Event) -> Option<String> {
    match event.kind {
        EventKind::PortAllocated => Some(format!(
            "Port {} is now reserved for this project.",
            event.port.unwrap_or_default()
        )),
        EventKind::PortReleased => Some("Ports are returned when a server stops.".to_string()),
        _ => None,
    }
}

#[tokio::test]
async fn test_annotator_enriches_manager_events() -> Result<()> {
    let annotator: Arc<dyn EventAnnotator> = Arc::new(explain);
    let manager = ServiceLifecycleManager::builder(ManagerConfig::for_range(3000, 9999))
        .availability(Arc::new(AssumeAvailable))
        .annotator(annotator)
        .build()?;

    let id = manager
        .create_server(ServerRequest::new("api", Framework::Flask).with_preferred_port(5000))
        .await?
        .service
        .id;
    manager.stop_server(id).await?;

    let events = manager.events().recent(None);
    let allocated = events
        .iter()
        .find(|e| e.kind == EventKind::PortAllocated)
        .expect("port-allocated was published");
    assert_eq!(
        allocated.educational_context.as_deref(),
        Some("Port 5000 is now reserved for this project.")
    );
    assert!(allocated.payload["insights"].is_array());

    let started = events
        .iter()
        .find(|e| e.kind == EventKind::ServerStarted)
        .expect("server-started was published");
    assert!(started.educational_context.is_none());

    // Newest first.
    assert_eq!(events[0].kind, EventKind::ServerStopped);

    Ok(())
}

#[tokio::test]
async fn test_subscribers_receive_published_events() {
    let bus = EventBus::new(8);
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();
    assert_eq!(bus.receiver_count(), 2);

    bus.publish(Event::new(EventKind::HealthCheck, json!({ "to": "warning" })).with_port(5000));

    let a = first.recv().await.unwrap();
    let b = second.recv().await.unwrap();
    assert_eq!(a.kind, EventKind::HealthCheck);
    assert_eq!(b.port, Some(5000));
}

#[test]
fn test_event_wire_shape() {
    let event = Event::new(EventKind::PortReleased, json!({ "durationMs": 12 })).with_port(3001);
    let value = serde_json::to_value(&event).unwrap();

    assert_eq!(value["type"], "port-released");
    assert_eq!(value["port"], 3001);
    assert_eq!(value["payload"]["durationMs"], 12);
    assert!(value.get("timestamp").is_some());
    assert!(value.get("educationalContext").is_some());
}

#[test]
fn test_publish_without_subscribers_still_records() {
    let bus = EventBus::new(2);
    bus.publish(Event::new(EventKind::ServerStarting, json!({})));
    bus.publish(Event::new(EventKind::ServerStarted, json!({})));
    bus.publish(Event::new(EventKind::ServerStopping, json!({})));

    let recent = bus.recent(None);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].kind, EventKind::ServerStopping);
    assert_eq!(recent[1].kind, EventKind::ServerStarted);
    assert_eq!(bus.recent(Some(1)).len(), 1);
}
