use devport::config::{ManagerConfig, ServerRequest};
use devport::error::{Error, Result};
use devport::port::{
    AllocationRequest, AssumeAvailable, FixedAvailability, InsightKind, PortAllocationEngine,
    WELL_KNOWN_PORTS,
};
use devport::{Framework, ServiceLifecycleManager};
use std::collections::HashSet;
use std::sync::Arc;

fn small_manager(min: u16, max: u16, excluded: &[u16]) -> ServiceLifecycleManager {
    let mut config = ManagerConfig::for_range(min, max);
    config.excluded_ports = excluded.to_vec();
    ServiceLifecycleManager::builder(config)
        .availability(Arc::new(AssumeAvailable))
        .seed(3)
        .build()
        .unwrap()
}

#[test]
fn test_allocations_stay_in_range_and_unique() -> Result<()> {
    let mut config = ManagerConfig::for_range(3300, 3399);
    config.excluded_ports = vec![3310, 3320, 3330];
    let mut engine = PortAllocationEngine::new(&config, Arc::new(AssumeAvailable)).with_seed(17);

    let frameworks = [Framework::Custom, Framework::Flask, Framework::React, Framework::Django];
    let mut seen = HashSet::new();
    for i in 0..95 {
        let mut request = AllocationRequest::new(format!("svc-{}", i));
        request.framework = Some(frameworks[i % frameworks.len()]);
        let allocation = engine.allocate(&request)?;

        assert!((3300..=3399).contains(&allocation.port));
        assert!(!config.excluded_ports.contains(&allocation.port));
        assert!(!WELL_KNOWN_PORTS.contains(&allocation.port));
        assert!(seen.insert(allocation.port), "port {} handed out twice", allocation.port);
    }

    // 100 ports minus 3 exclusions and the MySQL/RDP ports: the range is now full.
    let err = engine.allocate(&AllocationRequest::new("one-too-many")).unwrap_err();
    assert!(matches!(err, Error::PortAllocation { requested_port: None, .. }));

    Ok(())
}

#[tokio::test]
async fn test_exhausted_range_surfaces_allocation_error() -> Result<()> {
    let manager = small_manager(3000, 3009, &[]);
    for i in 0..10 {
        manager
            .create_server(ServerRequest::new(format!("app-{}", i), Framework::Express))
            .await?;
    }

    let err = manager
        .create_server(ServerRequest::new("late", Framework::Express).with_preferred_port(3005))
        .await
        .unwrap_err();

    match err {
        Error::PortAllocation { requested_port, .. } => assert_eq!(requested_port, Some(3005)),
        other => panic!("unexpected error: {}", other),
    }
    // Nothing was registered for the failed request.
    assert_eq!(manager.get_all_servers()?.len(), 10);

    Ok(())
}

#[tokio::test]
async fn test_reserved_preference_explains_the_move() -> Result<()> {
    let manager = small_manager(3000, 3009, &[3000]);

    let launch = manager
        .create_server(ServerRequest::new("todo", Framework::React).with_preferred_port(3000))
        .await?;

    assert_eq!(launch.service.port, 3001);
    let kinds: Vec<InsightKind> = launch.insights.iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![InsightKind::PreferenceConflict, InsightKind::FrameworkConvention]
    );

    let note = manager
        .port_info(3001)?
        .map(|p| p.educational_note)
        .unwrap_or_default();
    assert!(note.contains("conventional"));

    Ok(())
}

#[tokio::test]
async fn test_port_used_outside_the_manager_is_skipped() -> Result<()> {
    let occupied = Arc::new(FixedAvailability::new([5000]));
    let manager = ServiceLifecycleManager::builder(ManagerConfig::for_range(3000, 9999))
        .availability(occupied.clone())
        .build()?;

    let first = manager
        .create_server(ServerRequest::new("api", Framework::Flask).with_preferred_port(5000))
        .await?;
    assert_eq!(first.service.port, 5001);

    occupied.vacate(5000);
    let second = manager
        .create_server(ServerRequest::new("api-2", Framework::Flask).with_preferred_port(5000))
        .await?;
    assert_eq!(second.service.port, 5000);
    assert_eq!(second.insights[0].kind, InsightKind::PreferenceHonored);

    Ok(())
}

#[tokio::test]
async fn test_successful_history_is_reused() -> Result<()> {
    let manager = small_manager(3000, 9999, &[]);

    // Run a flask server on a non-conventional port and stop it cleanly.
    let id = manager
        .create_server(ServerRequest::new("old", Framework::Flask).with_preferred_port(7100))
        .await?
        .service
        .id;
    manager.stop_server(id).await?;

    // Occupy every conventional flask port.
    for port in Framework::Flask.preferred_ports() {
        manager
            .create_server(ServerRequest::new(format!("hold-{}", port), Framework::Flask).with_preferred_port(*port))
            .await?;
    }

    let launch = manager
        .create_server(ServerRequest::new("new", Framework::Flask))
        .await?;
    assert_eq!(launch.service.port, 7100);
    assert_eq!(
        launch.insights.last().map(|i| i.kind),
        Some(InsightKind::HistoricalReuse)
    );

    Ok(())
}

#[tokio::test]
async fn test_port_availability_reflects_the_registry() -> Result<()> {
    let manager = small_manager(3000, 3009, &[3007]);

    assert!(manager.is_port_available(3002)?);
    assert!(!manager.is_port_available(3007)?);
    assert!(!manager.is_port_available(9000)?);

    let launch = manager
        .create_server(ServerRequest::new("site", Framework::Custom).with_preferred_port(3002))
        .await?;
    assert!(!manager.is_port_available(3002)?);

    manager.remove_server(launch.service.id).await?;
    assert!(manager.is_port_available(3002)?);

    Ok(())
}
