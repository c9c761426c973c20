use devport::config::{ManagerConfig, ServerRequest};
use devport::error::Result;
use devport::server::HealthMonitor;
use devport::{Framework, ServiceLifecycleManager};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG=devport=debug shows allocation decisions and state changes.
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    tracing::info!("Starting classroom demo");

    let mut config = ManagerConfig::for_range(3000, 9999);
    config.excluded_ports = vec![3000];
    config.delays.build_ms = 400;
    config.delays.startup_ms = 200;
    config.monitor.interval_ms = 500;

    let manager = Arc::new(ServiceLifecycleManager::new(config)?);

    // Print everything the manager publishes
    let mut events = manager.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let port = event.port.map(|p| p.to_string()).unwrap_or_default();
            println!("  [event] {:<18} {}", event.kind, port);
        }
    });

    let mut monitor = HealthMonitor::for_manager(Arc::clone(&manager));
    monitor.start()?;

    let requests = vec![
        ServerRequest::new("todo-app", Framework::React).with_preferred_port(3000),
        ServerRequest::new("notes-api", Framework::Flask).with_preferred_port(5000),
        ServerRequest::new("landing-page", Framework::Static),
    ];

    let mut ids = Vec::new();
    for request in requests {
        println!("\nCreating {} ({})...", request.name, request.framework);
        let launch = manager.create_server(request).await?;
        println!("{} is running at {}", launch.service.name, launch.service.url());
        for insight in &launch.insights {
            println!("  why: {}", insight);
        }
        for tip in launch.recommendations.iter().take(2) {
            println!("  tip: {}", tip);
        }
        ids.push(launch.service.id);
    }

    tokio::time::sleep(Duration::from_secs(2)).await;

    println!("\n=== Servers ===");
    for service in manager.get_all_servers()? {
        println!(
            "{:<14} {:<8} port {:<5} health {:?}, {} requests, {:.1}% ok",
            service.name,
            service.status,
            service.port,
            service.health,
            service.metrics.requests,
            service.metrics.success_rate
        );
    }

    println!("\nRestarting todo-app...");
    let restarted = manager.restart_server(ids[0]).await?;
    println!("todo-app is back on port {}", restarted.port);

    println!("\nLast log lines of notes-api:");
    for entry in manager.get_server_logs(ids[1], Some(5))? {
        println!("  [{}] {}", entry.source, entry.message);
    }

    println!("\nRemoving landing-page...");
    manager.remove_server(ids[2]).await?;

    monitor.stop()?;
    manager.shutdown().await?;

    println!("\n=== Usage history ===");
    for entry in manager.usage_history()? {
        println!(
            "{:<14} port {:<5} {} ms, {} issue(s)",
            entry.service_name,
            entry.port,
            entry.duration_ms.unwrap_or_default(),
            entry.issues.len()
        );
    }

    printer.abort();
    tracing::info!("Classroom demo finished");
    Ok(())
}
