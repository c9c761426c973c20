/// Server management module for devport.
///
/// This module drives development servers through their lifecycle and keeps
/// their health and metrics current.
/// All public components are instrumented with `tracing` spans.
///
/// # Components
///
/// * `lifecycle` - Creates, stops, restarts and removes servers
/// * `launcher` - Builds, launches and terminates server processes
/// * `monitor` - Periodic health and metrics refresh
/// * `process` - Server records, the lifecycle state machine and logs
///
/// # Examples
///
/// Creating and stopping a server:
///
/// ```
/// use devport::config::{ManagerConfig, ServerRequest};
/// use devport::port::AssumeAvailable;
/// use devport::server::{ServiceLifecycleManager, ServiceStatus};
/// use devport::Framework;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> devport::Result<()> {
/// let manager = ServiceLifecycleManager::builder(ManagerConfig::for_range(3000, 3099))
///     .availability(Arc::new(AssumeAvailable))
///     .build()?;
///
/// let launch = manager
///     .create_server(ServerRequest::new("todo-app", Framework::React))
///     .await?;
/// assert_eq!(launch.service.port, 3000);
/// assert_eq!(launch.service.status, ServiceStatus::Running);
///
/// let stopped = manager.stop_server(launch.service.id).await?;
/// assert_eq!(stopped.status, ServiceStatus::Stopped);
/// # Ok(())
/// # }
/// ```
///
/// Monitoring server health:
///
/// ```no_run
/// use devport::config::ManagerConfig;
/// use devport::server::{HealthMonitor, HealthMonitorConfig, ServiceLifecycleManager};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> devport::Result<()> {
/// let manager = Arc::new(ServiceLifecycleManager::new(ManagerConfig::default())?);
/// let config = HealthMonitorConfig {
///     check_interval: Duration::from_secs(2),
///     ..HealthMonitorConfig::default()
/// };
///
/// let mut monitor = HealthMonitor::new(manager, config);
/// monitor.start()?;
/// # monitor.stop()?;
/// # Ok(())
/// # }
/// ```
pub mod launcher;
pub mod lifecycle;
pub mod monitor;
mod process;

pub use launcher::{Launcher, SimulatedLauncher};
pub use lifecycle::{ManagerBuilder, ServerLaunch, ServiceLifecycleManager};
pub use monitor::{HealthMonitor, HealthMonitorConfig, TickReport};
pub use process::{
    BuildInfo, BuildStatus, HealthStatus, LogEntry, LogLevel, ProcessHandle, Service,
    ServiceConfig, ServiceId, ServiceMetrics, ServiceStatus,
};
