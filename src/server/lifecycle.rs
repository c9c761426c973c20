use crate::config::{validate_config, ManagerConfig, ServerRequest};
use crate::error::{Error, Result};
use crate::events::{Event, EventAnnotator, EventBus, EventKind};
use crate::port::{
    AllocationRequest, AvailabilityCheck, Insight, Port, PortAllocationEngine, PortMetrics,
    PortStatus, TcpBindCheck, UsageHistoryEntry,
};
use crate::server::launcher::{Launcher, SimulatedLauncher};
use crate::server::{
    BuildInfo, BuildStatus, HealthStatus, LogEntry, LogLevel, ProcessHandle, Service, ServiceId,
    ServiceMetrics, ServiceStatus,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Result of creating a server
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerLaunch {
    /// The server record as it stood once running
    pub service: Service,
    /// Why the port was chosen
    pub insights: Vec<Insight>,
    /// Framework-appropriate tips
    pub recommendations: Vec<String>,
}

/// Builder for [`ServiceLifecycleManager`] collaborators
///
/// # Examples
///
/// ```
/// use devport::config::ManagerConfig;
/// use devport::port::AssumeAvailable;
/// use devport::ServiceLifecycleManager;
/// use std::sync::Arc;
///
/// let manager = ServiceLifecycleManager::builder(ManagerConfig::for_range(3000, 3009))
///     .availability(Arc::new(AssumeAvailable))
///     .seed(11)
///     .build()
///     .unwrap();
/// assert!(manager.allocated_ports().unwrap().is_empty());
/// ```
pub struct ManagerBuilder {
    config: ManagerConfig,
    availability: Option<Arc<dyn AvailabilityCheck>>,
    launcher: Option<Arc<dyn Launcher>>,
    annotator: Option<Arc<dyn EventAnnotator>>,
    seed: Option<u64>,
}

impl ManagerBuilder {
    /// Replace the default bind-test availability check.
    pub fn availability(mut self, availability: Arc<dyn AvailabilityCheck>) -> Self {
        self.availability = Some(availability);
        self
    }

    /// Replace the default simulated launcher.
    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Attach an annotator for published events.
    pub fn annotator(mut self, annotator: Arc<dyn EventAnnotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    /// Seed the allocator's fallback scan.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration and build the manager.
    pub fn build(self) -> Result<ServiceLifecycleManager> {
        validate_config(&self.config)?;

        let availability = self
            .availability
            .unwrap_or_else(|| Arc::new(TcpBindCheck));
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(SimulatedLauncher::new(self.config.delays)));

        let mut engine = PortAllocationEngine::new(&self.config, availability);
        if let Some(seed) = self.seed {
            engine = engine.with_seed(seed);
        }

        let mut events = EventBus::new(self.config.event_capacity);
        if let Some(annotator) = self.annotator {
            events = events.with_annotator(annotator);
        }

        Ok(ServiceLifecycleManager {
            config: self.config,
            engine: Mutex::new(engine),
            services: Mutex::new(HashMap::new()),
            processes: Mutex::new(HashMap::new()),
            events: Arc::new(events),
            launcher,
        })
    }
}

/// Creates, starts, stops, restarts and removes development servers.
///
/// The manager is the single owner of the port table (through its
/// [`PortAllocationEngine`]) and of the service table. Independent managers
/// never share state, so each IDE session or test can run its own.
///
/// Every registry mutation happens under a short synchronous lock; locks are
/// never held across a launcher call, so unrelated operations interleave
/// freely while a build or startup is suspended.
/// All public methods are instrumented with `tracing` spans.
pub struct ServiceLifecycleManager {
    config: ManagerConfig,
    engine: Mutex<PortAllocationEngine>,
    services: Mutex<HashMap<ServiceId, Service>>,
    processes: Mutex<HashMap<ServiceId, ProcessHandle>>,
    events: Arc<EventBus>,
    launcher: Arc<dyn Launcher>,
}

impl ServiceLifecycleManager {
    /// Create a manager with the default collaborators: a real bind-test for
    /// port availability and the simulated launcher.
    #[tracing::instrument(skip(config), fields(min = config.port_range.min, max = config.port_range.max))]
    pub fn new(config: ManagerConfig) -> Result<Self> {
        tracing::info!("Creating new ServiceLifecycleManager");
        Self::builder(config).build()
    }

    /// Start building a manager with custom collaborators.
    pub fn builder(config: ManagerConfig) -> ManagerBuilder {
        ManagerBuilder {
            config,
            availability: None,
            launcher: None,
            annotator: None,
            seed: None,
        }
    }

    /// Create a manager from a JSON or YAML configuration file.
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = ManagerConfig::from_file(path)?;
        Self::new(config)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The event bus this manager publishes to.
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Subscribe to live events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn engine(&self) -> Result<MutexGuard<'_, PortAllocationEngine>> {
        self.engine.lock().map_err(|_| Error::lock("port allocation engine"))
    }

    fn services(&self) -> Result<MutexGuard<'_, HashMap<ServiceId, Service>>> {
        self.services.lock().map_err(|_| Error::lock("service table"))
    }

    fn processes(&self) -> Result<MutexGuard<'_, HashMap<ServiceId, ProcessHandle>>> {
        self.processes.lock().map_err(|_| Error::lock("process table"))
    }

    /// Create a server and wait until it is running.
    ///
    /// Allocation failures surface unchanged as [`Error::PortAllocation`].
    /// Anything that fails after the port was allocated releases the port,
    /// leaves the server in `error` and returns [`Error::ServiceStartup`].
    #[tracing::instrument(skip(self, request), fields(name = %request.name, framework = %request.framework))]
    pub async fn create_server(&self, request: ServerRequest) -> Result<ServerLaunch> {
        tracing::info!("Creating server");
        let framework = request.framework;

        let mut alloc_request = AllocationRequest::for_framework(request.name.clone(), framework);
        alloc_request.preferred_port = request.preferred_port;
        let allocation = self.engine()?.allocate(&alloc_request).map_err(|e| {
            tracing::error!(error = %e, "Port allocation failed");
            e
        })?;
        let port = allocation.port;

        let config = framework.service_config(port, &request);
        let mut service = Service::new(request, config);
        let id = service.id;

        let bound = self.engine()?.bind(port, id);
        if let Err(e) = bound {
            self.engine()?.deallocate(port);
            return Err(e);
        }
        self.publish_allocation(id, port, &allocation.insights);

        let cap = self.config.max_logs_per_service;
        for insight in &allocation.insights {
            service.push_log(LogLevel::Info, "system", insight.message.clone(), cap);
        }
        service.push_log(
            LogLevel::Info,
            "system",
            format!("Starting {} ({}) on port {}", service.name, framework, port),
            cap,
        );
        service.push_log(LogLevel::Info, "system", format!("$ {}", service.config.command_line()), cap);
        let name = service.name.clone();
        self.services()?.insert(id, service);

        self.events.publish(
            Event::new(
                EventKind::ServerStarting,
                json!({ "name": name, "framework": framework, "to": ServiceStatus::Starting }),
            )
            .with_service(id)
            .with_port(port),
        );

        let service = self.launch(id).await?;
        let recommendations = framework.recommendations(&service.config);

        tracing::info!(service_id = %id, port, "Server created successfully");
        Ok(ServerLaunch {
            service,
            insights: allocation.insights,
            recommendations,
        })
    }

    /// Stop a server and release its port.
    ///
    /// Legal from `running`, `starting` and `error`.
    #[tracing::instrument(skip(self), fields(service_id = %id))]
    pub async fn stop_server(&self, id: ServiceId) -> Result<Service> {
        tracing::info!("Attempting to stop server");
        self.transition(id, ServiceStatus::Stopping, "Stopping server", EventKind::ServerStopping)?;

        let handle = self.processes()?.remove(&id);
        if let Some(handle) = handle {
            let pid = handle.pid;
            if let Err(e) = self.launcher.terminate(handle).await {
                let reason = format!("failed to terminate process {}: {}", pid, e);
                self.mark_failed(id, &reason);
                return Err(Error::Launch(reason));
            }
            self.log(id, LogLevel::Info, "system", format!("Process {} exited", pid))?;
        }

        let port = self.service_snapshot(id, |s| s.port)?;
        self.release_port(id, port)?;

        {
            let mut services = self.services()?;
            if let Some(service) = services.get_mut(&id) {
                service.health = HealthStatus::Unknown;
                service.metrics.cpu_percent = 0.0;
                service.metrics.memory_mb = 0.0;
            }
        }
        self.transition(id, ServiceStatus::Stopped, "Server stopped", EventKind::ServerStopped)?;

        tracing::info!("Server stopped successfully");
        self.get_server(id)
    }

    /// Restart a server, keeping its port.
    ///
    /// A running server is stopped first without releasing its port. A
    /// stopped or failed server gets a port again, preferring the one it had.
    #[tracing::instrument(skip(self), fields(service_id = %id))]
    pub async fn restart_server(&self, id: ServiceId) -> Result<Service> {
        tracing::info!("Attempting to restart server");
        let from = self.transition(
            id,
            ServiceStatus::Restarting,
            "Restarting server",
            EventKind::ServerRestarting,
        )?;
        let was_running = from == ServiceStatus::Running;

        let handle = self.processes()?.remove(&id);
        if let Some(handle) = handle {
            let pid = handle.pid;
            if let Err(e) = self.launcher.terminate(handle).await {
                let reason = format!("failed to terminate process {}: {}", pid, e);
                let (name, port) = self.mark_failed(id, &reason);
                return Err(Error::ServiceStartup { name, port, reason });
            }
            if was_running {
                self.log(id, LogLevel::Info, "system", format!("Process {} exited; keeping port", pid))?;
            }
        }

        self.ensure_port(id)?;

        let settle = self.config.delays.restart_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let service = self.launch(id).await?;
        tracing::info!(port = service.port, "Server restarted successfully");
        Ok(service)
    }

    /// Remove a server, stopping it first if it is running.
    ///
    /// The bound port is always released.
    #[tracing::instrument(skip(self), fields(service_id = %id))]
    pub async fn remove_server(&self, id: ServiceId) -> Result<()> {
        tracing::info!("Attempting to remove server");
        let status = self.service_snapshot(id, |s| s.status)?;

        match status {
            ServiceStatus::Running | ServiceStatus::Starting => {
                self.stop_server(id).await?;
            }
            ServiceStatus::Stopping | ServiceStatus::Restarting => {
                return Err(Error::InvalidTransition {
                    id: id.to_string(),
                    from: status,
                    to: ServiceStatus::Stopped,
                });
            }
            ServiceStatus::Stopped | ServiceStatus::Error => {}
        }

        let handle = self.processes()?.remove(&id);
        if let Some(handle) = handle {
            if let Err(e) = self.launcher.terminate(handle).await {
                tracing::warn!(error = %e, "Failed to terminate leftover process during removal");
            }
        }

        let port = self.service_snapshot(id, |s| s.port)?;
        self.release_port(id, port)?;

        let removed = self
            .services()?
            .remove(&id)
            .ok_or_else(|| Error::ServiceNotFound(id.to_string()))?;

        self.events.publish(
            Event::new(EventKind::ServerRemoved, json!({ "name": removed.name }))
                .with_service(id)
                .with_port(port),
        );
        tracing::info!("Server removed");
        Ok(())
    }

    /// Stop every server that is running, starting or failed.
    ///
    /// Collects all errors and reports them together.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Stopping all servers");
        let ids: Vec<ServiceId> = self
            .services()?
            .values()
            .filter(|s| {
                matches!(
                    s.status,
                    ServiceStatus::Running | ServiceStatus::Starting | ServiceStatus::Error
                )
            })
            .map(|s| s.id)
            .collect();

        let mut errors = Vec::new();
        for id in ids {
            if let Err(e) = self.stop_server(id).await {
                tracing::error!(service_id = %id, error = %e, "Failed to stop server");
                errors.push((id, e));
            }
        }

        if errors.is_empty() {
            tracing::info!("All servers stopped successfully");
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0).1)
        } else {
            let error_msg = errors
                .iter()
                .map(|(id, e)| format!("{}: {}", id, e))
                .collect::<Vec<_>>()
                .join("; ");
            Err(Error::Other(format!("Multiple servers failed to stop: {}", error_msg)))
        }
    }

    /// A snapshot of one server.
    pub fn get_server(&self, id: ServiceId) -> Result<Service> {
        self.service_snapshot(id, Service::clone)
    }

    /// The last `limit` log lines of a server, oldest first.
    #[tracing::instrument(skip(self), fields(service_id = %id))]
    pub fn get_server_logs(&self, id: ServiceId, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        self.service_snapshot(id, |s| s.recent_logs(limit))
    }

    /// Snapshots of every server, oldest first.
    pub fn get_all_servers(&self) -> Result<Vec<Service>> {
        let mut servers: Vec<Service> = self.services()?.values().cloned().collect();
        servers.sort_by_key(|s| s.created_at);
        Ok(servers)
    }

    /// Framework tips for a server's current configuration.
    pub fn recommendations(&self, id: ServiceId) -> Result<Vec<String>> {
        self.service_snapshot(id, |s| s.framework.recommendations(&s.config))
    }

    /// Live port entries sorted by number.
    pub fn allocated_ports(&self) -> Result<Vec<Port>> {
        Ok(self.engine()?.registry().entries().into_iter().cloned().collect())
    }

    /// Live entry for `port`, if any.
    pub fn port_info(&self, port: u16) -> Result<Option<Port>> {
        Ok(self.engine()?.registry().get(port).cloned())
    }

    /// Registry state of `port`.
    pub fn port_status(&self, port: u16) -> Result<PortStatus> {
        Ok(self.engine()?.registry().status(port))
    }

    /// Whether `port` could be allocated right now.
    pub fn is_port_available(&self, port: u16) -> Result<bool> {
        Ok(self.engine()?.is_available(port))
    }

    /// Every recorded allocation window, oldest first.
    pub fn usage_history(&self) -> Result<Vec<UsageHistoryEntry>> {
        Ok(self.engine()?.history().entries())
    }

    /// Launch (or relaunch) a server that is `starting` or `restarting`.
    async fn launch(&self, id: ServiceId) -> Result<Service> {
        let (config, name, port) = self.service_snapshot(id, |s| (s.config.clone(), s.name.clone(), s.port))?;
        let framework = config.framework;

        if framework.is_bundled() {
            self.log(id, LogLevel::Info, "build", format!("Building {} bundle...", framework))?;
            let info = match self.launcher.build(&config).await {
                Ok(info) => info,
                Err(e) => {
                    let reason = format!("build failed: {}", e);
                    self.mark_failed(id, &reason);
                    return Err(Error::ServiceStartup { name, port, reason });
                }
            };
            let status = info.status;
            let errors = info.errors.join("; ");
            self.record_build(id, port, info)?;

            if status == BuildStatus::Failed {
                let reason = format!("build failed: {}", errors);
                self.mark_failed(id, &reason);
                return Err(Error::ServiceStartup { name, port, reason });
            }
        }

        let handle = match self.launcher.launch(&config).await {
            Ok(handle) => handle,
            Err(e) => {
                let reason = e.to_string();
                self.mark_failed(id, &reason);
                return Err(Error::ServiceStartup { name, port, reason });
            }
        };

        let cap = self.config.max_logs_per_service;
        let committed = {
            let mut services = self.services()?;
            match services.get_mut(&id) {
                Some(service)
                    if matches!(
                        service.status,
                        ServiceStatus::Starting | ServiceStatus::Restarting
                    ) =>
                {
                    let from = service.status;
                    service.status = ServiceStatus::Running;
                    service.health = HealthStatus::Healthy;
                    service.started_at = Some(Utc::now());
                    service.metrics = ServiceMetrics::default();
                    service.last_error = None;
                    service.push_log(
                        LogLevel::Info,
                        "system",
                        format!("Server is running at {} (pid {})", service.url(), handle.pid),
                        cap,
                    );
                    for line in framework.startup_lines(&service.name, &service.config) {
                        service.push_log(LogLevel::Info, "stdout", line, cap);
                    }
                    self.processes()?.insert(id, handle.clone());
                    Some((from, service.clone()))
                }
                _ => None,
            }
        };

        match committed {
            Some((from, service)) => {
                let kind = if from == ServiceStatus::Restarting {
                    EventKind::ServerRestarted
                } else {
                    EventKind::ServerStarted
                };
                self.events.publish(
                    Event::new(
                        kind,
                        json!({ "name": service.name, "from": from, "to": ServiceStatus::Running, "url": service.url() }),
                    )
                    .with_service(id)
                    .with_port(service.port),
                );
                Ok(service)
            }
            None => {
                tracing::warn!(service_id = %id, "Server left the starting state during launch, terminating process");
                if let Err(e) = self.launcher.terminate(handle).await {
                    tracing::warn!(error = %e, "Failed to terminate orphaned process");
                }
                Err(Error::ServiceStartup {
                    name,
                    port,
                    reason: "server was stopped or removed before it finished starting".to_string(),
                })
            }
        }
    }

    fn record_build(&self, id: ServiceId, port: u16, info: BuildInfo) -> Result<()> {
        let cap = self.config.max_logs_per_service;
        {
            let mut services = self.services()?;
            let service = services
                .get_mut(&id)
                .ok_or_else(|| Error::ServiceNotFound(id.to_string()))?;
            for warning in &info.warnings {
                service.push_log(LogLevel::Warn, "build", warning.clone(), cap);
            }
            for error in &info.errors {
                service.push_log(LogLevel::Error, "build", error.clone(), cap);
            }
            let summary = match info.status {
                BuildStatus::Failed => format!("Build failed after {} ms", info.duration_ms),
                _ => format!(
                    "Build finished in {} ms ({:.1} kB)",
                    info.duration_ms,
                    info.output_size_bytes as f64 / 1024.0
                ),
            };
            service.push_log(LogLevel::Info, "build", summary, cap);
            service.build_info = Some(info.clone());
        }

        self.events.publish(
            Event::new(EventKind::BuildCompleted, json!(info))
                .with_service(id)
                .with_port(port),
        );
        Ok(())
    }

    /// Re-acquire a port for a server that no longer holds one.
    fn ensure_port(&self, id: ServiceId) -> Result<()> {
        let (old_port, name, framework, request) =
            self.service_snapshot(id, |s| (s.port, s.name.clone(), s.framework, s.request.clone()))?;

        let held = self.engine()?.is_held_by(old_port, id);
        if held {
            return Ok(());
        }

        let alloc_request =
            AllocationRequest::for_framework(name.clone(), framework).with_preferred_port(old_port);
        let allocated = self.engine()?.allocate(&alloc_request);
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                self.mark_failed(id, &e.to_string());
                return Err(e);
            }
        };
        let port = allocation.port;
        let bound = self.engine()?.bind(port, id);
        if let Err(e) = bound {
            self.engine()?.deallocate(port);
            self.mark_failed(id, &e.to_string());
            return Err(e);
        }
        self.publish_allocation(id, port, &allocation.insights);

        let cap = self.config.max_logs_per_service;
        let mut services = self.services()?;
        let service = services
            .get_mut(&id)
            .ok_or_else(|| Error::ServiceNotFound(id.to_string()))?;
        service.port = port;
        service.config = framework.service_config(port, &request);
        for insight in &allocation.insights {
            service.push_log(LogLevel::Info, "system", insight.message.clone(), cap);
        }
        Ok(())
    }

    /// Apply a checked lifecycle transition, log it and publish it.
    /// Returns the previous status.
    fn transition(
        &self,
        id: ServiceId,
        to: ServiceStatus,
        message: &str,
        kind: EventKind,
    ) -> Result<ServiceStatus> {
        let cap = self.config.max_logs_per_service;
        let (from, port) = {
            let mut services = self.services()?;
            let service = services
                .get_mut(&id)
                .ok_or_else(|| Error::ServiceNotFound(id.to_string()))?;
            let from = service.status;
            if !from.can_transition_to(to) {
                tracing::warn!(%from, %to, "Rejected lifecycle transition");
                return Err(Error::InvalidTransition {
                    id: id.to_string(),
                    from,
                    to,
                });
            }
            service.status = to;
            let level = if to == ServiceStatus::Error {
                LogLevel::Error
            } else {
                LogLevel::Info
            };
            service.push_log(level, "system", message, cap);
            (from, service.port)
        };

        tracing::info!(service_id = %id, %from, %to, "Service status changed");
        self.events.publish(
            Event::new(kind, json!({ "from": from, "to": to, "message": message }))
                .with_service(id)
                .with_port(port),
        );
        Ok(from)
    }

    /// Move a server to `error` after a failure and release its port.
    /// Problems while doing so are logged, never returned.
    fn mark_failed(&self, id: ServiceId, reason: &str) -> (String, u16) {
        tracing::error!(service_id = %id, %reason, "Server failed");
        let cap = self.config.max_logs_per_service;

        let snapshot = match self.services() {
            Ok(mut services) => services.get_mut(&id).map(|service| {
                service.status = ServiceStatus::Error;
                service.health = HealthStatus::Error;
                service.last_error = Some(reason.to_string());
                service.push_log(LogLevel::Error, "system", format!("Error: {}", reason), cap);
                (service.name.clone(), service.port)
            }),
            Err(e) => {
                tracing::error!(error = %e, "Could not record failure");
                None
            }
        };

        let Some((name, port)) = snapshot else {
            return (id.to_string(), 0);
        };

        match self.engine() {
            Ok(mut engine) => {
                if engine.is_held_by(port, id) {
                    engine.record_issue(port, reason);
                }
            }
            Err(e) => tracing::error!(error = %e, "Could not record port issue"),
        }

        self.events.publish(
            Event::new(
                EventKind::ServerError,
                json!({ "name": name, "to": ServiceStatus::Error, "reason": reason }),
            )
            .with_service(id)
            .with_port(port),
        );

        if let Err(e) = self.release_port(id, port) {
            tracing::error!(error = %e, port, "Could not release port after failure");
        }
        (name, port)
    }

    /// Release `port` if `id` still holds it, publishing `port-released`.
    fn release_port(&self, id: ServiceId, port: u16) -> Result<()> {
        let closed = self.engine()?.deallocate_for(port, id);
        if let Some(entry) = closed {
            self.log(id, LogLevel::Info, "system", format!("Released port {}", port))
                .ok();
            self.events.publish(
                Event::new(
                    EventKind::PortReleased,
                    json!({ "serviceName": entry.service_name, "durationMs": entry.duration_ms }),
                )
                .with_service(id)
                .with_port(port),
            );
        }
        Ok(())
    }

    fn publish_allocation(&self, id: ServiceId, port: u16, insights: &[Insight]) {
        let summary = insights
            .iter()
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let mut event = Event::new(EventKind::PortAllocated, json!({ "insights": insights }))
            .with_service(id)
            .with_port(port);
        if !summary.is_empty() {
            event.payload["summary"] = json!(summary);
        }
        self.events.publish(event);
    }

    fn service_snapshot<R>(&self, id: ServiceId, f: impl FnOnce(&Service) -> R) -> Result<R> {
        self.services()?
            .get(&id)
            .map(f)
            .ok_or_else(|| Error::ServiceNotFound(id.to_string()))
    }

    /// Append a line to a server's log.
    pub(crate) fn log(
        &self,
        id: ServiceId,
        level: LogLevel,
        source: &str,
        message: impl Into<String>,
    ) -> Result<()> {
        let cap = self.config.max_logs_per_service;
        let mut services = self.services()?;
        let service = services
            .get_mut(&id)
            .ok_or_else(|| Error::ServiceNotFound(id.to_string()))?;
        service.push_log(level, source, message, cap);
        Ok(())
    }

    /// Ids of servers currently `running`.
    pub(crate) fn running_ids(&self) -> Result<Vec<ServiceId>> {
        Ok(self
            .services()?
            .values()
            .filter(|s| s.status == ServiceStatus::Running)
            .map(|s| s.id)
            .collect())
    }

    /// Mutate a server only while it is still `running`.
    pub(crate) fn update_running<R>(
        &self,
        id: ServiceId,
        f: impl FnOnce(&mut Service) -> R,
    ) -> Result<Option<R>> {
        let mut services = self.services()?;
        let service = services
            .get_mut(&id)
            .ok_or_else(|| Error::ServiceNotFound(id.to_string()))?;
        if service.status != ServiceStatus::Running {
            return Ok(None);
        }
        Ok(Some(f(service)))
    }

    /// Mutate the traffic counters of a port held by `id`.
    pub(crate) fn update_port_metrics(
        &self,
        port: u16,
        id: ServiceId,
        f: impl FnOnce(&mut PortMetrics),
    ) -> Result<bool> {
        let mut engine = self.engine()?;
        if !engine.is_held_by(port, id) {
            return Ok(false);
        }
        match engine.port_metrics_mut(port) {
            Some(metrics) => {
                f(metrics);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Attach an issue to the open history window of a held port.
    pub(crate) fn record_port_issue(&self, port: u16, id: ServiceId, issue: &str) -> Result<()> {
        let mut engine = self.engine()?;
        if engine.is_held_by(port, id) {
            engine.record_issue(port, issue);
        }
        Ok(())
    }
}
