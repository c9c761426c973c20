use crate::config::MonitorSettings;
use crate::error::{Error, Result};
use crate::events::{Event, EventKind};
use crate::server::lifecycle::ServiceLifecycleManager;
use crate::server::{HealthStatus, LogLevel, ServiceId, ServiceMetrics};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

/// Health monitor configuration
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Check interval
    pub check_interval: Duration,
    /// Chance that one simulated request fails
    pub error_probability: f64,
    /// Success rate (percent) below which a server is degraded to `warning`
    pub warning_success_rate: f64,
    /// Success rate (percent) below which a server is degraded to `error`
    pub error_success_rate: f64,
    /// Memory gauge above which a server is degraded to `warning`
    pub memory_warning_mb: f64,
    /// Seed for the simulated traffic. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self::from_settings(&MonitorSettings::default())
    }
}

impl HealthMonitorConfig {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            check_interval: settings.interval(),
            error_probability: 0.02,
            warning_success_rate: 95.0,
            error_success_rate: 80.0,
            memory_warning_mb: 1024.0,
            seed: settings.seed,
        }
    }

    fn assess(&self, metrics: &ServiceMetrics) -> HealthStatus {
        if metrics.success_rate < self.error_success_rate {
            HealthStatus::Error
        } else if metrics.success_rate < self.warning_success_rate
            || metrics.memory_mb > self.memory_warning_mb
        {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

/// What one monitor tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Running servers examined
    pub checked: usize,
    /// Servers whose health got worse during this tick
    pub downgraded: Vec<ServiceId>,
    /// Servers whose check failed; logged and skipped
    pub failures: usize,
}

/// One tick's worth of simulated traffic for a server
struct TrafficSample {
    requests: u64,
    errors: u64,
    latency_ms: f64,
    bytes: u64,
    cpu_percent: f64,
    memory_mb: f64,
}

impl TrafficSample {
    fn draw(rng: &mut StdRng, config: &HealthMonitorConfig, bundled: bool) -> Self {
        let requests = rng.gen_range(1..=20u64);
        // NaN would slip through clamp and make gen_bool panic.
        let p = if config.error_probability.is_finite() {
            config.error_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let errors = (0..requests).filter(|_| rng.gen_bool(p)).count() as u64;
        let per_request = rng.gen_range(512..4096u64);
        let base_memory = if bundled { 180.0 } else { 70.0 };

        Self {
            requests,
            errors,
            latency_ms: rng.gen_range(5.0..120.0),
            bytes: requests * per_request,
            cpu_percent: rng.gen_range(0.5..35.0),
            memory_mb: base_memory + rng.gen_range(0.0..80.0),
        }
    }
}

/// Periodically refreshes metrics and health of every running server.
///
/// The background task only reads and writes through the manager's locked
/// tables, so it interleaves safely with lifecycle operations. A failing
/// check is logged and skipped; it never stops the loop.
pub struct HealthMonitor {
    /// Lifecycle manager
    manager: Arc<ServiceLifecycleManager>,
    /// Monitor configuration
    config: HealthMonitorConfig,
    /// Traffic simulator
    rng: Arc<Mutex<StdRng>>,
    /// Monitor task
    monitor_task: Option<JoinHandle<()>>,
    /// Running flag
    running: Arc<Mutex<bool>>,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(manager: Arc<ServiceLifecycleManager>, config: HealthMonitorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            manager,
            config,
            rng: Arc::new(Mutex::new(rng)),
            monitor_task: None,
            running: Arc::new(Mutex::new(false)),
        }
    }

    /// Create a monitor using the manager's own monitor settings
    pub fn for_manager(manager: Arc<ServiceLifecycleManager>) -> Self {
        let config = HealthMonitorConfig::from_settings(&manager.config().monitor);
        Self::new(manager, config)
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Whether the background task is active
    pub fn is_running(&self) -> bool {
        self.running.lock().map(|running| *running).unwrap_or(false)
    }

    /// Start the background task. Starting a started monitor does nothing.
    #[tracing::instrument(skip(self), fields(interval_ms = self.config.check_interval.as_millis() as u64))]
    pub fn start(&mut self) -> Result<()> {
        {
            let mut running = self
                .running
                .lock()
                .map_err(|_| Error::lock("monitor running flag"))?;

            if *running {
                return Ok(());
            }

            *running = true;
        }
        tracing::info!("Starting health monitor");

        let manager = Arc::clone(&self.manager);
        let rng = Arc::clone(&self.rng);
        let running = Arc::clone(&self.running);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            let mut interval = time::interval(config.check_interval);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;

            loop {
                interval.tick().await;

                let keep_going = running.lock().map(|flag| *flag).unwrap_or(false);
                if !keep_going {
                    break;
                }

                let report = run_tick(&manager, &config, &rng);
                tracing::debug!(
                    checked = report.checked,
                    downgraded = report.downgraded.len(),
                    failures = report.failures,
                    "Health monitor tick"
                );
            }
        });

        self.monitor_task = Some(task);
        Ok(())
    }

    /// Stop the background task. Stopping a stopped monitor does nothing.
    #[tracing::instrument(skip(self))]
    pub fn stop(&mut self) -> Result<()> {
        {
            let mut running = self
                .running
                .lock()
                .map_err(|_| Error::lock("monitor running flag"))?;

            if !*running {
                return Ok(());
            }

            *running = false;
        }

        if let Some(task) = self.monitor_task.take() {
            task.abort();
        }
        tracing::info!("Health monitor stopped");
        Ok(())
    }

    /// Run one monitoring pass now.
    pub fn tick(&self) -> TickReport {
        run_tick(&self.manager, &self.config, &self.rng)
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.monitor_task.take() {
            task.abort();
        }
    }
}

fn run_tick(
    manager: &ServiceLifecycleManager,
    config: &HealthMonitorConfig,
    rng: &Mutex<StdRng>,
) -> TickReport {
    check_each(manager, |id| check_service(manager, config, rng, id))
}

/// List the running servers and check each one, isolating per-server
/// failures.
fn check_each(
    manager: &ServiceLifecycleManager,
    mut check: impl FnMut(ServiceId) -> Result<Option<bool>>,
) -> TickReport {
    let mut report = TickReport::default();

    let ids = match manager.running_ids() {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!(error = %e, "Health monitor could not list servers");
            report.failures += 1;
            return report;
        }
    };

    for id in ids {
        match check(id) {
            Ok(Some(downgraded)) => {
                report.checked += 1;
                if downgraded {
                    report.downgraded.push(id);
                }
            }
            // Stopped or removed between listing and checking.
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(service_id = %id, error = %e, "Health check failed");
                report.failures += 1;
            }
        }
    }

    report
}

/// Refresh one server. Returns `None` if it is no longer running, otherwise
/// whether its health got worse.
fn check_service(
    manager: &ServiceLifecycleManager,
    config: &HealthMonitorConfig,
    rng: &Mutex<StdRng>,
    id: ServiceId,
) -> Result<Option<bool>> {
    let Some(bundled) = still_running(manager.update_running(id, |service| {
        service.framework.is_bundled()
    }))?
    else {
        return Ok(None);
    };
    let sample = {
        let mut rng = rng.lock().map_err(|_| Error::lock("monitor rng"))?;
        TrafficSample::draw(&mut rng, config, bundled)
    };

    let outcome = still_running(manager.update_running(id, |service| {
        let now = Utc::now();
        let metrics = &mut service.metrics;
        if let Some(started_at) = service.started_at {
            metrics.uptime_secs = (now - started_at).num_seconds().max(0) as u64;
        }
        metrics.requests += sample.requests;
        metrics.errors += sample.errors;
        metrics.success_rate = if metrics.requests == 0 {
            100.0
        } else {
            (metrics.requests - metrics.errors) as f64 / metrics.requests as f64 * 100.0
        };
        metrics.cpu_percent = sample.cpu_percent;
        metrics.memory_mb = sample.memory_mb;
        metrics.last_updated = Some(now);

        let previous = service.health;
        let next = config.assess(&service.metrics);
        service.health = next;
        (service.port, previous, next, service.metrics.clone())
    }))?;

    let Some((port, previous, next, metrics)) = outcome else {
        return Ok(None);
    };

    manager.update_port_metrics(port, id, |pm| {
        let before = pm.request_count;
        pm.request_count += sample.requests;
        pm.error_count += sample.errors;
        pm.avg_response_time_ms = (pm.avg_response_time_ms * before as f64
            + sample.latency_ms * sample.requests as f64)
            / pm.request_count as f64;
        pm.error_rate = pm.error_count as f64 / pm.request_count as f64;
        pm.bytes_transferred += sample.bytes;
    })?;

    if next.severity() > previous.severity() {
        let message = format!(
            "Health degraded to {:?}: success rate {:.1}%, memory {:.0} MB",
            next, metrics.success_rate, metrics.memory_mb
        );
        let level = if next == HealthStatus::Error {
            LogLevel::Error
        } else {
            LogLevel::Warn
        };
        tracing::warn!(service_id = %id, port, ?previous, ?next, "Server health degraded");
        manager.log(id, level, "monitor", message.clone())?;
        manager.record_port_issue(port, id, &message)?;
        manager.events().publish(
            Event::new(
                EventKind::HealthCheck,
                json!({
                    "from": previous,
                    "to": next,
                    "successRate": metrics.success_rate,
                    "memoryMb": metrics.memory_mb,
                    "message": message,
                }),
            )
            .with_service(id)
            .with_port(port),
        );
        return Ok(Some(true));
    }

    if next.severity() < previous.severity() {
        manager.log(
            id,
            LogLevel::Info,
            "monitor",
            format!("Health recovered to {:?}", next),
        )?;
    }
    Ok(Some(false))
}

/// A server removed since the tick listed it counts as no longer running.
fn still_running<R>(result: Result<Option<R>>) -> Result<Option<R>> {
    match result {
        Err(Error::ServiceNotFound(_)) => Ok(None),
        other => other,
    }
}
