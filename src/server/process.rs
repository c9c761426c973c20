// src/server/process.rs
use crate::config::ServerRequest;
use crate::framework::Framework;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a development server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(Uuid);

impl ServiceId {
    // Private constructor, only usable within our crate
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a development server
///
/// Legal edges:
///
/// ```text
/// starting   -> running | stopping | error
/// running    -> stopping | restarting | error
/// restarting -> running | error
/// stopping   -> stopped | error
/// stopped    -> restarting
/// error      -> stopping | restarting
/// any        -> error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Server is starting
    Starting,
    /// Server is running
    Running,
    /// Server is stopping
    Stopping,
    /// Server has stopped
    Stopped,
    /// Server is restarting
    Restarting,
    /// Server failed to start or crashed
    Error,
}

impl ServiceStatus {
    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(self, next: ServiceStatus) -> bool {
        use ServiceStatus::*;
        match (self, next) {
            (_, Error) => true,
            (Starting, Running) | (Starting, Stopping) => true,
            (Running, Stopping) | (Running, Restarting) => true,
            (Restarting, Running) => true,
            (Stopping, Stopped) => true,
            (Stopped, Restarting) => true,
            (Error, Stopping) | (Error, Restarting) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Starting => "starting",
            ServiceStatus::Running => "running",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Restarting => "restarting",
            ServiceStatus::Error => "error",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Health of a running server, independent of its lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Not checked yet, or not running
    Unknown,
    /// Server is healthy
    Healthy,
    /// Server is degraded
    Warning,
    /// Server is unhealthy
    Error,
}

impl HealthStatus {
    /// Ordering used to decide whether a check is a downgrade.
    pub fn severity(&self) -> u8 {
        match self {
            HealthStatus::Unknown | HealthStatus::Healthy => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Error => 2,
        }
    }
}

/// Resolved launch configuration of one server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub framework: Framework,
    pub port: u16,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_directory: PathBuf,
    pub auto_restart: bool,
    pub hot_reload: bool,
    pub build_optimization: bool,
}

impl ServiceConfig {
    /// Command line as a student would type it.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One line of a server's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// `system` for manager messages, `build` for the bundler, `stdout` for
    /// what the server itself prints
    pub source: String,
}

/// Outcome of a simulated bundler build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Building,
    Success,
    Failed,
}

/// Bundler build information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub status: BuildStatus,
    pub duration_ms: u64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub output_size_bytes: u64,
}

/// Runtime gauges refreshed by the health monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetrics {
    pub uptime_secs: u64,
    pub requests: u64,
    pub errors: u64,
    /// Percentage of successful requests, 100 with no traffic
    pub success_rate: f64,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self {
            uptime_secs: 0,
            requests: 0,
            errors: 0,
            success_rate: 100.0,
            cpu_percent: 0.0,
            memory_mb: 0.0,
            last_updated: None,
        }
    }
}

/// Handle of a launched (simulated) process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub command: String,
    pub started_at: DateTime<Utc>,
}

impl ProcessHandle {
    pub fn new(pid: u32, command: impl Into<String>) -> Self {
        Self {
            pid,
            command: command.into(),
            started_at: Utc::now(),
        }
    }
}

/// A development server instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub framework: Framework,
    pub port: u16,
    pub status: ServiceStatus,
    pub health: HealthStatus,
    pub config: ServiceConfig,
    pub logs: VecDeque<LogEntry>,
    pub metrics: ServiceMetrics,
    pub build_info: Option<BuildInfo>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// The request the server was created from, kept so the launch
    /// configuration can be rebuilt for a new port.
    pub request: ServerRequest,
}

impl Service {
    pub(crate) fn new(request: ServerRequest, config: ServiceConfig) -> Self {
        Self {
            id: ServiceId::new(),
            name: request.name.clone(),
            framework: config.framework,
            port: config.port,
            status: ServiceStatus::Starting,
            health: HealthStatus::Unknown,
            config,
            logs: VecDeque::new(),
            metrics: ServiceMetrics::default(),
            build_info: None,
            created_at: Utc::now(),
            started_at: None,
            last_error: None,
            request,
        }
    }

    /// Append a log line, evicting the oldest past `cap`.
    pub(crate) fn push_log(&mut self, level: LogLevel, source: &str, message: impl Into<String>, cap: usize) {
        while self.logs.len() >= cap.max(1) {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            source: source.to_string(),
        });
    }

    /// The last `limit` log lines, oldest first.
    pub fn recent_logs(&self, limit: Option<usize>) -> Vec<LogEntry> {
        let limit = limit.unwrap_or(self.logs.len());
        let skip = self.logs.len().saturating_sub(limit);
        self.logs.iter().skip(skip).cloned().collect()
    }

    /// URL the server listens on.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ServiceStatus::*;

    #[test]
    fn test_documented_edges() {
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Restarting));
        assert!(Restarting.can_transition_to(Running));
        assert!(Stopping.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Restarting));
        assert!(Running.can_transition_to(Error));
    }

    #[test]
    fn test_illegal_edges() {
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Stopping));
        assert!(!Restarting.can_transition_to(Stopping));
        assert!(!Starting.can_transition_to(Restarting));
        assert!(!Running.can_transition_to(Starting));
    }

    #[test]
    fn test_logs_are_bounded() {
        let request = ServerRequest::new("app", Framework::Static);
        let config = Framework::Static.service_config(8080, &request);
        let mut service = Service::new(request, config);

        for i in 0..5 {
            service.push_log(LogLevel::Info, "system", format!("line {}", i), 3);
        }

        assert_eq!(service.logs.len(), 3);
        let recent = service.recent_logs(Some(2));
        assert_eq!(recent[0].message, "line 3");
        assert_eq!(recent[1].message, "line 4");
    }
}
