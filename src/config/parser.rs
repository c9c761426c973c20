use crate::error::{Error, Result};
use crate::framework::Framework;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Request to create one development server.
///
/// This is what the IDE layer sends when a student presses "run". The
/// framework selects the launch table entry and the conventional ports;
/// everything else is optional.
///
/// # Examples
///
/// ```
/// use devport::config::ServerRequest;
/// use devport::Framework;
///
/// let request = ServerRequest::new("todo-api", Framework::Flask).with_preferred_port(5000);
/// assert_eq!(request.preferred_port, Some(5000));
/// assert!(request.hot_reload);
/// ```
///
/// Parsed from JSON, unknown framework tags fall back to `custom`:
///
/// ```
/// use devport::config::ServerRequest;
/// use devport::Framework;
///
/// let request: ServerRequest = serde_json::from_str(
///     r#"{"name": "bot", "framework": "rocket", "customCommand": "cargo", "customArgs": ["run"]}"#,
/// ).unwrap();
/// assert_eq!(request.framework, Framework::Custom);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerRequest {
    /// Display name of the project.
    pub name: String,
    /// Development server flavour.
    pub framework: Framework,
    /// Port to try first.
    pub preferred_port: Option<u16>,
    /// Project directory the server runs in.
    pub working_directory: PathBuf,
    /// Stored on the service config; this crate never restarts on its own.
    pub auto_restart: bool,
    /// Passed through to the launch command or environment.
    pub hot_reload: bool,
    /// Switches the launch to production-style build flags.
    pub build_optimization: bool,
    /// Extra environment, overriding the framework defaults.
    pub env: HashMap<String, String>,
    /// Command for the `custom` framework.
    pub custom_command: Option<String>,
    /// Arguments for the `custom` framework.
    pub custom_args: Vec<String>,
}

impl ServerRequest {
    /// A request with default flags for `name` running `framework`.
    pub fn new(name: impl Into<String>, framework: Framework) -> Self {
        Self {
            name: name.into(),
            framework,
            ..Self::default()
        }
    }

    pub fn with_preferred_port(mut self, port: u16) -> Self {
        self.preferred_port = Some(port);
        self
    }
}

impl Default for ServerRequest {
    fn default() -> Self {
        Self {
            name: String::new(),
            framework: Framework::Custom,
            preferred_port: None,
            working_directory: PathBuf::from("."),
            auto_restart: false,
            hot_reload: true,
            build_optimization: false,
            env: HashMap::new(),
            custom_command: None,
            custom_args: Vec::new(),
        }
    }
}

/// Inclusive range of ports the allocator may hand out.
///
/// ```
/// use devport::config::PortRange;
///
/// let range = PortRange { min: 3000, max: 3009 };
/// assert!(range.contains(3005));
/// assert_eq!(range.len(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    /// Lowest allocatable port.
    pub min: u16,
    /// Highest allocatable port.
    pub max: u16,
}

impl PortRange {
    /// Whether `port` lies inside the range.
    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }

    /// Number of ports in the range.
    pub fn len(&self) -> usize {
        if self.max < self.min {
            0
        } else {
            usize::from(self.max - self.min) + 1
        }
    }

    /// Whether the range holds no ports at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self { min: 3000, max: 9999 }
    }
}

/// Delays used by the simulated launcher, in milliseconds.
///
/// Zero delays make every lifecycle operation complete immediately, which is
/// what the tests rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchDelays {
    /// Duration of the simulated bundler build.
    pub build_ms: u64,
    /// Time between "process spawned" and "server listening".
    pub startup_ms: u64,
    /// Time the simulated process takes to exit.
    pub shutdown_ms: u64,
    /// Pause between stop and relaunch during a restart.
    pub restart_settle_ms: u64,
}

impl LaunchDelays {
    /// Delays that never suspend.
    pub fn none() -> Self {
        Self {
            build_ms: 0,
            startup_ms: 0,
            shutdown_ms: 0,
            restart_settle_ms: 0,
        }
    }

    pub fn build(&self) -> Duration {
        Duration::from_millis(self.build_ms)
    }

    pub fn startup(&self) -> Duration {
        Duration::from_millis(self.startup_ms)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_millis(self.shutdown_ms)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }
}

impl Default for LaunchDelays {
    fn default() -> Self {
        Self {
            build_ms: 1500,
            startup_ms: 800,
            shutdown_ms: 300,
            restart_settle_ms: 1000,
        }
    }
}

/// Health monitor cadence and randomness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    /// Interval between monitor ticks.
    pub interval_ms: u64,
    /// Seed for simulated traffic. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl MonitorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            seed: None,
        }
    }
}

/// Main configuration for a [`ServiceLifecycleManager`](crate::ServiceLifecycleManager).
///
/// # JSON Schema
///
/// ```json
/// {
///   "portRange": { "min": 3000, "max": 3009 },
///   "excludedPorts": [3005],
///   "maxLogsPerService": 100,
///   "delays": { "buildMs": 0, "startupMs": 0, "shutdownMs": 0, "restartSettleMs": 0 },
///   "monitor": { "intervalMs": 1000, "seed": 7 }
/// }
/// ```
///
/// Every field is optional; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// Allocatable port range.
    pub port_range: PortRange,
    /// Ports never handed out, on top of the built-in well-known set.
    pub excluded_ports: Vec<u16>,
    /// Per-service log buffer size. Oldest entries are evicted past this.
    pub max_logs_per_service: usize,
    /// Number of usage-history entries retained.
    pub max_history_entries: usize,
    /// Number of historically successful ports probed per allocation.
    pub history_candidates: usize,
    /// Capacity of the event broadcast channel and of the event history.
    pub event_capacity: usize,
    /// Simulated launcher delays.
    pub delays: LaunchDelays,
    /// Health monitor settings.
    pub monitor: MonitorSettings,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            port_range: PortRange::default(),
            excluded_ports: Vec::new(),
            max_logs_per_service: 100,
            max_history_entries: 1000,
            history_candidates: 5,
            event_capacity: 256,
            delays: LaunchDelays::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl ManagerConfig {
    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else
    /// as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The contents do not parse
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_from_yaml_str(&content),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// A configuration with the given range and no simulated delays.
    pub fn for_range(min: u16, max: u16) -> Self {
        Self {
            port_range: PortRange { min, max },
            delays: LaunchDelays::none(),
            ..Self::default()
        }
    }
}
