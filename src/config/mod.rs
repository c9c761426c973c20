//! Configuration module for devport.
//!
//! This module handles parsing and validation of the settings a
//! [`ServiceLifecycleManager`](crate::ServiceLifecycleManager) is built from:
//! the allocatable port range, exclusions, buffer sizes, simulated launch
//! delays and the health monitor cadence. Configurations load from JSON or
//! YAML.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use devport::config::ManagerConfig;
//!
//! let config = ManagerConfig::from_file("devport.json").unwrap();
//! println!("Allocating from {}-{}", config.port_range.min, config.port_range.max);
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use devport::config::{validate_config, ManagerConfig, PortRange};
//!
//! let config = ManagerConfig {
//!     port_range: PortRange { min: 3000, max: 3009 },
//!     excluded_ports: vec![3000],
//!     ..ManagerConfig::default()
//! };
//! validate_config(&config).unwrap();
//! ```
mod parser;
pub mod validator;

pub use parser::{LaunchDelays, ManagerConfig, MonitorSettings, PortRange, ServerRequest};
pub use validator::validate_config;
