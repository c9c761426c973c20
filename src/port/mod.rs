/// Port allocation module for devport.
///
/// This module decides which network port each development server gets and
/// remembers how past allocations went.
///
/// # Components
///
/// * `registry` - Live ports, the allocatable range and the reserved set
/// * `history` - Append-only log of allocation windows
/// * `engine` - Allocation algorithm and conflict resolution
/// * `availability` - Pluggable check for ports taken outside the manager
///
/// # Examples
///
/// ```
/// use devport::config::ManagerConfig;
/// use devport::port::{AllocationRequest, AssumeAvailable, PortAllocationEngine};
/// use devport::Framework;
/// use std::sync::Arc;
///
/// let mut config = ManagerConfig::for_range(3000, 3009);
/// config.excluded_ports = vec![3000];
/// let mut engine = PortAllocationEngine::new(&config, Arc::new(AssumeAvailable));
///
/// let request = AllocationRequest::for_framework("todo", Framework::React).with_preferred_port(3000);
/// let allocation = engine.allocate(&request).unwrap();
/// assert_eq!(allocation.port, 3001);
/// ```
pub mod availability;
pub mod engine;
pub mod history;
pub mod registry;

pub use availability::{AssumeAvailable, AvailabilityCheck, FixedAvailability, TcpBindCheck};
pub use engine::{Allocation, AllocationRequest, Insight, InsightKind, PortAllocationEngine};
pub use history::{PerformanceSummary, UsageHistoryEntry, UsageHistoryStore};
pub use registry::{Port, PortMetrics, PortRegistry, PortStatus, WELL_KNOWN_PORTS};
