use crate::config::PortRange;
use crate::error::{Error, Result};
use crate::framework::Framework;
use crate::server::ServiceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Well-known and system ports that are never handed out.
pub const WELL_KNOWN_PORTS: &[u16] = &[
    20, 21, 22, 23, 25, 53, 80, 110, 143, 443, 465, 587, 993, 995, 1433, 1521, 3306, 3389, 5432,
    5900, 6379, 27017,
];

/// Registry state of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    /// Never handed out
    Free,
    /// Committed by the allocator but not yet bound to a service, or a
    /// system/excluded port that is never handed out
    Reserved,
    /// Bound to a service
    Allocated,
    /// Handed out before and since returned
    Released,
}

/// Traffic counters for one port. Written only by the health monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_response_time_ms: f64,
    pub error_rate: f64,
    pub bytes_transferred: u64,
}

/// A live entry in the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub number: u16,
    pub status: PortStatus,
    /// Service currently holding the port. The service owns its lifecycle;
    /// this only records the holder.
    pub bound_service: Option<ServiceId>,
    pub service_name: String,
    pub framework: Option<Framework>,
    pub allocated_at: DateTime<Utc>,
    pub metrics: PortMetrics,
    pub educational_note: String,
}

/// In-memory table of live ports plus the allocatable range.
#[derive(Debug)]
pub struct PortRegistry {
    range: PortRange,
    reserved: BTreeSet<u16>,
    entries: HashMap<u16, Port>,
    released: HashSet<u16>,
}

impl PortRegistry {
    /// Create a registry for `range`, reserving the well-known ports plus
    /// `exclusions`.
    pub fn new(range: PortRange, exclusions: impl IntoIterator<Item = u16>) -> Self {
        let mut reserved: BTreeSet<u16> = WELL_KNOWN_PORTS.iter().copied().collect();
        reserved.extend(exclusions);
        Self {
            range,
            reserved,
            entries: HashMap::new(),
            released: HashSet::new(),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    pub fn is_reserved(&self, port: u16) -> bool {
        self.reserved.contains(&port)
    }

    /// Whether a live entry exists for `port`.
    pub fn is_allocated(&self, port: u16) -> bool {
        self.entries.contains_key(&port)
    }

    /// Registry state of any port, live or not.
    pub fn status(&self, port: u16) -> PortStatus {
        if let Some(entry) = self.entries.get(&port) {
            entry.status
        } else if self.reserved.contains(&port) {
            PortStatus::Reserved
        } else if self.released.contains(&port) {
            PortStatus::Released
        } else {
            PortStatus::Free
        }
    }

    /// Insert a new live entry. Fails if the port is already live.
    pub fn insert(&mut self, port: Port) -> Result<()> {
        if self.entries.contains_key(&port.number) {
            return Err(Error::PortAllocation {
                requested_port: Some(port.number),
                reason: format!("port {} is already allocated", port.number),
            });
        }
        self.released.remove(&port.number);
        self.entries.insert(port.number, port);
        Ok(())
    }

    /// Record `service` as the holder of `port` and mark it allocated.
    pub fn bind(&mut self, port: u16, service: ServiceId) -> Result<()> {
        let entry = self.entries.get_mut(&port).ok_or_else(|| {
            Error::Other(format!("cannot bind port {}: not in the registry", port))
        })?;
        entry.bound_service = Some(service);
        entry.status = PortStatus::Allocated;
        Ok(())
    }

    /// Remove the live entry for `port`, if any.
    pub fn remove(&mut self, port: u16) -> Option<Port> {
        let removed = self.entries.remove(&port);
        if removed.is_some() {
            self.released.insert(port);
        }
        removed
    }

    pub fn get(&self, port: u16) -> Option<&Port> {
        self.entries.get(&port)
    }

    pub fn get_mut(&mut self, port: u16) -> Option<&mut Port> {
        self.entries.get_mut(&port)
    }

    /// Live entries sorted by port number.
    pub fn entries(&self) -> Vec<&Port> {
        let mut entries: Vec<&Port> = self.entries.values().collect();
        entries.sort_by_key(|p| p.number);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(number: u16) -> Port {
        Port {
            number,
            status: PortStatus::Reserved,
            bound_service: None,
            service_name: "test".to_string(),
            framework: None,
            allocated_at: Utc::now(),
            metrics: PortMetrics::default(),
            educational_note: String::new(),
        }
    }

    #[test]
    fn test_status_transitions() {
        let mut registry = PortRegistry::new(PortRange { min: 3000, max: 3009 }, [3000]);

        assert_eq!(registry.status(3000), PortStatus::Reserved);
        assert_eq!(registry.status(3001), PortStatus::Free);

        registry.insert(port(3001)).unwrap();
        assert_eq!(registry.status(3001), PortStatus::Reserved);

        let id = ServiceId::new();
        registry.bind(3001, id).unwrap();
        assert_eq!(registry.status(3001), PortStatus::Allocated);
        assert_eq!(registry.get(3001).unwrap().bound_service, Some(id));

        assert!(registry.remove(3001).is_some());
        assert_eq!(registry.status(3001), PortStatus::Released);
        assert!(registry.remove(3001).is_none());
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut registry = PortRegistry::new(PortRange { min: 3000, max: 3009 }, []);
        registry.insert(port(3002)).unwrap();

        let err = registry.insert(port(3002)).unwrap_err();
        assert!(matches!(err, Error::PortAllocation { requested_port: Some(3002), .. }));
        assert_eq!(registry.len(), 1);
    }
}
