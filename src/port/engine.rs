use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::framework::Framework;
use crate::port::availability::AvailabilityCheck;
use crate::port::history::{PerformanceSummary, UsageHistoryEntry, UsageHistoryStore};
use crate::port::registry::{Port, PortMetrics, PortRegistry, PortStatus};
use crate::server::ServiceId;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What the caller wants a port for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRequest {
    pub preferred_port: Option<u16>,
    pub framework: Option<Framework>,
    pub name: String,
    /// Service category, e.g. `frontend`
    #[serde(rename = "type")]
    pub kind: String,
}

impl AllocationRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            preferred_port: None,
            framework: None,
            name: name.into(),
            kind: "custom".to_string(),
        }
    }

    pub fn for_framework(name: impl Into<String>, framework: Framework) -> Self {
        Self {
            preferred_port: None,
            framework: Some(framework),
            name: name.into(),
            kind: framework.kind().to_string(),
        }
    }

    pub fn with_preferred_port(mut self, port: u16) -> Self {
        self.preferred_port = Some(port);
        self
    }
}

/// Why an allocation ended up where it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightKind {
    /// The preferred port was free and used
    PreferenceHonored,
    /// The preferred port was taken
    PreferenceConflict,
    /// A conventional port for the framework was used
    FrameworkConvention,
    /// A port that worked well for this framework before was reused
    HistoricalReuse,
    /// Nothing better was free; the range was scanned
    RangeFallback,
}

/// Advisory text about an allocation. Never affects control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub port: u16,
    pub message: String,
}

impl Insight {
    fn new(kind: InsightKind, port: u16, message: impl Into<String>) -> Self {
        Self {
            kind,
            port,
            message: message.into(),
        }
    }
}

impl fmt::Display for Insight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A committed allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub port: u16,
    pub insights: Vec<Insight>,
}

/// Decides which port to hand out and keeps the registry and usage history
/// in step.
///
/// The engine is synchronous; every method runs to completion, so a caller
/// holding it behind a mutex gets atomic registry mutations.
pub struct PortAllocationEngine {
    registry: PortRegistry,
    history: UsageHistoryStore,
    availability: Arc<dyn AvailabilityCheck>,
    history_candidates: usize,
    rng: StdRng,
}

impl PortAllocationEngine {
    /// Create an engine from the manager configuration.
    pub fn new(config: &ManagerConfig, availability: Arc<dyn AvailabilityCheck>) -> Self {
        Self {
            registry: PortRegistry::new(config.port_range, config.excluded_ports.iter().copied()),
            history: UsageHistoryStore::new(config.max_history_entries),
            availability,
            history_candidates: config.history_candidates,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a seeded generator for the fallback scan offset.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn registry(&self) -> &PortRegistry {
        &self.registry
    }

    pub fn history(&self) -> &UsageHistoryStore {
        &self.history
    }

    /// Whether `port` could be handed out right now.
    pub fn is_available(&self, port: u16) -> bool {
        self.unavailable_reason(port).is_none()
    }

    fn unavailable_reason(&self, port: u16) -> Option<String> {
        if let Some(entry) = self.registry.get(port) {
            return Some(format!("already allocated to '{}'", entry.service_name));
        }
        if self.registry.is_reserved(port) {
            return Some("reserved for system services".to_string());
        }
        if !self.registry.range().contains(port) {
            let range = self.registry.range();
            return Some(format!("outside the allowed range {}-{}", range.min, range.max));
        }
        if !self.availability.is_available(port) {
            return Some("in use by another program".to_string());
        }
        None
    }

    /// Pick a port for `request` and commit it as reserved.
    ///
    /// Priority, first match wins: the preferred port; the framework's
    /// conventional ports; ports this framework used successfully before;
    /// a full range scan from a random offset.
    #[tracing::instrument(skip(self), fields(name = %request.name, preferred = ?request.preferred_port))]
    pub fn allocate(&mut self, request: &AllocationRequest) -> Result<Allocation> {
        let mut insights = Vec::new();

        if let Some(preferred) = request.preferred_port {
            match self.unavailable_reason(preferred) {
                None => {
                    insights.push(Insight::new(
                        InsightKind::PreferenceHonored,
                        preferred,
                        format!("Port {} was free, so your preferred port was used.", preferred),
                    ));
                    return self.commit(preferred, request, insights);
                }
                Some(reason) => {
                    tracing::debug!(port = preferred, %reason, "Preferred port unavailable");
                    insights.push(Insight::new(
                        InsightKind::PreferenceConflict,
                        preferred,
                        format!("Port {} is {}; looking for an alternative.", preferred, reason),
                    ));
                }
            }
        }

        if let Some(framework) = request.framework {
            let conventional = framework
                .preferred_ports()
                .iter()
                .copied()
                .find(|port| self.is_available(*port));
            if let Some(port) = conventional {
                insights.push(Insight::new(
                    InsightKind::FrameworkConvention,
                    port,
                    format!(
                        "Port {} is a conventional port for {} development servers.",
                        port, framework
                    ),
                ));
                return self.commit(port, request, insights);
            }

            let reused = self
                .history
                .successful_ports(framework, self.history_candidates)
                .into_iter()
                .find(|port| self.is_available(*port));
            if let Some(port) = reused {
                insights.push(Insight::new(
                    InsightKind::HistoricalReuse,
                    port,
                    format!(
                        "Port {} worked well for a previous {} server, so it was reused.",
                        port, framework
                    ),
                ));
                return self.commit(port, request, insights);
            }
        }

        let range = self.registry.range();
        let len = range.len();
        if len > 0 {
            let offset = self.rng.gen_range(0..len);
            let found = (0..len)
                .map(|i| range.min + ((offset + i) % len) as u16)
                .find(|port| self.is_available(*port));
            if let Some(port) = found {
                insights.push(Insight::new(
                    InsightKind::RangeFallback,
                    port,
                    format!(
                        "Port {} was the first free port found scanning {}-{}.",
                        port, range.min, range.max
                    ),
                ));
                return self.commit(port, request, insights);
            }
        }

        tracing::warn!(min = range.min, max = range.max, "Port range exhausted");
        Err(Error::PortAllocation {
            requested_port: request.preferred_port,
            reason: format!("no free port in range {}-{}", range.min, range.max),
        })
    }

    fn commit(
        &mut self,
        port: u16,
        request: &AllocationRequest,
        insights: Vec<Insight>,
    ) -> Result<Allocation> {
        let educational_note = insights
            .last()
            .map(|insight| insight.message.clone())
            .unwrap_or_default();

        self.registry.insert(Port {
            number: port,
            status: PortStatus::Reserved,
            bound_service: None,
            service_name: request.name.clone(),
            framework: request.framework,
            allocated_at: Utc::now(),
            metrics: PortMetrics::default(),
            educational_note,
        })?;
        self.history.open(port, &request.name, request.framework);

        tracing::info!(port, service = %request.name, "Port allocated");
        Ok(Allocation { port, insights })
    }

    /// Record `service` as the holder of an allocated port.
    pub fn bind(&mut self, port: u16, service: ServiceId) -> Result<()> {
        self.registry.bind(port, service)
    }

    /// Whether `port` is live and held by `service`.
    pub fn is_held_by(&self, port: u16, service: ServiceId) -> bool {
        self.registry
            .get(port)
            .is_some_and(|entry| entry.bound_service == Some(service))
    }

    /// Release `port`. Idempotent: releasing a port that is not live returns
    /// `None` and changes nothing.
    #[tracing::instrument(skip(self))]
    pub fn deallocate(&mut self, port: u16) -> Option<UsageHistoryEntry> {
        let removed = self.registry.remove(port)?;
        let performance = PerformanceSummary {
            requests: removed.metrics.request_count,
            avg_response_time_ms: removed.metrics.avg_response_time_ms,
            error_rate: removed.metrics.error_rate,
        };

        let closed = self.history.close(port, Utc::now(), performance);
        if closed.is_none() {
            tracing::warn!(port, "Released port had no open history entry");
        }
        tracing::info!(port, service = %removed.service_name, "Port released");
        closed
    }

    /// Release `port` only if `service` still holds it.
    pub fn deallocate_for(&mut self, port: u16, service: ServiceId) -> Option<UsageHistoryEntry> {
        if self.is_held_by(port, service) {
            self.deallocate(port)
        } else {
            None
        }
    }

    /// Attach an issue to the open history window of `port`.
    pub fn record_issue(&mut self, port: u16, issue: impl Into<String>) {
        self.history.record_issue(port, issue);
    }

    /// Mutable access to the traffic counters of a live port.
    pub fn port_metrics_mut(&mut self, port: u16) -> Option<&mut PortMetrics> {
        self.registry.get_mut(port).map(|entry| &mut entry.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::availability::{AssumeAvailable, FixedAvailability};

    fn engine(min: u16, max: u16, excluded: &[u16]) -> PortAllocationEngine {
        let mut config = ManagerConfig::for_range(min, max);
        config.excluded_ports = excluded.to_vec();
        PortAllocationEngine::new(&config, Arc::new(AssumeAvailable)).with_seed(7)
    }

    #[test]
    fn test_reserved_preference_falls_through_to_convention() {
        let mut engine = engine(3000, 3009, &[3000]);
        let request = AllocationRequest::for_framework("app", Framework::React).with_preferred_port(3000);

        let allocation = engine.allocate(&request).unwrap();

        assert_eq!(allocation.port, 3001);
        assert_eq!(allocation.insights[0].kind, InsightKind::PreferenceConflict);
        assert_eq!(allocation.insights[1].kind, InsightKind::FrameworkConvention);
    }

    #[test]
    fn test_free_preference_is_honored() {
        let mut engine = engine(3000, 9000, &[]);
        let request = AllocationRequest::for_framework("api", Framework::Flask).with_preferred_port(5000);

        let allocation = engine.allocate(&request).unwrap();

        assert_eq!(allocation.port, 5000);
        assert_eq!(allocation.insights.len(), 1);
        assert_eq!(allocation.insights[0].kind, InsightKind::PreferenceHonored);
        assert_eq!(engine.registry().status(5000), PortStatus::Reserved);
    }

    #[test]
    fn test_history_reuse_after_conventions_taken() {
        let mut engine = engine(5000, 5100, &[]);
        let flask = |name: &str| AllocationRequest::for_framework(name, Framework::Flask);

        let first = engine.allocate(&flask("a").with_preferred_port(5050)).unwrap();
        assert_eq!(first.port, 5050);
        engine.deallocate(5050);

        for port in Framework::Flask.preferred_ports() {
            engine.allocate(&AllocationRequest::new("squatter").with_preferred_port(*port)).unwrap();
        }

        let reused = engine.allocate(&flask("b")).unwrap();
        assert_eq!(reused.port, 5050);
        assert_eq!(reused.insights.last().unwrap().kind, InsightKind::HistoricalReuse);
    }

    #[test]
    fn test_fallback_skips_externally_occupied() {
        let mut config = ManagerConfig::for_range(6000, 6002);
        config.excluded_ports = vec![];
        let check = Arc::new(FixedAvailability::new([6000, 6001]));
        let mut engine = PortAllocationEngine::new(&config, check);

        let allocation = engine.allocate(&AllocationRequest::new("x")).unwrap();
        assert_eq!(allocation.port, 6002);
        assert_eq!(allocation.insights[0].kind, InsightKind::RangeFallback);
    }

    #[test]
    fn test_exhausted_range_fails() {
        let mut engine = engine(3000, 3009, &[]);
        for _ in 0..10 {
            engine.allocate(&AllocationRequest::new("x")).unwrap();
        }

        let err = engine.allocate(&AllocationRequest::new("y")).unwrap_err();
        assert!(matches!(err, Error::PortAllocation { requested_port: None, .. }));
    }

    #[test]
    fn test_deallocate_is_idempotent() {
        let mut engine = engine(3000, 3009, &[]);
        let port = engine.allocate(&AllocationRequest::new("x")).unwrap().port;

        let closed = engine.deallocate(port).unwrap();
        assert_eq!(closed.port, port);
        assert!(closed.duration_ms.is_some());
        let history_len = engine.history().len();

        assert!(engine.deallocate(port).is_none());
        assert_eq!(engine.history().len(), history_len);
        assert!(engine.is_available(port));
    }

    #[test]
    fn test_deallocate_for_checks_holder() {
        let mut engine = engine(3000, 3009, &[]);
        let port = engine.allocate(&AllocationRequest::new("x")).unwrap().port;
        let owner = ServiceId::new();
        engine.bind(port, owner).unwrap();

        assert!(engine.deallocate_for(port, ServiceId::new()).is_none());
        assert!(engine.registry().is_allocated(port));
        assert!(engine.deallocate_for(port, owner).is_some());
    }
}
