use crate::framework::Framework;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Error rate below which a past allocation counts as successful.
pub const SUCCESS_ERROR_RATE: f64 = 0.05;

/// Traffic summary captured when an allocation window closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub requests: u64,
    pub avg_response_time_ms: f64,
    pub error_rate: f64,
}

/// One past (or still open) allocation window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageHistoryEntry {
    pub port: u16,
    pub service_name: String,
    pub framework: Option<Framework>,
    pub allocated_at: DateTime<Utc>,
    /// `None` while the port is still allocated
    pub released_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub issues: Vec<String>,
    pub performance: PerformanceSummary,
}

impl UsageHistoryEntry {
    pub fn is_open(&self) -> bool {
        self.released_at.is_none()
    }

    /// Closed, issue-free and under the success error rate.
    pub fn is_successful(&self) -> bool {
        !self.is_open() && self.issues.is_empty() && self.performance.error_rate < SUCCESS_ERROR_RATE
    }
}

/// Append-only log of allocation windows, bounded by evicting the oldest
/// closed entries.
#[derive(Debug)]
pub struct UsageHistoryStore {
    entries: VecDeque<UsageHistoryEntry>,
    capacity: usize,
}

impl UsageHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open a window for `port`. Any window still open for the same port is
    /// closed first so at most one open entry exists per port.
    pub fn open(&mut self, port: u16, service_name: &str, framework: Option<Framework>) {
        let now = Utc::now();
        if self.open_entry(port).is_some() {
            tracing::warn!(port, "Closing stale open history entry before reopening");
            self.record_issue(port, "allocation window superseded without release");
            self.close(port, now, PerformanceSummary::default());
        }

        self.entries.push_back(UsageHistoryEntry {
            port,
            service_name: service_name.to_string(),
            framework,
            allocated_at: now,
            released_at: None,
            duration_ms: None,
            issues: Vec::new(),
            performance: PerformanceSummary::default(),
        });
        self.evict();
    }

    /// Close the open window for `port`, returning the closed entry.
    pub fn close(
        &mut self,
        port: u16,
        at: DateTime<Utc>,
        performance: PerformanceSummary,
    ) -> Option<UsageHistoryEntry> {
        let entry = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.port == port && e.is_open())?;

        let released_at = at.max(entry.allocated_at);
        entry.released_at = Some(released_at);
        entry.duration_ms = Some(
            (released_at - entry.allocated_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        entry.performance = performance;
        Some(entry.clone())
    }

    /// Attach an issue to the open window for `port`.
    pub fn record_issue(&mut self, port: u16, issue: impl Into<String>) -> bool {
        match self.entries.iter_mut().rev().find(|e| e.port == port && e.is_open()) {
            Some(entry) => {
                entry.issues.push(issue.into());
                true
            }
            None => false,
        }
    }

    pub fn open_entry(&self, port: u16) -> Option<&UsageHistoryEntry> {
        self.entries.iter().rev().find(|e| e.port == port && e.is_open())
    }

    /// Distinct ports successfully used by `framework`, most recently used
    /// first, at most `limit` of them.
    pub fn successful_ports(&self, framework: Framework, limit: usize) -> Vec<u16> {
        let mut candidates: Vec<&UsageHistoryEntry> = self
            .entries
            .iter()
            .filter(|e| e.framework == Some(framework) && e.is_successful())
            .collect();
        candidates.sort_by(|a, b| b.released_at.cmp(&a.released_at));

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .map(|e| e.port)
            .filter(|port| seen.insert(*port))
            .take(limit)
            .collect()
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<UsageHistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            match self.entries.iter().position(|e| !e.is_open()) {
                Some(index) => {
                    self.entries.remove(index);
                }
                // Only open windows left; they belong to live ports.
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn close_ok(store: &mut UsageHistoryStore, port: u16) {
        store.close(port, Utc::now(), PerformanceSummary::default());
    }

    #[test]
    fn test_close_computes_duration() {
        let mut store = UsageHistoryStore::new(10);
        store.open(3000, "app", Some(Framework::React));

        let closed = store
            .close(3000, Utc::now() + Duration::seconds(2), PerformanceSummary::default())
            .unwrap();

        assert!(closed.duration_ms.unwrap() >= 2000);
        assert!(store.close(3000, Utc::now(), PerformanceSummary::default()).is_none());
    }

    #[test]
    fn test_close_before_open_clamps_to_zero() {
        let mut store = UsageHistoryStore::new(10);
        store.open(3000, "app", None);

        let closed = store
            .close(3000, Utc::now() - Duration::seconds(60), PerformanceSummary::default())
            .unwrap();
        assert_eq!(closed.duration_ms, Some(0));
    }

    #[test]
    fn test_reopen_closes_stale_window() {
        let mut store = UsageHistoryStore::new(10);
        store.open(3000, "first", None);
        store.open(3000, "second", None);

        let open: Vec<_> = store.entries().into_iter().filter(|e| e.is_open()).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].service_name, "second");
    }

    #[test]
    fn test_successful_ports_filters_and_orders() {
        let mut store = UsageHistoryStore::new(10);

        store.open(5001, "a", Some(Framework::Flask));
        close_ok(&mut store, 5001);

        store.open(5002, "b", Some(Framework::Flask));
        store.record_issue(5002, "crashed");
        close_ok(&mut store, 5002);

        store.open(5003, "c", Some(Framework::Flask));
        store.close(
            5003,
            Utc::now(),
            PerformanceSummary {
                requests: 100,
                avg_response_time_ms: 20.0,
                error_rate: 0.2,
            },
        );

        store.open(5004, "d", Some(Framework::Flask));
        store.close(5004, Utc::now() + Duration::seconds(5), PerformanceSummary::default());

        store.open(3000, "e", Some(Framework::React));
        close_ok(&mut store, 3000);

        assert_eq!(store.successful_ports(Framework::Flask, 5), vec![5004, 5001]);
        assert_eq!(store.successful_ports(Framework::Flask, 1), vec![5004]);
    }

    #[test]
    fn test_eviction_keeps_open_windows() {
        let mut store = UsageHistoryStore::new(2);
        store.open(3000, "live", None);
        store.open(3001, "done", None);
        close_ok(&mut store, 3001);
        store.open(3002, "new", None);

        assert_eq!(store.len(), 2);
        assert!(store.open_entry(3000).is_some());
        assert!(store.open_entry(3002).is_some());
    }
}
