use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::Mutex;

/// Answers whether a port is free outside this crate's own bookkeeping.
///
/// The allocation engine rules out allocated, reserved and out-of-range ports
/// itself and only consults this check for the remainder.
pub trait AvailabilityCheck: Send + Sync {
    /// Whether `port` can be bound right now.
    fn is_available(&self, port: u16) -> bool;
}

/// Binds `127.0.0.1:port` and releases it immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpBindCheck;

impl AvailabilityCheck for TcpBindCheck {
    fn is_available(&self, port: u16) -> bool {
        TcpListener::bind(("127.0.0.1", port)).is_ok()
    }
}

/// Treats every port as free. Used for pure simulation and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeAvailable;

impl AvailabilityCheck for AssumeAvailable {
    fn is_available(&self, _port: u16) -> bool {
        true
    }
}

/// Treats a fixed, mutable set of ports as occupied by other programs.
#[derive(Debug, Default)]
pub struct FixedAvailability {
    occupied: Mutex<HashSet<u16>>,
}

impl FixedAvailability {
    pub fn new(occupied: impl IntoIterator<Item = u16>) -> Self {
        Self {
            occupied: Mutex::new(occupied.into_iter().collect()),
        }
    }

    /// Mark `port` as taken by something outside the manager.
    pub fn occupy(&self, port: u16) {
        if let Ok(mut occupied) = self.occupied.lock() {
            occupied.insert(port);
        }
    }

    /// Mark `port` as free again.
    pub fn vacate(&self, port: u16) {
        if let Ok(mut occupied) = self.occupied.lock() {
            occupied.remove(&port);
        }
    }
}

impl AvailabilityCheck for FixedAvailability {
    fn is_available(&self, port: u16) -> bool {
        self.occupied
            .lock()
            .map(|occupied| !occupied.contains(&port))
            .unwrap_or(false)
    }
}
