use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::events::MAX_EVENT_CAPACITY;

/// Validates the allocatable port range
pub fn validate_port_range(config: &ManagerConfig) -> Result<()> {
    let range = config.port_range;

    if range.min == 0 {
        return Err(Error::ConfigInvalid(
            "Port range must not include port 0".to_string(),
        ));
    }

    if range.is_empty() {
        return Err(Error::ConfigInvalid(format!(
            "Port range {}-{} is empty",
            range.min, range.max
        )));
    }

    Ok(())
}

/// Validates buffer sizes and the monitor cadence
pub fn validate_limits(config: &ManagerConfig) -> Result<()> {
    if config.max_logs_per_service == 0 {
        return Err(Error::ConfigInvalid(
            "maxLogsPerService must be at least 1".to_string(),
        ));
    }

    if config.event_capacity == 0 {
        return Err(Error::ConfigInvalid(
            "eventCapacity must be at least 1".to_string(),
        ));
    }

    if config.event_capacity > MAX_EVENT_CAPACITY {
        return Err(Error::ConfigInvalid(format!(
            "eventCapacity must be at most {}",
            MAX_EVENT_CAPACITY
        )));
    }

    if config.monitor.interval_ms == 0 {
        return Err(Error::ConfigInvalid(
            "monitor.intervalMs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &ManagerConfig) -> Result<()> {
    validate_port_range(config)?;
    validate_limits(config)?;

    Ok(())
}
