use devport::config::{validate_config, ManagerConfig, PortRange, ServerRequest};
use devport::error::{Error, Result};
use devport::events::MAX_EVENT_CAPACITY;
use devport::{Framework, ServiceLifecycleManager};
use std::io::Write;
use tempfile::Builder;

#[test]
fn test_parse_config() -> Result<()> {
    let config_str = r#"{
        "portRange": { "min": 4000, "max": 4999 },
        "excludedPorts": [4444],
        "maxLogsPerService": 50,
        "delays": { "buildMs": 0, "startupMs": 10, "shutdownMs": 0, "restartSettleMs": 0 },
        "monitor": { "intervalMs": 1000, "seed": 7 }
    }"#;

    let config = ManagerConfig::parse_from_str(config_str)?;

    assert_eq!(config.port_range, PortRange { min: 4000, max: 4999 });
    assert_eq!(config.excluded_ports, vec![4444]);
    assert_eq!(config.max_logs_per_service, 50);
    assert_eq!(config.delays.startup_ms, 10);
    assert_eq!(config.monitor.interval_ms, 1000);
    assert_eq!(config.monitor.seed, Some(7));
    // Unspecified fields keep their defaults.
    assert_eq!(config.max_history_entries, 1000);
    assert_eq!(config.event_capacity, 256);

    Ok(())
}

#[test]
fn test_defaults() {
    let config = ManagerConfig::default();

    assert_eq!(config.port_range, PortRange { min: 3000, max: 9999 });
    assert!(config.excluded_ports.is_empty());
    assert_eq!(config.max_logs_per_service, 100);
    assert_eq!(config.history_candidates, 5);
    assert_eq!(config.delays.build_ms, 1500);
    assert_eq!(config.monitor.interval_ms, 5000);
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_load_json_and_yaml_files() -> Result<()> {
    let mut json_file = Builder::new().suffix(".json").tempfile().unwrap();
    write!(json_file, r#"{{ "portRange": {{ "min": 8000, "max": 8010 }} }}"#).unwrap();

    let mut yaml_file = Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        yaml_file,
        "portRange:\n  min: 9000\n  max: 9010\nexcludedPorts: [9001, 9002]\nmonitor:\n  intervalMs: 250"
    )
    .unwrap();

    let from_json = ManagerConfig::from_file(json_file.path())?;
    assert_eq!(from_json.port_range.min, 8000);

    let from_yaml = ManagerConfig::from_file(yaml_file.path())?;
    assert_eq!(from_yaml.port_range.max, 9010);
    assert_eq!(from_yaml.excluded_ports, vec![9001, 9002]);
    assert_eq!(from_yaml.monitor.interval_ms, 250);

    let manager = ServiceLifecycleManager::from_config_file(yaml_file.path())?;
    assert_eq!(manager.config().port_range.min, 9000);

    Ok(())
}

#[test]
fn test_unreadable_and_malformed_config() {
    let missing = ManagerConfig::from_file("/definitely/not/here/devport.json");
    assert!(matches!(missing, Err(Error::ConfigParse(_))));

    let malformed = ManagerConfig::parse_from_str(r#"{ "portRange": { "min": "low" } }"#);
    assert!(matches!(malformed, Err(Error::ConfigParse(_))));

    let bad_yaml = ManagerConfig::parse_from_yaml_str("portRange: [1, 2");
    assert!(matches!(bad_yaml, Err(Error::ConfigParse(_))));
}

#[test]
fn test_validate_config() {
    let mut config = ManagerConfig::for_range(5000, 4000);
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    config.port_range = PortRange { min: 0, max: 10 };
    assert!(validate_config(&config).is_err());

    config.port_range = PortRange { min: 4000, max: 5000 };
    assert!(validate_config(&config).is_ok());

    config.max_logs_per_service = 0;
    assert!(validate_config(&config).is_err());
    config.max_logs_per_service = 10;

    config.monitor.interval_ms = 0;
    assert!(validate_config(&config).is_err());

    // The manager refuses to start from an invalid configuration.
    assert!(matches!(
        ServiceLifecycleManager::new(config),
        Err(Error::ConfigInvalid(_))
    ));
}

#[test]
fn test_oversized_event_capacity_is_rejected() -> Result<()> {
    let config = ManagerConfig::parse_from_str(r#"{"eventCapacity": 9223372036854775807}"#)?;
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));
    assert!(matches!(
        ServiceLifecycleManager::builder(config).build(),
        Err(Error::ConfigInvalid(_))
    ));

    let mut config = ManagerConfig::default();
    config.event_capacity = MAX_EVENT_CAPACITY;
    assert!(validate_config(&config).is_ok());

    Ok(())
}

#[test]
fn test_parse_server_request() -> Result<()> {
    let request: ServerRequest = serde_json::from_str(
        r#"{
            "name": "portfolio",
            "framework": "Next.js",
            "preferredPort": 3005,
            "workingDirectory": "/home/student/portfolio",
            "buildOptimization": true,
            "env": { "API_URL": "http://localhost:8000" }
        }"#,
    )
    .map_err(|e| Error::ConfigParse(e.to_string()))?;

    assert_eq!(request.framework, Framework::NextJs);
    assert_eq!(request.preferred_port, Some(3005));
    assert!(request.build_optimization);
    assert!(request.hot_reload);
    assert!(!request.auto_restart);
    assert_eq!(request.env["API_URL"], "http://localhost:8000");

    Ok(())
}
