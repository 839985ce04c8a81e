//! Global subscriber installation. Kept in its own test binary because the
//! subscriber can only be set once per process.

use hestia_telemetry::{init_logging, LogConfig, TelemetryError};

#[test]
fn test_second_init_is_rejected() {
    let config = LogConfig::production().with_level("warn");

    init_logging(&config).unwrap();
    tracing::warn!(listener = "http", "Shutdown listener returned an error");

    let err = init_logging(&config).unwrap_err();
    assert!(matches!(err, TelemetryError::LoggingInit(_)));
}
