use std::io::Write;
use std::time::Duration;

use ticketflow_core::config::AppConfig;
use ticketflow_core::TicketflowError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
stage_timeout_secs = 15

[capabilities]
call_timeout_secs = 5

[log]
enabled = true
log_dir = "/tmp/ticketflow-logs"
level = 3
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.stage_timeout(), Some(Duration::from_secs(15)));
    assert_eq!(config.capabilities.call_timeout(), Duration::from_secs(5));

    let log = config.log.expect("log section present");
    assert!(log.enabled);
    assert_eq!(log.level, 3);
    assert_eq!(log.log_dir().to_str(), Some("/tmp/ticketflow-logs"));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("TICKETFLOW_TEST_LOG_DIR", "/var/log/tickets");

    let toml_content = r#"
[log]
log_dir = "${TICKETFLOW_TEST_LOG_DIR}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    let log = config.log.expect("log section present");
    assert_eq!(log.log_dir.as_deref(), Some("/var/log/tickets"));

    std::env::remove_var("TICKETFLOW_TEST_LOG_DIR");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[engine]
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.stage_timeout(), None);
    assert_eq!(config.capabilities.call_timeout(), Duration::from_secs(30));
    assert!(config.log.is_none());
}

#[test]
fn test_malformed_config_is_configuration_error() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine]\nstage_timeout_secs = \"soon\"\n")
        .expect("write toml");

    match AppConfig::load(tmp.path()) {
        Err(TicketflowError::Configuration(_)) => {}
        other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("ticketflow.toml");

    assert!(matches!(
        AppConfig::load(&path),
        Err(TicketflowError::ConfigNotFound(_))
    ));
    let config = AppConfig::load_or_default(&path).expect("defaults");
    assert_eq!(config.capabilities.call_timeout(), Duration::from_secs(30));
}
