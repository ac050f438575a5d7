use std::io::Write;

use ctmatch_server::config::loader::load_config;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn loads_lookup_settings_from_file() {
    let file = write_config(
        r#"
[server]
port = 8090

[logging]
level = "debug"

[lookup]
api_endpoint = "https://trials.example.org/getClinicalTrial"
request_timeout_secs = 10

[lookup.cache]
enabled = false

[lookup.registry]
base_url = "http://localhost:9999/api/v2"

[lookup.code_mappings]
rxnorm = "data/rxnorm.json"
stage_ajcc = "data/ajcc.json"
"#,
    );

    let cfg = load_config(file.path().to_str()).unwrap();
    assert_eq!(cfg.server.port, 8090);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(
        cfg.lookup.endpoint.as_deref(),
        Some("https://trials.example.org/getClinicalTrial")
    );
    assert_eq!(cfg.lookup.request_timeout_secs, 10);
    assert!(!cfg.lookup.cache.enabled);
    assert_eq!(cfg.lookup.cache.ttl_secs, 3600);
    assert!(cfg.lookup.registry.enabled);
    assert_eq!(cfg.lookup.registry.base_url, "http://localhost:9999/api/v2");
    assert!(cfg.lookup.code_mappings.rxnorm.is_some());
    assert!(cfg.lookup.code_mappings.stage_snomed.is_none());
}

#[test]
fn missing_file_uses_defaults() {
    let cfg = load_config(Some("/nonexistent/ctmatch.toml")).unwrap();
    assert_eq!(cfg.server.port, 3000);
    assert!(cfg.lookup.cache.enabled);
}

#[test]
fn invalid_values_are_rejected() {
    let file = write_config(
        r#"
[logging]
level = "loud"
"#,
    );
    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(err.contains("logging.level"), "{err}");
}

#[test]
fn environment_overrides_file() {
    let file = write_config(
        r#"
[server]
host = "0.0.0.0"
"#,
    );
    // SAFETY: no other test in this binary asserts on server.host.
    unsafe { std::env::set_var("CTMATCH__SERVER__HOST", "127.0.0.1") };
    let cfg = load_config(file.path().to_str()).unwrap();
    unsafe { std::env::remove_var("CTMATCH__SERVER__HOST") };

    assert_eq!(cfg.server.host, "127.0.0.1");
}
