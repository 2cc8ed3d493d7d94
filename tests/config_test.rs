use nexcard_panel::config::{Config, ConfigError, DEFAULT_API_BASE};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn test_defaults() {
    let config = load(&[]).unwrap();
    assert_eq!(config.api_base, DEFAULT_API_BASE);
    assert_eq!(config.page_size, 20);
    assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    assert!(!config.jsonp);
    assert_eq!(config.bind, "127.0.0.1:3000");
    assert!(config.session_file.to_string_lossy().ends_with("session.json"));
}

#[test]
fn test_overrides() {
    let config = load(&[
        ("NEXCARD_API_BASE", "http://localhost:9000/exec"),
        ("NEXCARD_PAGE_SIZE", " 50 "),
        ("NEXCARD_TIMEOUT_SECS", "0"),
        ("NEXCARD_JSONP", "true"),
        ("NEXCARD_SESSION_FILE", "/tmp/nexcard.json"),
        ("NEXCARD_PUBLIC_URL", "https://panel.example.com"),
    ])
    .unwrap();

    assert_eq!(config.api_base, "http://localhost:9000/exec");
    assert_eq!(config.page_size, 50);
    assert_eq!(config.timeout, None, "Zero disables the timeout");
    assert!(config.jsonp);
    assert_eq!(config.session_file, PathBuf::from("/tmp/nexcard.json"));
    assert_eq!(config.public_url, "https://panel.example.com");
}

#[test]
fn test_blank_values_use_defaults() {
    let config = load(&[("NEXCARD_PAGE_SIZE", "  ")]).unwrap();
    assert_eq!(config.page_size, 20);
}

#[test]
fn test_invalid_values() {
    let err = load(&[("NEXCARD_PAGE_SIZE", "lots")]).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "NEXCARD_PAGE_SIZE"));

    assert!(load(&[("NEXCARD_PAGE_SIZE", "0")]).is_err());
    assert!(load(&[("NEXCARD_JSONP", "maybe")]).is_err());
}
