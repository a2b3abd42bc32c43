use std::env;
use std::fs;
use tempfile::TempDir;

/// Test loading configuration from YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
profiles:
  test:
    host: media.example.com
    port: 8080
    secret_id: 16111e9bb6ca4708abb0b4db2f
    secret_key: fd46f3cb84c141ffa52dd9c8d6
    project: 1
    business: 2
    service: app-cdn4aowk
    version: "2021-02-26"

default_profile: test
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = tiasset::config::load_from_yaml(&config_path).unwrap();

    assert_eq!(config.profiles.len(), 1);
    assert!(config.profiles.contains_key("test"));

    let profile = config.profiles.get("test").unwrap();
    assert_eq!(profile.host, "media.example.com");
    assert_eq!(profile.port, 8080);
    assert_eq!(profile.secret_id, "16111e9bb6ca4708abb0b4db2f");
    assert_eq!(profile.secret_key, "fd46f3cb84c141ffa52dd9c8d6");
    assert_eq!(profile.project, 1);
    assert_eq!(profile.business, 2);
    assert_eq!(profile.service, "app-cdn4aowk");
    assert_eq!(profile.version, "2021-02-26");

    assert_eq!(config.default_profile, Some("test".to_string()));
}

/// Test loading configuration from environment variables
#[test]
fn test_load_env_config() {
    // Save original env vars
    let orig: Vec<(&str, Option<String>)> = [
        "TIASSET_HOST",
        "TIASSET_PORT",
        "TIASSET_SECRET_ID",
        "TIASSET_SECRET_KEY",
        "TIASSET_PROJECT",
        "TIASSET_BUSINESS",
        "TIASSET_SERVICE",
        "TIASSET_VERSION",
    ]
    .iter()
    .map(|key| (*key, env::var(key).ok()))
    .collect();

    env::set_var("TIASSET_HOST", "media.example.com");
    env::set_var("TIASSET_PORT", "8080");
    env::set_var("TIASSET_SECRET_ID", "env-id");
    env::set_var("TIASSET_SECRET_KEY", "env-secret");
    env::set_var("TIASSET_PROJECT", "3");
    env::set_var("TIASSET_BUSINESS", "4");
    env::set_var("TIASSET_SERVICE", "app-cdn4aowk");
    env::remove_var("TIASSET_VERSION");

    let config = tiasset::config::load_from_env().unwrap();

    let profile = config.get_profile(None).unwrap();
    assert_eq!(profile.host, "media.example.com");
    assert_eq!(profile.port, 8080);
    assert_eq!(profile.secret_id, "env-id");
    assert_eq!(profile.secret_key, "env-secret");
    assert_eq!(profile.project, 3);
    assert_eq!(profile.business, 4);
    // Version falls back to its default
    assert_eq!(profile.version, "2021-02-26");

    // Restore original env vars
    for (key, value) in orig {
        match value {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }
}

/// Test that a missing required variable produces a helpful error
#[test]
fn test_load_env_config_missing_host() {
    let orig_host = env::var("TIASSET_HOST").ok();
    env::remove_var("TIASSET_HOST");

    let result = tiasset::config::load_from_env();
    assert!(result.is_err());
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("TIASSET_HOST"));

    if let Some(host) = orig_host {
        env::set_var("TIASSET_HOST", host);
    }
}

/// Test profile selection from a multi-profile file
#[test]
fn test_profile_selection() {
    let yaml = r#"
profiles:
  staging:
    host: staging.example.com
    secret_id: a
    secret_key: b
    service: svc
  production:
    host: prod.example.com
    secret_id: c
    secret_key: d
    service: svc

default_profile: staging
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = tiasset::config::load_config(
        Some(config_path.to_str().unwrap()),
        Some("production"),
    )
    .unwrap();
    let profile = config.get_profile(None).unwrap();
    assert_eq!(profile.host, "prod.example.com");

    let missing = tiasset::config::load_config(
        Some(config_path.to_str().unwrap()),
        Some("nonexistent"),
    );
    assert!(missing.is_err());
}
