use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Connection profile for one media-asset service deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Service host name or address
    pub host: String,

    /// Service port (default: 80)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Signing credential id
    pub secret_id: String,

    /// Signing credential secret
    pub secret_key: String,

    /// Project id sent with every gateway call
    #[serde(default)]
    pub project: i64,

    /// Business id sent with every gateway call
    #[serde(default)]
    pub business: i64,

    /// Service identifier included in the signature scope
    pub service: String,

    /// API version (default: 2021-02-26)
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_port() -> u16 {
    80
}

fn default_version() -> String {
    "2021-02-26".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Named profiles for different deployments
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    /// Profile used when none is named
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
}

impl Config {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            default_profile: None,
        }
    }

    /// Get a profile by name, or the default profile if not specified
    pub fn get_profile(&self, name: Option<&str>) -> Option<&Profile> {
        if let Some(name) = name {
            self.profiles.get(name)
        } else if let Some(default) = &self.default_profile {
            self.profiles.get(default)
        } else {
            self.profiles.values().next()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config = serde_yaml::from_str(&content)
        .context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// - TIASSET_HOST (required)
/// - TIASSET_PORT (optional, defaults to 80)
/// - TIASSET_SECRET_ID / TIASSET_SECRET_KEY (required)
/// - TIASSET_PROJECT / TIASSET_BUSINESS (optional, default 0)
/// - TIASSET_SERVICE (required)
/// - TIASSET_VERSION (optional, defaults to 2021-02-26)
pub fn load_from_env() -> Result<Config> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let mut config = Config::new();

    let host = std::env::var("TIASSET_HOST")
        .context("TIASSET_HOST environment variable not set")?;

    let port = match std::env::var("TIASSET_PORT") {
        Ok(raw) => raw
            .parse()
            .context("TIASSET_PORT is not a valid port number")?,
        Err(_) => default_port(),
    };

    let secret_id = std::env::var("TIASSET_SECRET_ID")
        .context("TIASSET_SECRET_ID environment variable not set")?;

    let secret_key = std::env::var("TIASSET_SECRET_KEY")
        .context("TIASSET_SECRET_KEY environment variable not set")?;

    let service = std::env::var("TIASSET_SERVICE")
        .context("TIASSET_SERVICE environment variable not set")?;

    let project = match std::env::var("TIASSET_PROJECT") {
        Ok(raw) => raw.parse().context("TIASSET_PROJECT is not a number")?,
        Err(_) => 0,
    };

    let business = match std::env::var("TIASSET_BUSINESS") {
        Ok(raw) => raw.parse().context("TIASSET_BUSINESS is not a number")?,
        Err(_) => 0,
    };

    let version =
        std::env::var("TIASSET_VERSION").unwrap_or_else(|_| default_version());

    let profile = Profile {
        host,
        port,
        secret_id,
        secret_key,
        project,
        business,
        service,
        version,
    };

    config.profiles.insert("default".to_string(), profile);
    config.default_profile = Some("default".to_string());

    Ok(config)
}

/// Load configuration from file or environment
///
/// Tries the YAML file when a path is given, otherwise falls back to
/// environment variables.
pub fn load_config(config_path: Option<&str>, profile_name: Option<&str>) -> Result<Config> {
    if let Some(path) = config_path {
        let mut config = load_from_yaml(path)?;

        // If a specific profile is requested, make it the default
        if let Some(name) = profile_name {
            if !config.profiles.contains_key(name) {
                anyhow::bail!("Profile '{}' not found in config file", name);
            }
            config.default_profile = Some(name.to_string());
        }

        Ok(config)
    } else {
        load_from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
profiles:
  production:
    host: media.example.com
    port: 8080
    secret_id: 16111e9bb6ca4708abb0b4db2f
    secret_key: fd46f3cb84c141ffa52dd9c8d6
    project: 1
    business: 1
    service: app-cdn4aowk
    version: "2021-02-26"

default_profile: production
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.profiles.len(), 1);
        assert!(config.profiles.contains_key("production"));

        let profile = config.profiles.get("production").unwrap();
        assert_eq!(profile.host, "media.example.com");
        assert_eq!(profile.port, 8080);
        assert_eq!(profile.service, "app-cdn4aowk");

        assert_eq!(config.default_profile, Some("production".to_string()));
    }

    #[test]
    fn test_default_values() {
        let yaml = r#"
profiles:
  minimal:
    host: media.example.com
    secret_id: id
    secret_key: secret
    service: app-cdn4aowk
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let profile = config.profiles.get("minimal").unwrap();

        assert_eq!(profile.port, 80);
        assert_eq!(profile.version, "2021-02-26");
        assert_eq!(profile.project, 0);
        assert_eq!(profile.business, 0);
    }

    #[test]
    fn test_get_profile_fallbacks() {
        let yaml = r#"
profiles:
  only:
    host: media.example.com
    secret_id: id
    secret_key: secret
    service: svc
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // No default set: falls back to any profile
        assert!(config.get_profile(None).is_some());
        assert!(config.get_profile(Some("only")).is_some());
        assert!(config.get_profile(Some("missing")).is_none());
    }
}
