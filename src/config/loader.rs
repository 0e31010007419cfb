//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from a TOML file, apply environment overrides, then
/// validate.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config = parse_config(&content)?;

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

/// Overlay secrets and store locations from the environment. Empty values
/// are treated as unset.
pub fn apply_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let store = &mut config.rate_limit.store;

    if let Some(url) = get("REDIS_URL") {
        store.redis_url = Some(url);
    }
    if let Some(url) = get("KV_REST_API_URL") {
        store.kv_rest_url = Some(url);
    }
    if let Some(token) = get("KV_REST_API_TOKEN") {
        store.kv_rest_token = Some(token);
    }
    if let Some(key) = get("AIAS_ADMIN_API_KEY") {
        config.admin.api_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = parse_config(
            r#"
            [rate_limit.store]
            redis_url = "redis://file:6379"
            "#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            ("REDIS_URL", "redis://env:6379"),
            ("KV_REST_API_URL", "https://kv.example.com"),
            ("KV_REST_API_TOKEN", ""),
            ("AIAS_ADMIN_API_KEY", "s3cret"),
        ]
        .into_iter()
        .collect();
        apply_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        let store = &config.rate_limit.store;
        assert_eq!(store.redis_url.as_deref(), Some("redis://env:6379"));
        assert_eq!(store.kv_rest_url.as_deref(), Some("https://kv.example.com"));
        assert_eq!(store.kv_rest_token, None);
        assert_eq!(config.admin.api_key, "s3cret");
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[routes]]
            name = "orphan"
            path_prefix = "/x"
            upstream = "missing"
            "#
        )
        .unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Path::new("/nonexistent/aias.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
