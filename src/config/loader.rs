//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `listener.port`.
pub const PORT_ENV: &str = "PORT";
/// Environment variable enabling development mode when set to `development`.
pub const APP_ENV: &str = "APP_ENV";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("PORT={0:?} is not a valid port")]
    InvalidPort(String),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply process
/// environment overrides, then validate.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Like [`load_config`] with an explicit environment lookup.
pub fn load_config_with<F>(path: Option<&Path>, env: F) -> Result<ServerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ServerConfig::default(),
    };

    apply_env(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `PORT` and `APP_ENV` overrides.
pub fn apply_env<F>(config: &mut ServerConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = env(PORT_ENV) {
        config.listener.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
    }

    if let Some(app_env) = env(APP_ENV) {
        config.development = app_env.trim().eq_ignore_ascii_case("development");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = load_config_with(None, env(&[])).unwrap();
        assert_eq!(config.listener.port, 3000);
        assert!(!config.development);
    }

    #[test]
    fn env_overrides() {
        let config = load_config_with(
            None,
            env(&[(PORT_ENV, "8081"), (APP_ENV, "Development")]),
        )
        .unwrap();
        assert_eq!(config.listener.port, 8081);
        assert!(config.development);

        let config = load_config_with(None, env(&[(APP_ENV, "production")])).unwrap();
        assert!(!config.development);
    }

    #[test]
    fn bad_port() {
        let err = load_config_with(None, env(&[(PORT_ENV, "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(p) if p == "http"));
    }

    #[test]
    fn file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "development = true\n[listener]\nport = 4000\nhost = \"127.0.0.1\"").unwrap();

        let config = load_config_with(Some(file.path()), env(&[])).unwrap();
        assert_eq!(config.listener.port, 4000);
        assert_eq!(config.listener.host, "127.0.0.1");
        assert!(config.development);

        let config = load_config_with(Some(file.path()), env(&[(PORT_ENV, "5000")])).unwrap();
        assert_eq!(config.listener.port, 5000);
    }

    #[test]
    fn invalid_file_reports_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listener]\nhost = \"localhost\"").unwrap();

        let err = load_config_with(Some(file.path()), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("localhost"));
    }

    #[test]
    fn missing_file() {
        let err = load_config_with(Some(Path::new("/nonexistent/server.toml")), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
