//! Daemon configuration, loaded from `KEEL_`-prefixed environment
//! variables with CLI overrides applied by the binary.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Controller daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bind address.
    pub ip: String,
    /// Bind port.
    pub port: u16,
    /// HS256 signing key for JWT-protected routes.
    pub secret: String,
    /// 0 = warn, 1 = info, 2 = debug, 3+ = trace.
    pub verbosity: u8,

    pub cors_allowed_origins: Vec<String>,
    pub cors_allowed_methods: Vec<String>,
    pub cors_allowed_headers: Vec<String>,
    pub cors_exposed_headers: Vec<String>,
    pub cors_allow_credentials: bool,
    pub cors_max_age: u64,
    pub cors_options_passthrough: bool,
    pub cors_debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 8080,
            secret: String::new(),
            verbosity: 1,
            cors_allowed_origins: vec!["*".to_string()],
            cors_allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "DELETE".to_string(),
            ],
            cors_allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            cors_exposed_headers: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age: 600,
            cors_options_passthrough: false,
            cors_debug: false,
        }
    }
}

impl Config {
    /// Load from the environment, falling back to defaults per variable.
    pub fn from_env() -> ConfigResult<Self> {
        let defaults = Self::default();

        Ok(Self {
            ip: env_string("KEEL_IP").unwrap_or(defaults.ip),
            port: env_parse("KEEL_PORT")?.unwrap_or(defaults.port),
            secret: env_string("KEEL_SECRET").unwrap_or(defaults.secret),
            verbosity: env_parse("KEEL_VERBOSITY")?.unwrap_or(defaults.verbosity),
            cors_allowed_origins: env_list("KEEL_CORS_ALLOWED_ORIGINS")
                .unwrap_or(defaults.cors_allowed_origins),
            cors_allowed_methods: env_list("KEEL_CORS_ALLOWED_METHODS")
                .unwrap_or(defaults.cors_allowed_methods),
            cors_allowed_headers: env_list("KEEL_CORS_ALLOWED_HEADERS")
                .unwrap_or(defaults.cors_allowed_headers),
            cors_exposed_headers: env_list("KEEL_CORS_EXPOSED_HEADERS")
                .unwrap_or(defaults.cors_exposed_headers),
            cors_allow_credentials: env_parse("KEEL_CORS_ALLOW_CREDENTIALS")?
                .unwrap_or(defaults.cors_allow_credentials),
            cors_max_age: env_parse("KEEL_CORS_MAX_AGE")?.unwrap_or(defaults.cors_max_age),
            cors_options_passthrough: env_parse("KEEL_CORS_OPTIONS_PASSTHROUGH")?
                .unwrap_or(defaults.cors_options_passthrough),
            cors_debug: env_parse("KEEL_CORS_DEBUG")?.unwrap_or(defaults.cors_debug),
        })
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// `tracing_subscriber` filter directive for the configured verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

fn env_string(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

/// Split `"x,y,z"` into a list, trimming blanks.
pub fn string_to_slice(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn env_list(var: &str) -> Option<Vec<String>> {
    env_string(var).map(|v| string_to_slice(&v))
}

fn env_parse<T: std::str::FromStr>(var: &str) -> ConfigResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(var) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            var: var.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.log_filter(), "info");
        assert!(cfg.cors_allowed_origins.contains(&"*".to_string()));
    }

    #[test]
    fn test_string_to_slice() {
        assert_eq!(
            string_to_slice("a, b,c"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(string_to_slice("").is_empty());
        assert_eq!(string_to_slice("single"), vec!["single".to_string()]);
    }

    #[test]
    fn test_log_filter_levels() {
        let mut cfg = Config::default();
        cfg.verbosity = 0;
        assert_eq!(cfg.log_filter(), "warn");
        cfg.verbosity = 2;
        assert_eq!(cfg.log_filter(), "debug");
        cfg.verbosity = 9;
        assert_eq!(cfg.log_filter(), "trace");
    }
}
