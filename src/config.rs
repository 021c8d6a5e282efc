//! Engine configuration.
//!
//! Values come from code, or from `APICHAIN_*` environment variables (a `.env`
//! file is loaded once if present).

use once_cell::sync::Lazy;
use std::env;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

/// Settings shared by every run of an orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Base for relative step URLs such as `/ping`
    pub base_url: Option<String>,

    /// Current page query string, exposed to templates as `qs`
    pub query_string: String,

    /// Default request timeout in milliseconds
    pub timeout_ms: u64,

    /// Operation budget for a single expression
    pub max_operations: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            query_string: String::new(),
            timeout_ms: 30_000,
            max_operations: 100_000,
        }
    }
}

impl EngineConfig {
    /// Read `APICHAIN_BASE_URL`, `APICHAIN_QUERY`, `APICHAIN_TIMEOUT_MS` and
    /// `APICHAIN_MAX_OPERATIONS`, keeping defaults for anything unset or
    /// unparsable.
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let defaults = Self::default();
        Self {
            base_url: env::var("APICHAIN_BASE_URL").ok().filter(|v| !v.is_empty()),
            query_string: env::var("APICHAIN_QUERY").unwrap_or_default(),
            timeout_ms: env::var("APICHAIN_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_ms),
            max_operations: env::var("APICHAIN_MAX_OPERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_operations),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    pub fn with_query_string(mut self, qs: &str) -> Self {
        self.query_string = qs.to_string();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.base_url, None);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.max_operations, 100_000);
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::default()
            .with_base_url("https://api.test")
            .with_query_string("?ref=mail")
            .with_timeout_ms(500);

        assert_eq!(config.base_url.as_deref(), Some("https://api.test"));
        assert_eq!(config.query_string, "?ref=mail");
        assert_eq!(config.timeout_ms, 500);
    }
}
