use std::time::Duration;

use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub polling: PollingConfig,
}

/// Admin API connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/admin".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Apply command-line overrides on top of file and environment settings
    pub fn with_overrides(mut self, base_url: Option<String>, api_key: Option<String>) -> Self {
        if let Some(base_url) = base_url {
            self.api.base_url = base_url;
        }
        if let Some(api_key) = api_key {
            self.api.api_key = Some(api_key);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:8080/admin");
        assert_eq!(config.api.timeout_secs, 30);
        assert!(config.api.api_key.is_none());
        assert_eq!(config.polling.interval(), Duration::from_secs(2));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_source_keeps_defaults() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[api]\nbase_url = \"https://gateway.internal/admin\"\n\n[logging]\nformat = \"json\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.api.base_url, "https://gateway.internal/admin");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.polling.interval_ms, 2000);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::default()
            .with_overrides(Some("http://other/admin".to_string()), Some("key".to_string()));
        assert_eq!(config.api.base_url, "http://other/admin");
        assert_eq!(config.api.api_key.as_deref(), Some("key"));

        let untouched = AppConfig::default().with_overrides(None, None);
        assert_eq!(untouched.api.base_url, "http://localhost:8080/admin");
    }
}
