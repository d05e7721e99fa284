use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{aggregator::AggregationSettings, provider::ProviderId};

/// Configuration for a single provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Overrides [`ProviderId::default_base_url`], e.g. for a proxy or a test server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AggregationConfig {
    /// Minimum number of providers that must answer.
    pub quorum: usize,
    pub per_call_timeout_ms: u64,
    /// Request-scoped deadline for the whole fan-out.
    pub overall_timeout_ms: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self { quorum: 1, per_call_timeout_ms: 3000, overall_timeout_ms: 5000 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { format: LogFormat::Text, level: "info".to_string() }
    }
}

/// Top-level configuration, loaded once at startup.
///
/// Example TOML:
/// ```toml
/// listen_addr = "0.0.0.0:8080"
///
/// [aggregation]
/// quorum = 1
///
/// [providers.openweather]
/// api_key = "..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            aggregation: AggregationConfig::default(),
            logging: LoggingConfig::default(),
            providers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load config from the platform config directory, or an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-task", "weather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Set/replace a provider API key, keeping any base URL already configured.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .entry(provider_id.as_str().to_string())
            .and_modify(|cfg| cfg.api_key = api_key.clone())
            .or_insert(ProviderConfig { api_key, base_url: None, enabled: true });
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Returns API key for a provider, if present and non-empty.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.provider_config(provider_id)
            .map(|cfg| cfg.api_key.as_str())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn provider_base_url(&self, provider_id: ProviderId) -> &str {
        self.provider_config(provider_id)
            .and_then(|cfg| cfg.base_url.as_deref())
            .unwrap_or_else(|| provider_id.default_base_url())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some()
    }

    /// Providers that have a key and are not disabled, in [`ProviderId::all`] order.
    pub fn enabled_providers(&self) -> Vec<ProviderId> {
        ProviderId::all()
            .iter()
            .copied()
            .filter(|id| {
                self.is_provider_configured(*id)
                    && self.provider_config(*id).is_some_and(|cfg| cfg.enabled)
            })
            .collect()
    }

    /// Apply `WEATHER_<PROVIDER>_API_KEY` and `WEATHER_LISTEN_ADDR` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for id in ProviderId::all() {
            let var = format!("WEATHER_{}_API_KEY", id.as_str().to_uppercase());
            if let Some(key) = lookup(&var).filter(|k| !k.trim().is_empty()) {
                self.upsert_provider_api_key(*id, key);
            }
        }

        if let Some(addr) = lookup("WEATHER_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
    }

    /// Check everything the gateway needs before it starts serving.
    pub fn validate(&self) -> Result<()> {
        for name in self.providers.keys() {
            ProviderId::try_from(name.as_str())
                .with_context(|| format!("Invalid provider section [providers.{name}]"))?;
        }

        let enabled = self.enabled_providers();
        if enabled.is_empty() {
            bail!(
                "No weather provider is configured.\n\
                 Hint: run `weather configure <provider>` (e.g. `weather configure openweather`) first."
            );
        }

        for id in &enabled {
            let base_url = self.provider_base_url(*id);
            let url = reqwest::Url::parse(base_url)
                .with_context(|| format!("Invalid base_url '{base_url}' for provider {id}"))?;
            if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
                bail!("Invalid base_url '{base_url}' for provider {id}: expected an http(s) URL");
            }
        }

        let agg = &self.aggregation;
        if agg.quorum == 0 || agg.quorum > enabled.len() {
            bail!(
                "aggregation.quorum must be between 1 and the number of enabled providers ({}), got {}",
                enabled.len(),
                agg.quorum
            );
        }
        if agg.per_call_timeout_ms == 0 || agg.overall_timeout_ms == 0 {
            bail!("aggregation timeouts must be greater than zero");
        }
        if agg.per_call_timeout_ms > agg.overall_timeout_ms {
            bail!(
                "aggregation.per_call_timeout_ms ({}) exceeds overall_timeout_ms ({})",
                agg.per_call_timeout_ms,
                agg.overall_timeout_ms
            );
        }

        self.listen_socket_addr()?;
        Ok(())
    }

    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("Invalid listen_addr '{}'", self.listen_addr))
    }

    pub fn aggregation_settings(&self) -> AggregationSettings {
        AggregationSettings {
            per_call_timeout: Duration::from_millis(self.aggregation.per_call_timeout_ms),
            overall_timeout: Duration::from_millis(self.aggregation.overall_timeout_ms),
            quorum: self.aggregation.quorum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;

    fn configured() -> Config {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OPEN_KEY".into());
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "WEATHER_KEY".into());
        cfg
    }

    #[test]
    fn validate_errors_when_nothing_configured() {
        let cfg = Config::default();
        let err = cfg.validate().unwrap_err();

        assert!(err.to_string().contains("No weather provider is configured"));
    }

    #[test]
    fn set_api_key_for_provider() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OPEN_KEY".into());

        let key = cfg.provider_api_key(ProviderId::OpenWeather);
        assert_eq!(key, Some("OPEN_KEY"));
        assert!(cfg.is_provider_configured(ProviderId::OpenWeather));
        assert!(!cfg.is_provider_configured(ProviderId::WeatherApi));
    }

    #[test]
    fn upsert_keeps_custom_base_url() {
        let mut cfg = Config::default();
        cfg.providers.insert(
            "weatherapi".into(),
            ProviderConfig {
                api_key: "OLD".into(),
                base_url: Some("http://localhost:9000".into()),
                enabled: true,
            },
        );

        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "NEW".into());

        assert_eq!(cfg.provider_api_key(ProviderId::WeatherApi), Some("NEW"));
        assert_eq!(cfg.provider_base_url(ProviderId::WeatherApi), "http://localhost:9000");
        assert_eq!(cfg.provider_base_url(ProviderId::OpenWeather), "https://api.openweathermap.org");
    }

    #[test]
    fn disabled_and_keyless_providers_are_not_enabled() {
        let mut cfg = configured();
        cfg.providers.get_mut("weatherapi").unwrap().enabled = false;
        cfg.providers.insert(
            "wunderground".into(),
            ProviderConfig { api_key: "  ".into(), base_url: None, enabled: true },
        );

        assert_eq!(cfg.enabled_providers(), vec![ProviderId::OpenWeather]);
    }

    #[test]
    fn validate_rejects_unusable_base_urls() {
        for bad in ["not a url", "mailto:ops@example.com", "ftp://example.com"] {
            let mut cfg = configured();
            cfg.providers.get_mut("openweather").unwrap().base_url = Some(bad.into());

            let err = cfg.validate().unwrap_err();
            assert!(format!("{err:#}").contains("Invalid base_url"), "base_url {bad}");
        }
    }

    #[test]
    fn validate_accepts_custom_http_base_url() {
        let mut cfg = configured();
        cfg.providers.get_mut("weatherapi").unwrap().base_url = Some("http://127.0.0.1:9000".into());

        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn quorum_cannot_exceed_enabled_providers() {
        let mut cfg = configured();
        cfg.aggregation.quorum = 2;
        assert!(cfg.validate().is_ok());

        cfg.aggregation.quorum = 3;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("aggregation.quorum"));

        cfg.aggregation.quorum = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn per_call_timeout_must_fit_overall_timeout() {
        let mut cfg = configured();
        cfg.aggregation.per_call_timeout_ms = 6000;
        cfg.aggregation.overall_timeout_ms = 5000;

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds overall_timeout_ms"));
    }

    #[test]
    fn invalid_listen_addr_is_rejected() {
        let mut cfg = configured();
        cfg.listen_addr = "not an address".into();

        assert!(cfg.validate().unwrap_err().to_string().contains("Invalid listen_addr"));
    }

    #[test]
    fn unknown_provider_section_is_rejected() {
        let mut cfg = configured();
        cfg.providers.insert(
            "darksky".into(),
            ProviderConfig { api_key: "K".into(), base_url: None, enabled: true },
        );

        let err = cfg.validate().unwrap_err();
        assert!(format!("{err:#}").contains("Unknown provider 'darksky'"));
    }

    #[test]
    fn env_overrides_fill_keys_and_listen_addr() {
        let mut cfg = Config::default();
        cfg.apply_overrides_from(|name| match name {
            "WEATHER_WUNDERGROUND_API_KEY" => Some("WU".into()),
            "WEATHER_LISTEN_ADDR" => Some("127.0.0.1:3000".into()),
            _ => None,
        });

        assert_eq!(cfg.provider_api_key(ProviderId::Wunderground), Some("WU"));
        assert_eq!(cfg.listen_addr, "127.0.0.1:3000");
        assert_eq!(cfg.enabled_providers(), vec![ProviderId::Wunderground]);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [aggregation]
            quorum = 2

            [providers.openweather]
            api_key = "A"

            [providers.weatherapi]
            api_key = "B"
            base_url = "http://127.0.0.1:1234"
            "#,
        )
        .expect("valid toml");

        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.aggregation.quorum, 2);
        assert_eq!(cfg.aggregation.overall_timeout_ms, 5000);
        assert_eq!(cfg.logging, LoggingConfig::default());
        assert!(cfg.validate().is_ok());

        let settings = cfg.aggregation_settings();
        assert_eq!(settings.per_call_timeout, Duration::from_millis(3000));
        assert_eq!(settings.quorum, 2);
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = configured();
        cfg.logging.format = LogFormat::Json;
        cfg.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = Config::load_from(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(cfg, Config::default());
    }
}
