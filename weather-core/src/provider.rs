use crate::{
    City, Config,
    model::{Failure, FailureKind, ProviderResult, Reading},
    provider::{
        openweather::OpenWeatherProvider, weatherapi::WeatherApiProvider,
        wunderground::WundergroundProvider,
    },
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt::Debug, sync::Arc};
use tokio::time::Instant;

pub mod openweather;
pub mod weatherapi;
pub mod wunderground;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
    Wunderground,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
            ProviderId::Wunderground => "wunderground",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi, ProviderId::Wunderground]
    }

    /// Base URL used when the configuration does not override it.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "https://api.openweathermap.org",
            ProviderId::WeatherApi => "https://api.weatherapi.com",
            ProviderId::Wunderground => "http://api.wunderground.com",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            "wunderground" => Ok(ProviderId::Wunderground),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi, wunderground."
            )),
        }
    }
}

/// One external weather source.
///
/// Implementations never fail across this boundary: every transport, status,
/// parsing or deadline problem comes back as [`ProviderResult::Failure`].
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn fetch_temperature(&self, city: &City, deadline: Instant) -> ProviderResult;
}

/// Construct a provider from config and explicit ProviderId.
///
/// All providers built from the same `http` client share its connection pool.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
    http: Client,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let api_key = config.provider_api_key(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `weather configure {id}` and enter your API key."
        )
    })?;
    let base_url = config.provider_base_url(id).to_owned();
    let api_key = api_key.to_owned();

    let provider: Arc<dyn WeatherProvider> = match id {
        ProviderId::OpenWeather => Arc::new(OpenWeatherProvider::new(api_key, base_url, http)),
        ProviderId::WeatherApi => Arc::new(WeatherApiProvider::new(api_key, base_url, http)),
        ProviderId::Wunderground => Arc::new(WundergroundProvider::new(api_key, base_url, http)),
    };

    Ok(provider)
}

/// Build every enabled provider, in [`ProviderId::all`] order.
pub fn providers_from_config(
    config: &Config,
    http: Client,
) -> anyhow::Result<Vec<Arc<dyn WeatherProvider>>> {
    config
        .enabled_providers()
        .into_iter()
        .map(|id| provider_from_config(id, config, http.clone()))
        .collect()
}

/// Run one provider call under `deadline`, converting its error into a [`Failure`].
pub(crate) async fn bounded<F>(source: ProviderId, deadline: Instant, call: F) -> ProviderResult
where
    F: std::future::Future<Output = Result<f64, Failure>>,
{
    match tokio::time::timeout_at(deadline, call).await {
        Ok(Ok(temperature_c)) => Reading::new(source, temperature_c).into(),
        Ok(Err(failure)) => failure.into(),
        Err(_) => Failure::timeout(source).into(),
    }
}

pub(crate) fn send_failure(source: ProviderId, err: reqwest::Error) -> Failure {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_decode() {
        FailureKind::MalformedResponse
    } else {
        FailureKind::Network
    };
    Failure::new(source, kind, err.to_string())
}

/// Read the body of `res`, failing on non-success statuses, then parse it as JSON.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    source: ProviderId,
    res: Response,
) -> Result<T, Failure> {
    let status = res.status();
    let body = res.text().await.map_err(|e| send_failure(source, e))?;

    if !status.is_success() {
        return Err(Failure::new(
            source,
            FailureKind::UpstreamStatus(status.as_u16()),
            truncate_body(&body),
        ));
    }

    serde_json::from_str(&body)
        .map_err(|e| Failure::new(source, FailureKind::MalformedResponse, e.to_string()))
}

pub fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }

    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::time::Duration;

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let s = id.as_str();
            let parsed = ProviderId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn provider_id_parse_is_case_insensitive() {
        assert_eq!(ProviderId::try_from("WeatherAPI").unwrap(), ProviderId::WeatherApi);
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn provider_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = provider_from_config(ProviderId::OpenWeather, &cfg, Client::new()).unwrap_err();
        assert!(err.to_string().contains("No API key configured for provider"));
    }

    #[test]
    fn providers_from_config_builds_only_enabled_ones() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "KEY".to_string());
        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "KEY".to_string());

        let providers = providers_from_config(&cfg, Client::new()).expect("providers");
        let ids: Vec<_> = providers.iter().map(|p| p.id()).collect();

        assert_eq!(ids, vec![ProviderId::OpenWeather, ProviderId::WeatherApi]);
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "é".repeat(150);
        let out = truncate_body(&body);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 203);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_turns_late_calls_into_timeouts() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let result = bounded(ProviderId::OpenWeather, deadline, async {
            tokio::time::sleep(Duration::from_millis(51)).await;
            Ok(10.0)
        })
        .await;

        assert_eq!(result, ProviderResult::Failure(Failure::timeout(ProviderId::OpenWeather)));
    }
}
