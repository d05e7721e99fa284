use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;

use crate::{
    City,
    model::{Failure, ProviderResult},
    provider::{ProviderId, bounded, read_json, send_failure},
};

use super::WeatherProvider;

const SOURCE: ProviderId = ProviderId::OpenWeather;

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, base_url: String, http: Client) -> Self {
        Self { api_key, base_url, http }
    }

    async fn fetch_current(&self, city: &str) -> Result<f64, Failure> {
        let url = format!("{}/data/2.5/weather", self.base_url.trim_end_matches('/'));

        let res = self
            .http
            .get(url)
            .query(&[("q", city), ("appid", self.api_key.as_str()), ("units", "metric")])
            .send()
            .await
            .map_err(|e| send_failure(SOURCE, e))?;

        let parsed: OwCurrentResponse = read_json(SOURCE, res).await?;
        tracing::debug!(provider = %SOURCE, city, temp_c = parsed.main.temp, "reading received");

        Ok(parsed.main.temp)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        SOURCE
    }

    async fn fetch_temperature(&self, city: &City, deadline: Instant) -> ProviderResult {
        bounded(SOURCE, deadline, self.fetch_current(city.as_str())).await
    }
}
