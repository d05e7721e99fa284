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

const SOURCE: ProviderId = ProviderId::WeatherApi;

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String, base_url: String, http: Client) -> Self {
        Self { api_key, base_url, http }
    }

    async fn fetch_current(&self, city: &str) -> Result<f64, Failure> {
        let url = format!("{}/v1/current.json", self.base_url.trim_end_matches('/'));

        let res = self
            .http
            .get(url)
            .query(&[("key", self.api_key.as_str()), ("q", city)])
            .send()
            .await
            .map_err(|e| send_failure(SOURCE, e))?;

        let parsed: WaResponse = read_json(SOURCE, res).await?;
        tracing::debug!(provider = %SOURCE, city, temp_c = parsed.current.temp_c, "reading received");

        Ok(parsed.current.temp_c)
    }
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    current: WaCurrent,
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        SOURCE
    }

    async fn fetch_temperature(&self, city: &City, deadline: Instant) -> ProviderResult {
        bounded(SOURCE, deadline, self.fetch_current(city.as_str())).await
    }
}
