use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;

use crate::{
    City,
    model::{Failure, FailureKind, ProviderResult},
    provider::{ProviderId, bounded, read_json, send_failure},
};

use super::WeatherProvider;

const SOURCE: ProviderId = ProviderId::Wunderground;

/// Weather Underground "conditions" endpoint; the key is part of the path.
#[derive(Debug, Clone)]
pub struct WundergroundProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WundergroundProvider {
    pub fn new(api_key: String, base_url: String, http: Client) -> Self {
        Self { api_key, base_url, http }
    }

    async fn fetch_current(&self, city: &str) -> Result<f64, Failure> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Failure::new(SOURCE, FailureKind::Network, format!("bad base url: {e}")))?;
        let file = format!("{city}.json");
        url.path_segments_mut()
            .map_err(|_| Failure::new(SOURCE, FailureKind::Network, "base url cannot be a base"))?
            .pop_if_empty()
            .extend(["api", self.api_key.as_str(), "conditions", "q", file.as_str()]);

        let res = self.http.get(url).send().await.map_err(|e| send_failure(SOURCE, e))?;

        let parsed: WuResponse = read_json(SOURCE, res).await?;
        let temp_c = parsed.current_observation.temp_c;
        tracing::debug!(provider = %SOURCE, city, temp_c, "reading received");

        Ok(temp_c)
    }
}

#[derive(Debug, Deserialize)]
struct WuObservation {
    temp_c: f64,
}

#[derive(Debug, Deserialize)]
struct WuResponse {
    current_observation: WuObservation,
}

#[async_trait]
impl WeatherProvider for WundergroundProvider {
    fn id(&self) -> ProviderId {
        SOURCE
    }

    async fn fetch_temperature(&self, city: &City, deadline: Instant) -> ProviderResult {
        bounded(SOURCE, deadline, self.fetch_current(city.as_str())).await
    }
}
