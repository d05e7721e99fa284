use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fmt, time::Duration};

use crate::{error::RequestError, provider::ProviderId};

/// A validated city name: trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct City(String);

impl City {
    pub fn new(raw: &str) -> Result<Self, RequestError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RequestError::MissingCity);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One successful temperature observation from one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    source: ProviderId,
    temperature_c: f64,
    retrieved_at: DateTime<Utc>,
}

impl Reading {
    /// Reading stamped with the current time.
    pub fn new(source: ProviderId, temperature_c: f64) -> Self {
        Self { source, temperature_c, retrieved_at: Utc::now() }
    }

    pub fn source(&self) -> ProviderId {
        self.source
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn retrieved_at(&self) -> DateTime<Utc> {
        self.retrieved_at
    }
}

/// Why a provider call did not produce a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum FailureKind {
    Network,
    Timeout,
    MalformedResponse,
    UpstreamStatus(u16),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Network => f.write_str("network error"),
            FailureKind::Timeout => f.write_str("timeout"),
            FailureKind::MalformedResponse => f.write_str("malformed response"),
            FailureKind::UpstreamStatus(status) => write!(f, "upstream status {status}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub source: ProviderId,
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    pub fn new(source: ProviderId, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self { source, kind, detail: detail.into() }
    }

    pub fn timeout(source: ProviderId) -> Self {
        Self::new(source, FailureKind::Timeout, "deadline elapsed before the provider answered")
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.kind)?;
        if !self.detail.is_empty() {
            write!(f, " ({})", self.detail)?;
        }
        Ok(())
    }
}

/// Outcome of a single adapter invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResult {
    Reading(Reading),
    Failure(Failure),
}

impl ProviderResult {
    pub fn source(&self) -> ProviderId {
        match self {
            ProviderResult::Reading(reading) => reading.source(),
            ProviderResult::Failure(failure) => failure.source,
        }
    }
}

impl From<Reading> for ProviderResult {
    fn from(reading: Reading) -> Self {
        ProviderResult::Reading(reading)
    }
}

impl From<Failure> for ProviderResult {
    fn from(failure: Failure) -> Self {
        ProviderResult::Failure(failure)
    }
}

/// Mean temperature over the providers that answered.
///
/// Only built from at least one reading; failures are kept sorted by source id.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    city: City,
    temperature_c: f64,
    readings: Vec<Reading>,
    failures: Vec<Failure>,
    elapsed: Duration,
}

impl Aggregate {
    /// Returns `None` when `readings` is empty, since the mean is undefined.
    pub fn from_readings(
        city: City,
        readings: Vec<Reading>,
        mut failures: Vec<Failure>,
        elapsed: Duration,
    ) -> Option<Self> {
        if readings.is_empty() {
            return None;
        }

        let sum: f64 = readings.iter().map(Reading::temperature_c).sum();
        let temperature_c = sum / readings.len() as f64;
        failures.sort_by_key(|f| f.source.as_str());

        Some(Self { city, temperature_c, readings, failures, elapsed })
    }

    pub fn city(&self) -> &City {
        &self.city
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn sources_used(&self) -> usize {
        self.readings.len()
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Providers that did not contribute, sorted by source id.
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_is_trimmed() {
        let city = City::new("  London ").expect("valid city");
        assert_eq!(city.as_str(), "London");
    }

    #[test]
    fn blank_city_is_rejected() {
        assert_eq!(City::new("   ").unwrap_err(), RequestError::MissingCity);
        assert_eq!(City::new("").unwrap_err(), RequestError::MissingCity);
    }

    #[test]
    fn aggregate_requires_a_reading() {
        let city = City::new("Oslo").unwrap();
        let failures = vec![Failure::timeout(ProviderId::OpenWeather)];
        assert!(Aggregate::from_readings(city, vec![], failures, Duration::ZERO).is_none());
    }

    #[test]
    fn aggregate_sorts_failures_by_source() {
        let city = City::new("Oslo").unwrap();
        let readings = vec![Reading::new(ProviderId::WeatherApi, 3.0)];
        let failures = vec![
            Failure::timeout(ProviderId::Wunderground),
            Failure::new(ProviderId::OpenWeather, FailureKind::Network, "refused"),
        ];

        let agg = Aggregate::from_readings(city, readings, failures, Duration::ZERO).unwrap();
        let order: Vec<_> = agg.failures().iter().map(|f| f.source).collect();

        assert_eq!(order, vec![ProviderId::OpenWeather, ProviderId::Wunderground]);
        assert_eq!(agg.sources_used(), 1);
        assert_eq!(agg.temperature_c(), 3.0);
    }

    #[test]
    fn failure_display_includes_detail() {
        let failure = Failure::new(ProviderId::WeatherApi, FailureKind::UpstreamStatus(401), "bad key");
        assert_eq!(failure.to_string(), "weatherapi: upstream status 401 (bad key)");
    }
}
