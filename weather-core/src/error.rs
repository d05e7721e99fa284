use thiserror::Error;

use crate::model::Failure;

/// Problems with the incoming query itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("missing city")]
    MissingCity,
}

/// Why a fan-out call could not produce an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("no weather providers are configured")]
    NoSources,

    #[error("all sources failed: {}", join_failures(.failures))]
    AllSourcesFailed { failures: Vec<Failure> },

    #[error(
        "insufficient sources: got {succeeded}, need {required}: {}",
        join_failures(.failures)
    )]
    InsufficientSources { succeeded: usize, required: usize, failures: Vec<Failure> },

    #[error("timed out waiting for sources: {}", join_failures(.failures))]
    OverallTimeout { failures: Vec<Failure> },

    /// A provider task panicked or was cancelled unexpectedly.
    #[error("provider task failed: {0}")]
    JoinBarrier(String),
}

impl AggregationError {
    /// Per-source failures carried by this error, if any.
    pub fn failures(&self) -> &[Failure] {
        match self {
            AggregationError::AllSourcesFailed { failures }
            | AggregationError::InsufficientSources { failures, .. }
            | AggregationError::OverallTimeout { failures } => failures,
            AggregationError::NoSources | AggregationError::JoinBarrier(_) => &[],
        }
    }

    /// Short machine-friendly label, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AggregationError::NoSources => "no_sources",
            AggregationError::AllSourcesFailed { .. } => "all_sources_failed",
            AggregationError::InsufficientSources { .. } => "insufficient_sources",
            AggregationError::OverallTimeout { .. } => "overall_timeout",
            AggregationError::JoinBarrier(_) => "join_barrier",
        }
    }
}

fn join_failures(failures: &[Failure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::FailureKind, provider::ProviderId};

    #[test]
    fn all_sources_failed_lists_every_failure() {
        let err = AggregationError::AllSourcesFailed {
            failures: vec![
                Failure::new(ProviderId::OpenWeather, FailureKind::Network, ""),
                Failure::timeout(ProviderId::WeatherApi),
            ],
        };

        let msg = err.to_string();
        assert!(msg.starts_with("all sources failed"));
        assert!(msg.contains("openweather: network error"));
        assert!(msg.contains("weatherapi: timeout"));
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn insufficient_sources_reports_counts() {
        let err = AggregationError::InsufficientSources {
            succeeded: 1,
            required: 2,
            failures: vec![Failure::timeout(ProviderId::Wunderground)],
        };

        assert!(err.to_string().contains("got 1, need 2"));
        assert_eq!(err.kind(), "insufficient_sources");
    }
}
