//! Decides whether a partially failed fan-out still yields an answer.

use std::time::Duration;

use crate::{
    error::AggregationError,
    model::{Aggregate, City, Failure, Reading},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialFailurePolicy {
    quorum: usize,
}

impl Default for PartialFailurePolicy {
    fn default() -> Self {
        Self { quorum: 1 }
    }
}

impl PartialFailurePolicy {
    /// A quorum of zero is raised to one: the mean needs at least one reading.
    pub fn new(quorum: usize) -> Self {
        Self { quorum: quorum.max(1) }
    }

    /// Every provider must answer, like a sequential fail-fast loop.
    pub fn strict(provider_count: usize) -> Self {
        Self::new(provider_count)
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// `deadline_elapsed` is set when the overall deadline cut the fan-out short;
    /// only then is a missed quorum reported as [`AggregationError::OverallTimeout`].
    pub fn decide(
        &self,
        city: City,
        successes: Vec<Reading>,
        mut failures: Vec<Failure>,
        elapsed: Duration,
        deadline_elapsed: bool,
    ) -> Result<Aggregate, AggregationError> {
        failures.sort_by_key(|f| f.source.as_str());

        if successes.len() >= self.quorum {
            return Aggregate::from_readings(city, successes, failures, elapsed)
                .ok_or(AggregationError::NoSources);
        }

        if deadline_elapsed && failures.iter().any(Failure::is_timeout) {
            return Err(AggregationError::OverallTimeout { failures });
        }

        if successes.is_empty() {
            return Err(AggregationError::AllSourcesFailed { failures });
        }

        Err(AggregationError::InsufficientSources {
            succeeded: successes.len(),
            required: self.quorum,
            failures,
        })
    }
}
