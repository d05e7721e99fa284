//! # Fan-out aggregation
//!
//! Queries every configured provider concurrently and averages whatever
//! arrives before the deadline. Each provider call runs on its own task,
//! bounded by `min(per-call timeout, overall deadline)`; the join barrier
//! stops waiting at the overall deadline, aborts whatever is still running and
//! records those providers as timeouts. The [`PartialFailurePolicy`] then
//! decides between an [`Aggregate`] and an [`AggregationError`].

use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinSet,
    time::{Instant, timeout_at},
};

use crate::{
    error::AggregationError,
    model::{Aggregate, City, Failure, ProviderResult},
    policy::PartialFailurePolicy,
    provider::{ProviderId, WeatherProvider},
};

/// Timeouts and quorum for one aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationSettings {
    pub per_call_timeout: Duration,
    pub overall_timeout: Duration,
    pub quorum: usize,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            per_call_timeout: Duration::from_millis(3000),
            overall_timeout: Duration::from_millis(5000),
            quorum: 1,
        }
    }
}

impl AggregationSettings {
    #[must_use]
    pub fn with_per_call_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum = quorum;
        self
    }
}

/// Owns the provider set; cheap to share behind an `Arc` across requests.
#[derive(Debug)]
pub struct Aggregator {
    providers: Vec<Arc<dyn WeatherProvider>>,
    settings: AggregationSettings,
}

impl Aggregator {
    pub fn new(providers: Vec<Arc<dyn WeatherProvider>>, settings: AggregationSettings) -> Self {
        Self { providers, settings }
    }

    pub fn settings(&self) -> &AggregationSettings {
        &self.settings
    }

    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Aggregate with the configured per-call and overall timeouts.
    pub async fn aggregate(&self, city: &City) -> Result<Aggregate, AggregationError> {
        self.aggregate_with(city, self.settings.per_call_timeout, self.settings.overall_timeout)
            .await
    }

    pub async fn aggregate_with(
        &self,
        city: &City,
        per_call_timeout: Duration,
        overall_timeout: Duration,
    ) -> Result<Aggregate, AggregationError> {
        let deadline = Instant::now() + overall_timeout;
        self.fan_out(city, per_call_timeout, deadline).await
    }

    /// Aggregate against an absolute deadline owned by the caller.
    pub async fn aggregate_until(
        &self,
        city: &City,
        deadline: Instant,
    ) -> Result<Aggregate, AggregationError> {
        self.fan_out(city, self.settings.per_call_timeout, deadline).await
    }

    async fn fan_out(
        &self,
        city: &City,
        per_call_timeout: Duration,
        deadline: Instant,
    ) -> Result<Aggregate, AggregationError> {
        let started = Instant::now();

        if self.providers.is_empty() {
            return Err(AggregationError::NoSources);
        }

        let mut tasks = JoinSet::new();
        // Indexed by position in `self.providers`; two adapters may share an id.
        let mut pending: Vec<Option<ProviderId>> = Vec::with_capacity(self.providers.len());

        for (index, provider) in self.providers.iter().enumerate() {
            let provider = Arc::clone(provider);
            let city = city.clone();
            let source = provider.id();
            let call_deadline = deadline.min(Instant::now() + per_call_timeout);

            pending.push(Some(source));
            tasks.spawn(async move {
                let result =
                    match timeout_at(call_deadline, provider.fetch_temperature(&city, call_deadline))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Failure::timeout(source).into(),
                    };
                (index, result)
            });
        }

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        let mut cut_short = false;

        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(None) => break,
                Ok(Some(Ok((index, result)))) => {
                    if let Some(slot) = pending.get_mut(index) {
                        *slot = None;
                    }
                    match result {
                        ProviderResult::Reading(reading) => successes.push(reading),
                        ProviderResult::Failure(failure) => {
                            tracing::debug!(%city, %failure, "provider failed");
                            failures.push(failure);
                        }
                    }
                }
                Ok(Some(Err(join_err))) => {
                    tasks.abort_all();
                    tracing::error!(%city, error = %join_err, "provider task did not complete");
                    return Err(AggregationError::JoinBarrier(join_err.to_string()));
                }
                Err(_) => {
                    // Dropping the aborted futures releases their connections.
                    tasks.abort_all();
                    cut_short = true;
                    break;
                }
            }
        }

        // Calls bounded by the overall deadline itself may report their own
        // timeout just before the barrier does.
        let deadline_elapsed = cut_short || Instant::now() >= deadline;
        failures.extend(pending.into_iter().flatten().map(Failure::timeout));

        let policy = PartialFailurePolicy::new(self.settings.quorum);
        policy.decide(city.clone(), successes, failures, started.elapsed(), deadline_elapsed)
    }
}
