//! Core library for the `weather` gateway.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Abstraction over weather providers and their HTTP adapters
//! - Concurrent fan-out with per-call and overall deadlines
//! - The partial-failure policy that turns readings into an aggregate
//!
//! It is used by `weather-gateway`, but can also be embedded in other binaries or services.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod model;
pub mod policy;
pub mod provider;

pub use aggregator::{AggregationSettings, Aggregator};
pub use config::{AggregationConfig, Config, LogFormat, LoggingConfig, ProviderConfig};
pub use error::{AggregationError, RequestError};
pub use model::{Aggregate, City, Failure, FailureKind, ProviderResult, Reading};
pub use policy::PartialFailurePolicy;
pub use provider::{ProviderId, WeatherProvider, provider_from_config, providers_from_config};
