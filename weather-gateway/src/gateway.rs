//! HTTP entry point: `GET /weather/{city}`.
//!
//! The gateway is the only place where aggregation outcomes become HTTP
//! responses. Each request gets its own fan-out; nothing is shared between
//! requests except the read-only [`Aggregator`].

use std::{net::SocketAddr, sync::Arc, time::Instant};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use thiserror::Error;
use weather_core::{Aggregate, AggregationError, Aggregator, City, Failure, RequestError};

#[derive(Debug, Serialize, PartialEq)]
pub struct WeatherBody {
    pub city: String,
    pub temp: f64,
    pub sources_used: usize,
    pub took_ms: u64,
}

impl From<&Aggregate> for WeatherBody {
    fn from(agg: &Aggregate) -> Self {
        Self {
            city: agg.city().to_string(),
            temp: agg.temperature_c(),
            sources_used: agg.sources_used(),
            took_ms: u64::try_from(agg.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    providers: Vec<&'static str>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    BadRequest(#[from] RequestError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Aggregation(AggregationError::OverallTimeout { .. }) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            GatewayError::Aggregation(AggregationError::JoinBarrier(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Aggregation(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Aggregation(err) => err.kind(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct Gateway {
    aggregator: Arc<Aggregator>,
}

impl Gateway {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/weather/{city}", get(weather))
            .route("/weather/", get(missing_city))
            .route("/weather", get(missing_city))
            .route("/health", get(health))
            .with_state(self)
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        tracing::info!(
            %addr,
            providers = ?self.aggregator.provider_ids(),
            quorum = self.aggregator.settings().quorum,
            "weather gateway listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;

        tracing::info!("weather gateway stopped");
        Ok(())
    }

    /// Resolve one city; the request deadline is the configured overall timeout.
    pub async fn lookup(&self, raw_city: &str) -> Result<Aggregate, GatewayError> {
        let city = City::new(raw_city)?;
        Ok(self.aggregator.aggregate(&city).await?)
    }
}

async fn weather(State(gateway): State<Gateway>, Path(raw_city): Path<String>) -> Response {
    let started = Instant::now();
    let result = gateway.lookup(&raw_city).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(agg) => {
            tracing::info!(
                city = %agg.city(),
                outcome = "ok",
                status = StatusCode::OK.as_u16(),
                elapsed_ms,
                temp_c = agg.temperature_c(),
                sources = %source_outcomes(&agg),
                "weather request"
            );
            (StatusCode::OK, Json(WeatherBody::from(&agg))).into_response()
        }
        Err(err) => {
            let failures: &[Failure] = match &err {
                GatewayError::Aggregation(agg_err) => agg_err.failures(),
                GatewayError::BadRequest(_) => &[],
            };
            tracing::warn!(
                city = %raw_city.trim(),
                outcome = err.outcome(),
                status = err.status().as_u16(),
                elapsed_ms,
                sources = %failure_outcomes(failures),
                error = %err,
                "weather request"
            );
            err.into_response()
        }
    }
}

async fn missing_city() -> Response {
    let err = GatewayError::from(RequestError::MissingCity);
    tracing::warn!(outcome = "bad_request", status = err.status().as_u16(), "weather request");
    err.into_response()
}

async fn health(State(gateway): State<Gateway>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        providers: gateway.aggregator.provider_ids().iter().map(|id| id.as_str()).collect(),
    })
}

/// `openweather=ok weatherapi=timeout`, in source order.
fn source_outcomes(agg: &Aggregate) -> String {
    let mut parts: Vec<(&str, String)> = agg
        .readings()
        .iter()
        .map(|r| (r.source().as_str(), "ok".to_string()))
        .chain(agg.failures().iter().map(|f| (f.source.as_str(), f.kind.to_string())))
        .collect();
    parts.sort();
    parts.iter().map(|(source, outcome)| format!("{source}={outcome}")).collect::<Vec<_>>().join(" ")
}

fn failure_outcomes(failures: &[Failure]) -> String {
    failures.iter().map(|f| format!("{}={}", f.source, f.kind)).collect::<Vec<_>>().join(" ")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
