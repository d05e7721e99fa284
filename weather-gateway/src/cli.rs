use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode};
use weather_core::{Aggregator, City, Config, ProviderId, providers_from_config};

use crate::{
    gateway::{Gateway, WeatherBody},
    logging,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Averages temperatures from several weather providers")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP gateway.
    Serve {
        /// Listen address, overrides `listen_addr` from the config.
        #[arg(long)]
        listen: Option<String>,
    },

    /// Query all providers once and print the averaged temperature.
    Show {
        city: String,

        /// Print the same JSON the gateway would return.
        #[arg(long)]
        json: bool,
    },

    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather", "weatherapi" or "wunderground".
        provider: String,
    },

    /// List supported providers and whether they are configured.
    Providers,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        match self.command {
            Command::Configure { provider } => {
                let id = ProviderId::try_from(provider.as_str())?;
                let api_key = Password::new(&format!("API key for {id}:"))
                    .with_display_mode(PasswordDisplayMode::Masked)
                    .without_confirmation()
                    .prompt()
                    .context("Failed to read API key")?;

                config.upsert_provider_api_key(id, api_key.trim().to_string());
                let path = match self.config {
                    Some(path) => path,
                    None => Config::config_file_path()?,
                };
                config.save_to(&path)?;
                println!("Saved API key for {id} to {}", path.display());
            }
            Command::Providers => {
                config.apply_env_overrides();
                let enabled = config.enabled_providers();
                for id in ProviderId::all() {
                    let status = if enabled.contains(id) {
                        "enabled"
                    } else if config.is_provider_configured(*id) {
                        "disabled"
                    } else {
                        "not configured"
                    };
                    println!("{:<14} {:<15} {}", id, status, config.provider_base_url(*id));
                }
            }
            Command::Show { city, json } => {
                config.apply_env_overrides();
                config.validate()?;
                logging::init(&config.logging);

                let city = City::new(&city)?;
                let aggregator = build_aggregator(&config)?;
                let agg = aggregator.aggregate(&city).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&WeatherBody::from(&agg))?);
                } else {
                    println!(
                        "{}: {:.1} °C (from {} of {} sources, {} ms)",
                        agg.city(),
                        agg.temperature_c(),
                        agg.sources_used(),
                        agg.sources_used() + agg.failures().len(),
                        agg.elapsed().as_millis()
                    );
                    for reading in agg.readings() {
                        println!("  {:<14} {:.1} °C", reading.source(), reading.temperature_c());
                    }
                    for failure in agg.failures() {
                        println!("  {:<14} {} {}", failure.source, failure.kind, failure.detail);
                    }
                }
            }
            Command::Serve { listen } => {
                config.apply_env_overrides();
                if let Some(listen) = listen {
                    config.listen_addr = listen;
                }
                config.validate()?;
                logging::init(&config.logging);

                let addr = config.listen_socket_addr()?;
                let aggregator = build_aggregator(&config)?;
                Gateway::new(aggregator).serve(addr).await?;
            }
        }

        Ok(())
    }
}

/// One HTTP client, and so one connection pool, shared by every provider.
fn build_aggregator(config: &Config) -> anyhow::Result<Arc<Aggregator>> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("weather-gateway/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_millis(config.aggregation.per_call_timeout_ms))
        .build()
        .context("Failed to build HTTP client")?;

    let providers = providers_from_config(config, http)?;
    Ok(Arc::new(Aggregator::new(providers, config.aggregation_settings())))
}
