// home_exporters - Prometheus metrics exporters for Nest, OpenWeather and Philips Hue
//
// Copyright 2024 home_exporters contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::Parser;
use home_exporters::client::ClientError;
use home_exporters::config::Config;
use home_exporters::http::{self, RequestContext};
use home_exporters::nest::{NestClient, ThermostatMetrics, DEFAULT_API_URL};
use prometheus_client::registry::Registry;
use reqwest::redirect;
use reqwest::Client;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9101);
const DEFAULT_CONFIG_PATH: &str = "config.json";
// The Nest service rate limits data requests to roughly one per minute.
const DEFAULT_REFRESH_SECS: u64 = 60;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;

#[derive(Debug, Parser)]
#[clap(name = "nest_exporter", version = clap::crate_version!())]
struct NestApplication {
    /// Path to the JSON configuration file. Only the "nest" section is read.
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Base URL for the Nest API
    #[clap(long, default_value_t = DEFAULT_API_URL.into())]
    api_url: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Fetch thermostat state from the Nest API at this interval, in seconds.
    #[clap(long, default_value_t = DEFAULT_REFRESH_SECS)]
    refresh_secs: u64,

    /// Timeout for fetching thermostat state from the Nest API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to. By default, nest_exporter will bind to a public address
    /// since the purpose is to expose metrics to an external system (Prometheus or
    /// another agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = NestApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let config = Config::load(&opts.config).unwrap_or_else(|e| {
        tracing::error!(message = "unable to load configuration", path = %opts.config.display(), error = %e);
        process::exit(1)
    });

    let nest = config.nest.unwrap_or_else(|| {
        tracing::error!(message = "config is missing 'nest' section", path = %opts.config.display());
        process::exit(2)
    });

    // Redirects are followed by the Nest client itself so that the Authorization
    // header is preserved across the hop to the per-account API host.
    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder()
        .timeout(timeout)
        .redirect(redirect::Policy::none())
        .build()
        .unwrap_or_else(|e| {
            tracing::error!(message = "unable to initialize HTTP client", error = %e);
            process::exit(1)
        });

    // Make an initial request to list thermostats. This allows us to verify that the
    // access token is valid and the API is available before starting the HTTP server
    // and running indefinitely.
    let client = NestClient::new(http_client, &opts.api_url, &nest.access_token.access_token);
    match client.thermostats().await {
        Err(ClientError::Unauthorized(_)) => {
            tracing::error!(message = "invalid access token provided");
            process::exit(1)
        }
        Err(e) => {
            tracing::warn!(message = "failed to fetch initial thermostat state", error = %e);
        }
        Ok(thermostats) => {
            tracing::debug!(message = "verified API access", thermostats = thermostats.len());
        }
    }

    let mut registry = Registry::default();
    let metrics = ThermostatMetrics::new(&mut registry);
    let api_url = opts.api_url.clone();
    let allowed = nest.thermostats;
    let mut interval = tokio::time::interval(Duration::from_secs(opts.refresh_secs));

    tokio::spawn(async move {
        tracing::info!(message = "thermostat polling started", api_url = %api_url);

        loop {
            let _ = interval.tick().await;
            match client
                .thermostats()
                .instrument(tracing::span!(Level::DEBUG, "nest_thermostats"))
                .await
            {
                Ok(thermostats) => {
                    for (id, thermostat) in thermostats.iter() {
                        if !allowed.is_empty() && !allowed.contains(id) {
                            continue;
                        }

                        metrics.observe(thermostat);
                    }

                    tracing::info!(message = "fetched thermostat state", thermostats = thermostats.len());
                }
                Err(e) => {
                    tracing::error!(message = "failed to fetch thermostat state", error = %e);
                }
            }
        }
    });

    let context = Arc::new(RequestContext::new(registry));
    let server = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "server started", address = %opts.bind);
    server
        .serve(http::app(context).into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = http::sigterm() => {}
                _ = http::sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}
