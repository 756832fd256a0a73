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
use home_exporters::hue::{HueClient, SensorMetrics};
use prometheus_client::registry::Registry;
use reqwest::Client;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9103);
const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_REFRESH_SECS: u64 = 60;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;

#[derive(Debug, Parser)]
#[clap(name = "hue_exporter", version = clap::crate_version!())]
struct HueApplication {
    /// Path to the JSON configuration file. Only the "hue" section is read.
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Fetch sensor state from the Hue bridge at this interval, in seconds.
    #[clap(long, default_value_t = DEFAULT_REFRESH_SECS)]
    refresh_secs: u64,

    /// Timeout for fetching sensor state from the Hue bridge, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to. By default, hue_exporter will bind to a public address
    /// since the purpose is to expose metrics to an external system (Prometheus or
    /// another agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = HueApplication::parse();
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

    let hue = config.hue.unwrap_or_else(|| {
        tracing::error!(message = "config is missing 'hue' section", path = %opts.config.display());
        process::exit(2)
    });

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    // Make an initial request to list sensors. The bridge reports a bad username
    // in-band as an API error, so this verifies the credentials before starting the
    // HTTP server and running indefinitely.
    let client = HueClient::new(http_client, &hue.ipaddress, &hue.username);
    match client.sensors().await {
        Err(ClientError::Api(description)) => {
            tracing::error!(message = "bridge rejected the configured username", error = %description);
            process::exit(1)
        }
        Err(e) => {
            tracing::warn!(message = "failed to fetch initial sensor state", error = %e);
        }
        Ok(sensors) => {
            tracing::debug!(message = "verified bridge access", sensors = sensors.len());
        }
    }

    let mut registry = Registry::default();
    let metrics = SensorMetrics::new(&mut registry);
    let ipaddress = hue.ipaddress.clone();
    let mut interval = tokio::time::interval(Duration::from_secs(opts.refresh_secs));

    tokio::spawn(async move {
        tracing::info!(message = "sensor polling started", ipaddress = %ipaddress);

        loop {
            let _ = interval.tick().await;
            match client
                .sensors()
                .instrument(tracing::span!(Level::DEBUG, "hue_sensors"))
                .await
            {
                Ok(sensors) => {
                    for (sensorid, sensor) in sensors.iter() {
                        metrics.observe(sensorid, sensor);
                    }

                    tracing::info!(message = "fetched sensor state", sensors = sensors.len());
                }
                Err(e) => {
                    tracing::error!(message = "failed to fetch sensor state", error = %e);
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
