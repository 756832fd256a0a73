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

//! Prometheus metrics exporters for a handful of home device and weather APIs
//!
//! ## Features
//!
//! This crate builds three independent exporter binaries. Each one reads a section of a
//! shared JSON configuration file, polls one upstream API on an interval and serves the
//! resulting values as Prometheus metrics over HTTP.
//!
//! ### `openweather_exporter`
//!
//! Fetches current conditions for each configured location using the [OpenWeather One Call
//! API](https://openweathermap.org/api/one-call-api). Metrics are served on port `9102` and
//! all carry `location`, `lat` and `long` labels.
//!
//! * `owm_temperature` - Temperature, in kelvin.
//! * `owm_temperature_c` - Temperature, in degrees celsius.
//! * `owm_temperature_feels_like` - Perceived temperature, in kelvin.
//! * `owm_temperature_feels_like_c` - Perceived temperature, in degrees celsius.
//! * `owm_pressure` - Atmospheric pressure, in hectopascals.
//! * `owm_humidity` - Relative humidity (0-100).
//! * `owm_wind_speed` - Wind speed, in meters per second.
//! * `owm_wind_gust` - Wind gust, in meters per second. NaN when the API omits it.
//! * `owm_wind_degrees` - Wind direction, in degrees.
//!
//! ### `nest_exporter`
//!
//! Fetches every thermostat visible to the configured access token using the [Nest
//! API](https://developers.nest.com/). Metrics are served on port `9101` and all carry a
//! `thermostat_id` label.
//!
//! * `nest_last_connection` - Unix timestamp of the last contact with the Nest service.
//! * `nest_is_online` - Whether the device is connected (1) or not (0).
//! * `nest_ambient_temperature_c` - Temperature measured at the device, in half degrees celsius.
//! * `nest_ambient_temperature_f` - Temperature measured at the device, in whole degrees fahrenheit.
//! * `nest_humidity` - Humidity measured at the device, in percent.
//! * `nest_heating` - Whether the HVAC system is actively heating.
//! * `nest_cooling` - Whether the HVAC system is actively cooling.
//! * `nest_target_temperature_high_c` - Maximum target temperature, in half degrees celsius.
//! * `nest_target_temperature_low_c` - Minimum target temperature, in half degrees celsius.
//! * `nest_target_temperature_high_f` - Maximum target temperature, in whole degrees fahrenheit.
//! * `nest_target_temperature_low_f` - Minimum target temperature, in whole degrees fahrenheit.
//! * `nest_time_to_target` - Minutes until the target temperature is reached.
//!
//! ### `hue_exporter`
//!
//! Fetches every sensor paired with the configured Hue bridge and exports the temperature
//! sensors (`ZLLTemperature`). Metrics are served on port `9103`.
//!
//! * `hue_temperature_c{sensorid, uniqueid}` - Temperature, in degrees celsius. NaN while
//!   the sensor is unreachable.
//!
//! ## Configuration
//!
//! All three binaries read the same JSON file, `config.json` by default (override with
//! `--config`). Each exporter only requires its own section.
//!
//! ```json
//! {
//!     "openweather": {
//!         "appid": "d0f6...",
//!         "locations": {
//!             "home": {"lat": 52.52, "long": 13.41}
//!         }
//!     },
//!     "nest": {
//!         "access_token": {"access_token": "c.5ZX..."}
//!     },
//!     "hue": {
//!         "ipaddress": "192.168.1.2",
//!         "username": "bd61baf63df..."
//!     }
//! }
//! ```
//!
//! The `nest.access_token` object is the token response produced by the Nest authorization
//! flow, stored verbatim. An optional `nest.thermostats` list of device IDs restricts which
//! thermostats are exported.
//!
//! ## Build
//!
//! The exporters are Rust programs and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! Run the exporter for the API you care about, pointing it at your configuration file.
//!
//! ```text
//! ./openweather_exporter --config /etc/home_exporters/config.json
//! ```
//!
//! ## Prometheus
//!
//! Each exporter exposes metrics at `/metrics` on its own port (`9101` for Nest, `9102`
//! for OpenWeather, `9103` for Hue). Add the exporters you run as targets under the
//! Prometheus `scrape_configs` section as described by the example below.
//!
//! ```yaml
//! # Sample config for Prometheus.
//!
//! global:
//!   scrape_interval:     15s
//!   evaluation_interval: 15s
//!   external_labels:
//!     monitor: 'my_prom'
//!
//! scrape_configs:
//! - job_name: openweather_exporter
//!   static_configs:
//!   - targets: ['example:9102']
//! - job_name: nest_exporter
//!   static_configs:
//!   - targets: ['example:9101']
//! ```
//!

pub mod client;
pub mod config;
pub mod http;
pub mod hue;
pub mod nest;
pub mod openweather;
