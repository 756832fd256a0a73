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

use crate::client::{self, ClientError};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use reqwest::header::{ACCEPT, LOCATION, USER_AGENT};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;

pub const DEFAULT_API_URL: &str = "https://developer-api.nest.com/";

#[derive(Debug)]
pub struct NestClient {
    client: Client,
    base_url: Url,
    access_token: String,
}

impl NestClient {
    const JSON_RESPONSE: &'static str = "application/json";
    const MAX_REDIRECTS: usize = 10;

    /// Create a new client for the Nest API.
    ///
    /// The provided `client` must be built with redirect following disabled:
    /// the API redirects to a per-account host and the Authorization header
    /// has to survive the hop, which reqwest won't do across origins.
    pub fn new(client: Client, base_url: &str, access_token: &str) -> Self {
        NestClient {
            client,
            base_url: Url::parse(base_url).unwrap(),
            access_token: access_token.into(),
        }
    }

    /// Fetch all thermostats visible to the access token, keyed by device ID.
    pub async fn thermostats(&self) -> Result<BTreeMap<String, Thermostat>, ClientError> {
        let url = self.thermostats_url();
        tracing::debug!(message = "making thermostats request", url = %url);

        let res = self.make_request(url).await?;
        res.json::<BTreeMap<String, Thermostat>>()
            .await
            .map_err(ClientError::Internal)
    }

    async fn make_request(&self, url: Url) -> Result<Response, ClientError> {
        let mut url = url;

        for _ in 0..Self::MAX_REDIRECTS {
            let res = self
                .client
                .get(url.clone())
                .header(USER_AGENT, client::USER_AGENT)
                .header(ACCEPT, Self::JSON_RESPONSE)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(ClientError::Internal)?;

            if res.status().is_redirection() {
                url = redirect_target(&res, &url)?;
                continue;
            }

            return client::check_status(res);
        }

        Err(ClientError::TooManyRedirects(url))
    }

    fn thermostats_url(&self) -> Url {
        let mut url = self.base_url.clone();
        {
            url.path_segments_mut()
                .map(|mut p| {
                    p.clear().push("devices").push("thermostats");
                })
                .expect("unable to modify thermostats URL path segments");
        }

        url
    }
}

fn redirect_target(res: &Response, url: &Url) -> Result<Url, ClientError> {
    res.headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|loc| url.join(loc).ok())
        .ok_or_else(|| ClientError::Unexpected(res.status(), url.clone()))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Thermostat {
    #[serde(alias = "device_id")]
    pub device_id: String,
    #[serde(alias = "name")]
    pub name: Option<String>,
    #[serde(alias = "is_online")]
    pub is_online: Option<bool>,
    #[serde(alias = "last_connection")]
    pub last_connection: Option<String>,
    #[serde(alias = "humidity")]
    pub humidity: Option<f64>,
    #[serde(alias = "hvac_state")]
    pub hvac_state: Option<String>,
    #[serde(alias = "hvac_mode")]
    pub hvac_mode: Option<String>,
    #[serde(alias = "ambient_temperature_c")]
    pub ambient_temperature_c: Option<f64>,
    #[serde(alias = "ambient_temperature_f")]
    pub ambient_temperature_f: Option<f64>,
    #[serde(alias = "target_temperature_high_c")]
    pub target_temperature_high_c: Option<f64>,
    #[serde(alias = "target_temperature_low_c")]
    pub target_temperature_low_c: Option<f64>,
    #[serde(alias = "target_temperature_high_f")]
    pub target_temperature_high_f: Option<f64>,
    #[serde(alias = "target_temperature_low_f")]
    pub target_temperature_low_f: Option<f64>,
    #[serde(alias = "time_to_target")]
    pub time_to_target: Option<String>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ThermostatLabels {
    pub thermostat_id: String,
}

type ThermostatGauge = Family<ThermostatLabels, Gauge<f64, AtomicU64>>;

/// Holder for metrics that can be set from a `Thermostat` response.
///
/// All metrics are created and registered upon call to `ThermostatMetrics::new()`.
/// Metrics all share the prefix "nest_" and a "thermostat_id" label.
pub struct ThermostatMetrics {
    last_connection: ThermostatGauge,
    is_online: ThermostatGauge,
    ambient_temperature_c: ThermostatGauge,
    ambient_temperature_f: ThermostatGauge,
    humidity: ThermostatGauge,
    heating: ThermostatGauge,
    cooling: ThermostatGauge,
    target_temperature_high_c: ThermostatGauge,
    target_temperature_low_c: ThermostatGauge,
    target_temperature_high_f: ThermostatGauge,
    target_temperature_low_f: ThermostatGauge,
    time_to_target: ThermostatGauge,
}

impl ThermostatMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let reg = reg.sub_registry_with_prefix("nest");

        let last_connection = ThermostatGauge::default();
        reg.register(
            "last_connection",
            "Unix timestamp (seconds) of the last successful interaction with the Nest service",
            last_connection.clone(),
        );

        let is_online = ThermostatGauge::default();
        reg.register(
            "is_online",
            "Device connection status with the Nest Service (1 for online, 0 for offline)",
            is_online.clone(),
        );

        let ambient_temperature_c = ThermostatGauge::default();
        reg.register(
            "ambient_temperature_c",
            "Temperature, measured at the device, in half degrees Celsius (0.5°C)",
            ambient_temperature_c.clone(),
        );

        let ambient_temperature_f = ThermostatGauge::default();
        reg.register(
            "ambient_temperature_f",
            "Temperature, measured at the device, in whole degrees Fahrenheit (°F)",
            ambient_temperature_f.clone(),
        );

        let humidity = ThermostatGauge::default();
        reg.register(
            "humidity",
            "Humidity, in percent (%) format, measured at the device, rounded to the nearest 5%",
            humidity.clone(),
        );

        let heating = ThermostatGauge::default();
        reg.register(
            "heating",
            "Indicates whether HVAC system is actively heating",
            heating.clone(),
        );

        let cooling = ThermostatGauge::default();
        reg.register(
            "cooling",
            "Indicates whether HVAC system is actively cooling",
            cooling.clone(),
        );

        let target_temperature_high_c = ThermostatGauge::default();
        reg.register(
            "target_temperature_high_c",
            "Maximum target temperature, displayed in half degrees Celsius (0.5°C)",
            target_temperature_high_c.clone(),
        );

        let target_temperature_low_c = ThermostatGauge::default();
        reg.register(
            "target_temperature_low_c",
            "Minimum target temperature, displayed in half degrees Celsius (0.5°C)",
            target_temperature_low_c.clone(),
        );

        let target_temperature_high_f = ThermostatGauge::default();
        reg.register(
            "target_temperature_high_f",
            "Maximum target temperature, displayed in whole degrees Fahrenheit (°F)",
            target_temperature_high_f.clone(),
        );

        let target_temperature_low_f = ThermostatGauge::default();
        reg.register(
            "target_temperature_low_f",
            "Minimum target temperature, displayed in whole degrees Fahrenheit (°F)",
            target_temperature_low_f.clone(),
        );

        let time_to_target = ThermostatGauge::default();
        reg.register(
            "time_to_target",
            "The time, in minutes, that it will take for the structure to reach the target temperature",
            time_to_target.clone(),
        );

        Self {
            last_connection,
            is_online,
            ambient_temperature_c,
            ambient_temperature_f,
            humidity,
            heating,
            cooling,
            target_temperature_high_c,
            target_temperature_low_c,
            target_temperature_high_f,
            target_temperature_low_f,
            time_to_target,
        }
    }

    /// Set metrics from the provided thermostat if the relevant value exists.
    ///
    /// If the thermostat doesn't report a value for a particular metric, the
    /// metric will not be updated.
    pub fn observe(&self, thermostat: &Thermostat) {
        let labels = ThermostatLabels {
            thermostat_id: thermostat.device_id.clone(),
        };

        if let Some(ts) = thermostat.last_connection.as_deref().and_then(parse_timestamp) {
            self.last_connection.get_or_create(&labels).set(ts);
        }

        if let Some(online) = thermostat.is_online {
            self.is_online
                .get_or_create(&labels)
                .set(if online { 1.0 } else { 0.0 });
        }

        self.set_if_present(&self.ambient_temperature_c, &labels, thermostat.ambient_temperature_c);
        self.set_if_present(&self.ambient_temperature_f, &labels, thermostat.ambient_temperature_f);
        self.set_if_present(&self.humidity, &labels, thermostat.humidity);
        self.set_if_present(
            &self.target_temperature_high_c,
            &labels,
            thermostat.target_temperature_high_c,
        );
        self.set_if_present(
            &self.target_temperature_low_c,
            &labels,
            thermostat.target_temperature_low_c,
        );
        self.set_if_present(
            &self.target_temperature_high_f,
            &labels,
            thermostat.target_temperature_high_f,
        );
        self.set_if_present(
            &self.target_temperature_low_f,
            &labels,
            thermostat.target_temperature_low_f,
        );

        let hvac_state = thermostat.hvac_state.as_deref();
        self.heating
            .get_or_create(&labels)
            .set(if hvac_state == Some("heating") { 1.0 } else { 0.0 });
        self.cooling
            .get_or_create(&labels)
            .set(if hvac_state == Some("cooling") { 1.0 } else { 0.0 });

        if let Some(minutes) = thermostat.time_to_target.as_deref().and_then(parse_time_to_target) {
            self.time_to_target.get_or_create(&labels).set(minutes);
        }
    }

    fn set_if_present(&self, gauge: &ThermostatGauge, labels: &ThermostatLabels, value: Option<f64>) {
        if let Some(v) = value {
            gauge.get_or_create(labels).set(v);
        }
    }
}

/// Parse the RFC 3339 timestamps reported by the Nest API into unix seconds.
fn parse_timestamp(s: &str) -> Option<f64> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp() as f64)
}

/// Parse a `time_to_target` value such as "~0", "~15" or "<10" into minutes.
fn parse_time_to_target(s: &str) -> Option<f64> {
    s.trim_start_matches(|c: char| !c.is_ascii_digit()).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::{
        parse_time_to_target, parse_timestamp, NestClient, Thermostat, ThermostatMetrics, DEFAULT_API_URL,
    };
    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;
    use reqwest::Client;
    use std::collections::BTreeMap;

    const THERMOSTATS_RESPONSE: &str = r#"
    {
        "peyiJNo0IldT2YlIVtYaGQ": {
            "device_id": "peyiJNo0IldT2YlIVtYaGQ",
            "name": "Hallway (upstairs)",
            "is_online": true,
            "last_connection": "2016-10-31T23:59:59.000Z",
            "humidity": 42.5,
            "hvac_state": "heating",
            "hvac_mode": "heat",
            "ambient_temperature_c": 21.5,
            "ambient_temperature_f": 72,
            "target_temperature_c": 22.5,
            "target_temperature_f": 72,
            "target_temperature_high_c": 24.5,
            "target_temperature_low_c": 19.5,
            "target_temperature_high_f": 80,
            "target_temperature_low_f": 65,
            "time_to_target": "~15",
            "can_heat": true,
            "can_cool": false
        }
    }
    "#;

    #[test]
    fn test_thermostats_url() {
        let client = NestClient::new(Client::new(), DEFAULT_API_URL, "c.tok");
        assert_eq!("/devices/thermostats", client.thermostats_url().path());
    }

    #[test]
    fn test_parse_thermostats_response() {
        let thermostats: BTreeMap<String, Thermostat> = serde_json::from_str(THERMOSTATS_RESPONSE).unwrap();
        let thermostat = &thermostats["peyiJNo0IldT2YlIVtYaGQ"];

        assert_eq!("peyiJNo0IldT2YlIVtYaGQ", thermostat.device_id);
        assert_eq!(Some(true), thermostat.is_online);
        assert_eq!(Some(21.5), thermostat.ambient_temperature_c);
        assert_eq!(Some("heating"), thermostat.hvac_state.as_deref());
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(Some(1477958399.0), parse_timestamp("2016-10-31T23:59:59.000Z"));
        assert_eq!(None, parse_timestamp("eleven o'clock"));
    }

    #[test]
    fn test_parse_time_to_target() {
        assert_eq!(Some(0.0), parse_time_to_target("~0"));
        assert_eq!(Some(15.0), parse_time_to_target("~15"));
        assert_eq!(Some(10.0), parse_time_to_target("<10"));
        assert_eq!(None, parse_time_to_target("off"));
    }

    #[test]
    fn test_observe_sets_expected_lines() {
        let thermostats: BTreeMap<String, Thermostat> = serde_json::from_str(THERMOSTATS_RESPONSE).unwrap();

        let mut registry = Registry::default();
        let metrics = ThermostatMetrics::new(&mut registry);
        for thermostat in thermostats.values() {
            metrics.observe(thermostat);
        }

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(
            buf.contains(r#"nest_ambient_temperature_c{thermostat_id="peyiJNo0IldT2YlIVtYaGQ"} 21.5"#),
            "encoded metrics were: {}",
            buf
        );
        assert!(
            buf.contains(r#"nest_heating{thermostat_id="peyiJNo0IldT2YlIVtYaGQ"} 1.0"#),
            "encoded metrics were: {}",
            buf
        );
        assert!(
            buf.contains(r#"nest_cooling{thermostat_id="peyiJNo0IldT2YlIVtYaGQ"} 0.0"#),
            "encoded metrics were: {}",
            buf
        );
        assert!(
            buf.contains(r#"nest_last_connection{thermostat_id="peyiJNo0IldT2YlIVtYaGQ"} 1477958399.0"#),
            "encoded metrics were: {}",
            buf
        );
        assert!(
            buf.contains(r#"nest_time_to_target{thermostat_id="peyiJNo0IldT2YlIVtYaGQ"} 15.0"#),
            "encoded metrics were: {}",
            buf
        );
    }

    #[test]
    fn test_observe_skips_missing_values() {
        let thermostat = Thermostat {
            device_id: "abc123".to_owned(),
            name: None,
            is_online: None,
            last_connection: None,
            humidity: None,
            hvac_state: None,
            hvac_mode: None,
            ambient_temperature_c: None,
            ambient_temperature_f: None,
            target_temperature_high_c: None,
            target_temperature_low_c: None,
            target_temperature_high_f: None,
            target_temperature_low_f: None,
            time_to_target: None,
        };

        let mut registry = Registry::default();
        let metrics = ThermostatMetrics::new(&mut registry);
        metrics.observe(&thermostat);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(!buf.contains("nest_ambient_temperature_c{"), "encoded metrics were: {}", buf);
        assert!(!buf.contains("nest_last_connection{"), "encoded metrics were: {}", buf);
        // hvac_state is unknown, which is reported as neither heating nor cooling
        assert!(
            buf.contains(r#"nest_heating{thermostat_id="abc123"} 0.0"#),
            "encoded metrics were: {}",
            buf
        );
    }
}
