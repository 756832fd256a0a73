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
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;

/// Sensor type reported by the bridge for ZigBee temperature sensors.
pub const ZLL_TEMPERATURE: &str = "ZLLTemperature";

// ZLLTemperature readings are fixed point with a scaling factor of 100.
const TEMPERATURE_SCALE: f64 = 100.0;

#[derive(Debug)]
pub struct HueClient {
    client: Client,
    base_url: Url,
    username: String,
}

impl HueClient {
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, ipaddress: &str, username: &str) -> Self {
        HueClient {
            client,
            base_url: Url::parse(&format!("http://{}/", ipaddress)).unwrap(),
            username: username.into(),
        }
    }

    /// Fetch all sensors paired with the bridge, keyed by sensor ID.
    ///
    /// The bridge reports failures in-band: a 200 response whose body is an
    /// array of error objects instead of the sensor map. Those are surfaced
    /// as `ClientError::Api`.
    pub async fn sensors(&self) -> Result<BTreeMap<String, Sensor>, ClientError> {
        let url = self.sensors_url();
        tracing::debug!(message = "making sensors request", url = %url);

        let res = self.make_request(url).await?;
        let body = res.json::<serde_json::Value>().await.map_err(ClientError::Internal)?;
        parse_sensors(body)
    }

    async fn make_request(&self, url: Url) -> Result<Response, ClientError> {
        let res = self
            .client
            .get(url)
            .header(USER_AGENT, client::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(ClientError::Internal)?;

        client::check_status(res)
    }

    fn sensors_url(&self) -> Url {
        let encoded_username = utf8_percent_encode(&self.username, NON_ALPHANUMERIC);
        let mut url = self.base_url.clone();
        {
            url.path_segments_mut()
                .map(|mut p| {
                    p.clear().push("api").push(&encoded_username.to_string()).push("sensors");
                })
                .expect("unable to modify sensors URL path segments");
        }

        url
    }
}

fn parse_sensors(body: serde_json::Value) -> Result<BTreeMap<String, Sensor>, ClientError> {
    if let Some(errors) = body.as_array() {
        let description = errors
            .iter()
            .filter_map(|e| e.pointer("/error/description"))
            .filter_map(|d| d.as_str())
            .next()
            .unwrap_or("unknown bridge error");

        return Err(ClientError::Api(description.to_owned()));
    }

    serde_json::from_value(body).map_err(ClientError::Json)
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Sensor {
    #[serde(alias = "type")]
    pub type_: String,
    #[serde(alias = "name")]
    pub name: Option<String>,
    #[serde(alias = "uniqueid")]
    pub uniqueid: Option<String>,
    #[serde(alias = "state", default)]
    pub state: SensorState,
    #[serde(alias = "config", default)]
    pub config: SensorConfig,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SensorState {
    #[serde(alias = "temperature")]
    pub temperature: Option<f64>,
    #[serde(alias = "lastupdated")]
    pub lastupdated: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SensorConfig {
    #[serde(alias = "on")]
    pub on: Option<bool>,
    #[serde(alias = "reachable")]
    pub reachable: Option<bool>,
    #[serde(alias = "battery")]
    pub battery: Option<f64>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SensorLabels {
    pub sensorid: String,
    pub uniqueid: String,
}

type SensorGauge = Family<SensorLabels, Gauge<f64, AtomicU64>>;

/// Holder for metrics that can be set from the bridge sensor list.
///
/// Only `ZLLTemperature` sensors are exported; the bridge lists plenty of
/// other types (daylight, switches) that carry no temperature.
pub struct SensorMetrics {
    temperature_c: SensorGauge,
}

impl SensorMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let reg = reg.sub_registry_with_prefix("hue");

        let temperature_c = SensorGauge::default();
        reg.register("temperature_c", "Temperature (°C)", temperature_c.clone());

        Self { temperature_c }
    }

    /// Set metrics from the provided sensor. Sensors of other types than
    /// `ZLLTemperature` are ignored.
    ///
    /// An unreachable sensor keeps its time series but reports NaN, so that
    /// dashboards show a gap instead of a frozen reading.
    pub fn observe(&self, sensorid: &str, sensor: &Sensor) {
        if sensor.type_ != ZLL_TEMPERATURE {
            return;
        }

        let labels = SensorLabels {
            sensorid: sensorid.into(),
            uniqueid: sensor.uniqueid.clone().unwrap_or_default(),
        };

        let reachable = sensor.config.reachable.unwrap_or(false);
        let temperature = match sensor.state.temperature {
            Some(t) if reachable => t / TEMPERATURE_SCALE,
            _ => f64::NAN,
        };

        self.temperature_c.get_or_create(&labels).set(temperature);
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_sensors, HueClient, Sensor, SensorMetrics};
    use crate::client::ClientError;
    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;
    use reqwest::Client;
    use std::collections::BTreeMap;

    const SENSORS_RESPONSE: &str = r#"
    {
        "1": {
            "state": {"daylight": true, "lastupdated": "2020-10-17T06:55:00"},
            "config": {"on": true, "configured": true},
            "name": "Daylight",
            "type": "Daylight",
            "modelid": "PHDL00",
            "manufacturername": "Philips"
        },
        "5": {
            "state": {"temperature": 2358, "lastupdated": "2020-10-17T07:15:13"},
            "config": {"on": true, "battery": 100, "reachable": true},
            "name": "Hue temperature sensor 1",
            "type": "ZLLTemperature",
            "modelid": "SML001",
            "manufacturername": "Philips",
            "uniqueid": "00:17:88:01:02:00:af:b5-02-0402"
        },
        "8": {
            "state": {"temperature": 1899, "lastupdated": "2020-10-12T11:30:27"},
            "config": {"on": true, "battery": 47, "reachable": false},
            "name": "Hue temperature sensor 2",
            "type": "ZLLTemperature",
            "modelid": "SML001",
            "manufacturername": "Philips",
            "uniqueid": "00:17:88:01:02:01:b2:11-02-0402"
        }
    }
    "#;

    #[test]
    fn test_sensors_url() {
        let client = HueClient::new(Client::new(), "192.168.1.2", "bd61baf63df");
        let url = client.sensors_url();

        assert_eq!("/api/bd61baf63df/sensors", url.path());
        assert_eq!(Some("192.168.1.2"), url.host_str());
    }

    #[test]
    fn test_parse_sensors_response() {
        let sensors: BTreeMap<String, Sensor> = serde_json::from_str(SENSORS_RESPONSE).unwrap();

        assert_eq!(3, sensors.len());
        assert_eq!("Daylight", sensors["1"].type_);
        assert_eq!(Some(2358.0), sensors["5"].state.temperature);
        assert_eq!(Some(false), sensors["8"].config.reachable);
    }

    #[test]
    fn test_observe_sets_expected_lines() {
        let sensors: BTreeMap<String, Sensor> = serde_json::from_str(SENSORS_RESPONSE).unwrap();

        let mut registry = Registry::default();
        let metrics = SensorMetrics::new(&mut registry);
        for (sensorid, sensor) in sensors.iter() {
            metrics.observe(sensorid, sensor);
        }

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(
            buf.contains(r#"hue_temperature_c{sensorid="5",uniqueid="00:17:88:01:02:00:af:b5-02-0402"} 23.58"#),
            "encoded metrics were: {}",
            buf
        );
        // Sensor 8 is unreachable, its reading is stale and exported as NaN
        assert!(
            buf.contains(r#"hue_temperature_c{sensorid="8",uniqueid="00:17:88:01:02:01:b2:11-02-0402"} NaN"#),
            "encoded metrics were: {}",
            buf
        );
        // The daylight sensor carries no temperature at all
        assert!(!buf.contains(r#"sensorid="1""#), "encoded metrics were: {}", buf);
    }

    #[test]
    fn test_parse_sensors_error_array() {
        let body: serde_json::Value = serde_json::from_str(
            r#"[{"error": {"type": 1, "address": "/", "description": "unauthorized user"}}]"#,
        )
        .unwrap();

        match parse_sensors(body) {
            Err(ClientError::Api(description)) => assert_eq!("unauthorized user", description),
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_sensors_map() {
        let body: serde_json::Value = serde_json::from_str(SENSORS_RESPONSE).unwrap();
        let sensors = parse_sensors(body).unwrap();
        assert_eq!(3, sensors.len());
    }
}
