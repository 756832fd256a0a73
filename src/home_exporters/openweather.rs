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
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicU64;

pub const DEFAULT_API_URL: &str = "https://api.openweathermap.org/";

const KELVIN_CELSIUS_OFFSET: f64 = -273.15;

#[derive(Debug)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: Url,
    appid: String,
}

impl OpenWeatherClient {
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, base_url: &str, appid: &str) -> Self {
        OpenWeatherClient {
            client,
            base_url: Url::parse(base_url).unwrap(),
            appid: appid.into(),
        }
    }

    /// Fetch current conditions for a set of coordinates from the One Call API.
    pub async fn one_call(&self, lat: f64, long: f64) -> Result<OneCall, ClientError> {
        // The request URL carries the API key as a query parameter, log coordinates only.
        tracing::debug!(message = "making one call request", lat, long);

        let res = self.make_request(self.one_call_url(lat, long)).await?;
        res.json::<OneCall>().await.map_err(ClientError::Internal)
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

    fn one_call_url(&self, lat: f64, long: f64) -> Url {
        let mut url = self.base_url.clone();
        {
            url.path_segments_mut()
                .map(|mut p| {
                    p.clear().push("data").push("2.5").push("onecall");
                })
                .expect("unable to modify one call URL path segments");
        }

        url.query_pairs_mut()
            .append_pair("lat", &lat.to_string())
            .append_pair("lon", &long.to_string())
            .append_pair("appid", &self.appid);

        url
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct OneCall {
    #[serde(alias = "lat")]
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lon: f64,
    #[serde(alias = "timezone")]
    pub timezone: Option<String>,
    #[serde(alias = "current")]
    pub current: CurrentConditions,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CurrentConditions {
    #[serde(alias = "dt")]
    pub dt: Option<i64>,
    #[serde(alias = "temp")]
    pub temp: f64,
    #[serde(alias = "feels_like")]
    pub feels_like: f64,
    #[serde(alias = "pressure")]
    pub pressure: f64,
    #[serde(alias = "humidity")]
    pub humidity: f64,
    #[serde(alias = "wind_speed")]
    pub wind_speed: f64,
    #[serde(alias = "wind_gust")]
    pub wind_gust: Option<f64>,
    #[serde(alias = "wind_deg")]
    pub wind_deg: f64,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LocationLabels {
    pub location: String,
    pub lat: String,
    pub long: String,
}

impl LocationLabels {
    fn new(location: &str, onecall: &OneCall) -> Self {
        LocationLabels {
            location: location.into(),
            lat: onecall.lat.to_string(),
            long: onecall.lon.to_string(),
        }
    }
}

type LocationGauge = Family<LocationLabels, Gauge<f64, AtomicU64>>;

/// Holder for metrics that can be set from a `OneCall` response.
///
/// All metrics are created and registered upon call to `WeatherMetrics::new()`. Metrics
/// all share the prefix "owm_" and are labelled with the configured location name and the
/// coordinates echoed by the API.
pub struct WeatherMetrics {
    temperature: LocationGauge,
    temperature_c: LocationGauge,
    temperature_feels_like: LocationGauge,
    temperature_feels_like_c: LocationGauge,
    pressure: LocationGauge,
    humidity: LocationGauge,
    wind_speed: LocationGauge,
    wind_gust: LocationGauge,
    wind_degrees: LocationGauge,
}

impl WeatherMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let reg = reg.sub_registry_with_prefix("owm");

        let temperature = LocationGauge::default();
        reg.register("temperature", "Temperature (K)", temperature.clone());

        let temperature_c = LocationGauge::default();
        reg.register("temperature_c", "Temperature (°C)", temperature_c.clone());

        let temperature_feels_like = LocationGauge::default();
        reg.register(
            "temperature_feels_like",
            "Temperature accounting for human perception of weather (K)",
            temperature_feels_like.clone(),
        );

        let temperature_feels_like_c = LocationGauge::default();
        reg.register(
            "temperature_feels_like_c",
            "Temperature accounting for human perception of weather (°C)",
            temperature_feels_like_c.clone(),
        );

        let pressure = LocationGauge::default();
        reg.register("pressure", "Atmospheric pressure (hPa)", pressure.clone());

        let humidity = LocationGauge::default();
        reg.register("humidity", "Humidity (%)", humidity.clone());

        let wind_speed = LocationGauge::default();
        reg.register("wind_speed", "Wind speed (m/s)", wind_speed.clone());

        let wind_gust = LocationGauge::default();
        reg.register("wind_gust", "Wind gust (m/s)", wind_gust.clone());

        let wind_degrees = LocationGauge::default();
        reg.register("wind_degrees", "Wind direction (degrees)", wind_degrees.clone());

        Self {
            temperature,
            temperature_c,
            temperature_feels_like,
            temperature_feels_like_c,
            pressure,
            humidity,
            wind_speed,
            wind_gust,
            wind_degrees,
        }
    }

    /// Set metrics for a named location from the provided One Call response.
    pub fn observe(&self, location: &str, onecall: &OneCall) {
        let labels = LocationLabels::new(location, onecall);
        let current = &onecall.current;

        self.temperature.get_or_create(&labels).set(current.temp);
        self.temperature_c
            .get_or_create(&labels)
            .set(current.temp + KELVIN_CELSIUS_OFFSET);
        self.temperature_feels_like.get_or_create(&labels).set(current.feels_like);
        self.temperature_feels_like_c
            .get_or_create(&labels)
            .set(current.feels_like + KELVIN_CELSIUS_OFFSET);
        self.pressure.get_or_create(&labels).set(current.pressure);
        self.humidity.get_or_create(&labels).set(current.humidity);
        self.wind_speed.get_or_create(&labels).set(current.wind_speed);
        self.wind_gust
            .get_or_create(&labels)
            .set(current.wind_gust.unwrap_or(f64::NAN));
        self.wind_degrees.get_or_create(&labels).set(current.wind_deg);
    }
}

#[cfg(test)]
mod tests {
    use super::{OneCall, OpenWeatherClient, WeatherMetrics, DEFAULT_API_URL};
    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;
    use reqwest::Client;

    const ONE_CALL_RESPONSE: &str = r#"
    {
        "lat": 52.52,
        "lon": 13.41,
        "timezone": "Europe/Berlin",
        "timezone_offset": 3600,
        "current": {
            "dt": 1601102400,
            "sunrise": 1601096513,
            "sunset": 1601139615,
            "temp": 285.5,
            "feels_like": 283.25,
            "pressure": 1017,
            "humidity": 85,
            "dew_point": 283.0,
            "uvi": 1.5,
            "clouds": 75,
            "visibility": 10000,
            "wind_speed": 4.5,
            "wind_deg": 250,
            "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d"}]
        }
    }
    "#;

    #[test]
    fn test_one_call_url() {
        let client = OpenWeatherClient::new(Client::new(), DEFAULT_API_URL, "d0f6bd5");
        let url = client.one_call_url(52.52, 13.41);

        assert_eq!("/data/2.5/onecall", url.path());
        assert_eq!(Some("lat=52.52&lon=13.41&appid=d0f6bd5"), url.query());
    }

    #[test]
    fn test_parse_one_call_response() {
        let onecall: OneCall = serde_json::from_str(ONE_CALL_RESPONSE).unwrap();

        assert_eq!(52.52, onecall.lat);
        assert_eq!(13.41, onecall.lon);
        assert_eq!(285.5, onecall.current.temp);
        assert_eq!(None, onecall.current.wind_gust);
    }

    #[test]
    fn test_observe_sets_expected_lines() {
        let onecall: OneCall = serde_json::from_str(ONE_CALL_RESPONSE).unwrap();

        let mut registry = Registry::default();
        let metrics = WeatherMetrics::new(&mut registry);
        metrics.observe("home", &onecall);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(
            buf.contains(r#"owm_temperature{location="home",lat="52.52",long="13.41"} 285.5"#),
            "encoded metrics were: {}",
            buf
        );
        assert!(
            buf.contains(r#"owm_temperature_c{location="home",lat="52.52",long="13.41"} 12.35"#),
            "encoded metrics were: {}",
            buf
        );
        assert!(
            buf.contains(r#"owm_wind_speed{location="home",lat="52.52",long="13.41"} 4.5"#),
            "encoded metrics were: {}",
            buf
        );
        // No gust in the response, exported as NaN like the other exporters do
        // for unavailable values.
        assert!(
            buf.contains(r#"owm_wind_gust{location="home",lat="52.52",long="13.41"} NaN"#),
            "encoded metrics were: {}",
            buf
        );
    }
}
