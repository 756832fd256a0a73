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

use serde::Deserialize;
use std::collections::BTreeMap;
use std::error;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug)]
pub enum ConfigError {
    Read(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(e) => write!(f, "unable to read config file: {}", e),
            Self::Parse(e) => write!(f, "unable to parse config file: {}", e),
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Read(e) => Some(e),
            Self::Parse(e) => Some(e),
        }
    }
}

/// Shared configuration file for all exporters, one optional section per
/// upstream API. Loaded once at startup and immutable afterwards. Each
/// exporter only requires the section it reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub openweather: Option<OpenWeatherConfig>,
    pub nest: Option<NestConfig>,
    pub hue: Option<HueConfig>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(ConfigError::Read)?;
        serde_json::from_slice(&bytes).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenWeatherConfig {
    pub appid: String,
    pub locations: BTreeMap<String, Location>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub long: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NestConfig {
    /// Token response produced by the Nest authorization flow, stored verbatim.
    pub access_token: AccessToken,
    /// Device IDs to export. Empty means every thermostat the token can see.
    #[serde(default)]
    pub thermostats: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HueConfig {
    pub ipaddress: String,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError};

    const FULL_CONFIG: &str = r#"
    {
        "openweather": {
            "appid": "d0f6bd5d0f6bd5",
            "locations": {
                "home": {"lat": 52.52, "long": 13.41},
                "cabin": {"lat": 60.39, "long": 5.32}
            }
        },
        "nest": {
            "access_token": {
                "access_token": "c.5ZXdummy",
                "expires_in": 315360000
            },
            "thermostats": ["peyiJNo0IldT2YlIVtYaGQ"]
        },
        "hue": {
            "ipaddress": "192.168.1.2",
            "username": "bd61baf63df"
        }
    }
    "#;

    #[test]
    fn test_parse_full_config() {
        let config: Config = serde_json::from_str(FULL_CONFIG).unwrap();

        let owm = config.openweather.unwrap();
        assert_eq!("d0f6bd5d0f6bd5", owm.appid);
        assert_eq!(2, owm.locations.len());
        assert_eq!(52.52, owm.locations["home"].lat);
        assert_eq!(13.41, owm.locations["home"].long);

        let nest = config.nest.unwrap();
        assert_eq!("c.5ZXdummy", nest.access_token.access_token);
        assert_eq!(vec!["peyiJNo0IldT2YlIVtYaGQ".to_owned()], nest.thermostats);

        let hue = config.hue.unwrap();
        assert_eq!("192.168.1.2", hue.ipaddress);
        assert_eq!("bd61baf63df", hue.username);
    }

    #[test]
    fn test_parse_missing_sections() {
        let config: Config = serde_json::from_str(r#"{"hue": {"ipaddress": "192.168.1.2", "username": "u"}}"#).unwrap();

        assert!(config.openweather.is_none());
        assert!(config.nest.is_none());
        assert!(config.hue.is_some());
    }

    #[test]
    fn test_parse_missing_appid() {
        let res = serde_json::from_str::<Config>(r#"{"openweather": {"locations": {}}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_parse_default_thermostats() {
        let config: Config =
            serde_json::from_str(r#"{"nest": {"access_token": {"access_token": "c.tok"}}}"#).unwrap();
        assert!(config.nest.unwrap().thermostats.is_empty());
    }

    #[test]
    fn test_load_malformed_file() {
        let path = std::env::temp_dir().join("home_exporters_config_test.json");
        std::fs::write(&path, "{not json").unwrap();

        let res = Config::load(&path);
        assert!(matches!(res, Err(ConfigError::Parse(_))));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_file() {
        let res = Config::load("/nonexistent/config.json");
        assert!(matches!(res, Err(ConfigError::Read(_))));
    }
}
