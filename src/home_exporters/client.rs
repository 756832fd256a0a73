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

use reqwest::{Response, StatusCode, Url};
use std::error;
use std::fmt;

/// User agent sent with every upstream API request made by the exporters.
pub const USER_AGENT: &str = "home_exporters Prometheus exporters";

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    Json(serde_json::Error),
    Unauthorized(Url),
    Unexpected(StatusCode, Url),
    TooManyRedirects(Url),
    Api(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::Json(e) => write!(f, "malformed API response: {}", e),
            Self::Unauthorized(url) => write!(f, "unauthorized for {}", url),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::TooManyRedirects(url) => write!(f, "too many redirects for {}", url),
            Self::Api(msg) => write!(f, "API error: {}", msg),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

/// Turn non-200 responses into errors, mapping authentication failures to
/// `ClientError::Unauthorized`.
pub(crate) fn check_status(res: Response) -> Result<Response, ClientError> {
    let status = res.status();
    if status == StatusCode::OK {
        Ok(res)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(ClientError::Unauthorized(res.url().clone()))
    } else {
        Err(ClientError::Unexpected(status, res.url().clone()))
    }
}
