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

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::io;
use std::sync::Arc;
use tokio::signal::unix::{self, SignalKind};
use tower_http::trace::TraceLayer;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// State shared with every request handler, holding the registry that poll
/// loops write their samples into.
pub struct RequestContext {
    registry: Registry,
}

impl RequestContext {
    pub fn new(registry: Registry) -> Self {
        RequestContext { registry }
    }
}

/// Build the exporter HTTP application: an index page at `/` and the metrics
/// endpoint at `/metrics`.
pub fn app(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(text_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn index() -> Html<&'static str> {
    Html(r#"<a href="/metrics">Metrics</a>"#)
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(()) => {
            tracing::debug!(
                message = "encoded prometheus metrics to text format",
                num_bytes = buf.len(),
            );

            ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Return after the first SIGTERM signal received by this process
pub async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
pub async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{app, RequestContext};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use prometheus_client::metrics::gauge::Gauge;
    use prometheus_client::registry::Registry;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_context() -> Arc<RequestContext> {
        let mut registry = Registry::default();
        let gauge: Gauge<f64, AtomicU64> = Gauge::default();
        gauge.set(23.5);
        registry.register("test_temperature", "Temperature for tests", gauge);

        Arc::new(RequestContext::new(registry))
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let res = app(test_context())
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(StatusCode::OK, res.status());
        assert_eq!(
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
            res.headers()[axum::http::header::CONTENT_TYPE],
        );

        let body = hyper::body::to_bytes(res.into_body()).await.unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("test_temperature 23.5"), "body was: {}", text);
    }

    #[tokio::test]
    async fn test_index_route() {
        let res = app(test_context())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(StatusCode::OK, res.status());

        let body = hyper::body::to_bytes(res.into_body()).await.unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains(r#"href="/metrics""#), "body was: {}", text);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let res = app(test_context())
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(StatusCode::NOT_FOUND, res.status());
    }
}
