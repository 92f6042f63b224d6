//! The HTTP server for metrics scraping & signed payload downloads.

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode};
use axum::{extract::Extension, routing::get, AddExtensionLayer, Router};
use futures::prelude::*;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::database::Database;
use crate::get_metrics_recorder;
use crate::signing;

const CONTENT_TYPE_PROM: &str = "text/plain; version=0.0.4";
const CONTENT_TYPE_PAYLOAD: &str = "application/octet-stream";

/// The query parameter naming the target object group of a download.
pub const PARAM_OBJECT_GROUP: &str = "object_group";
/// The query parameter naming the target revision number of a download.
pub const PARAM_REVISION: &str = "revision";

/// Shared state of the HTTP server's handlers.
#[derive(Clone)]
struct HttpState {
    config: Arc<Config>,
    catalog: CatalogStore,
}

/// Spawns the HTTP server, handling metrics scraping & signed payload downloads.
pub fn spawn_http_server(config: Arc<Config>, catalog: CatalogStore, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<Result<()>> {
    let metrics = get_metrics_recorder().handle();
    let state = HttpState { config: config.clone(), catalog };
    let app = Router::new()
        .route("/metrics", get(prometheus_scrape))
        .route("/download", get(download))
        .layer(AddExtensionLayer::new(metrics))
        .layer(AddExtensionLayer::new(state));
    let server = axum::Server::bind(&([0, 0, 0, 0], config.http_port).into())
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            let _res = shutdown.recv().await;
        });
    tracing::info!("HTTP server is listening at 0.0.0.0:{}", config.http_port);
    tokio::spawn(server.map_err(anyhow::Error::from))
}

/// Handle Prometheus metrics scraping.
async fn prometheus_scrape(Extension(state): Extension<PrometheusHandle>) -> (StatusCode, HeaderMap, String) {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("content-type"), HeaderValue::from_static(CONTENT_TYPE_PROM));
    (StatusCode::OK, headers, state.render())
}

/// Handle a signed download of an object group revision payload.
///
/// The URL's signature is verified before any parameter is interpreted; unverified
/// requests never touch storage.
async fn download(Extension(state): Extension<HttpState>, req: axum::http::Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("content-type"), HeaderValue::from_static(CONTENT_TYPE_PAYLOAD));

    // Reconstruct the full URL as it was signed.
    let host = req
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("localhost");
    let full_url = format!("http://{}{}", host, req.uri());
    match signing::verify_url(&state.config.url_signing_key, &full_url) {
        Ok(true) => (),
        Ok(false) => return (StatusCode::FORBIDDEN, headers, Vec::new()),
        Err(err) => {
            tracing::error!(error = ?err, "error verifying download URL signature");
            return (StatusCode::SERVICE_UNAVAILABLE, headers, Vec::new());
        }
    }

    // The signature checks out, so interpret the target parameters.
    let target = Url::parse(&full_url).ok().and_then(|url| {
        let mut group_id = None;
        let mut revision = None;
        for (key, val) in url.query_pairs() {
            match key.as_ref() {
                PARAM_OBJECT_GROUP => group_id = Uuid::parse_str(&val).ok(),
                PARAM_REVISION => revision = val.parse::<u64>().ok(),
                _ => continue,
            }
        }
        group_id.zip(revision)
    });
    let (group_id, revision) = match target {
        Some(target) => target,
        None => return (StatusCode::BAD_REQUEST, headers, Vec::new()),
    };

    let catalog = state.catalog.clone();
    let record = Database::spawn_blocking(move || catalog.get_revision(&group_id, revision)).await;
    match record {
        Ok(Ok(Some(record))) => (StatusCode::OK, headers, record.payload),
        Ok(Ok(None)) => (StatusCode::NOT_FOUND, headers, Vec::new()),
        Ok(Err(err)) => {
            tracing::error!(error = ?err, "error fetching revision record for download");
            (StatusCode::INTERNAL_SERVER_ERROR, headers, Vec::new())
        }
        Err(err) => {
            tracing::error!(error = ?err, "error fetching revision record for download");
            (StatusCode::INTERNAL_SERVER_ERROR, headers, Vec::new())
        }
    }
}
