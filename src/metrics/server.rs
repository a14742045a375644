//! HTTP exporter: Prometheus text on `/metrics`, JSON health and stats,
//! an authenticated reseed trigger and an authenticated noise intake.

use super::{MetricsRegistry, MetricsSnapshot};
use crate::error::{Error, ErrorKind};
use crate::health::HealthStatus;
use crate::service::EntropyService;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("invalid listen address {0:?}")]
    Address(String),

    #[error("server error: {0}")]
    Server(String),
}

#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 9090).into(),
        }
    }
}

impl MetricsServerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], port).into(),
        }
    }

    pub fn from_listen(listen: &str) -> Result<Self, ServerError> {
        let bind_addr = listen
            .parse()
            .map_err(|_| ServerError::Address(listen.to_string()))?;
        Ok(Self { bind_addr })
    }
}

struct AppState {
    service: Arc<EntropyService>,
    registry: MetricsRegistry,
}

pub struct MetricsServer {
    config: MetricsServerConfig,
    state: Arc<AppState>,
}

impl MetricsServer {
    pub fn new(config: MetricsServerConfig, service: Arc<EntropyService>, registry: MetricsRegistry) -> Self {
        Self {
            config,
            state: Arc::new(AppState { service, registry }),
        }
    }

    /// Runs the server until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/stats", get(stats_handler))
            .route("/reseed", post(reseed_handler))
            .route("/ingest", post(ingest_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(addr = %self.config.bind_addr, "Metrics server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = MetricsSnapshot::from_service(&state.service.stats(), &state.service.health());
    state.registry.update(&snapshot);

    match state.registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let report = state.service.health();
    let code = match report.status {
        HealthStatus::Fault => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };
    (code, Json(report)).into_response()
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.service.stats()).into_response()
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    state.service.authorize(key)
}

fn error_response(e: &Error) -> Response {
    let code = match e.kind() {
        ErrorKind::InvalidArgument | ErrorKind::InvalidRange | ErrorKind::InsufficientSeedMaterial => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, e.to_string()).into_response()
}

/// An empty body reseeds from the stream; otherwise the body is the
/// operator's seed material.
async fn reseed_handler(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let material = (!body.is_empty()).then(|| body.to_vec());
    // Reseeding may wait on the stream.
    let service = Arc::clone(&state.service);
    match tokio::task::spawn_blocking(move || service.force_reseed(material)).await {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Forced reseed failed");
            error_response(&e)
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn ingest_handler(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.service.ingest(&body) {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Ingest rejected");
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticSource;
    use crate::config::AleaConfig;
    use crate::queue::OverflowPolicy;
    use axum::http::HeaderValue;

    fn app_state(api_key: Option<&str>) -> Arc<AppState> {
        let mut config = AleaConfig::default();
        config.source.width = 32;
        config.source.height = 32;
        config.extraction.resize = 16;
        config.queue.capacity = 16;
        config.queue.policy = OverflowPolicy::DropOldest;
        config.reseed.boot_bytes = 64;
        config.reseed.boot_timeout_ms = 10_000;
        config.security.api_key = api_key.map(str::to_string);
        let source = SyntheticSource::new(32, 32, 5);
        let service = EntropyService::start_with_source(config, source).unwrap();
        Arc::new(AppState {
            service: Arc::new(service),
            registry: MetricsRegistry::new().unwrap(),
        })
    }

    fn keyed(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_str(key).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_reseed_uses_request_body_as_material() {
        let state = app_state(Some("k"));

        let response = reseed_handler(State(Arc::clone(&state)), keyed("k"), Bytes::from(vec![9u8; 32])).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.service.stats().drbg.reseed_count, 1);

        let response = reseed_handler(State(Arc::clone(&state)), keyed("k"), Bytes::from(vec![9u8; 8])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.service.stats().drbg.reseed_count, 1);

        let response = reseed_handler(State(Arc::clone(&state)), HeaderMap::new(), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = reseed_handler(State(Arc::clone(&state)), keyed("k"), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.service.stats().drbg.reseed_count, 2);
    }

    #[tokio::test]
    async fn test_ingest_requires_key_and_queues_blocks() {
        let state = app_state(Some("k"));
        let body = Bytes::from(vec![0x5au8; 128]);

        let response = ingest_handler(State(Arc::clone(&state)), keyed("wrong"), body.clone()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = ingest_handler(State(Arc::clone(&state)), keyed("k"), body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let oversized = Bytes::from(vec![0u8; (1 << 20) + 1]);
        let response = ingest_handler(State(Arc::clone(&state)), keyed("k"), oversized).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_config_default() {
        let config = MetricsServerConfig::default();
        assert_eq!(config.bind_addr.port(), 9090);
        assert!(config.bind_addr.ip().is_loopback());
    }

    #[test]
    fn test_config_with_port() {
        let config = MetricsServerConfig::with_port(8080);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn test_config_from_listen() {
        let config = MetricsServerConfig::from_listen("0.0.0.0:9191").unwrap();
        assert_eq!(config.bind_addr.port(), 9191);
        assert!(MetricsServerConfig::from_listen("not an address").is_err());
    }
}
