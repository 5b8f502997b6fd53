mod analysis;
mod config;
mod http;
mod listing;
mod llm;
mod metrics;
mod models;
mod pipeline;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use config::AppConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{AnalyzeRequest, AnalyzeResponse, ApiError};
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use serde_json::json;
use std::{any::Any, net::SocketAddr, sync::Arc};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

const OPENAPI_YAML: &str = include_str!("../docs/openapi.yaml");

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "dealscope.api", "server crashed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    crate::metrics::describe();
    let state = AppState {
        pipeline: Pipeline::from_config(&config),
        openapi: Arc::new(load_openapi()),
        prometheus_handle,
    };

    let app = router(state, config.body_limit);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target = "dealscope.api", model = %config.llm.model, "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

fn router(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_origin(AnyOrigin);

    Router::new()
        .route("/api/analyze", post(analyze).fallback(method_not_allowed))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

fn load_openapi() -> serde_json::Value {
    serde_yaml::from_str(OPENAPI_YAML).unwrap_or_else(|_| json!({"openapi": "3.0.3"}))
}

/// Rate a marketplace listing.
///
/// - Method: `POST`
/// - Path: `/api/analyze`
/// - Body: `{ "url": "<listing url>" }`
/// - Response: `AnalyzeResponse`, or `{ "error": ... }` with 400/500
async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    crate::metrics::inc_requests("/api/analyze");
    let Json(request) = payload.map_err(|rejection| {
        info!(target = "dealscope.api", reason = %rejection.body_text(), "analyze_body_rejected");
        PipelineError::invalid_input("validate", "Invalid request body")
    })?;

    let url = pipeline::validate_url(request.url.as_deref())?;
    info!(target = "dealscope.api", %url, "analysis requested");

    let appraisal = state.pipeline.run(&url).await?;
    let total_ms: u128 = appraisal.stages.iter().map(|s| s.elapsed_ms).sum();
    info!(
        target = "dealscope.api",
        rating = appraisal.result.rating,
        stages = appraisal.stages.len(),
        total_ms = total_ms as u64,
        "analysis served"
    );
    Ok(Json(AnalyzeResponse::new(&appraisal.listing, appraisal.result)))
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        Json(ApiError {
            error: "Method not allowed".to_string(),
        }),
    )
        .into_response()
}

/// Health and readiness check.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "dealscope-api-rs",
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Ok(key) = std::env::var("OPENAPI_KEY")
        && !presented_key_matches(&headers, "X-Docs-Key", &key)
    {
        return Err(AppError::Unauthorized);
    }
    Ok(Json((*state.openapi).clone()))
}

async fn swagger_ui() -> Response {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Dealscope API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY")
        && !presented_key_matches(&headers, "X-Metrics-Key", &secret)
    {
        return AppError::Unauthorized.into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

fn presented_key_matches(headers: &HeaderMap, name: &str, expected: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|presented| presented == expected)
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
    Unauthorized,
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Pipeline(err) => {
                info!(target = "dealscope.api", stage = err.stage(), kind = ?err.kind(), "request_failed");
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::Fetch
                    | PipelineErrorKind::Extraction
                    | PipelineErrorKind::ModelConfig
                    | PipelineErrorKind::ModelCall
                    | PipelineErrorKind::NoAnalysis
                    | PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.detail().to_string())
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
        };
        (status, Json(ApiError { error: message })).into_response()
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unexpected error".to_string()
    };
    error!(target = "dealscope.api", %message, "handler_panicked");
    AppError::from(PipelineError::internal("handler", message)).into_response()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpConfig, LlmConfig};
    use crate::http::build_client;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state(server: &MockServer) -> AppState {
        state_with_metrics(server, PrometheusBuilder::new().build_recorder().handle())
    }

    fn state_with_metrics(server: &MockServer, prometheus_handle: PrometheusHandle) -> AppState {
        let mut llm = LlmConfig::new("test-key");
        llm.api_base = server.uri();
        AppState {
            pipeline: Pipeline::new(build_client(&HttpConfig::default()), llm),
            openapi: Arc::new(load_openapi()),
            prometheus_handle,
        }
    }

    async fn call(app: Router, method: Method, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    async fn silent_upstream() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn missing_url_is_rejected_without_network() {
        let server = silent_upstream().await;
        let (status, body) = call(router(state(&server), 16 * 1024), Method::POST, "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "URL is required" }));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let server = silent_upstream().await;
        let (status, body) = call(router(state(&server), 16 * 1024), Method::POST, "{url").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid request body" }));
    }

    #[tokio::test]
    async fn non_post_is_method_not_allowed() {
        let server = silent_upstream().await;
        let (status, body) = call(router(state(&server), 16 * 1024), Method::GET, "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({ "error": "Method not allowed" }));
    }

    #[tokio::test]
    async fn unreachable_listing_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let body = json!({ "url": format!("{}/items/404", server.uri()) }).to_string();
        let (status, body) = call(router(state(&server), 16 * 1024), Method::POST, &body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Failed to fetch listing" }));
    }

    #[tokio::test]
    async fn successful_analysis_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items/7"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<meta property="og:title" content="Wool Coat">
                   <script type="application/ld+json">{"offers":{"price":"45","priceCurrency":"EUR"}}</script>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [
                    { "text": "RATING: 4\nASSESSMENT: - Solid price for wool." }
                ] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let body = json!({ "url": format!("{}/items/7", server.uri()) }).to_string();
        let (status, body) = call(router(state(&server), 16 * 1024), Method::POST, &body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rating"], json!(4));
        assert_eq!(body["assessment"], json!("Solid price for wool."));
        assert_eq!(body["item"]["title"], json!("Wool Coat"));
        assert_eq!(body["item"]["price"], json!("€45"));
        assert_eq!(body["item"]["brand"], serde_json::Value::Null);
        assert_eq!(body["item"]["image"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn metrics_endpoint_reports_requests_and_stage_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = ::metrics::set_default_local_recorder(&recorder);
        let app = router(state_with_metrics(&server, handle), 16 * 1024);

        let body = json!({ "url": format!("{}/items/404", server.uri()) }).to_string();
        let (status, _) = call(app.clone(), Method::POST, &body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert!(text.contains(r#"dealscope_requests_total{route="/api/analyze"} 1"#), "{text}");
        assert!(text.contains(r#"dealscope_stage_failures_total{stage="fetch_listing"} 1"#), "{text}");
        assert!(!text.contains("dealscope_ratings_total"), "{text}");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let server = silent_upstream().await;
        let response = router(state(&server), 1024)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn openapi_document_parses() {
        let doc = load_openapi();
        assert!(doc["paths"]["/api/analyze"]["post"].is_object());
    }
}
