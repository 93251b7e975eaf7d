// classify_worker/src/api/routes.rs
use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics::{counter, gauge, histogram};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::auth::{BearerAuth, CredentialVerifier};
use crate::classify::engine::ClassifyEngine;
use crate::classify::{default_labels, Classification, ClassifyError};
use crate::config::AppConfig;

// Application state shared across request handlers
pub struct AppState {
    pub engine: ClassifyEngine,
    pub verifier: CredentialVerifier,
    pub config: AppConfig,
    pub worker_id: String,
    pub start_time: SystemTime,
    pub stats: Arc<Mutex<ServiceStats>>,
}

// Statistics for the worker
pub struct ServiceStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub classify_times_ms: Vec<f64>,
    pub errors: u64,
    pub request_timeouts: u64,
    pub current_in_flight: u32,
    pub max_in_flight: u32,
}

impl ServiceStats {
    pub fn new() -> Self {
        ServiceStats {
            total_requests: 0,
            cache_hits: 0,
            cache_misses: 0,
            classify_times_ms: Vec::with_capacity(1000),
            errors: 0,
            request_timeouts: 0,
            current_in_flight: 0,
            max_in_flight: 0,
        }
    }

    pub fn avg_classify_time(&self) -> f64 {
        if self.classify_times_ms.is_empty() {
            return 0.0;
        }
        self.classify_times_ms.iter().sum::<f64>() / self.classify_times_ms.len() as f64
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let looked_up = self.cache_hits + self.cache_misses;
        if looked_up == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / looked_up as f64
    }

    // Keep the sample vector at a reasonable size
    fn trim_samples(&mut self) {
        const MAX_SAMPLES: usize = 1000;
        if self.classify_times_ms.len() > MAX_SAMPLES {
            self.classify_times_ms = self
                .classify_times_ms
                .split_off(self.classify_times_ms.len() - MAX_SAMPLES);
        }
    }

    pub fn record_hit(&mut self) {
        self.total_requests += 1;
        self.cache_hits += 1;
        counter!("worker.requests", 1);
        counter!("worker.cache_hits", 1);
    }

    pub fn record_miss(&mut self, classify_time_ms: f64) {
        self.total_requests += 1;
        self.cache_misses += 1;
        self.classify_times_ms.push(classify_time_ms);
        self.trim_samples();
        counter!("worker.requests", 1);
        counter!("worker.cache_misses", 1);
        histogram!("worker.classify_time_ms", classify_time_ms);
    }

    pub fn record_error(&mut self) {
        self.total_requests += 1;
        self.errors += 1;
        counter!("worker.requests", 1);
        counter!("worker.errors", 1);
    }

    pub fn record_timeout(&mut self) {
        self.total_requests += 1;
        self.request_timeouts += 1;
        counter!("worker.requests", 1);
        counter!("worker.timeouts", 1);
    }

    pub fn update_in_flight(&mut self, count: u32) {
        self.current_in_flight = count;
        if count > self.max_in_flight {
            self.max_in_flight = count;
        }
        gauge!("worker.in_flight_requests", count as f64);
    }
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}

// Error types for the API
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Timeout(String),
    Internal(String),
}

// Convert API errors to HTTP responses
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            ApiError::Timeout(message) => (StatusCode::REQUEST_TIMEOUT, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
            "code": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));

        // Client errors are expected traffic; only server-side failures are faults
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = error_message, "API error occurred");
        } else {
            tracing::warn!(status = status.as_u16(), error = error_message, "request rejected");
        }

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

// Create the API router
pub fn create_api_router(app_state: Arc<AppState>) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            BearerAuth::check_token,
        ));

    Router::new()
        .route("/v1/classify", get(classify))
        .route("/v1/health", get(health_check))
        .route("/v1/status", get(service_status))
        .layer(middleware_stack)
        .with_state(app_state)
}

// Parsed /v1/classify query parameters
struct ClassifyParams {
    message: String,
    labels: Vec<String>,
}

// The labels parameter repeats (`labels=a&labels=b`), which rules out the
// typed Query extractor; parse the raw query instead.
fn parse_classify_params(query: &str) -> Result<ClassifyParams, ApiError> {
    let mut message = None;
    let mut labels = Vec::new();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "message" => message = Some(value.into_owned()),
            "labels" => labels.push(value.into_owned()),
            _ => {}
        }
    }

    let message = message
        .ok_or_else(|| ApiError::BadRequest("missing required parameter: message".into()))?;
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }

    if labels.iter().any(|label| label.is_empty()) {
        return Err(ApiError::BadRequest("labels must not be empty strings".into()));
    }
    let mut seen = HashSet::new();
    for label in &labels {
        if !seen.insert(label.as_str()) {
            return Err(ApiError::BadRequest(format!("duplicate label: {:?}", label)));
        }
    }

    Ok(ClassifyParams { message, labels })
}

async fn classify(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<Classification>, ApiError> {
    let params = parse_classify_params(query.as_deref().unwrap_or(""))?;

    // No labels supplied means the fixed default set
    let labels = if params.labels.is_empty() {
        default_labels()
    } else {
        params.labels
    };

    {
        let mut stats = state.stats.lock().await;
        let count = stats.current_in_flight;
        stats.update_in_flight(count + 1);
    }

    let started = Instant::now();
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    let outcome = tokio::select! {
        outcome = state.engine.classify(&params.message, &labels) => outcome,
        _ = tokio::time::sleep(timeout) => {
            let mut stats = state.stats.lock().await;
            stats.record_timeout();
            let count = stats.current_in_flight;
            stats.update_in_flight(count - 1);
            return Err(ApiError::Timeout(format!(
                "classification timed out after {}s",
                state.config.request_timeout_secs
            )));
        }
    };

    let classify_time_ms = started.elapsed().as_secs_f64() * 1000.0;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            let mut stats = state.stats.lock().await;
            stats.record_error();
            let count = stats.current_in_flight;
            stats.update_in_flight(count - 1);

            return Err(match e {
                ClassifyError::InvalidInput(message) => ApiError::BadRequest(message),
                other => ApiError::Internal(format!("classification failed: {}", other)),
            });
        }
    };

    {
        let mut stats = state.stats.lock().await;
        if outcome.cache_hit {
            stats.record_hit();
        } else {
            stats.record_miss(classify_time_ms);
        }
        let count = stats.current_in_flight;
        stats.update_in_flight(count - 1);
    }

    Ok(Json(outcome.result))
}

// Health check endpoint, reachable without credentials
async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "worker_id": state.worker_id,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": SystemTime::now()
            .duration_since(state.start_time)
            .unwrap_or_default()
            .as_secs()
    }))
}

// Service statistics snapshot
async fn service_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.stats.lock().await;

    Json(json!({
        "worker_id": state.worker_id,
        "model_id": state.config.model_id,
        "uptime_seconds": SystemTime::now()
            .duration_since(state.start_time)
            .unwrap_or_default()
            .as_secs(),
        "total_requests": stats.total_requests,
        "cache": {
            "hits": stats.cache_hits,
            "misses": stats.cache_misses,
            "hit_rate": stats.cache_hit_rate(),
        },
        "avg_classify_time_ms": stats.avg_classify_time(),
        "errors": stats.errors,
        "timeouts": stats.request_timeouts,
        "in_flight": {
            "current": stats.current_in_flight,
            "max": stats.max_in_flight,
        }
    }))
}
