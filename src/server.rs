//! HTTP transport for the classification pipeline

use crate::config::Device;
use crate::error::EnsembleError;
use crate::metrics::{MetricsSnapshot, ServiceMetrics};
use crate::models::{InferenceEngine, ModelRegistry};
use crate::types::ClassificationReport;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};

/// Shared, read-only request context
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub engine: InferenceEngine,
    pub metrics: Arc<ServiceMetrics>,
    pub device: Device,
    pub request_timeout: Duration,
}

pub type SharedState = Arc<AppState>;

/// Build the service router.
pub fn router(state: SharedState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/predict", post(predict))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error body with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            "timeout",
            format!("classification did not finish within {} ms", after.as_millis()),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<EnsembleError> for ApiError {
    fn from(err: EnsembleError) -> Self {
        let status = match &err {
            EnsembleError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            EnsembleError::NoModelsAvailable => StatusCode::SERVICE_UNAVAILABLE,
            EnsembleError::InferenceFailed { .. }
            | EnsembleError::UnknownClass(_)
            | EnsembleError::ModelLoadFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new(err.status(), "invalid_upload", err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    models_loaded: Vec<String>,
    device: Device,
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let status = if state.registry.is_usable() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        models_loaded: state.registry.model_names().into_iter().map(String::from).collect(),
        device: state.device,
    })
}

async fn metrics(State(state): State<SharedState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn predict(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<ClassificationReport>, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = info_span!("predict", request_id = %request_id);

    async move {
        let result = classify_upload(&state, multipart, &request_id).await;
        if let Err(e) = &result {
            state.metrics.record_failure(e.error);
            warn!(status = %e.status, error = e.error, message = %e.message, "Request failed");
        }
        result.map(Json)
    }
    .instrument(span)
    .await
}

async fn classify_upload(
    state: &AppState,
    mut multipart: Multipart,
    request_id: &str,
) -> Result<ClassificationReport, ApiError> {
    state.registry.ensure_usable()?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(ApiError::bad_request("File must be an image"));
        }

        upload = Some(field.bytes().await?);
        break;
    }
    let bytes = upload.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;

    let started = Instant::now();
    let registry = state.registry.clone();
    let engine = state.engine.clone();
    let task = tokio::task::spawn_blocking(move || engine.run_ensemble(&bytes, &registry));

    let result = match tokio::time::timeout(state.request_timeout, task).await {
        Err(_) => return Err(ApiError::timeout(state.request_timeout)),
        Ok(Err(join_error)) => return Err(ApiError::internal(join_error.to_string())),
        Ok(Ok(outcome)) => outcome?,
    };
    let processing_time = started.elapsed();

    let report = result.to_report()?.with_request_id(request_id);
    state.metrics.record_classification(processing_time, &result);

    info!(
        class = %report.prediction.class_name,
        risk = ?report.prediction.risk,
        agreement = report.prediction.agreement,
        models = result.contributing_models(),
        failed = result.failed_models.len(),
        processing_time_us = processing_time.as_micros() as u64,
        "Image classified"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::{Broken, FixedLogits, Slow};
    use crate::models::LoadedModel;
    use crate::preprocess::tests::solid_png;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "lesion-test-boundary";

    fn app(models: Vec<LoadedModel>) -> (Router, Arc<ServiceMetrics>) {
        app_with(models, Duration::from_secs(10), 5 * 1024 * 1024)
    }

    fn app_with(
        models: Vec<LoadedModel>,
        request_timeout: Duration,
        max_upload_bytes: usize,
    ) -> (Router, Arc<ServiceMetrics>) {
        let metrics = Arc::new(ServiceMetrics::new());
        let state = Arc::new(AppState {
            registry: Arc::new(ModelRegistry::new(models)),
            engine: InferenceEngine::default(),
            metrics: metrics.clone(),
            device: Device::Cpu,
            request_timeout,
        });
        (router(state, max_upload_bytes), metrics)
    }

    fn upload(content_type: &str, payload: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"lesion.png\"\r\n",
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn fake(name: &str, class_id: usize) -> LoadedModel {
        LoadedModel::new(name, Device::Cpu, FixedLogits::favoring(class_id))
    }

    #[tokio::test]
    async fn test_health_lists_models() {
        let (app, _) = app(vec![fake("mobilenetv3", 0), fake("resnet50", 0)]);

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["models_loaded"][1], "resnet50");
        assert_eq!(body["device"], "cpu");
    }

    #[tokio::test]
    async fn test_health_degraded_without_models() {
        let (app, _) = app(vec![]);
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json(response).await["status"], "degraded");
    }

    #[tokio::test]
    async fn test_predict_returns_report() {
        let (app, metrics) = app(vec![
            fake("mobilenetv3", 4),
            fake("densenet121", 4),
            fake("resnet50", 5),
        ]);

        let response = app
            .oneshot(upload("image/png", &solid_png(40, 40, [120, 80, 60])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["prediction"]["class_id"], 4);
        assert_eq!(body["prediction"]["class_name"], "mel");
        assert_eq!(body["prediction"]["risk"], "Very High");
        assert_eq!(body["model_predictions"]["resnet50"]["class_name"], "nv");
        assert_eq!(body["class_probabilities"].as_object().unwrap().len(), 7);
        let agreement = body["prediction"]["agreement"].as_f64().unwrap();
        assert!((agreement - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.snapshot().requests_classified, 1);
    }

    #[tokio::test]
    async fn test_predict_without_models_is_unavailable() {
        let (app, metrics) = app(vec![]);

        let response = app
            .oneshot(upload("image/png", &solid_png(8, 8, [0, 0, 0])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(response).await["error"], "no_models_available");
        assert_eq!(metrics.snapshot().failures_by_kind["no_models_available"], 1);
    }

    #[tokio::test]
    async fn test_predict_rejects_corrupt_image() {
        let (app, _) = app(vec![fake("resnet50", 0)]);

        let response = app
            .oneshot(upload("image/jpeg", b"\xff\xd8\xff not really a jpeg"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "invalid_image");
    }

    #[tokio::test]
    async fn test_predict_rejects_non_image_content_type() {
        let (app, _) = app(vec![fake("resnet50", 0)]);

        let response = app
            .oneshot(upload("text/plain", b"hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["message"], "File must be an image");
    }

    #[tokio::test]
    async fn test_predict_reports_failed_models() {
        let (app, _) = app(vec![
            LoadedModel::new("densenet121", Device::Cpu, Broken("bad graph")),
            fake("resnet50", 3),
        ]);

        let response = app
            .oneshot(upload("image/png", &solid_png(16, 16, [10, 200, 30])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["prediction"]["class_name"], "df");
        assert!(body["failed_models"]["densenet121"]
            .as_str()
            .unwrap()
            .contains("bad graph"));
    }

    #[tokio::test]
    async fn test_predict_times_out() {
        let (app, metrics) = app_with(
            vec![LoadedModel::new("resnet50", Device::Cpu, Slow(Duration::from_millis(500)))],
            Duration::from_millis(20),
            5 * 1024 * 1024,
        );

        let response = app
            .oneshot(upload("image/png", &solid_png(16, 16, [40, 40, 40])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json(response).await["error"], "timeout");
        assert_eq!(metrics.snapshot().failures_by_kind["timeout"], 1);
    }

    #[tokio::test]
    async fn test_predict_rejects_oversized_upload() {
        let (app, _) = app_with(vec![fake("resnet50", 0)], Duration::from_secs(10), 64);
        let payload = solid_png(64, 64, [1, 2, 3]);

        let response = app.oneshot(upload("image/png", &payload)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json(response).await["error"], "invalid_upload");
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (EnsembleError::InvalidImage("x".into()), StatusCode::BAD_REQUEST),
            (EnsembleError::NoModelsAvailable, StatusCode::SERVICE_UNAVAILABLE),
            (
                EnsembleError::InferenceFailed {
                    model: "m".into(),
                    reason: "r".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (EnsembleError::UnknownClass("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
