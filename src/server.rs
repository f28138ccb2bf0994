//! HTTP surface: `/health` and `/v1/predict`

use crate::error::ServiceError;
use crate::metrics::ServiceMetrics;
use crate::models::inference::InferenceEngine;
use crate::types::{ErrorResponse, HealthResponse, PredictRequest, PredictResponse};
use actix_web::http::StatusCode;
use actix_web::{get, post, web, HttpResponse, ResponseError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Shared state injected into every handler
pub struct AppState {
    pub engine: InferenceEngine,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    pub fn new(engine: InferenceEngine, metrics: Arc<ServiceMetrics>) -> Self {
        Self { engine, metrics }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_)
            | ServiceError::Load { .. }
            | ServiceError::ModelUnavailable
            | ServiceError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse::new(self.detail()))
    }
}

/// Register routes and the JSON extractor config on an app
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).service(health).service(predict);
}

/// Body parse failures become the standard 400 payload.
///
/// The parser's message can quote request values, so it is not logged.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|_err, _req| {
        ServiceError::InvalidInput("malformed request body".to_string()).into()
    })
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse::ok())
}

#[post("/v1/predict")]
async fn predict(
    state: web::Data<AppState>,
    payload: web::Json<PredictRequest>,
) -> Result<web::Json<PredictResponse>, ServiceError> {
    let request_id = Uuid::new_v4();
    let started = Instant::now();

    match state.engine.predict(&payload.features) {
        Ok(result) => {
            let latency = started.elapsed();
            state.metrics.record_prediction(latency, &result);

            debug!(
                request_id = %request_id,
                prediction = result.prediction,
                confidence = result.confidence,
                latency_us = latency.as_micros() as u64,
                "Prediction served"
            );

            Ok(web::Json(result.into()))
        }
        Err(e) => {
            state.metrics.record_failure(&e);

            match &e {
                ServiceError::Inference(_) => {
                    error!(request_id = %request_id, error = %e, "Inference failed")
                }
                _ => warn!(request_id = %request_id, kind = e.kind(), "Prediction rejected"),
            }

            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inference::tests::{transaction, StubFailing, StubLabel, StubProba};
    use crate::models::model::Model;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;

    fn state(model: Option<Arc<dyn Model>>) -> web::Data<AppState> {
        web::Data::new(AppState::new(
            InferenceEngine::new(model, "test-version"),
            Arc::new(ServiceMetrics::new()),
        ))
    }

    fn proba_state() -> web::Data<AppState> {
        state(Some(Arc::new(StubProba(vec![vec![0.1, 0.9]]))))
    }

    #[actix_web::test]
    async fn test_health_ok() {
        let app = test::init_service(App::new().app_data(proba_state()).configure(routes)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[actix_web::test]
    async fn test_health_ok_without_model() {
        let app = test::init_service(App::new().app_data(state(None)).configure(routes)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
    }

    #[actix_web::test]
    async fn test_predict_success() {
        let app_state = proba_state();
        let app =
            test::init_service(App::new().app_data(app_state.clone()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/v1/predict")
            .set_json(json!({"features": {"amount": 123.45, "merchant_id": 42}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({"prediction": 1, "confidence": 0.9, "model_version": "test-version"})
        );
        assert_eq!(app_state.metrics.predictions.load(Ordering::Relaxed), 1);
    }

    #[actix_web::test]
    async fn test_predict_label_only_model() {
        let app = test::init_service(
            App::new()
                .app_data(state(Some(Arc::new(StubLabel(2)))))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/v1/predict")
            .set_json(PredictRequest {
                features: transaction(),
            })
            .to_request();
        let body: PredictResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.prediction, 2);
        assert_eq!(body.confidence, 1.0);
        assert_eq!(body.model_version, "test-version");
    }

    #[actix_web::test]
    async fn test_model_not_loaded() {
        let app = test::init_service(App::new().app_data(state(None)).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/v1/predict")
            .set_json(json!({"features": {"amount": 123.45}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"detail": "Model not loaded"}));
    }

    #[actix_web::test]
    async fn test_invalid_features() {
        let app_state = proba_state();
        let app =
            test::init_service(App::new().app_data(app_state.clone()).configure(routes)).await;

        for payload in [
            json!({"features": {}}),
            json!({}),
            json!({"features": [1.0, 2.0]}),
            json!({"features": {"amount": "high"}}),
        ] {
            let req = test::TestRequest::post()
                .uri("/v1/predict")
                .set_json(payload)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body, json!({"detail": "Invalid feature payload"}));
        }

        // Only the empty mapping reaches the engine
        assert_eq!(app_state.metrics.invalid_input.load(Ordering::Relaxed), 1);
    }

    #[actix_web::test]
    async fn test_unparseable_body() {
        let app = test::init_service(App::new().app_data(proba_state()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/v1/predict")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_inference_failure_is_reported() {
        let app_state = state(Some(Arc::new(StubFailing)));
        let app =
            test::init_service(App::new().app_data(app_state.clone()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/v1/predict")
            .set_json(json!({"features": {"amount": 1.0}}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"detail": "Inference failed"}));
        assert_eq!(
            app_state.metrics.inference_failures.load(Ordering::Relaxed),
            1
        );
    }
}
