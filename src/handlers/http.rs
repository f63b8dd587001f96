use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use uuid::Uuid;

use crate::analysis::orchestrator::AnalysisError;
use crate::analysis::types::RawAnalysisInput;
use crate::config::MAX_STATS_TOP_LIMIT;
use crate::state::AppState;
use crate::utils::timing::{complete_request_timer, start_request_timer};

pub const ROOT_GREETING: &str = "Ouch! You've hit my roots!";

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopQuery {
    limit: Option<i64>,
}

fn error_response(status: StatusCode, error: impl Into<String>, raw: Option<String>) -> Response {
    let body = ErrorBody {
        error: error.into(),
        raw,
    };
    (status, Json(body)).into_response()
}

fn analysis_error_response(err: AnalysisError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match err {
        AnalysisError::Rejected(rejection) => error_response(status, rejection.to_string(), None),
        AnalysisError::MalformedOutput(validation) => error_response(
            status,
            "The model returned malformed advice. Please try again.",
            Some(validation.into_raw()),
        ),
        AnalysisError::InvocationFailed(_) => error_response(status, "Analysis failed", None),
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/analyse", post(analyse_handler))
        .route("/stats/top", get(top_plants_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_handler() -> &'static str {
    ROOT_GREETING
}

async fn health_handler(State(state): State<AppState>) -> Response {
    match state.ledger.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(err) => {
            warn!("Health check failed: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn analyse_handler(
    State(state): State<AppState>,
    payload: Result<Json<RawAnalysisInput>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let mut timer = start_request_timer("/analyse", &request_id);

    let input = match payload {
        Ok(Json(input)) => input,
        Err(rejection) => {
            let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::BAD_REQUEST
            };
            let detail = rejection.body_text();
            complete_request_timer(&mut timer, status.as_u16(), Some(detail.clone()));
            return error_response(status, detail, None);
        }
    };

    match state.orchestrator.analyse(&request_id, &input).await {
        Ok(advice) => {
            complete_request_timer(&mut timer, StatusCode::OK.as_u16(), None);
            (StatusCode::OK, Json(advice)).into_response()
        }
        Err(err) => {
            if let AnalysisError::InvocationFailed(source) = &err {
                error!(request_id = %request_id, "Analyse error: {source:#}");
            }
            complete_request_timer(&mut timer, err.status_code(), Some(err.to_string()));
            analysis_error_response(err)
        }
    }
}

async fn top_plants_handler(
    State(state): State<AppState>,
    query: Result<Query<TopQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text(), None)
        }
    };
    let limit = query
        .limit
        .unwrap_or(state.stats_top_limit)
        .clamp(1, MAX_STATS_TOP_LIMIT);

    match state.ledger.top_entries(limit).await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => {
            error!("Failed to load top plants: {err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not load top plants",
                None,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::analysis::builder::AdviceRequestBuilder;
    use crate::analysis::orchestrator::tests::{FakeModel, BOSTON_FERN_REPLY};
    use crate::analysis::orchestrator::Orchestrator;
    use crate::db::ledger::tests::temp_ledger;
    use crate::db::ledger::Ledger;

    async fn app_with(model: Arc<FakeModel>) -> (TempDir, Ledger, Router) {
        let (dir, ledger) = temp_ledger().await;
        let orchestrator =
            Orchestrator::new(model, ledger.clone(), AdviceRequestBuilder::default());
        let state = AppState::new(orchestrator, ledger.clone(), 10);
        (dir, ledger, router(state, 1024 * 1024))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn successful_analysis_is_counted_in_top_plants() {
        let model = FakeModel::replying(BOSTON_FERN_REPLY);
        let (_dir, _ledger, app) = app_with(model.clone()).await;

        let (status, body) = send(
            &app,
            post_json(
                "/analyse",
                json!({ "prompt": "My fern's leaves are yellowing", "image": null }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["plant_common_name"], "Boston Fern");
        assert_eq!(body["careGuide"]["Common issues"], "Dry air");

        let (status, top) = send(&app, get_request("/stats/top")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(top, json!([{ "plant_name": "Boston Fern", "count": 1 }]));
    }

    #[tokio::test]
    async fn empty_request_is_rejected_and_not_counted() {
        let model = FakeModel::replying(BOSTON_FERN_REPLY);
        let (_dir, ledger, app) = app_with(model.clone()).await;

        let (status, body) =
            send(&app, post_json("/analyse", json!({ "prompt": "", "image": null }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Please provide a prompt or an image.");
        assert!(body.get("raw").is_none());
        assert_eq!(model.call_count(), 0);
        assert!(ledger.top_entries(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prompt_with_language_variant_is_accepted() {
        let model = FakeModel::replying(BOSTON_FERN_REPLY);
        let (_dir, _ledger, app) = app_with(model).await;

        let (status, _) = send(
            &app,
            post_json("/analyse", json!({ "prompt": "Mi helecho", "language": "es" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_model_output_is_bad_gateway_with_raw() {
        let model = FakeModel::replying("not json");
        let (_dir, _ledger, app) = app_with(model).await;

        let (status, body) =
            send(&app, post_json("/analyse", json!({ "prompt": "fern" }))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["raw"], "not json");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn model_failure_is_internal_error() {
        let model = FakeModel::failing("upstream down");
        let (_dir, _ledger, app) = app_with(model).await;

        let (status, body) =
            send(&app, post_json("/analyse", json!({ "prompt": "fern" }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Analysis failed" }));
    }

    #[tokio::test]
    async fn unparseable_body_is_bad_request() {
        let model = FakeModel::replying(BOSTON_FERN_REPLY);
        let (_dir, _ledger, app) = app_with(model.clone()).await;

        let request = Request::builder()
            .method("POST")
            .uri("/analyse")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"prompt\": "))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn top_plants_is_empty_array_initially_and_honours_limit() {
        let model = FakeModel::replying(BOSTON_FERN_REPLY);
        let (_dir, ledger, app) = app_with(model).await;

        let (status, top) = send(&app, get_request("/stats/top")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(top, json!([]));

        for name in ["Monstera", "Monstera", "Aloe", "Aloe", "Fern"] {
            ledger.record_sighting(name).await.unwrap();
        }
        let (_, top) = send(&app, get_request("/stats/top?limit=2")).await;
        assert_eq!(
            top,
            json!([
                { "plant_name": "Aloe", "count": 2 },
                { "plant_name": "Monstera", "count": 2 }
            ])
        );
    }

    #[tokio::test]
    async fn non_numeric_limit_is_json_bad_request() {
        let model = FakeModel::replying(BOSTON_FERN_REPLY);
        let (_dir, _ledger, app) = app_with(model).await;

        let (status, body) = send(&app, get_request("/stats/top?limit=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn undecodable_image_is_rejected_before_the_model() {
        let model = FakeModel::replying(BOSTON_FERN_REPLY);
        let (_dir, ledger, app) = app_with(model.clone()).await;

        let (status, body) = send(
            &app,
            post_json("/analyse", json!({ "prompt": "help", "image": "%%%not-base64%%%" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("The image could not be decoded"));
        assert!(body.get("raw").is_none());
        assert_eq!(model.call_count(), 0);
        assert!(ledger.top_entries(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn root_and_health_respond() {
        let model = FakeModel::replying(BOSTON_FERN_REPLY);
        let (_dir, ledger, app) = app_with(model).await;

        let response = app.clone().oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], ROOT_GREETING.as_bytes());

        let (status, body) = send(&app, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        ledger.close().await;
        let (status, body) = send(&app, get_request("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
    }
}
