//! HTTP surface for the lifecycle engine, mounted by the API service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::audit::AlertSink;
use crate::engine::{CheckKind, EngineHandle};
use crate::lifecycle::domain::ApplicationId;
use crate::lifecycle::executor::EngineError;
use crate::lifecycle::store::{LifecycleStore, StoreError};
use crate::revenue::repository::RevenueStore;

/// Router builder exposing the engine's read and operator endpoints.
pub fn engine_router<S, A>(engine: EngineHandle<S, A>) -> Router
where
    S: LifecycleStore + RevenueStore + 'static,
    A: AlertSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications/urgent",
            get(urgent_handler::<S, A>),
        )
        .route(
            "/api/v1/applications/:application_id/status",
            get(status_handler::<S, A>),
        )
        .route(
            "/api/v1/applications/:application_id/reactivate",
            post(reactivate_handler::<S, A>),
        )
        .route("/api/v1/monitoring/check", post(check_handler::<S, A>))
        .route("/api/v1/monitoring/stats", get(monitoring_stats_handler::<S, A>))
        .route("/api/v1/revenue/stats", get(revenue_stats_handler::<S, A>))
        .route("/api/v1/revenue/trends", get(revenue_trends_handler::<S, A>))
        .with_state(engine)
}

pub(crate) async fn status_handler<S, A>(
    State(engine): State<EngineHandle<S, A>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: LifecycleStore + RevenueStore + 'static,
    A: AlertSink + 'static,
{
    let id = ApplicationId(application_id);
    match engine.validated_status(&id).await {
        Ok(validated) => (StatusCode::OK, axum::Json(validated)).into_response(),
        Err(err) => error_response(&id, err),
    }
}

pub(crate) async fn reactivate_handler<S, A>(
    State(engine): State<EngineHandle<S, A>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: LifecycleStore + RevenueStore + 'static,
    A: AlertSink + 'static,
{
    let id = ApplicationId(application_id);
    match engine.reactivate(&id).await {
        Ok(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        Err(err) => error_response(&id, err),
    }
}

pub(crate) async fn urgent_handler<S, A>(
    State(engine): State<EngineHandle<S, A>>,
) -> Response
where
    S: LifecycleStore + RevenueStore + 'static,
    A: AlertSink + 'static,
{
    match engine.urgent() {
        Ok(urgent) => (StatusCode::OK, axum::Json(json!({ "applications": urgent }))).into_response(),
        Err(err) => internal_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ManualCheckRequest {
    kind: CheckKind,
}

pub(crate) async fn check_handler<S, A>(
    State(engine): State<EngineHandle<S, A>>,
    axum::Json(request): axum::Json<ManualCheckRequest>,
) -> Response
where
    S: LifecycleStore + RevenueStore + 'static,
    A: AlertSink + 'static,
{
    let report = engine.manual_check(request.kind).await;
    (StatusCode::OK, axum::Json(report)).into_response()
}

pub(crate) async fn monitoring_stats_handler<S, A>(
    State(engine): State<EngineHandle<S, A>>,
) -> Response
where
    S: LifecycleStore + RevenueStore + 'static,
    A: AlertSink + 'static,
{
    match engine.monitoring_stats() {
        Ok(stats) => (StatusCode::OK, axum::Json(stats)).into_response(),
        Err(err) => internal_error(err),
    }
}

pub(crate) async fn revenue_stats_handler<S, A>(
    State(engine): State<EngineHandle<S, A>>,
) -> Response
where
    S: LifecycleStore + RevenueStore + 'static,
    A: AlertSink + 'static,
{
    match engine.revenue_stats() {
        Ok(stats) => (StatusCode::OK, axum::Json(stats)).into_response(),
        Err(err) => internal_error(err),
    }
}

pub(crate) async fn revenue_trends_handler<S, A>(
    State(engine): State<EngineHandle<S, A>>,
) -> Response
where
    S: LifecycleStore + RevenueStore + 'static,
    A: AlertSink + 'static,
{
    match engine.revenue_trends() {
        Ok(series) => (StatusCode::OK, axum::Json(json!({ "days": series }))).into_response(),
        Err(err) => internal_error(err),
    }
}

fn error_response(id: &ApplicationId, err: EngineError) -> Response {
    match err {
        EngineError::Store(StoreError::NotFound) => {
            let payload = json!({
                "application_id": id.0,
                "error": "application not found",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        other => internal_error(other),
    }
}

fn internal_error(err: EngineError) -> Response {
    let payload = json!({ "error": err.to_string() });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}
