use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use posfin::audit::AlertSink;
use posfin::engine::EngineHandle;
use posfin::lifecycle::LifecycleStore;
use posfin::revenue::RevenueStore;
use posfin::router::engine_router;
use serde_json::json;

pub(crate) fn with_engine_routes<S, A>(engine: EngineHandle<S, A>) -> axum::Router
where
    S: LifecycleStore + RevenueStore + 'static,
    A: AlertSink + 'static,
{
    engine_router(engine)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use posfin::clock::{Clock, SystemClock};
    use posfin::config::{EngineConfig, LedgerConfig};
    use posfin::lifecycle::InMemoryMarketStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> axum::Router {
        let store = Arc::new(InMemoryMarketStore::default());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let engine = EngineHandle::new(
            Arc::clone(&store),
            Arc::clone(&store),
            clock,
            EngineConfig::default(),
            LedgerConfig::default(),
        );
        with_engine_routes(engine)
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload.get("status"), Some(&json!("ok")));
    }

    #[tokio::test]
    async fn engine_routes_are_mounted() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/revenue/stats")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
