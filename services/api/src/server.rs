use crate::cli::ServeArgs;
use crate::infra::{AppState, FanoutAlertSink};
use crate::routes::with_engine_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use posfin::audit::forwarder::WebhookForwarder;
use posfin::clock::{Clock, SystemClock};
use posfin::config::AppConfig;
use posfin::engine::EngineHandle;
use posfin::error::AppError;
use posfin::lifecycle::InMemoryMarketStore;
use posfin::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryMarketStore::default());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut background = Vec::new();

    let forward_sink = match WebhookForwarder::from_config(&config.webhook) {
        Some((sink, forwarder, receiver)) => {
            info!("alert webhook forwarding enabled");
            background.push(tokio::spawn(forwarder.run(receiver, stop_rx.clone())));
            Some(sink)
        }
        None => None,
    };
    let alerts = Arc::new(FanoutAlertSink::new(Arc::clone(&store), forward_sink));

    let engine = EngineHandle::new(
        Arc::clone(&store),
        alerts,
        clock,
        config.engine.clone(),
        config.ledger.clone(),
    );

    background.push(tokio::spawn(
        Arc::clone(&engine.monitor).run(stop_rx.clone()),
    ));
    background.push(tokio::spawn(
        Arc::clone(&engine.monitor).run_sweep_loop(stop_rx.clone()),
    ));
    background.push(tokio::spawn(Arc::clone(&engine.ledger).run(
        config.engine.revenue_interval(),
        stop_rx.clone(),
    )));
    background.push(tokio::spawn(
        Arc::clone(&engine.health).run(stop_rx.clone()),
    ));

    let app = with_engine_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "application lifecycle engine ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Signal the monitors and wait; in-flight units of work finish before
    // each task exits.
    let _ = stop_tx.send(true);
    for task in background {
        let _ = task.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}
