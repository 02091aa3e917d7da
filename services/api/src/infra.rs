use metrics_exporter_prometheus::PrometheusHandle;
use posfin::audit::forwarder::ChannelAlertSink;
use posfin::audit::{AlertError, AlertSink, SystemAlert};
use posfin::lifecycle::InMemoryMarketStore;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Persists every alert in the store and, when a webhook is configured,
/// fans it out to the forwarding channel. Forwarding is best-effort; the
/// persisted record is the source of truth.
pub(crate) struct FanoutAlertSink {
    store: Arc<InMemoryMarketStore>,
    forward: Option<Arc<ChannelAlertSink>>,
}

impl FanoutAlertSink {
    pub(crate) fn new(
        store: Arc<InMemoryMarketStore>,
        forward: Option<Arc<ChannelAlertSink>>,
    ) -> Self {
        Self { store, forward }
    }
}

impl AlertSink for FanoutAlertSink {
    fn publish(&self, alert: SystemAlert) -> Result<(), AlertError> {
        self.store.publish(alert.clone())?;
        if let Some(forward) = &self.forward {
            if let Err(err) = forward.publish(alert) {
                warn!(error = %err, "alert forwarding failed");
            }
        }
        Ok(())
    }
}
