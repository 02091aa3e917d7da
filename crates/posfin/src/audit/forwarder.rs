//! Side-channel forwarding alerts to an external monitoring webhook.
//!
//! Alerts arrive on an in-process channel and are POSTed as
//! `{event_type, payload}` with bearer-token authentication. Delivery is
//! best-effort: a failed POST is logged and dropped, never retried into a
//! backlog and never allowed to crash the task.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use super::{AlertError, AlertSink, SystemAlert};
use crate::config::WebhookConfig;

const CHANNEL_CAPACITY: usize = 256;

/// Sink half: pushes alerts onto the forwarding channel without blocking the
/// publishing task. A full channel drops the alert with a warning.
pub struct ChannelAlertSink {
    sender: mpsc::Sender<SystemAlert>,
}

impl AlertSink for ChannelAlertSink {
    fn publish(&self, alert: SystemAlert) -> Result<(), AlertError> {
        match self.sender.try_send(alert) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(alert)) => {
                warn!(alert_type = alert.alert_type.label(), "forwarding channel full; alert dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(AlertError::Transport("forwarder stopped".to_string()))
            }
        }
    }
}

/// Forwarder half: drains the channel and delivers to the webhook.
pub struct WebhookForwarder {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl WebhookForwarder {
    /// Builds the sink/forwarder pair, or `None` when no webhook is
    /// configured (forwarding disabled).
    pub fn from_config(
        config: &WebhookConfig,
    ) -> Option<(Arc<ChannelAlertSink>, WebhookForwarder, mpsc::Receiver<SystemAlert>)> {
        let (url, token) = config.endpoint()?;
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let sink = Arc::new(ChannelAlertSink { sender });
        let forwarder = WebhookForwarder {
            client: reqwest::Client::new(),
            url: url.to_string(),
            token: token.to_string(),
        };
        Some((sink, forwarder, receiver))
    }

    pub async fn run(
        self,
        mut alerts: mpsc::Receiver<SystemAlert>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                alert = alerts.recv() => {
                    match alert {
                        Some(alert) => self.forward(alert).await,
                        None => break,
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!("alert forwarder stopped");
    }

    async fn forward(&self, alert: SystemAlert) {
        let body = json!({
            "event_type": alert.alert_type.label(),
            "payload": alert,
        });
        let result = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(status = %response.status(), "webhook rejected alert");
            }
            Err(err) => {
                warn!(error = %err, "webhook delivery failed");
            }
        }
    }
}
