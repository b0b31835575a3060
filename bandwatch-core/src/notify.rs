//! Alert publication seam
//!
//! The core only broadcasts raised alerts. Delivery to the outside (MQTT in
//! the kernel, a mock client in tests) goes through `AlertPublisher`.

use crate::alerts::Alert;
use std::future::Future;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, warn};

/// Destination for serialized alerts
pub trait AlertPublisher: Send + Sync + 'static {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<(), String>> + Send;
}

/// Drains the alert broadcast and publishes each alert as JSON on `topic`.
/// Returns when the monitor (sender side) is dropped.
pub async fn forward_alerts<P: AlertPublisher>(
    mut alerts: broadcast::Receiver<Alert>,
    publisher: P,
    topic: String,
) {
    loop {
        match alerts.recv().await {
            Ok(alert) => {
                let payload = match serde_json::to_vec(&alert) {
                    Ok(p) => p,
                    Err(e) => {
                        error!("Failed to serialize alert {}: {}", alert.id, e);
                        continue;
                    }
                };
                match publisher.publish(&topic, payload).await {
                    Ok(()) => debug!("Published alert {} on {}", alert.id, topic),
                    Err(e) => warn!("Failed to publish alert {} on {}: {}", alert.id, topic, e),
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Alert forwarder lagging, {} alerts skipped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
