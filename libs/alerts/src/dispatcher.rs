//! The dispatcher seam.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::alert::{Alert, AlertSeverity};

/// Receives alerts published by the engine.
///
/// Implementations own delivery entirely: transport, duplicate
/// suppression, and fan-out to configured channels. `publish` must not
/// fail from the caller's perspective; an implementation that cannot
/// deliver should handle that internally.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// Publishes a single alert. Fire-and-forget.
    async fn publish(&self, alert: Alert);
}

/// Dispatcher that renders alerts as `tracing` events.
///
/// The default sink when no external alerting is wired in: alerts land in
/// the service log at the level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn publish(&self, alert: Alert) {
        let metadata = serde_json::Value::Object(alert.metadata.clone());
        match alert.severity {
            AlertSeverity::Info | AlertSeverity::Notice => info!(
                topic = %alert.topic,
                alert_id = %alert.alert_id,
                %metadata,
                "{}", alert.message
            ),
            AlertSeverity::Warn => warn!(
                topic = %alert.topic,
                alert_id = %alert.alert_id,
                %metadata,
                "{}", alert.message
            ),
            AlertSeverity::Error => error!(
                topic = %alert.topic,
                alert_id = %alert.alert_id,
                %metadata,
                "{}", alert.message
            ),
        }
    }
}
