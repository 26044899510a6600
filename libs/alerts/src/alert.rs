//! The alert envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// All alert topic names as constants.
pub mod topics {
    // Resize
    pub const RESIZE_PLANNED: &str = "resize.planned";
    pub const RESIZE_STARTED: &str = "resize.started";
    pub const RESIZE_SCHEDULED: &str = "resize.scheduled";
    pub const RESIZE_SPARED: &str = "resize.spared";

    // Machine lifecycle
    pub const MACHINE_TERMINATED: &str = "machine.terminated";
    pub const MACHINE_TERMINATION_FAILED: &str = "machine.termination_failed";
    pub const MACHINE_START_FAILED: &str = "machine.start_failed";
    pub const MACHINE_ATTACHED: &str = "machine.attached";
    pub const MACHINE_DETACHED: &str = "machine.detached";

    // Tagging
    pub const MACHINE_SERVICE_STATE_CHANGED: &str = "machine.service_state_changed";
    pub const MACHINE_MEMBERSHIP_CHANGED: &str = "machine.membership_changed";

    // Pool
    pub const POOL_FETCH_FAILED: &str = "pool.fetch_failed";
}

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Routine activity worth an audit trail.
    #[default]
    Info,
    /// Activity an operator probably wants to see.
    Notice,
    /// Something failed but the engine recovered or will retry.
    Warn,
    /// Something failed and needs operator attention.
    Error,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Notice => "notice",
            AlertSeverity::Warn => "warn",
            AlertSeverity::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A structured operator alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique, sortable alert identifier.
    pub alert_id: Ulid,

    /// Topic, one of the [`topics`] constants.
    pub topic: String,

    /// Severity.
    pub severity: AlertSeverity,

    /// Human-readable message.
    pub message: String,

    /// Structured metadata (machine ids, counts, error strings).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// When the alerted condition occurred.
    pub occurred_at: DateTime<Utc>,
}

impl Alert {
    /// Creates a new alert builder for the given topic.
    pub fn builder(topic: impl Into<String>) -> AlertBuilder {
        AlertBuilder::new(topic)
    }
}

/// Builder for [`Alert`] values.
#[derive(Debug)]
pub struct AlertBuilder {
    topic: String,
    severity: AlertSeverity,
    message: Option<String>,
    metadata: serde_json::Map<String, serde_json::Value>,
    occurred_at: Option<DateTime<Utc>>,
}

impl AlertBuilder {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            severity: AlertSeverity::Info,
            message: None,
            metadata: serde_json::Map::new(),
            occurred_at: None,
        }
    }

    pub fn severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches a metadata key/value pair.
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn occurred_at(mut self, ts: DateTime<Utc>) -> Self {
        self.occurred_at = Some(ts);
        self
    }

    /// Builds the alert.
    ///
    /// # Panics
    ///
    /// Panics if no message was set.
    pub fn build(self) -> Alert {
        Alert {
            alert_id: Ulid::new(),
            topic: self.topic,
            severity: self.severity,
            message: self.message.expect("message is required"),
            metadata: self.metadata,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
        }
    }
}
