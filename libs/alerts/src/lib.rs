//! Structured operator alerts.
//!
//! The reconciliation engine reports everything noteworthy (resize
//! actions, driver failures, operator interventions) as [`Alert`] values
//! published through the [`AlertDispatcher`] seam. Delivery (SMTP, HTTP
//! webhooks, duplicate suppression, fan-out) is the dispatcher
//! implementation's concern; publishing is fire-and-forget from the
//! engine's point of view.

mod alert;
mod dispatcher;

pub use alert::{topics, Alert, AlertBuilder, AlertSeverity};
pub use dispatcher::{AlertDispatcher, LogDispatcher};
