use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, warn};

/// Who gets told when a step fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorContact {
    pub owner: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A step failed and will be attempted again.
    Retry,
    /// A step failed for the last time; the run halts.
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub pipeline: String,
    pub step: &'static str,
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: String,
    pub recipient: OperatorContact,
}

/// Delivery channel for operator alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Emits alerts as structured log events; the JSON log file is what an
/// external alerting system tails.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        match alert.kind {
            AlertKind::Retry => warn!(
                alert = "retry",
                recipient = %alert.recipient.email,
                step = alert.step,
                attempt = alert.attempt,
                max_attempts = alert.max_attempts,
                "🔁 Pipeline '{}' step '{}' failed (attempt {}/{}), retrying: {}",
                alert.pipeline,
                alert.step,
                alert.attempt,
                alert.max_attempts,
                alert.error
            ),
            AlertKind::Failure => error!(
                alert = "failure",
                recipient = %alert.recipient.email,
                owner = %alert.recipient.owner,
                step = alert.step,
                attempt = alert.attempt,
                "🚨 Pipeline '{}' step '{}' failed after {} attempt(s): {}",
                alert.pipeline,
                alert.step,
                alert.attempt,
                alert.error
            ),
        }
        Ok(())
    }
}
