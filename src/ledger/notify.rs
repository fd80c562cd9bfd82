use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Receives user-facing outcomes of ledger operations.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, level: NotifyLevel);

    /// Asks the caller to reload its request list.
    fn refetch_customers(&self) {}
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, level: NotifyLevel) {
        match level {
            NotifyLevel::Success | NotifyLevel::Info => info!(target: "notify", "{message}"),
            NotifyLevel::Warning => warn!(target: "notify", "{message}"),
            NotifyLevel::Error => error!(target: "notify", "{message}"),
        }
    }
}
