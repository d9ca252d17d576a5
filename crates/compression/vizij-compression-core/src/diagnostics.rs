use serde::Serialize;

/// Running counters kept by the build scheduler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerDiagnostics {
    pub requested: u64,
    pub cache_hits: u64,
    pub sync_builds: u64,
    /// Async requests that fell back to a synchronous build for lack of budget.
    pub budget_fallbacks: u64,
    pub async_started: u64,
    pub completed: u64,
    pub failed: u64,
    pub retrieval_failures: u64,
    pub cancelled: u64,
    pub superseded: u64,
    /// Results whose asset was destroyed before delivery.
    pub discarded: u64,
    pub peak_reserved_bytes: u64,
}

impl SchedulerDiagnostics {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
