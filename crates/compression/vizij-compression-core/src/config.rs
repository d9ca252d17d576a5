//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Order in which queued build jobs are promoted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePolicy {
    /// Most recently queued first: the asset the user touched last builds first.
    #[default]
    Lifo,
    Fifo,
}

/// Scheduler, stripping and worker-pool settings. Every field has a default so a
/// partial JSON document is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Maximum number of concurrently active asynchronous builds.
    pub concurrency_cap: usize,
    /// Upper bound on the summed size estimates of in-flight builds.
    pub memory_budget_bytes: u64,
    /// Drop every other frame before compression when the asset allows it.
    pub frame_strip_enabled: bool,
    /// Also strip sequences with an odd frame count (lossy resample to half).
    pub strip_odd_framed_sequences: bool,
    /// Upper bound on the time one `tick` may spend polling and promoting. A tick
    /// always polls one active job and attempts one promotion before checking it.
    pub tick_time_slice_ms: u64,
    pub queue_policy: QueuePolicy,
    /// Threads used by the in-memory cache for asynchronous builds.
    pub worker_threads: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            concurrency_cap: 4,
            memory_budget_bytes: 512 * 1024 * 1024,
            frame_strip_enabled: false,
            strip_odd_framed_sequences: false,
            tick_time_slice_ms: 2,
            queue_policy: QueuePolicy::Lifo,
            worker_threads: 2,
        }
    }
}

impl CompressionConfig {
    pub fn from_json_str(s: &str) -> Result<Self, BuildError> {
        let cfg: Self = serde_json::from_str(s).map_err(|e| BuildError::InvalidConfiguration {
            reason: format!("config parse error: {e}"),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        let reject = |reason: &str| {
            Err(BuildError::InvalidConfiguration {
                reason: reason.to_string(),
            })
        };
        if self.concurrency_cap == 0 {
            return reject("concurrency_cap must be at least 1");
        }
        if self.memory_budget_bytes == 0 {
            return reject("memory_budget_bytes must be non-zero");
        }
        if self.worker_threads == 0 {
            return reject("worker_threads must be at least 1");
        }
        if self.tick_time_slice_ms == 0 {
            return reject("tick_time_slice_ms must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = CompressionConfig::from_json_str(r#"{ "concurrency_cap": 2, "queue_policy": "fifo" }"#)
            .unwrap();
        assert_eq!(cfg.concurrency_cap, 2);
        assert_eq!(cfg.queue_policy, QueuePolicy::Fifo);
        assert_eq!(cfg.memory_budget_bytes, CompressionConfig::default().memory_budget_bytes);
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(matches!(
            CompressionConfig::from_json_str(r#"{ "memory_budget_bytes": 0 }"#),
            Err(BuildError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn zero_time_slice_is_rejected() {
        assert!(matches!(
            CompressionConfig::from_json_str(r#"{ "tick_time_slice_ms": 0 }"#),
            Err(BuildError::InvalidConfiguration { .. })
        ));
    }
}
