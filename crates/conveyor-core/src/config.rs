//! Runtime configuration.
//!
//! Configuration is an explicit value handed to constructors; there is no
//! process-global settings object. `Default` carries the operational
//! defaults, `from_env` layers environment overrides on top for binaries.

use std::time::Duration;

/// Tuning for the queue service and its worker pools.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Concurrent workers spawned per registered task type.
    pub workers_per_type: usize,

    /// Upper bound on one blocking dequeue wait. This is the worst-case
    /// latency for a worker to notice shutdown while its queue is idle.
    pub poll_interval: Duration,

    /// Deadline for a single processor invocation.
    pub processing_timeout: Duration,

    /// Fixed pause after a transient store failure.
    pub store_backoff: Duration,

    /// Window after the last status write before a record expires.
    pub status_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers_per_type: 4,
            poll_interval: Duration::from_secs(1),
            processing_timeout: Duration::from_secs(300),
            store_backoff: Duration::from_secs(5),
            status_ttl: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// Defaults overridden by `CONVEYOR_*` environment variables where set.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse("CONVEYOR_WORKERS_PER_TYPE") {
            config.workers_per_type = n;
        }
        if let Some(secs) = env_parse("CONVEYOR_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("CONVEYOR_PROCESSING_TIMEOUT_SECS") {
            config.processing_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("CONVEYOR_STORE_BACKOFF_SECS") {
            config.store_backoff = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("CONVEYOR_STATUS_TTL_SECS") {
            config.status_ttl = Duration::from_secs(secs);
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operational_values() {
        let config = QueueConfig::default();
        assert_eq!(config.workers_per_type, 4);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.processing_timeout, Duration::from_secs(300));
        assert_eq!(config.store_backoff, Duration::from_secs(5));
        assert_eq!(config.status_ttl, Duration::from_secs(3600));
    }
}
