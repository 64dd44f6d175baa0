//! Tunables for a session watcher.

use std::{process, time::Duration};

use serde::Deserialize;

use crate::{Error, Result};

/// Default prefix for the per-watcher window class name.
pub const DEFAULT_CLASS_PREFIX: &str = "SessionWatch";
/// Default relay queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
/// Default wait for the listener to report readiness.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);
/// Default wait for each thread during stop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Watcher configuration.
///
/// The notification scope is not configurable: every watcher subscribes to
/// all sessions on the machine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherConfig {
    /// Prefix for the hidden window's class name. The process id and watcher
    /// id are appended so concurrent watchers never share a class.
    pub class_prefix: String,
    /// Events buffered between the listener and a slow relay before new
    /// events are dropped.
    pub queue_capacity: usize,
    /// How long `start` waits for native setup to finish.
    #[serde(with = "millis")]
    pub ready_timeout: Duration,
    /// How long `stop` waits for each thread before detaching it.
    #[serde(with = "millis")]
    pub stop_timeout: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            class_prefix: DEFAULT_CLASS_PREFIX.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl WatcherConfig {
    /// Set the class name prefix.
    pub fn with_class_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.class_prefix = prefix.into();
        self
    }

    /// Set the relay queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the readiness timeout.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Set the per-thread stop timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Reject values the watcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.class_prefix.is_empty() {
            return Err(Error::InvalidConfig("class_prefix must not be empty"));
        }
        if self.class_prefix.contains('\0') {
            return Err(Error::InvalidConfig("class_prefix must not contain NUL"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig("queue_capacity must be at least 1"));
        }
        if self.ready_timeout.is_zero() {
            return Err(Error::InvalidConfig("ready_timeout must be non-zero"));
        }
        if self.stop_timeout.is_zero() {
            return Err(Error::InvalidConfig("stop_timeout must be non-zero"));
        }
        Ok(())
    }

    /// Class name for the watcher with the given id.
    pub(crate) fn class_name(&self, id: u64) -> String {
        format!("{}-{}-{}", self.class_prefix, process::id(), id)
    }
}

/// Durations as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(WatcherConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let cases = [
            WatcherConfig::default().with_class_prefix(""),
            WatcherConfig::default().with_class_prefix("a\0b"),
            WatcherConfig::default().with_queue_capacity(0),
            WatcherConfig::default().with_ready_timeout(Duration::ZERO),
            WatcherConfig::default().with_stop_timeout(Duration::ZERO),
        ];
        for cfg in cases {
            assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))), "{cfg:?}");
        }
    }

    #[test]
    fn class_names_embed_pid_and_id() {
        let cfg = WatcherConfig::default().with_class_prefix("Test");
        let name = cfg.class_name(7);
        assert_eq!(name, format!("Test-{}-7", process::id()));
        assert_ne!(name, cfg.class_name(8));
    }
}
