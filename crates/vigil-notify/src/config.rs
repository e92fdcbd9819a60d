//! Configuration for the notifier pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use vigil_event::{Event, EventBuilder};

/// Configuration for one notifier sink.
///
/// Controls worker concurrency, cooldown bookkeeping and the per-job
/// timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Sink name; also the leading segment of every cooldown key.
    pub name: String,

    /// Worker concurrency cap. Zero means `max(1, cpus/3 + 2)`.
    #[serde(default)]
    pub worker_limit: usize,

    /// Base cooldown applied between duplicate notifications.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Per-job delivery timeout, including artifact offload.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// TTL of the process-wide delivery lock.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Interval at which a job polls for the delivery lock to clear.
    #[serde(default = "default_lock_poll_ms")]
    pub lock_poll_ms: u64,

    /// Trailing segment of the process-wide delivery-lock key.
    #[serde(default = "default_global_lock_key")]
    pub global_lock_key: String,
}

fn default_cooldown_secs() -> u64 {
    15 * 60
}

fn default_job_timeout_secs() -> u64 {
    60
}

fn default_lock_ttl_secs() -> u64 {
    30
}

fn default_lock_poll_ms() -> u64 {
    300
}

fn default_global_lock_key() -> String {
    "global".into()
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            worker_limit: 0,
            cooldown_secs: default_cooldown_secs(),
            job_timeout_secs: default_job_timeout_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            lock_poll_ms: default_lock_poll_ms(),
            global_lock_key: default_global_lock_key(),
        }
    }
}

impl NotifierConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Load from a TOML file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, Event> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            EventBuilder::wrap(err)
                .message(format!("reading notifier config {} failed", path.display()))
                .freeze()
        })?;
        toml::from_str(&content).map_err(|err| {
            EventBuilder::wrap(err)
                .message(format!("parsing notifier config {} failed", path.display()))
                .freeze()
        })
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms)
    }

    /// The resolved worker cap.
    pub fn workers(&self) -> usize {
        if self.worker_limit > 0 {
            self.worker_limit
        } else {
            (num_cpus::get() / 3 + 2).max(1)
        }
    }
}
