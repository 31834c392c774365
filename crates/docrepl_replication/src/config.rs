//! Configuration for replication sessions.

use crate::error::{ReplicationError, ReplicationResult};
use docrepl_codec::MIN_SCRATCH_CAPACITY;
use docrepl_protocol::{KeyFilter, REPLICATED_SYSTEM_PREFIXES, SYSTEM_KEY_PREFIXES};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default maximum number of items considered per batch.
pub const DEFAULT_MAX_ITEMS_PER_BATCH: usize = 1024;

/// Default maximum document payload bytes per batch.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 16 * 1024 * 1024;

/// Default scratch buffer size used by the encoder.
pub const DEFAULT_SCRATCH_BUFFER_SIZE: usize = 32 * 1024;

/// Default number of idle payload buffers kept by the pool.
pub const DEFAULT_POOL_MAX_RETAINED: usize = 64;

/// Default time a worker waits for new writes before polling again.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables of an outgoing replication session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Items considered per batch before the batch is closed at the next
    /// transaction boundary.
    pub max_items_per_batch: usize,
    /// Document payload bytes per batch before the batch is closed at the
    /// next transaction boundary.
    pub max_batch_bytes: usize,
    /// Size of the fixed encoder buffer.
    pub scratch_buffer_size: usize,
    /// Idle payload buffers kept for reuse.
    pub pool_max_retained: usize,
    /// Polling interval of the worker when nothing wakes it.
    #[serde(with = "duration_millis")]
    pub idle_interval: Duration,
    /// Whether local-only system records are withheld.
    pub filter_system_keys: bool,
    /// Key prefixes of local-only records, matched case-insensitively.
    pub excluded_key_prefixes: Vec<String>,
    /// Sub-prefixes of `excluded_key_prefixes` that are replicated anyway.
    pub included_key_prefixes: Vec<String>,
}

impl ReplicationConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            max_items_per_batch: DEFAULT_MAX_ITEMS_PER_BATCH,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            scratch_buffer_size: DEFAULT_SCRATCH_BUFFER_SIZE,
            pool_max_retained: DEFAULT_POOL_MAX_RETAINED,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            filter_system_keys: true,
            excluded_key_prefixes: prefix_table(SYSTEM_KEY_PREFIXES),
            included_key_prefixes: prefix_table(REPLICATED_SYSTEM_PREFIXES),
        }
    }

    /// Sets the item cap.
    pub fn with_max_items_per_batch(mut self, max: usize) -> Self {
        self.max_items_per_batch = max;
        self
    }

    /// Sets the payload byte cap.
    pub fn with_max_batch_bytes(mut self, max: usize) -> Self {
        self.max_batch_bytes = max;
        self
    }

    /// Sets the scratch buffer size.
    pub fn with_scratch_buffer_size(mut self, size: usize) -> Self {
        self.scratch_buffer_size = size;
        self
    }

    /// Sets how many idle payload buffers the pool keeps.
    pub fn with_pool_max_retained(mut self, retained: usize) -> Self {
        self.pool_max_retained = retained;
        self
    }

    /// Sets the worker polling interval.
    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Enables or disables the system key filter.
    pub fn with_system_key_filter(mut self, enabled: bool) -> Self {
        self.filter_system_keys = enabled;
        self
    }

    /// Replaces the excluded and re-included key prefix tables.
    pub fn with_key_prefixes<E, I>(mut self, excluded: E, included: I) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.excluded_key_prefixes = excluded.into_iter().map(Into::into).collect();
        self.included_key_prefixes = included.into_iter().map(Into::into).collect();
        self
    }

    /// Key filter matching this configuration.
    pub fn key_filter(&self) -> KeyFilter {
        if self.filter_system_keys {
            KeyFilter::new(&self.excluded_key_prefixes, &self.included_key_prefixes)
        } else {
            KeyFilter::allow_all()
        }
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.max_items_per_batch == 0 {
            return Err(ReplicationError::InvalidConfig(
                "max_items_per_batch must be at least 1".into(),
            ));
        }
        if self.max_batch_bytes == 0 {
            return Err(ReplicationError::InvalidConfig(
                "max_batch_bytes must be at least 1".into(),
            ));
        }
        if self.scratch_buffer_size < MIN_SCRATCH_CAPACITY {
            return Err(ReplicationError::InvalidConfig(format!(
                "scratch_buffer_size must be at least {MIN_SCRATCH_CAPACITY}"
            )));
        }
        if self.excluded_key_prefixes.iter().any(String::is_empty) {
            return Err(ReplicationError::InvalidConfig(
                "excluded_key_prefixes must not contain an empty prefix".into(),
            ));
        }
        if self.idle_interval.is_zero() {
            return Err(ReplicationError::InvalidConfig(
                "idle_interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn prefix_table(prefixes: &[&[u8]]) -> Vec<String> {
    prefixes
        .iter()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .collect()
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// A replication destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    /// Database name on the destination node.
    pub database: String,
    /// Address of the destination node.
    pub url: String,
}

impl Destination {
    /// Creates a destination.
    pub fn new(database: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            url: url.into(),
        }
    }

    /// Key under which knowledge about this destination is stored.
    pub fn id(&self) -> String {
        format!("{}@{}", self.database, self.url)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.database, self.url)
    }
}
