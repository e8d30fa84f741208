//! # Pool Configuration
//!
//! Purpose: Describe pool occupancy bounds and idle reclamation with an
//! explicit, validated struct instead of a loose option bag.
//!
//! ## Design Principles
//! 1. **Explicit Defaults**: `minPool = 1`, `maxPool = 10`, `ttl = 600000` ms.
//! 2. **Validate Once**: Bounds are checked at construction, not per call.
//! 3. **Wire-Compatible Names**: Serde uses the camelCase option names, so
//!    `{"minPool":2,"maxPool":4,"ttl":1000}` parses directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Default minimum number of live connections.
pub const DEFAULT_MIN_POOL: usize = 1;

/// Default maximum number of live connections.
pub const DEFAULT_MAX_POOL: usize = 10;

/// Default idle time before a connection may be evicted (10 minutes).
pub const DEFAULT_TTL_MS: u64 = 600_000;

/// Default period of the eviction sweep.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Default capacity of the pool event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1_024;

/// Occupancy and reclamation settings for the connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoolConfig {
    /// Connections kept open at all times.
    pub min_pool: usize,
    /// Hard upper bound on open connections.
    pub max_pool: usize,
    /// Idle time in milliseconds after which a connection may be evicted.
    #[serde(rename = "ttl")]
    pub ttl_ms: u64,
    /// Period of the background eviction sweep in milliseconds.
    pub sweep_interval_ms: u64,
    /// Buffered events per subscriber before slow receivers start lagging.
    pub event_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            min_pool: DEFAULT_MIN_POOL,
            max_pool: DEFAULT_MAX_POOL,
            ttl_ms: DEFAULT_TTL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Parses a JSON option object; missing fields take their defaults.
    pub fn from_json(raw: &str) -> ClientResult<Self> {
        let config: PoolConfig =
            serde_json::from_str(raw).map_err(|err| ClientError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the minimum pool size.
    pub fn with_min_pool(mut self, min_pool: usize) -> Self {
        self.min_pool = min_pool;
        self
    }

    /// Sets the maximum pool size.
    pub fn with_max_pool(mut self, max_pool: usize) -> Self {
        self.max_pool = max_pool;
        self
    }

    /// Sets the idle TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = duration_to_ms(ttl);
        self
    }

    /// Sets the eviction sweep period.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = duration_to_ms(interval);
        self
    }

    /// Sets the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Idle TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Sweep period as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Checks the occupancy bounds and timer settings.
    pub fn validate(&self) -> ClientResult<()> {
        if self.min_pool < 1 {
            return Err(ClientError::InvalidConfig(
                "minPool must be at least 1".to_string(),
            ));
        }
        if self.max_pool < self.min_pool {
            return Err(ClientError::InvalidConfig(format!(
                "maxPool ({}) must be >= minPool ({})",
                self.max_pool, self.min_pool
            )));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "sweepInterval must be positive".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ClientError::InvalidConfig(
                "eventCapacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
