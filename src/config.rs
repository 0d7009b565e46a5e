//! Typed configuration for pools and queues.
//!
//! Values are validated when the configured object is built; a zero size or
//! depth is rejected with [`Error::InvalidConfig`].

use crate::error::{Error, Result};
use crate::memory::defaults::{
    DEFAULT_BUFFER_SIZE, DEFAULT_POOL_DEPTH, DEFAULT_QUEUE_BURST, DEFAULT_QUEUE_CAPACITY,
};

/// Configuration of a [`BufferPool`](crate::memory::BufferPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Name used in logs.
    pub name: String,
    /// Size of each pooled buffer in bytes.
    pub buffer_size: usize,
    /// Maximum number of buffers kept on the free list.
    pub max_depth: usize,
    /// Fill the free list at construction.
    pub preallocate: bool,
}

impl PoolConfig {
    /// Create a pool configuration.
    pub fn new(buffer_size: usize, max_depth: usize) -> Self {
        Self {
            name: "pool".to_string(),
            buffer_size,
            max_depth,
            preallocate: false,
        }
    }

    /// Set the pool name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fill the free list to `max_depth` at construction.
    pub fn preallocated(mut self) -> Self {
        self.preallocate = true;
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "pool {}: buffer_size must be > 0",
                self.name
            )));
        }
        if self.max_depth == 0 {
            return Err(Error::InvalidConfig(format!(
                "pool {}: max_depth must be > 0",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_POOL_DEPTH)
    }
}

/// Configuration of a [`CrossThreadQueue`](crate::nodes::queue::CrossThreadQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Name used in logs.
    pub name: String,
    /// Maximum number of queued buffers.
    pub capacity: usize,
    /// Buffers forwarded by the source per scheduling callback.
    pub burst: usize,
}

impl QueueConfig {
    /// Create a queue configuration with the default burst.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Set the queue name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set how many buffers the source forwards before rescheduling itself.
    pub fn with_burst(mut self, burst: usize) -> Self {
        self.burst = burst;
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig(format!(
                "queue {}: capacity must be > 0",
                self.name
            )));
        }
        if self.burst == 0 {
            return Err(Error::InvalidConfig(format!(
                "queue {}: burst must be > 0",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "queue".to_string(),
            capacity: DEFAULT_QUEUE_CAPACITY,
            burst: DEFAULT_QUEUE_BURST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.max_depth, DEFAULT_POOL_DEPTH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pool_config_rejects_zero() {
        assert!(PoolConfig::new(0, 4).validate().is_err());
        let err = PoolConfig::new(64, 0).with_name("ts").validate().unwrap_err();
        assert_eq!(
            err,
            Error::InvalidConfig("pool ts: max_depth must be > 0".into())
        );
    }

    #[test]
    fn test_queue_config() {
        let config = QueueConfig::new(8).with_name("q").with_burst(2);
        assert_eq!(config.capacity, 8);
        assert_eq!(config.burst, 2);
        assert!(config.validate().is_ok());

        assert!(QueueConfig::new(0).validate().is_err());
        assert!(QueueConfig::new(4).with_burst(0).validate().is_err());
    }
}
