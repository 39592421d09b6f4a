//! Client configuration
//!
//! Validation limits applied by the request builder and the retention policy
//! of the event processor live here. Everything has a sensible default, so
//! most callers only touch the fields they care about.
//!
//! ```rust
//! use std::time::Duration;
//! use rvoip_call_automation::config::{CallAutomationConfig, EventRetentionConfig};
//!
//! let config = CallAutomationConfig::new()
//!     .with_string_max_length(1024)
//!     .with_retention(EventRetentionConfig::new(500, Duration::from_secs(60)));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.retention.max_retained_events, 500);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::GENERATED_CONTEXT_LENGTH;
use crate::errors::{CallAutomationError, Result};

/// Maximum length of free-text fields accepted by the service
pub const DEFAULT_STRING_MAX_LENGTH: usize = 5000;
/// Inclusive lower bound on the add-participant invitation timeout
pub const DEFAULT_MIN_INVITATION_TIMEOUT_SECS: u32 = 0;
/// Inclusive upper bound on the add-participant invitation timeout
pub const DEFAULT_MAX_INVITATION_TIMEOUT_SECS: u32 = 180;

/// Bounded retention of events nobody has claimed yet
///
/// When `max_retained_events` is reached the oldest unclaimed event is
/// evicted first. Events older than `retention_ttl` are dropped the next time
/// the processor is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRetentionConfig {
    pub max_retained_events: usize,
    #[serde(with = "duration_secs")]
    pub retention_ttl: Duration,
}

impl EventRetentionConfig {
    pub fn new(max_retained_events: usize, retention_ttl: Duration) -> Self {
        Self {
            max_retained_events,
            retention_ttl,
        }
    }
}

impl Default for EventRetentionConfig {
    fn default() -> Self {
        Self {
            max_retained_events: 1000,
            retention_ttl: Duration::from_secs(300),
        }
    }
}

/// Top-level configuration for a [`crate::client::CallAutomationClient`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAutomationConfig {
    /// Limit for operation context and user-to-user information, in characters
    pub string_max_length: usize,
    pub min_invitation_timeout_secs: u32,
    pub max_invitation_timeout_secs: u32,
    /// Used by `wait_for_outcome_default` on command results
    #[serde(with = "duration_secs")]
    pub default_wait_timeout: Duration,
    pub retention: EventRetentionConfig,
    /// Capacity of the all-events broadcast channel
    pub broadcast_capacity: usize,
}

impl Default for CallAutomationConfig {
    fn default() -> Self {
        Self {
            string_max_length: DEFAULT_STRING_MAX_LENGTH,
            min_invitation_timeout_secs: DEFAULT_MIN_INVITATION_TIMEOUT_SECS,
            max_invitation_timeout_secs: DEFAULT_MAX_INVITATION_TIMEOUT_SECS,
            default_wait_timeout: Duration::from_secs(240),
            retention: EventRetentionConfig::default(),
            broadcast_capacity: 256,
        }
    }
}

impl CallAutomationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_string_max_length(mut self, max_length: usize) -> Self {
        self.string_max_length = max_length;
        self
    }

    pub fn with_invitation_timeout_range(mut self, min_secs: u32, max_secs: u32) -> Self {
        self.min_invitation_timeout_secs = min_secs;
        self.max_invitation_timeout_secs = max_secs;
        self
    }

    pub fn with_default_wait_timeout(mut self, timeout: Duration) -> Self {
        self.default_wait_timeout = timeout;
        self
    }

    pub fn with_retention(mut self, retention: EventRetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Reject configurations the client cannot operate with
    pub fn validate(&self) -> Result<()> {
        // Generated operation contexts are written back into the options and
        // re-checked on the next prepare, so they must fit the limit.
        if self.string_max_length < GENERATED_CONTEXT_LENGTH {
            return Err(CallAutomationError::config(format!(
                "string_max_length must be at least {GENERATED_CONTEXT_LENGTH}, got {}",
                self.string_max_length
            )));
        }
        if self.min_invitation_timeout_secs > self.max_invitation_timeout_secs {
            return Err(CallAutomationError::config(format!(
                "invitation timeout range is inverted: {} > {}",
                self.min_invitation_timeout_secs, self.max_invitation_timeout_secs
            )));
        }
        if self.retention.max_retained_events == 0 {
            return Err(CallAutomationError::config("max_retained_events must be greater than zero"));
        }
        if self.retention.retention_ttl.is_zero() {
            return Err(CallAutomationError::config("retention_ttl must be non-zero"));
        }
        if self.broadcast_capacity == 0 {
            return Err(CallAutomationError::config("broadcast_capacity must be greater than zero"));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
