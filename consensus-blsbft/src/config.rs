//! BLS-BFT consensus configuration.
//!
//! Defines the timer cadence, the per-round time window, and inbound queue
//! limits. Chain-dependent timings (minimum block interval, maximum block
//! creation time) are supplied by the chain collaborator instead.

use std::time::Duration;

/// Configuration for a BLS-BFT engine instance.
///
/// All durations are in milliseconds.
#[derive(Debug, Clone)]
pub struct BlsBftConfig {
    /// Interval between timer ticks driving phase dispatch.
    /// Default: 100.
    pub tick_interval_ms: u64,

    /// Length of one round's time window. When the window elapses without a
    /// commit, the engine moves on to the next round.
    /// Default: 10_000.
    pub round_timeout_ms: u64,

    /// Capacity of the inbound proposal queue, and of the buffer holding
    /// proposals for rounds not yet reached. Proposals arriving while the
    /// queue is full are dropped.
    /// Default: 100.
    pub propose_queue_capacity: usize,

    /// Capacity of the inbound vote queue.
    /// Default: 1_000.
    pub vote_queue_capacity: usize,

    /// Maximum encoded size of an outbound consensus envelope in bytes.
    /// Default: 1_048_576 (1 MiB).
    pub max_message_size: usize,

    /// How many rounds past the current one a proposal or vote may target
    /// and still be buffered. Messages for the next height count rounds
    /// from zero; anything further ahead is dropped.
    /// Default: 8.
    pub max_round_lookahead: u32,

    /// Total number of early votes held across all future round keys.
    /// Default: 1_000.
    pub early_vote_capacity: usize,
}

impl Default for BlsBftConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            round_timeout_ms: 10_000,
            propose_queue_capacity: 100,
            vote_queue_capacity: 1_000,
            max_message_size: 1_048_576,
            max_round_lookahead: 8,
            early_vote_capacity: 1_000,
        }
    }
}

impl BlsBftConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval);
        }
        if self.round_timeout_ms <= self.tick_interval_ms {
            return Err(ConfigError::RoundTimeoutTooShort {
                round_timeout_ms: self.round_timeout_ms,
                tick_interval_ms: self.tick_interval_ms,
            });
        }
        if self.propose_queue_capacity == 0
            || self.vote_queue_capacity == 0
            || self.early_vote_capacity == 0
        {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidMaxMessageSize);
        }
        Ok(())
    }
}

/// Errors in BLS-BFT configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("tick_interval_ms must be > 0")]
    InvalidTickInterval,
    #[error("round_timeout_ms ({round_timeout_ms}) must exceed tick_interval_ms ({tick_interval_ms})")]
    RoundTimeoutTooShort {
        round_timeout_ms: u64,
        tick_interval_ms: u64,
    },
    #[error("inbound queue and buffer capacities must be > 0")]
    InvalidQueueCapacity,
    #[error("max_message_size must be > 0")]
    InvalidMaxMessageSize,
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    #[test]
    fn test_default_config() {
        let config = BlsBftConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.round_timeout(), Duration::from_secs(10));
        assert_eq!(config.propose_queue_capacity, 100);
        assert_eq!(config.vote_queue_capacity, 1_000);
        assert_eq!(config.max_round_lookahead, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tick_must_be_sub_round() {
        let config = BlsBftConfig {
            tick_interval_ms: 500,
            round_timeout_ms: 500,
            ..BlsBftConfig::default()
        };
        assert_matches!(
            config.validate(),
            Err(ConfigError::RoundTimeoutTooShort {
                round_timeout_ms: 500,
                tick_interval_ms: 500
            })
        );
    }

    #[test]
    fn test_invalid_tick_interval() {
        let mut config = BlsBftConfig::default();
        config.tick_interval_ms = 0;
        assert_matches!(config.validate(), Err(ConfigError::InvalidTickInterval));
    }

    #[test]
    fn test_invalid_queue_capacity() {
        let mut config = BlsBftConfig::default();
        config.vote_queue_capacity = 0;
        assert_matches!(config.validate(), Err(ConfigError::InvalidQueueCapacity));

        let config = BlsBftConfig {
            early_vote_capacity: 0,
            ..BlsBftConfig::default()
        };
        assert_matches!(config.validate(), Err(ConfigError::InvalidQueueCapacity));
    }

    #[test]
    fn test_invalid_max_message_size() {
        let mut config = BlsBftConfig::default();
        config.max_message_size = 0;
        assert_matches!(config.validate(), Err(ConfigError::InvalidMaxMessageSize));
    }
}
