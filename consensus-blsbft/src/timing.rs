//! Round timing derived from the chain clock.
//!
//! Validators never exchange round-change messages. Each derives the current
//! round from the timestamp of the last accepted block: after a minimum
//! block interval has passed, the window is sliced into fixed-length rounds.
//!
//! ```text
//!   last block       min interval          round 0        round 1
//!       |<------------------------->|<-------------->|<-------------->| ...
//! ```

use {
    std::time::{Duration, SystemTime},
    strata_consensus_messages::RoundKey,
};

/// A snapshot of the timing inputs for one height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundClock {
    pub last_block_timestamp: SystemTime,
    pub min_block_interval: Duration,
    pub round_timeout: Duration,
}

impl RoundClock {
    pub fn new(
        last_block_timestamp: SystemTime,
        min_block_interval: Duration,
        round_timeout: Duration,
    ) -> Self {
        Self {
            last_block_timestamp,
            min_block_interval,
            round_timeout,
        }
    }

    /// Time elapsed since the last block. Zero if the block timestamp lies
    /// in the future.
    pub fn since_last_block(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_block_timestamp)
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the minimum inter-block interval is still running at `now`.
    pub fn is_throttled(&self, now: SystemTime) -> bool {
        self.since_last_block(now) < self.min_block_interval
    }

    /// The round in effect at `now`:
    /// `floor(max(0, since_last_block - min_block_interval) / round_timeout)`.
    pub fn round_at(&self, now: SystemTime) -> u32 {
        let elapsed = self
            .since_last_block(now)
            .saturating_sub(self.min_block_interval);
        let round = elapsed
            .as_nanos()
            .checked_div(self.round_timeout.as_nanos())
            .unwrap_or(0);
        u32::try_from(round).unwrap_or(u32::MAX)
    }

    /// Whether traffic for `key` is near enough to buffer. Only
    /// `next_height` and the height after it qualify. At `next_height` the
    /// round may lead the round in effect at `now` by `max_round_lead`; at
    /// the following height it is counted from zero.
    pub fn admits(
        &self,
        key: RoundKey,
        next_height: u64,
        max_round_lead: u32,
        now: SystemTime,
    ) -> bool {
        match key.height.checked_sub(next_height) {
            Some(0) => key.round <= self.round_at(now).saturating_add(max_round_lead),
            Some(1) => key.round <= max_round_lead,
            _ => false,
        }
    }
}
