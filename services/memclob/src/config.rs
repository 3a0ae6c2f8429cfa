//! Order book configuration

use serde::{Deserialize, Serialize};

/// How post-only placements are ordered when the operations queue is replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPostOnlyPolicy {
    /// Replay post-only placements in a first pass, everything else in a
    /// second pass. Post-only orders rest before the takers that matched
    /// them are re-placed.
    PostOnlyFirst,
    /// Replay every operation in queue order. Post-only orders that now
    /// cross are rejected like any other post-only order.
    InOrder,
}

/// Configuration for the in-memory order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemClobConfig {
    /// Produce off-chain place/update/remove messages.
    pub generate_offchain_updates: bool,
    /// Replay ordering for post-only placements.
    pub replay_post_only: ReplayPostOnlyPolicy,
    /// Maximum number of buffered off-chain messages before the oldest are dropped.
    pub max_offchain_messages: usize,
}

impl Default for MemClobConfig {
    fn default() -> Self {
        Self {
            generate_offchain_updates: true,
            replay_post_only: ReplayPostOnlyPolicy::PostOnlyFirst,
            max_offchain_messages: 100_000,
        }
    }
}

impl MemClobConfig {
    pub fn with_offchain_updates(mut self, enabled: bool) -> Self {
        self.generate_offchain_updates = enabled;
        self
    }

    pub fn with_replay_post_only(mut self, policy: ReplayPostOnlyPolicy) -> Self {
        self.replay_post_only = policy;
        self
    }

    pub fn with_max_offchain_messages(mut self, max: usize) -> Self {
        self.max_offchain_messages = max;
        self
    }
}
