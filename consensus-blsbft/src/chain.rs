//! Collaborator interfaces consumed by the engine.
//!
//! The engine never sees a concrete chain or transport. The enclosing node
//! provides a [`ChainInterface`] for block production, validation and
//! storage, and a [`NodeInterface`] for broadcasting consensus traffic.

use {
    crate::{
        committee::Committee,
        error::{ChainError, NodeError},
    },
    async_trait::async_trait,
    solana_hash::Hash,
    std::time::{Duration, SystemTime},
    strata_consensus_messages::ConsensusEnvelope,
};

/// A block as seen by the consensus engine.
///
/// The engine only needs the block's identity, its position, and access to
/// the opaque validation field it fills in.
pub trait ConsensusBlock: Clone + Send + Sync + 'static {
    /// Hash that validators sign. Must not cover the validation field.
    fn hash(&self) -> Hash;
    fn height(&self) -> u64;
    fn round(&self) -> u32;
    /// Base58 identity of the producer.
    fn producer(&self) -> &str;
    fn validation_data(&self) -> &str;
    fn set_validation_data(&mut self, data: String);

    /// Whether voters must also sign with the auxiliary scheme, e.g. when
    /// the block carries instructions checked by an ECDSA-only system.
    fn requires_aux_confirmation(&self) -> bool {
        false
    }

    fn to_bytes(&self) -> Result<Vec<u8>, ChainError>;
}

/// The chain a consensus engine produces blocks for.
#[async_trait]
pub trait ChainInterface: Send + Sync + 'static {
    type Block: ConsensusBlock;

    /// Key identifying the chain in consensus envelopes.
    fn chain_key(&self) -> &str;

    fn is_ready(&self) -> bool;

    fn current_height(&self) -> u64;

    /// Build a new block for `round` on top of the current head. May be
    /// slow; the engine bounds it with [`max_block_create_time`].
    ///
    /// [`max_block_create_time`]: ChainInterface::max_block_create_time
    async fn create_new_block(&self, round: u32) -> Result<Self::Block, ChainError>;

    /// Check a received candidate's contents before voting on it.
    async fn validate_pre_sign_block(&self, block: &Self::Block) -> Result<(), ChainError>;

    /// Persist a committed block and announce it to peers. Returns
    /// [`ChainError::DuplicateBlock`] if it is already stored.
    async fn insert_and_broadcast_block(&self, block: Self::Block) -> Result<(), ChainError>;

    fn committee(&self) -> Committee;

    fn committee_size(&self) -> usize {
        self.committee().len()
    }

    fn committee_index_of(&self, identity: &str) -> Option<usize> {
        self.committee().index_of(identity)
    }

    /// Committee index of the producer of the last accepted block.
    fn last_proposer_index(&self) -> usize;

    fn last_block_timestamp(&self) -> SystemTime;

    fn min_block_interval(&self) -> Duration;

    fn max_block_create_time(&self) -> Duration;

    fn unmarshal_block(&self, bytes: &[u8]) -> Result<Self::Block, ChainError>;
}

/// Outbound transport for consensus traffic.
#[async_trait]
pub trait NodeInterface: Send + Sync + 'static {
    /// Deliver `message` to the peers running `chain_key`. No delivery
    /// guarantee.
    async fn push_message_to_chain(
        &self,
        message: ConsensusEnvelope,
        chain_key: &str,
    ) -> Result<(), NodeError>;
}
