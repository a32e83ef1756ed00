//! Error types for the BLS-BFT engine and its collaborators.

use {crate::config::ConfigError, std::time::Duration, thiserror::Error};

/// Errors produced by the consensus engine.
///
/// Only [`start`](crate::BlsBft::start), [`stop`](crate::BlsBft::stop) and
/// key loading hand these back to a caller; everything raised while the
/// engine is running is logged and the offending step abandoned.
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("consensus engine already started")]
    ConsensusAlreadyStarted,

    #[error("consensus engine already stopped")]
    ConsensusAlreadyStopped,

    /// Malformed seed, or no key loaded when one is required.
    #[error("failed to load consensus key: {0}")]
    LoadKey(String),

    /// The aggregation primitive rejected the signature shares.
    #[error("failed to combine signatures: {0}")]
    CombineSignature(String),

    /// A signature was checked and did not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// A commit carries too few contributors for the committee.
    #[error("{contributors} of {committee_size} contributors is not a quorum")]
    InsufficientQuorum {
        contributors: usize,
        committee_size: usize,
    },

    /// Verification could not run at all.
    #[error("unexpected verification error: {0}")]
    UnexpectedError(String),

    #[error("failed to encode validation data: {0}")]
    EncodeValidationData(String),

    #[error("failed to decode validation data: {0}")]
    DecodeValidationData(String),

    #[error("block creation timed out after {0:?}")]
    BlockCreationTimeout(Duration),

    /// The chain refused the block for a reason other than it being a
    /// duplicate.
    #[error("chain rejected block: {0}")]
    ChainRejected(String),

    #[error("producer mismatch: expected {expected}, block produced by {actual}")]
    ProducerMismatch { expected: String, actual: String },

    #[error("malformed inbound message: {0}")]
    MalformedMessage(String),

    #[error("unknown consensus scheme: {0}")]
    UnknownScheme(String),

    #[error("validator is not a member of the current committee")]
    NotInCommittee,

    #[error("invalid committee: {0}")]
    InvalidCommittee(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<strata_consensus_messages::MessageError> for ConsensusError {
    fn from(err: strata_consensus_messages::MessageError) -> Self {
        ConsensusError::MalformedMessage(err.to_string())
    }
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors reported by the chain collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The block is already part of the chain. Benign for the engine.
    #[error("block already inserted")]
    DuplicateBlock,

    #[error("block rejected: {0}")]
    Rejected(String),

    #[error("failed to decode block: {0}")]
    Decode(String),
}

/// Errors reported by the node transport collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("no route to chain {0}")]
    UnknownChain(String),

    #[error("failed to push consensus message: {0}")]
    Push(String),
}
