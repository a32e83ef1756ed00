//! Strata BLS-BFT consensus engine
//!
//! A round-based Byzantine fault tolerant engine run once per chain (the
//! beacon chain and every shard). In each round one committee member,
//! chosen by rotation, proposes a block; the others validate it and vote
//! by signing its hash. Once more than two thirds of the committee voted,
//! any member combines the BLS shares into a single aggregate signature,
//! embeds it in the block, and hands the block to the chain for insertion.
//!
//! # Key Properties
//!
//! - **Single writer**: one actor task owns all round state for a chain.
//! - **Clock-driven rounds**: the round number follows from the last block's
//!   timestamp, so validators agree on it without round-change messages.
//! - **Compact commits**: one aggregate BLS signature plus the sorted list
//!   of contributing committee indices, with optional per-voter secp256k1
//!   signatures for systems that cannot check BLS.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    BlsBft<C, N>                       │
//! │   start / stop / load_key_from_seed / inbound_handle │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │              RoundDriver (actor)               │  │
//! │  │  RoundState ─ Phase, candidate, proposals      │  │
//! │  │  tick │ propose queue │ vote queue │ stop      │  │
//! │  └───┬───────────────┬───────────────────┬────────┘  │
//! │  ┌───▼────┐  ┌───────▼────────┐  ┌───────▼───────┐   │
//! │  │ Key    │  │ VoteCollector  │  │ Aggregator +  │   │
//! │  │ Signer │  │ + early votes  │  │ ValidationData│   │
//! │  └────────┘  └────────────────┘  └───────────────┘   │
//! └───────┬──────────────────────────────────┬───────────┘
//!         ▼                                  ▼
//!   ChainInterface                     NodeInterface
//! ```
//!
//! | Module              | Purpose |
//! |---------------------|---------|
//! | [`engine`]          | Actor, lifecycle handle, inbound routing |
//! | [`chain`]           | Chain, block and transport traits |
//! | [`signer`]          | Main (BLS) and auxiliary (secp256k1) keys |
//! | [`aggregator`]      | Signature aggregation and verification |
//! | [`validation_data`] | Codec for the block's validation field |
//! | [`vote_collector`]  | Current-round and early vote storage |
//! | [`round_state`]     | Phase and candidate bookkeeping |
//! | [`proposer`]        | Proposer rotation |
//! | [`timing`]          | Round derivation from the chain clock |
//! | [`committee`]       | Ordered committee membership |
//! | [`factory`]         | Scheme registry |

pub mod aggregator;
pub mod chain;
pub mod committee;
pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
pub mod proposer;
pub mod round_state;
pub mod signer;
pub mod timing;
pub mod validation_data;
pub mod vote_collector;

#[cfg(any(test, feature = "dev-context-only-utils"))]
pub mod test_utils;

// Re-exports for convenience
pub use {
    chain::{ChainInterface, ConsensusBlock, NodeInterface},
    committee::{Committee, CommitteeMember},
    config::{BlsBftConfig, ConfigError},
    engine::{verify_committed_block, BlsBft, ConsensusEngine, InboundHandle},
    error::{ChainError, ConsensusError, NodeError, Result},
    factory::{BlsBftFactory, EngineFactory, EngineRegistry, BLSBFT_SCHEME},
    round_state::Phase,
    signer::{derive_seed, KeySigner, PublicIdentity},
    validation_data::ValidationData,
};
