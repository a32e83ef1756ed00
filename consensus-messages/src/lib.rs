//! Strata consensus wire messages
//!
//! Every chain in a Strata node (the beacon chain and each shard) runs its
//! own BLS-BFT engine, but all of them share one peer-to-peer transport.
//! This crate defines what travels over that transport:
//!
//! - [`ProposeMessage`]: an opaque serialized candidate block.
//! - [`VoteMessage`]: a validator's [`Vote`] for a [`RoundKey`].
//! - [`ConsensusEnvelope`]: chain key + [`MessageKind`] tag + payload, so
//!   traffic for several chains can be multiplexed and routed without
//!   decoding the body.
//!
//! | Module      | Purpose |
//! |-------------|---------|
//! | [`message`] | Wire types and bincode ser/de helpers |
//! | [`error`]   | Crate-wide error enum |

pub mod error;
pub mod message;

pub use {
    error::{MessageError, Result},
    message::{ConsensusEnvelope, MessageKind, ProposeMessage, RoundKey, Vote, VoteMessage},
};
