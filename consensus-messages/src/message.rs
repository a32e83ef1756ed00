//! Message types and serialization for consensus network communication.
//!
//! All messages are serialized with bincode for compact wire representation.
//! Consensus traffic for every chain shares one transport: each payload is
//! wrapped in a [`ConsensusEnvelope`] that names the chain it belongs to and
//! tags the payload type, so the receiving node can route it to the right
//! engine without decoding the body.

use {
    crate::error::{MessageError, Result},
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

// ── Round key ───────────────────────────────────────────────────────────────

/// Composite `(height, round)` identifier correlating proposals and votes.
///
/// Orders by height first, then round. On the wire it travels as the string
/// `"<height>_<round>"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoundKey {
    pub height: u64,
    pub round: u32,
}

impl RoundKey {
    pub const fn new(height: u64, round: u32) -> Self {
        Self { height, round }
    }
}

impl fmt::Display for RoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.height, self.round)
    }
}

impl FromStr for RoundKey {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || MessageError::MalformedRoundKey(s.to_string());
        let (height, round) = s.split_once('_').ok_or_else(malformed)?;
        Ok(Self {
            height: height.parse().map_err(|_| malformed())?,
            round: round.parse().map_err(|_| malformed())?,
        })
    }
}

// ── Vote ────────────────────────────────────────────────────────────────────

/// A single validator's vote on a candidate block.
///
/// `confirmation` is the voter's auxiliary-scheme signature over
/// `sha256(block_hash ‖ main_signature ‖ aux_signature)`, binding both
/// signatures to the voter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// BLS share over the block hash.
    pub main_signature: Vec<u8>,
    /// Auxiliary-scheme signature over the block hash; empty when the block
    /// does not require auxiliary confirmation.
    pub aux_signature: Vec<u8>,
    pub confirmation: Vec<u8>,
}

// ── Payloads ────────────────────────────────────────────────────────────────

/// A candidate block broadcast by the round's proposer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposeMessage {
    /// Serialized block; only the chain layer knows how to decode it.
    pub block: Vec<u8>,
}

/// A vote broadcast by a committee member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    /// Round key in `"<height>_<round>"` form.
    pub round_key: String,
    /// Base58 identity of the voter.
    pub validator: String,
    pub vote: Vote,
}

impl VoteMessage {
    pub fn new(round_key: RoundKey, validator: impl Into<String>, vote: Vote) -> Self {
        Self {
            round_key: round_key.to_string(),
            validator: validator.into(),
            vote,
        }
    }

    /// Parse the carried round key.
    pub fn parsed_round_key(&self) -> Result<RoundKey> {
        self.round_key.parse()
    }
}

// ── Envelope ────────────────────────────────────────────────────────────────

/// Type tag carried by every [`ConsensusEnvelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Propose,
    Vote,
}

impl MessageKind {
    /// Return a human-readable tag for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::Vote => "vote",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level consensus wire message.
///
/// The payload is the bincode encoding of a [`ProposeMessage`] or
/// [`VoteMessage`] according to `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusEnvelope {
    /// Key of the chain whose engine should consume this message.
    pub chain_key: String,
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl ConsensusEnvelope {
    /// Wrap a proposal for `chain_key`.
    pub fn propose(chain_key: impl Into<String>, msg: &ProposeMessage) -> Result<Self> {
        Ok(Self {
            chain_key: chain_key.into(),
            kind: MessageKind::Propose,
            payload: bincode::serialize(msg)?,
        })
    }

    /// Wrap a vote for `chain_key`.
    pub fn vote(chain_key: impl Into<String>, msg: &VoteMessage) -> Result<Self> {
        Ok(Self {
            chain_key: chain_key.into(),
            kind: MessageKind::Vote,
            payload: bincode::serialize(msg)?,
        })
    }

    /// Decode the payload as a proposal.
    pub fn decode_propose(&self) -> Result<ProposeMessage> {
        self.expect_kind(MessageKind::Propose)?;
        Ok(bincode::deserialize(&self.payload)?)
    }

    /// Decode the payload as a vote.
    pub fn decode_vote(&self) -> Result<VoteMessage> {
        self.expect_kind(MessageKind::Vote)?;
        Ok(bincode::deserialize(&self.payload)?)
    }

    /// Serialize the whole envelope, rejecting encodings above `max_size`.
    pub fn to_bytes(&self, max_size: usize) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(self)?;
        if bytes.len() > max_size {
            return Err(MessageError::MessageTooLarge {
                size: bytes.len(),
                max: max_size,
            });
        }
        Ok(bytes)
    }

    /// Deserialize an envelope received from the transport.
    pub fn from_bytes(data: &[u8], max_size: usize) -> Result<Self> {
        if data.len() > max_size {
            return Err(MessageError::MessageTooLarge {
                size: data.len(),
                max: max_size,
            });
        }
        bincode::deserialize(data).map_err(MessageError::Serialization)
    }

    fn expect_kind(&self, expected: MessageKind) -> Result<()> {
        if self.kind != expected {
            return Err(MessageError::WrongKind {
                expected: expected.as_str(),
                actual: self.kind.as_str(),
            });
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches, test_case::test_case};

    fn sample_vote() -> Vote {
        Vote {
            main_signature: vec![1; 96],
            aux_signature: vec![],
            confirmation: vec![3; 64],
        }
    }

    #[test_case("5_0", RoundKey::new(5, 0) ; "round zero")]
    #[test_case("18446744073709551615_7", RoundKey::new(u64::MAX, 7) ; "max height")]
    fn test_round_key_parse(s: &str, expected: RoundKey) {
        assert_eq!(s.parse::<RoundKey>().unwrap(), expected);
        assert_eq!(expected.to_string(), s);
    }

    #[test_case("" ; "empty")]
    #[test_case("5" ; "missing round")]
    #[test_case("a_1" ; "non numeric height")]
    #[test_case("5_-1" ; "negative round")]
    #[test_case("5_1_2" ; "extra component")]
    fn test_round_key_malformed(s: &str) {
        assert_matches!(s.parse::<RoundKey>(), Err(MessageError::MalformedRoundKey(_)));
    }

    #[test]
    fn test_round_key_ordering() {
        assert!(RoundKey::new(5, 3) < RoundKey::new(6, 0));
        assert!(RoundKey::new(6, 0) < RoundKey::new(6, 1));
        assert_eq!(RoundKey::new(6, 1), RoundKey::new(6, 1));
    }

    #[test]
    fn test_vote_envelope_roundtrip() {
        let msg = VoteMessage::new(RoundKey::new(9, 2), "validator-a", sample_vote());
        let env = ConsensusEnvelope::vote("shard-1", &msg).unwrap();
        assert_eq!(env.kind, MessageKind::Vote);

        let bytes = env.to_bytes(1_048_576).unwrap();
        let decoded = ConsensusEnvelope::from_bytes(&bytes, 1_048_576).unwrap();
        assert_eq!(decoded.chain_key, "shard-1");
        let decoded_vote = decoded.decode_vote().unwrap();
        assert_eq!(decoded_vote, msg);
        assert_eq!(decoded_vote.parsed_round_key().unwrap(), RoundKey::new(9, 2));
    }

    #[test]
    fn test_decode_wrong_kind() {
        let env = ConsensusEnvelope::propose("beacon", &ProposeMessage { block: vec![7; 10] })
            .unwrap();
        assert_matches!(
            env.decode_vote(),
            Err(MessageError::WrongKind {
                expected: "vote",
                actual: "propose"
            })
        );
    }

    #[test]
    fn test_garbage_payload_is_error() {
        let env = ConsensusEnvelope {
            chain_key: "beacon".to_string(),
            kind: MessageKind::Vote,
            payload: vec![0xff, 0x01],
        };
        assert_matches!(env.decode_vote(), Err(MessageError::Serialization(_)));
    }

    #[test]
    fn test_message_too_large() {
        let env = ConsensusEnvelope::propose("beacon", &ProposeMessage { block: vec![0; 64] })
            .unwrap();
        assert_matches!(env.to_bytes(8), Err(MessageError::MessageTooLarge { max: 8, .. }));
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(MessageKind::Propose.to_string(), "propose");
        assert_eq!(MessageKind::Vote.as_str(), "vote");
    }
}
