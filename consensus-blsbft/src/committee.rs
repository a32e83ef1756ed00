//! Committee membership.
//!
//! A committee is the ordered list of validators allowed to propose and vote
//! in the current round. Order is significant: proposer selection and
//! index-based signature verification both address members by position, so
//! unlike a stake-sorted validator set the input order is kept verbatim.

use {
    crate::error::{ConsensusError, Result},
    blst::min_pk::PublicKey as MainPublicKey,
    libsecp256k1::PublicKey as AuxPublicKey,
    std::{collections::HashMap, fmt},
};

/// Length of a compressed main-scheme (BLS12-381 G1) public key.
pub const MAIN_PUBKEY_LEN: usize = 48;
/// Length of a compressed auxiliary-scheme (secp256k1) public key.
pub const AUX_PUBKEY_LEN: usize = 33;
/// Length of the raw bytes behind a textual identity.
pub const IDENTITY_LEN: usize = MAIN_PUBKEY_LEN + AUX_PUBKEY_LEN;

/// Build the base58 textual identity for a key pair.
pub fn encode_identity(main_key: &[u8; MAIN_PUBKEY_LEN], aux_key: &[u8; AUX_PUBKEY_LEN]) -> String {
    let mut raw = Vec::with_capacity(IDENTITY_LEN);
    raw.extend_from_slice(main_key);
    raw.extend_from_slice(aux_key);
    bs58::encode(raw).into_string()
}

/// A single committee member with both of its consensus public keys.
#[derive(Clone)]
pub struct CommitteeMember {
    identity: String,
    main_key: MainPublicKey,
    aux_key: AuxPublicKey,
}

impl CommitteeMember {
    /// Build a member from raw compressed public keys.
    pub fn from_keys(main_key: &[u8], aux_key: &[u8]) -> Result<Self> {
        let main_bytes: [u8; MAIN_PUBKEY_LEN] = main_key.try_into().map_err(|_| {
            ConsensusError::InvalidCommittee(format!(
                "main public key must be {MAIN_PUBKEY_LEN} bytes, got {}",
                main_key.len()
            ))
        })?;
        let aux_bytes: [u8; AUX_PUBKEY_LEN] = aux_key.try_into().map_err(|_| {
            ConsensusError::InvalidCommittee(format!(
                "aux public key must be {AUX_PUBKEY_LEN} bytes, got {}",
                aux_key.len()
            ))
        })?;
        let main = MainPublicKey::key_validate(&main_bytes)
            .map_err(|e| ConsensusError::InvalidCommittee(format!("main public key: {e:?}")))?;
        let aux = AuxPublicKey::parse_compressed(&aux_bytes)
            .map_err(|e| ConsensusError::InvalidCommittee(format!("aux public key: {e:?}")))?;
        Ok(Self {
            identity: encode_identity(&main_bytes, &aux_bytes),
            main_key: main,
            aux_key: aux,
        })
    }

    /// Reconstruct a member from its base58 identity string.
    pub fn from_identity(identity: &str) -> Result<Self> {
        let raw = bs58::decode(identity)
            .into_vec()
            .map_err(|e| ConsensusError::InvalidCommittee(format!("identity {identity}: {e}")))?;
        if raw.len() != IDENTITY_LEN {
            return Err(ConsensusError::InvalidCommittee(format!(
                "identity {identity} decodes to {} bytes",
                raw.len()
            )));
        }
        let (main, aux) = raw.split_at(MAIN_PUBKEY_LEN);
        Self::from_keys(main, aux)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn main_key(&self) -> &MainPublicKey {
        &self.main_key
    }

    pub fn aux_key(&self) -> &AuxPublicKey {
        &self.aux_key
    }
}

impl fmt::Debug for CommitteeMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommitteeMember").field(&self.identity).finish()
    }
}

impl PartialEq for CommitteeMember {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for CommitteeMember {}

/// An ordered committee of validators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Committee {
    members: Vec<CommitteeMember>,
    /// Fast lookup from identity to position in `members`.
    index: HashMap<String, usize>,
}

impl Committee {
    /// Create a committee, keeping the given order. Duplicate identities are
    /// rejected since they would make index lookups ambiguous.
    pub fn new(members: Vec<CommitteeMember>) -> Result<Self> {
        let mut index = HashMap::with_capacity(members.len());
        for (i, member) in members.iter().enumerate() {
            if index.insert(member.identity.clone(), i).is_some() {
                return Err(ConsensusError::InvalidCommittee(format!(
                    "duplicate member {}",
                    member.identity
                )));
            }
        }
        Ok(Self { members, index })
    }

    /// Build a committee from base58 identity strings.
    pub fn from_identities<S: AsRef<str>>(identities: &[S]) -> Result<Self> {
        let members = identities
            .iter()
            .map(|id| CommitteeMember::from_identity(id.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(members)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CommitteeMember> {
        self.members.get(index)
    }

    /// Position of `identity` in the committee.
    pub fn index_of(&self, identity: &str) -> Option<usize> {
        self.index.get(identity).copied()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.index.contains_key(identity)
    }
}
