//! Per-chain round state owned by the engine actor.
//!
//! Nothing in here is shared: the actor is the only writer, so the state
//! needs no locking. Votes live in the
//! [`VoteCollector`](crate::vote_collector::VoteCollector) because
//! verification tasks write to them concurrently.

use {
    crate::{committee::Committee, validation_data::ValidationData},
    solana_hash::Hash,
    std::{collections::BTreeMap, fmt, sync::Arc},
    strata_consensus_messages::RoundKey,
};

/// The step within a single consensus round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No phase set; the next tick starts a new round.
    #[default]
    Unset,
    /// Waiting for the round to begin.
    NewRound,
    /// This validator produces the block.
    Propose,
    /// Waiting for the proposer's block.
    Listen,
    /// Voting on, and collecting votes for, the candidate.
    Vote,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Unset => write!(f, "Unset"),
            Phase::NewRound => write!(f, "NewRound"),
            Phase::Propose => write!(f, "Propose"),
            Phase::Listen => write!(f, "Listen"),
            Phase::Vote => write!(f, "Vote"),
        }
    }
}

/// Where an inbound vote should go relative to the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDisposition {
    /// For a round already left behind; drop it.
    Stale,
    /// For a later round, or the current one before its candidate is known.
    Early,
    /// For the current candidate; verify and collect.
    Current,
}

/// Round state for one chain.
#[derive(Debug, Clone)]
pub struct RoundState<B> {
    pub phase: Phase,
    pub target_height: u64,
    pub round: u32,

    // -- Candidate --
    pub candidate_block: Option<B>,
    pub candidate_hash: Option<Hash>,
    pub candidate_validation: Option<ValidationData>,
    /// Whether this validator has already sent its vote this round.
    pub voted: bool,

    pub last_proposer_index: usize,
    /// Committee snapshot taken when the round started.
    pub committee: Arc<Committee>,

    /// Proposals received for this round or later ones, first arrival kept.
    proposals: BTreeMap<RoundKey, B>,
}

impl<B> Default for RoundState<B> {
    fn default() -> Self {
        Self {
            phase: Phase::Unset,
            target_height: 0,
            round: 0,
            candidate_block: None,
            candidate_hash: None,
            candidate_validation: None,
            voted: false,
            last_proposer_index: 0,
            committee: Arc::default(),
            proposals: BTreeMap::new(),
        }
    }
}

impl<B> RoundState<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn round_key(&self) -> RoundKey {
        RoundKey::new(self.target_height, self.round)
    }

    /// Reset for `(target_height, round)`. The phase is left to the caller.
    /// Buffered proposals for lower round keys are pruned.
    pub fn reset(
        &mut self,
        target_height: u64,
        round: u32,
        committee: Committee,
        last_proposer_index: usize,
    ) {
        self.target_height = target_height;
        self.round = round;
        self.candidate_block = None;
        self.candidate_hash = None;
        self.candidate_validation = None;
        self.voted = false;
        self.last_proposer_index = last_proposer_index;
        self.committee = Arc::new(committee);
        self.proposals = self.proposals.split_off(&self.round_key());
    }

    pub fn has_candidate(&self) -> bool {
        self.candidate_block.is_some()
    }

    pub fn set_candidate(&mut self, block: B, hash: Hash, validation: ValidationData) {
        self.candidate_block = Some(block);
        self.candidate_hash = Some(hash);
        self.candidate_validation = Some(validation);
    }

    /// Whether a proposal for `key` should be buffered: it targets the
    /// current round with no candidate chosen yet, or a later round.
    pub fn accepts_proposal(&self, key: RoundKey) -> bool {
        let current = self.round_key();
        (key == current && !self.has_candidate()) || key > current
    }

    /// Buffer `block` under `key`, holding at most `capacity` proposals.
    ///
    /// Returns `false` if a proposal for the key is already held, or if the
    /// buffer is full and every held key is at or below `key`. Otherwise a
    /// full buffer gives up its highest key.
    pub fn buffer_proposal(&mut self, key: RoundKey, block: B, capacity: usize) -> bool {
        if self.proposals.contains_key(&key) {
            return false;
        }
        if self.proposals.len() >= capacity {
            match self.proposals.last_entry() {
                Some(highest) if *highest.key() > key => {
                    highest.remove();
                }
                _ => return false,
            }
        }
        self.proposals.insert(key, block);
        true
    }

    pub fn take_proposal(&mut self, key: RoundKey) -> Option<B> {
        self.proposals.remove(&key)
    }

    pub fn buffered_proposals(&self) -> usize {
        self.proposals.len()
    }

    pub fn classify_vote(&self, key: RoundKey) -> VoteDisposition {
        let current = self.round_key();
        if key < current {
            VoteDisposition::Stale
        } else if key > current || self.candidate_hash.is_none() {
            VoteDisposition::Early
        } else {
            VoteDisposition::Current
        }
    }
}
