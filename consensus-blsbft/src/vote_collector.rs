//! Vote bookkeeping shared between the engine actor and vote verification
//! tasks.
//!
//! The collector holds the votes for the round the engine is currently
//! voting in, plus an early-vote buffer for round keys the engine has not
//! reached yet. Verification runs off the actor, so every mutation takes the
//! internal lock and re-checks the round key: a verified vote that finishes
//! after the engine moved on is simply dropped.
//!
//! At most one verification per validator is in flight for the current
//! round, and the early buffer holds a bounded number of votes.

use {
    parking_lot::RwLock,
    std::collections::{BTreeMap, HashMap, HashSet},
    strata_consensus_messages::{RoundKey, Vote},
};

/// Largest vote count that is *not* a quorum: `floor(2n / 3)`.
pub fn majority_threshold(committee_size: usize) -> usize {
    committee_size.saturating_mul(2) / 3
}

/// `count` votes form a quorum iff `count > floor(2n / 3)`.
pub fn is_majority(count: usize, committee_size: usize) -> bool {
    count > majority_threshold(committee_size)
}

#[derive(Debug, Default)]
struct VoteBook {
    round_key: RoundKey,
    votes: HashMap<String, Vote>,
    /// Validators whose current-round vote is being verified.
    pending: HashSet<String>,
    early: BTreeMap<RoundKey, HashMap<String, Vote>>,
}

impl VoteBook {
    fn early_len(&self) -> usize {
        self.early.values().map(HashMap::len).sum()
    }

    /// Drop one vote from the highest buffered round key if that key is
    /// above `round_key`.
    fn evict_above(&mut self, round_key: RoundKey) -> bool {
        let Some(mut highest) = self.early.last_entry() else {
            return false;
        };
        if *highest.key() <= round_key {
            return false;
        }
        let victim = highest.get().keys().next().cloned();
        if let Some(victim) = victim {
            highest.get_mut().remove(&victim);
        }
        if highest.get().is_empty() {
            highest.remove();
        }
        true
    }
}

/// Thread-safe vote store for the current round and early arrivals.
#[derive(Debug)]
pub struct VoteCollector {
    early_capacity: usize,
    book: RwLock<VoteBook>,
}

impl VoteCollector {
    /// A collector buffering at most `early_capacity` early votes.
    pub fn new(early_capacity: usize) -> Self {
        Self {
            early_capacity,
            book: RwLock::default(),
        }
    }

    /// Start collecting for `round_key`. Current votes and pending
    /// verifications are cleared and early buffers for lower round keys are
    /// pruned.
    pub fn reset(&self, round_key: RoundKey) {
        let mut book = self.book.write();
        book.round_key = round_key;
        book.votes.clear();
        book.pending.clear();
        book.early = book.early.split_off(&round_key);
    }

    /// Record `vote` from `identity` for `round_key`.
    ///
    /// Returns `false` when the round key is no longer current or the
    /// validator already voted; the first vote wins.
    pub fn add_vote(&self, round_key: RoundKey, identity: &str, vote: Vote) -> bool {
        let mut book = self.book.write();
        if book.round_key != round_key || book.votes.contains_key(identity) {
            return false;
        }
        book.votes.insert(identity.to_string(), vote);
        true
    }

    pub fn has_majority(&self, committee_size: usize) -> bool {
        is_majority(self.book.read().votes.len(), committee_size)
    }

    pub fn len(&self) -> usize {
        self.book.read().votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.book.read().votes.is_empty()
    }

    pub fn has_voted(&self, identity: &str) -> bool {
        self.book.read().votes.contains_key(identity)
    }

    /// Claim the verification slot for `identity` in `round_key`.
    ///
    /// Returns `false` when the round key is not current, the validator
    /// already voted, or one of its votes is already being verified.
    pub fn begin_verification(&self, round_key: RoundKey, identity: &str) -> bool {
        let mut book = self.book.write();
        if book.round_key != round_key || book.votes.contains_key(identity) {
            return false;
        }
        book.pending.insert(identity.to_string())
    }

    /// Release the slot taken by [`begin_verification`].
    ///
    /// [`begin_verification`]: VoteCollector::begin_verification
    pub fn end_verification(&self, round_key: RoundKey, identity: &str) {
        let mut book = self.book.write();
        if book.round_key == round_key {
            book.pending.remove(identity);
        }
    }

    pub fn pending_verifications(&self) -> usize {
        self.book.read().pending.len()
    }

    /// Copy of the current vote map, for aggregation.
    pub fn snapshot(&self) -> HashMap<String, Vote> {
        self.book.read().votes.clone()
    }

    /// Buffer a vote for a round key the engine has not reached.
    ///
    /// Votes for round keys below the current one are refused. A validator
    /// keeps its first buffered vote per round key. When the buffer is full
    /// a vote for the highest buffered key makes room, or the new vote is
    /// refused if nothing higher is held.
    pub fn add_early_vote(&self, round_key: RoundKey, identity: &str, vote: Vote) -> bool {
        let mut book = self.book.write();
        if round_key < book.round_key
            || book
                .early
                .get(&round_key)
                .is_some_and(|bucket| bucket.contains_key(identity))
        {
            return false;
        }
        if book.early_len() >= self.early_capacity && !book.evict_above(round_key) {
            return false;
        }
        book.early
            .entry(round_key)
            .or_default()
            .insert(identity.to_string(), vote);
        true
    }

    /// Remove and return every vote buffered for `round_key`.
    pub fn drain_early_votes(&self, round_key: RoundKey) -> HashMap<String, Vote> {
        self.book
            .write()
            .early
            .remove(&round_key)
            .unwrap_or_default()
    }

    /// Number of early votes buffered across all round keys.
    pub fn early_len(&self) -> usize {
        self.book.read().early_len()
    }

    /// Number of votes buffered for `round_key`.
    pub fn early_vote_count(&self, round_key: RoundKey) -> usize {
        self.book
            .read()
            .early
            .get(&round_key)
            .map_or(0, HashMap::len)
    }
}
