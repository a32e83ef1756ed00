//! The BLS-BFT consensus engine.
//!
//! One actor task per chain drives the round state machine:
//!
//! ```text
//!   NewRound ──▶ Propose ──┐
//!      ▲    └──▶ Listen ───┴──▶ Vote ──(quorum)──▶ commit ──┐
//!      └────────────────────────────────────────────────────┘
//! ```
//!
//! The actor wakes on a periodic tick, an inbound proposal, an inbound vote,
//! or the stop signal, and handles one event at a time. It is the only
//! writer of [`RoundState`]. Three kinds of work leave the actor:
//!
//! - vote signature checks run on the blocking pool and feed the shared
//!   [`VoteCollector`], which drops results for a round key that is no
//!   longer current;
//! - outbound broadcasts are detached tasks;
//! - block creation is a spawned task raced against the chain's maximum
//!   creation time and aborted if the timer wins.

use {
    crate::{
        aggregator,
        chain::{ChainInterface, ConsensusBlock, NodeInterface},
        committee::Committee,
        config::BlsBftConfig,
        error::{ChainError, ConsensusError, Result},
        proposer,
        round_state::{Phase, RoundState, VoteDisposition},
        signer::{KeySigner, PublicIdentity},
        timing::RoundClock,
        validation_data::{self, ValidationData},
        vote_collector::{self, VoteCollector},
    },
    log::*,
    parking_lot::{Mutex, RwLock},
    std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::SystemTime,
    },
    strata_consensus_messages::{
        ConsensusEnvelope, MessageKind, ProposeMessage, RoundKey, Vote, VoteMessage,
    },
    tokio::{
        sync::{mpsc, oneshot},
        time::{self, MissedTickBehavior},
    },
};

/// Consensus engine surface used by the enclosing node.
///
/// Object safe so a node can hold engines for several schemes behind
/// `Box<dyn ConsensusEngine>`.
pub trait ConsensusEngine: Send + Sync {
    /// Spawn the engine actor. Requires a loaded key.
    fn start(&self) -> Result<()>;
    /// Signal the actor to exit. A stopped engine cannot be restarted.
    fn stop(&self) -> Result<()>;
    /// Route an inbound envelope to the proposal or vote queue.
    fn process_inbound_message(&self, envelope: ConsensusEnvelope) -> Result<()>;
    fn load_key_from_seed(&self, seed: &[u8]) -> Result<()>;
    fn public_identity(&self) -> Option<PublicIdentity>;
    /// Whether the engine is actively taking part in consensus.
    fn is_ongoing(&self) -> bool;
    fn inbound_handle(&self) -> InboundHandle;
}

// ── Inbound routing ─────────────────────────────────────────────────────────

/// Cloneable sender side of an engine's inbound queues.
///
/// Handed to the transport so it can deliver consensus traffic without
/// holding the engine itself.
#[derive(Debug, Clone)]
pub struct InboundHandle {
    chain_key: Arc<str>,
    max_message_size: usize,
    propose_tx: mpsc::Sender<ProposeMessage>,
    vote_tx: mpsc::Sender<VoteMessage>,
}

impl InboundHandle {
    pub fn chain_key(&self) -> &str {
        &self.chain_key
    }

    /// Demultiplex `envelope` into the proposal or vote queue.
    ///
    /// Envelopes for another chain are ignored. A full queue drops the
    /// message with a warning instead of blocking the transport.
    pub fn dispatch(&self, envelope: ConsensusEnvelope) -> Result<()> {
        if envelope.chain_key != *self.chain_key {
            debug!(
                "BlsBft[{}]: ignoring {} for chain {}",
                self.chain_key, envelope.kind, envelope.chain_key
            );
            return Ok(());
        }
        let sent = match envelope.kind {
            MessageKind::Propose => self
                .propose_tx
                .try_send(envelope.decode_propose()?)
                .map_err(|e| e.to_string()),
            MessageKind::Vote => self
                .vote_tx
                .try_send(envelope.decode_vote()?)
                .map_err(|e| e.to_string()),
        };
        if let Err(e) = sent {
            warn!(
                "BlsBft[{}]: dropping inbound {}: {e}",
                self.chain_key, envelope.kind
            );
        }
        Ok(())
    }

    /// Decode a raw envelope from the transport and dispatch it.
    pub fn dispatch_bytes(&self, data: &[u8]) -> Result<()> {
        self.dispatch(ConsensusEnvelope::from_bytes(data, self.max_message_size)?)
    }
}

// ── Engine handle ───────────────────────────────────────────────────────────

enum Lifecycle {
    Idle {
        propose_rx: mpsc::Receiver<ProposeMessage>,
        vote_rx: mpsc::Receiver<VoteMessage>,
    },
    Running {
        stop_tx: oneshot::Sender<()>,
    },
    Stopped,
}

/// A BLS-BFT engine for one chain.
pub struct BlsBft<C: ChainInterface, N: NodeInterface> {
    config: BlsBftConfig,
    chain: Arc<C>,
    node: Arc<N>,
    signer: Arc<RwLock<Option<Arc<KeySigner>>>>,
    ongoing: Arc<AtomicBool>,
    inbound: InboundHandle,
    lifecycle: Mutex<Lifecycle>,
}

impl<C: ChainInterface, N: NodeInterface> BlsBft<C, N> {
    pub fn new(config: BlsBftConfig, chain: Arc<C>, node: Arc<N>) -> Result<Self> {
        config.validate()?;
        let (propose_tx, propose_rx) = mpsc::channel(config.propose_queue_capacity);
        let (vote_tx, vote_rx) = mpsc::channel(config.vote_queue_capacity);
        let inbound = InboundHandle {
            chain_key: Arc::from(chain.chain_key()),
            max_message_size: config.max_message_size,
            propose_tx,
            vote_tx,
        };
        Ok(Self {
            config,
            chain,
            node,
            signer: Arc::new(RwLock::new(None)),
            ongoing: Arc::new(AtomicBool::new(false)),
            inbound,
            lifecycle: Mutex::new(Lifecycle::Idle {
                propose_rx,
                vote_rx,
            }),
        })
    }

    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match &*lifecycle {
            Lifecycle::Running { .. } => return Err(ConsensusError::ConsensusAlreadyStarted),
            Lifecycle::Stopped => return Err(ConsensusError::ConsensusAlreadyStopped),
            Lifecycle::Idle { .. } => {}
        }
        if self.signer.read().is_none() {
            return Err(ConsensusError::LoadKey("no consensus key loaded".to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ConsensusError::UnexpectedError(format!("engine requires a tokio runtime: {e}"))
        })?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let Lifecycle::Idle {
            propose_rx,
            vote_rx,
        } = std::mem::replace(&mut *lifecycle, Lifecycle::Running { stop_tx })
        else {
            return Err(ConsensusError::ConsensusAlreadyStarted);
        };

        let driver = RoundDriver::new(
            self.config.clone(),
            Arc::clone(&self.chain),
            Arc::clone(&self.node),
            Arc::clone(&self.signer),
            Arc::clone(&self.ongoing),
        );
        runtime.spawn(driver.run(stop_rx, propose_rx, vote_rx));
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running { stop_tx } => {
                // The actor may already be gone; nothing to do then.
                let _ = stop_tx.send(());
                self.ongoing.store(false, Ordering::Relaxed);
                info!("BlsBft[{}]: stop requested", self.chain.chain_key());
                Ok(())
            }
            idle @ Lifecycle::Idle { .. } => {
                *lifecycle = idle;
                Err(ConsensusError::ConsensusAlreadyStopped)
            }
            Lifecycle::Stopped => Err(ConsensusError::ConsensusAlreadyStopped),
        }
    }

    pub fn process_inbound_message(&self, envelope: ConsensusEnvelope) -> Result<()> {
        self.inbound.dispatch(envelope)
    }

    /// Load the validator's keys. Takes effect on the next tick if the
    /// engine is already running.
    pub fn load_key_from_seed(&self, seed: &[u8]) -> Result<()> {
        let signer = KeySigner::from_seed(seed)?;
        info!(
            "BlsBft[{}]: loaded consensus key {}",
            self.chain.chain_key(),
            signer.public_key().identity
        );
        *self.signer.write() = Some(Arc::new(signer));
        Ok(())
    }

    pub fn public_identity(&self) -> Option<PublicIdentity> {
        self.signer.read().as_ref().map(|s| s.public_key().clone())
    }

    pub fn is_ongoing(&self) -> bool {
        self.ongoing.load(Ordering::Relaxed)
    }

    pub fn inbound_handle(&self) -> InboundHandle {
        self.inbound.clone()
    }

    pub fn config(&self) -> &BlsBftConfig {
        &self.config
    }
}

impl<C: ChainInterface, N: NodeInterface> ConsensusEngine for BlsBft<C, N> {
    fn start(&self) -> Result<()> {
        BlsBft::start(self)
    }

    fn stop(&self) -> Result<()> {
        BlsBft::stop(self)
    }

    fn process_inbound_message(&self, envelope: ConsensusEnvelope) -> Result<()> {
        BlsBft::process_inbound_message(self, envelope)
    }

    fn load_key_from_seed(&self, seed: &[u8]) -> Result<()> {
        BlsBft::load_key_from_seed(self, seed)
    }

    fn public_identity(&self) -> Option<PublicIdentity> {
        BlsBft::public_identity(self)
    }

    fn is_ongoing(&self) -> bool {
        BlsBft::is_ongoing(self)
    }

    fn inbound_handle(&self) -> InboundHandle {
        BlsBft::inbound_handle(self)
    }
}

/// Re-check a sealed block's validation data against `committee`: a quorum
/// of contributors, the aggregate over them, the producer signature, and
/// every auxiliary signature present.
pub fn verify_committed_block<B: ConsensusBlock>(block: &B, committee: &Committee) -> Result<()> {
    let hash = block.hash();
    let data = validation_data::decode(block.validation_data())?;
    if !vote_collector::is_majority(data.contributor_indices.len(), committee.len()) {
        return Err(ConsensusError::InsufficientQuorum {
            contributors: data.contributor_indices.len(),
            committee_size: committee.len(),
        });
    }
    aggregator::verify_aggregate_main(
        hash.as_ref(),
        &data.aggregate_main_sig,
        &data.contributor_indices,
        committee,
    )?;
    let producer = committee
        .index_of(block.producer())
        .ok_or(ConsensusError::NotInCommittee)?;
    aggregator::verify_single_main(hash.as_ref(), &data.producer_main_sig, producer, committee)?;
    for (&idx, aux) in data
        .contributor_indices
        .iter()
        .zip(&data.aggregate_aux_sigs)
        .filter(|(_, aux)| !aux.is_empty())
    {
        let member = committee.get(idx).ok_or_else(|| {
            ConsensusError::UnexpectedError(format!("contributor index {idx} out of range"))
        })?;
        aggregator::verify_single_aux(hash.as_ref(), aux, member.aux_key())?;
    }
    Ok(())
}

// ── Actor ───────────────────────────────────────────────────────────────────

/// The engine actor. Owns the round state for one chain.
pub(crate) struct RoundDriver<C: ChainInterface, N: NodeInterface> {
    tag: String,
    config: BlsBftConfig,
    chain: Arc<C>,
    node: Arc<N>,
    signer: Arc<RwLock<Option<Arc<KeySigner>>>>,
    ongoing: Arc<AtomicBool>,
    state: RoundState<C::Block>,
    votes: Arc<VoteCollector>,
}

impl<C: ChainInterface, N: NodeInterface> RoundDriver<C, N> {
    pub(crate) fn new(
        config: BlsBftConfig,
        chain: Arc<C>,
        node: Arc<N>,
        signer: Arc<RwLock<Option<Arc<KeySigner>>>>,
        ongoing: Arc<AtomicBool>,
    ) -> Self {
        Self {
            tag: format!("BlsBft[{}]", chain.chain_key()),
            votes: Arc::new(VoteCollector::new(config.early_vote_capacity)),
            config,
            chain,
            node,
            signer,
            ongoing,
            state: RoundState::new(),
        }
    }

    async fn run(
        mut self,
        mut stop_rx: oneshot::Receiver<()>,
        mut propose_rx: mpsc::Receiver<ProposeMessage>,
        mut vote_rx: mpsc::Receiver<VoteMessage>,
    ) {
        info!("{}: consensus loop started", self.tag);
        let mut ticker = time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                Some(msg) = propose_rx.recv() => self.on_propose(msg),
                Some(msg) = vote_rx.recv() => self.on_vote(msg),
                _ = ticker.tick() => self.on_tick().await,
            }
        }

        self.ongoing.store(false, Ordering::Relaxed);
        info!("{}: consensus loop stopped", self.tag);
    }

    fn signer(&self) -> Option<Arc<KeySigner>> {
        self.signer.read().clone()
    }

    fn clock(&self) -> RoundClock {
        RoundClock::new(
            self.chain.last_block_timestamp(),
            self.chain.min_block_interval(),
            self.config.round_timeout(),
        )
    }

    /// Whether inbound traffic for `key` falls inside the lookahead window.
    fn admits(&self, key: RoundKey) -> bool {
        self.clock().admits(
            key,
            self.chain.current_height().saturating_add(1),
            self.config.max_round_lookahead,
            SystemTime::now(),
        )
    }

    /// Whether the chain head and clock still point at the round held in
    /// the state.
    fn in_time_frame(&self, now: SystemTime) -> bool {
        self.chain.current_height().saturating_add(1) == self.state.target_height
            && self.clock().round_at(now) == self.state.round
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.state.phase != phase {
            debug!(
                "{}: {} -> {} at {}",
                self.tag,
                self.state.phase,
                phase,
                self.state.round_key()
            );
            self.state.phase = phase;
        }
    }

    // -- Tick --

    pub(crate) async fn on_tick(&mut self) {
        let Some(signer) = self.signer() else {
            return;
        };
        let identity = signer.public_key().identity.as_str();

        if !self.chain.committee().contains(identity) {
            self.ongoing.store(false, Ordering::Relaxed);
            self.new_round(&signer).await;
            return;
        }
        if !self.chain.is_ready() {
            self.ongoing.store(false, Ordering::Relaxed);
            return;
        }
        self.ongoing.store(true, Ordering::Relaxed);

        if self.state.phase == Phase::Unset || !self.in_time_frame(SystemTime::now()) {
            self.new_round(&signer).await;
            return;
        }

        match self.state.phase {
            Phase::Listen => self.listen(&signer).await,
            Phase::Vote => self.vote(&signer).await,
            Phase::Unset | Phase::NewRound | Phase::Propose => {}
        }
    }

    // -- NewRound --

    async fn new_round(&mut self, signer: &KeySigner) {
        if !self.chain.is_ready() {
            self.set_phase(Phase::Unset);
            return;
        }
        let now = SystemTime::now();
        if !matches!(self.state.phase, Phase::Unset | Phase::NewRound) && self.in_time_frame(now) {
            return;
        }
        self.set_phase(Phase::NewRound);

        let clock = self.clock();
        if clock.is_throttled(now) {
            return;
        }

        let target_height = self.chain.current_height().saturating_add(1);
        let round = clock.round_at(now);
        let committee = self.chain.committee();
        let last_proposer = self.chain.last_proposer_index();
        let proposing =
            proposer::is_proposer(&committee, &signer.public_key().identity, last_proposer, round);
        let proposer_index = proposer::proposer_index(last_proposer, round, committee.len());

        self.state
            .reset(target_height, round, committee, last_proposer);
        self.votes.reset(self.state.round_key());

        if proposing {
            info!("{}: proposing for {}", self.tag, self.state.round_key());
            self.set_phase(Phase::Propose);
            self.propose(signer).await;
        } else {
            info!(
                "{}: listening for {} (proposer index {:?})",
                self.tag,
                self.state.round_key(),
                proposer_index
            );
            self.set_phase(Phase::Listen);
        }
    }

    // -- Propose --

    async fn propose(&mut self, signer: &KeySigner) {
        let round = self.state.round;
        let limit = self.chain.max_block_create_time();
        let chain = Arc::clone(&self.chain);
        let mut creation = tokio::spawn(async move { chain.create_new_block(round).await });

        let mut block = match time::timeout(limit, &mut creation).await {
            Err(_) => {
                creation.abort();
                warn!(
                    "{}: {} for {}",
                    self.tag,
                    ConsensusError::BlockCreationTimeout(limit),
                    self.state.round_key()
                );
                return;
            }
            Ok(Err(e)) => {
                error!("{}: block creation task failed: {e}", self.tag);
                return;
            }
            Ok(Ok(Err(e))) => {
                warn!("{}: chain could not create block: {e}", self.tag);
                return;
            }
            Ok(Ok(Ok(block))) => block,
        };

        if block.height() != self.state.target_height || block.round() != round {
            warn!(
                "{}: created block {}_{} does not match {}",
                self.tag,
                block.height(),
                block.round(),
                self.state.round_key()
            );
            return;
        }

        let hash = block.hash();
        let validation =
            ValidationData::from_producer(signer.sign(hash.as_ref()), signer.sign_aux(hash.as_ref()));
        let sealed = validation_data::encode(&validation).and_then(|encoded| {
            block.set_validation_data(encoded);
            block
                .to_bytes()
                .map_err(|e| ConsensusError::EncodeValidationData(e.to_string()))
        });
        let bytes = match sealed {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("{}: failed to seal proposal: {e}", self.tag);
                return;
            }
        };

        self.state.set_candidate(block, hash, validation);
        match ConsensusEnvelope::propose(self.chain.chain_key(), &ProposeMessage { block: bytes }) {
            Ok(envelope) => self.broadcast(envelope),
            Err(e) => error!("{}: failed to encode proposal: {e}", self.tag),
        }
        info!(
            "{}: proposed block {hash} for {}",
            self.tag,
            self.state.round_key()
        );
        self.enter_vote();
    }

    // -- Listen --

    async fn listen(&mut self, signer: &KeySigner) {
        if self.chain.current_height() >= self.state.target_height {
            debug!(
                "{}: height {} already reached",
                self.tag, self.state.target_height
            );
            self.new_round(signer).await;
            return;
        }
        let key = self.state.round_key();
        let Some(block) = self.state.take_proposal(key) else {
            return;
        };
        match self.pre_sign_validate(&block).await {
            Ok(validation) => {
                let hash = block.hash();
                info!("{}: accepted proposal {hash} for {key}", self.tag);
                self.state.set_candidate(block, hash, validation);
                self.enter_vote();
            }
            Err(e) => warn!(
                "{}: discarding proposal from {} for {key}: {e}",
                self.tag,
                block.producer()
            ),
        }
    }

    async fn pre_sign_validate(&self, block: &C::Block) -> Result<ValidationData> {
        let committee = &self.state.committee;
        let expected = proposer::proposer_index(
            self.state.last_proposer_index,
            block.round(),
            committee.len(),
        )
        .and_then(|idx| committee.get(idx))
        .ok_or(ConsensusError::NotInCommittee)?;
        if expected.identity() != block.producer() {
            return Err(ConsensusError::ProducerMismatch {
                expected: expected.identity().to_string(),
                actual: block.producer().to_string(),
            });
        }
        let producer_index = committee
            .index_of(block.producer())
            .ok_or(ConsensusError::NotInCommittee)?;

        let hash = block.hash();
        let validation = validation_data::decode(block.validation_data())?;
        aggregator::verify_single_main(
            hash.as_ref(),
            &validation.producer_main_sig,
            producer_index,
            committee,
        )?;
        if !validation.producer_aux_sig.is_empty() {
            aggregator::verify_single_aux(
                hash.as_ref(),
                &validation.producer_aux_sig,
                expected.aux_key(),
            )?;
        }
        self.chain
            .validate_pre_sign_block(block)
            .await
            .map_err(|e| ConsensusError::ChainRejected(e.to_string()))?;
        Ok(validation)
    }

    // -- Vote --

    fn enter_vote(&mut self) {
        self.set_phase(Phase::Vote);
        let key = self.state.round_key();
        let early = self.votes.drain_early_votes(key);
        if !early.is_empty() {
            debug!("{}: replaying {} early votes for {key}", self.tag, early.len());
        }
        for (identity, vote) in early {
            self.verify_in_background(identity, vote);
        }
    }

    async fn vote(&mut self, signer: &KeySigner) {
        if !self.state.voted {
            self.send_vote(signer);
        }
        if self.state.has_candidate() && self.votes.has_majority(self.state.committee.len()) {
            self.commit().await;
        }
    }

    fn send_vote(&mut self, signer: &KeySigner) {
        let (Some(block), Some(hash)) = (&self.state.candidate_block, self.state.candidate_hash)
        else {
            return;
        };
        let identity = &signer.public_key().identity;
        if self.state.committee.index_of(identity).is_none() {
            return;
        }

        let main_signature = signer.sign(hash.as_ref());
        let aux_signature = if block.requires_aux_confirmation() {
            signer.sign_aux(hash.as_ref())
        } else {
            Vec::new()
        };
        let digest = aggregator::confirmation_digest(&hash, &main_signature, &aux_signature);
        let vote = Vote {
            confirmation: signer.sign_aux(digest.as_ref()),
            main_signature,
            aux_signature,
        };

        let key = self.state.round_key();
        self.votes.add_vote(key, identity, vote.clone());
        self.state.voted = true;
        match ConsensusEnvelope::vote(
            self.chain.chain_key(),
            &VoteMessage::new(key, identity.clone(), vote),
        ) {
            Ok(envelope) => self.broadcast(envelope),
            Err(e) => error!("{}: failed to encode vote: {e}", self.tag),
        }
        debug!("{}: voted for {hash} at {key}", self.tag);
    }

    // -- Commit --

    /// Seal and insert the candidate. The engine then waits in NewRound
    /// until the chain head or the round clock moves.
    async fn commit(&mut self) {
        let block = match self.seal_candidate() {
            Ok(block) => block,
            Err(e) => {
                error!(
                    "{}: could not seal candidate for {}: {e}",
                    self.tag,
                    self.state.round_key()
                );
                return;
            }
        };
        let height = block.height();
        match self.chain.insert_and_broadcast_block(block).await {
            Ok(()) => info!(
                "{}: committed block at height {height} with {} votes",
                self.tag,
                self.votes.len()
            ),
            Err(ChainError::DuplicateBlock) => {
                debug!("{}: block at height {height} already inserted", self.tag)
            }
            Err(e) => {
                error!(
                    "{}: {}",
                    self.tag,
                    ConsensusError::ChainRejected(e.to_string())
                );
                return;
            }
        }
        self.set_phase(Phase::NewRound);
    }

    /// Combine the collected votes into the candidate's validation data and
    /// verify the result end to end.
    fn seal_candidate(&self) -> Result<C::Block> {
        let (Some(block), Some(validation)) = (
            &self.state.candidate_block,
            &self.state.candidate_validation,
        ) else {
            return Err(ConsensusError::UnexpectedError("no candidate".to_string()));
        };
        let committee = &self.state.committee;
        let combined = aggregator::combine(&self.votes.snapshot(), committee)?;

        let mut validation = validation.clone();
        validation.contributor_indices = combined.contributors;
        validation.aggregate_main_sig = combined.aggregate_main;
        validation.aggregate_aux_sigs = combined.aux_signatures;

        let mut block = block.clone();
        block.set_validation_data(validation_data::encode(&validation)?);
        verify_committed_block(&block, committee)?;
        Ok(block)
    }

    // -- Inbound --

    pub(crate) fn on_propose(&mut self, msg: ProposeMessage) {
        let block = match self.chain.unmarshal_block(&msg.block) {
            Ok(block) => block,
            Err(e) => {
                debug!(
                    "{}: {}",
                    self.tag,
                    ConsensusError::MalformedMessage(e.to_string())
                );
                return;
            }
        };
        let key = RoundKey::new(block.height(), block.round());
        if !self.state.accepts_proposal(key) {
            trace!(
                "{}: dropping stale proposal {key} at {}",
                self.tag,
                self.state.round_key()
            );
            return;
        }
        if !self.admits(key) {
            debug!("{}: dropping proposal {key} outside lookahead", self.tag);
            return;
        }
        let committee = self.chain.committee();
        let next_height = self.chain.current_height().saturating_add(1);
        let producer_ok = if key.height == next_height {
            proposer::is_proposer(
                &committee,
                block.producer(),
                self.chain.last_proposer_index(),
                key.round,
            )
        } else {
            committee.contains(block.producer())
        };
        if !producer_ok {
            warn!(
                "{}: dropping proposal {key} from unexpected producer {}",
                self.tag,
                block.producer()
            );
            return;
        }
        if self
            .state
            .buffer_proposal(key, block, self.config.propose_queue_capacity)
        {
            debug!("{}: buffered proposal for {key}", self.tag);
        } else {
            debug!("{}: proposal {key} not buffered", self.tag);
        }
    }

    pub(crate) fn on_vote(&mut self, msg: VoteMessage) {
        if self.chain.committee_index_of(&msg.validator).is_none() {
            debug!("{}: vote from unknown validator {}", self.tag, msg.validator);
            return;
        }
        let key = match msg.parsed_round_key() {
            Ok(key) => key,
            Err(e) => {
                debug!("{}: {}", self.tag, ConsensusError::from(e));
                return;
            }
        };
        match self.state.classify_vote(key) {
            VoteDisposition::Stale => trace!(
                "{}: dropping stale vote {key} from {}",
                self.tag,
                msg.validator
            ),
            VoteDisposition::Early if !self.admits(key) => trace!(
                "{}: dropping vote {key} from {} outside lookahead",
                self.tag,
                msg.validator
            ),
            VoteDisposition::Early => {
                if self.votes.add_early_vote(key, &msg.validator, msg.vote) {
                    trace!("{}: buffered early vote {key} from {}", self.tag, msg.validator);
                }
            }
            VoteDisposition::Current => self.verify_in_background(msg.validator, msg.vote),
        }
    }

    /// Verify `vote` off the actor and collect it if it checks out and the
    /// round has not moved on.
    fn verify_in_background(&self, identity: String, vote: Vote) {
        let (Some(block), Some(hash)) = (&self.state.candidate_block, self.state.candidate_hash)
        else {
            return;
        };
        let committee = Arc::clone(&self.state.committee);
        let Some(index) = committee.index_of(&identity) else {
            debug!("{}: {identity} is not in this round's committee", self.tag);
            return;
        };
        let key = self.state.round_key();
        if !self.votes.begin_verification(key, &identity) {
            trace!("{}: vote from {identity} already collected or in flight", self.tag);
            return;
        }
        let require_aux = block.requires_aux_confirmation();
        let votes = Arc::clone(&self.votes);
        let tag = self.tag.clone();

        tokio::task::spawn_blocking(move || {
            match aggregator::verify_vote(&hash, &vote, index, &committee, require_aux) {
                Ok(()) => {
                    if votes.add_vote(key, &identity, vote) {
                        trace!("{tag}: collected vote {key} from {identity}");
                    }
                }
                Err(e) => warn!("{tag}: rejecting vote {key} from {identity}: {e}"),
            }
            votes.end_verification(key, &identity);
        });
    }

    fn broadcast(&self, envelope: ConsensusEnvelope) {
        if envelope.payload.len() > self.config.max_message_size {
            warn!(
                "{}: {} of {} bytes exceeds max message size",
                self.tag,
                envelope.kind,
                envelope.payload.len()
            );
            return;
        }
        let node = Arc::clone(&self.node);
        let chain_key = self.chain.chain_key().to_string();
        let tag = self.tag.clone();
        tokio::spawn(async move {
            let kind = envelope.kind;
            if let Err(e) = node.push_message_to_chain(envelope, &chain_key).await {
                debug!("{tag}: broadcast of {kind} failed: {e}");
            }
        });
    }

    #[cfg(test)]
    fn candidate_hash(&self) -> Option<solana_hash::Hash> {
        self.state.candidate_hash
    }
}
