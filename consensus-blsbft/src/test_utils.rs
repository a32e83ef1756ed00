//! In-memory collaborators for exercising the engine without a real chain
//! or network.

use {
    crate::{
        chain::{ChainInterface, ConsensusBlock, NodeInterface},
        committee::Committee,
        engine::InboundHandle,
        error::{ChainError, NodeError},
        signer::KeySigner,
    },
    async_trait::async_trait,
    log::*,
    parking_lot::{Mutex, RwLock},
    serde::{Deserialize, Serialize},
    solana_hash::Hash,
    solana_sha256_hasher::hashv,
    std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::{Duration, SystemTime},
    },
    strata_consensus_messages::{ConsensusEnvelope, MessageKind},
};

/// Signers seeded with `[1; 32]`, `[2; 32]`, ... `[n; 32]`.
pub fn make_signers(n: u8) -> Vec<KeySigner> {
    (1..=n)
        .map(|i| KeySigner::from_seed(&[i; 32]).expect("fixed seed is valid"))
        .collect()
}

/// Committee made of the given signers, in order.
pub fn committee_of(signers: &[KeySigner]) -> Committee {
    let ids: Vec<&str> = signers
        .iter()
        .map(|s| s.public_key().identity.as_str())
        .collect();
    Committee::from_identities(&ids).expect("signer identities are valid")
}

// ── Block ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockBlock {
    pub height: u64,
    pub round: u32,
    pub producer: String,
    pub payload: Vec<u8>,
    pub validation: String,
    pub aux_confirmation: bool,
}

impl MockBlock {
    pub fn new(height: u64, round: u32, producer: String) -> Self {
        Self {
            height,
            round,
            payload: format!("block-{height}-{round}").into_bytes(),
            producer,
            validation: String::new(),
            aux_confirmation: false,
        }
    }
}

impl ConsensusBlock for MockBlock {
    fn hash(&self) -> Hash {
        hashv(&[
            &self.height.to_le_bytes(),
            &self.round.to_le_bytes(),
            self.producer.as_bytes(),
            &self.payload,
            &[u8::from(self.aux_confirmation)],
        ])
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn round(&self) -> u32 {
        self.round
    }

    fn producer(&self) -> &str {
        &self.producer
    }

    fn validation_data(&self) -> &str {
        &self.validation
    }

    fn set_validation_data(&mut self, data: String) {
        self.validation = data;
    }

    fn requires_aux_confirmation(&self) -> bool {
        self.aux_confirmation
    }

    fn to_bytes(&self) -> Result<Vec<u8>, ChainError> {
        serde_json::to_vec(self).map_err(|e| ChainError::Decode(e.to_string()))
    }
}

// ── Chain ───────────────────────────────────────────────────────────────────

/// How [`MockChain::create_new_block`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateBehavior {
    Immediate,
    Delay(Duration),
    /// Never completes.
    Never,
}

#[derive(Debug)]
struct ChainState {
    height: u64,
    last_proposer_index: usize,
    last_block_timestamp: SystemTime,
    ready: bool,
    reject_pre_sign: bool,
    insert_error: Option<ChainError>,
    inserted: Vec<MockBlock>,
}

/// A chain that keeps inserted blocks in memory.
#[derive(Debug)]
pub struct MockChain {
    chain_key: String,
    producer: String,
    committee: Committee,
    min_block_interval: Duration,
    max_block_create_time: Duration,
    create_behavior: CreateBehavior,
    aux_confirmation: bool,
    create_calls: AtomicUsize,
    state: RwLock<ChainState>,
}

impl MockChain {
    /// A ready chain at `height` whose last block was produced by committee
    /// member 0 just now.
    pub fn new(chain_key: &str, producer: String, committee: Committee, height: u64) -> Self {
        Self {
            chain_key: chain_key.to_string(),
            producer,
            committee,
            min_block_interval: Duration::from_secs(1),
            max_block_create_time: Duration::from_secs(1),
            create_behavior: CreateBehavior::Immediate,
            aux_confirmation: false,
            create_calls: AtomicUsize::new(0),
            state: RwLock::new(ChainState {
                height,
                last_proposer_index: 0,
                last_block_timestamp: SystemTime::now(),
                ready: true,
                reject_pre_sign: false,
                insert_error: None,
                inserted: Vec::new(),
            }),
        }
    }

    pub fn with_last_block_age(self, age: Duration) -> Self {
        self.state.write().last_block_timestamp = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self
    }

    pub fn with_last_proposer_index(self, index: usize) -> Self {
        self.state.write().last_proposer_index = index;
        self
    }

    pub fn with_min_block_interval(mut self, interval: Duration) -> Self {
        self.min_block_interval = interval;
        self
    }

    pub fn with_max_block_create_time(mut self, limit: Duration) -> Self {
        self.max_block_create_time = limit;
        self
    }

    pub fn with_create_behavior(mut self, behavior: CreateBehavior) -> Self {
        self.create_behavior = behavior;
        self
    }

    /// Blocks created by this chain require auxiliary confirmation.
    pub fn with_aux_confirmation(mut self, required: bool) -> Self {
        self.aux_confirmation = required;
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.write().ready = ready;
    }

    pub fn set_reject_pre_sign(&self, reject: bool) {
        self.state.write().reject_pre_sign = reject;
    }

    /// Make every insert fail with `error` without storing the block.
    pub fn set_insert_error(&self, error: Option<ChainError>) {
        self.state.write().insert_error = error;
    }

    pub fn inserted_blocks(&self) -> Vec<MockBlock> {
        self.state.read().inserted.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChainInterface for MockChain {
    type Block = MockBlock;

    fn chain_key(&self) -> &str {
        &self.chain_key
    }

    fn is_ready(&self) -> bool {
        self.state.read().ready
    }

    fn current_height(&self) -> u64 {
        self.state.read().height
    }

    async fn create_new_block(&self, round: u32) -> Result<MockBlock, ChainError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        match self.create_behavior {
            CreateBehavior::Immediate => {}
            CreateBehavior::Delay(delay) => tokio::time::sleep(delay).await,
            CreateBehavior::Never => std::future::pending::<()>().await,
        }
        let height = self.current_height().saturating_add(1);
        let mut block = MockBlock::new(height, round, self.producer.clone());
        block.aux_confirmation = self.aux_confirmation;
        Ok(block)
    }

    async fn validate_pre_sign_block(&self, block: &MockBlock) -> Result<(), ChainError> {
        if self.state.read().reject_pre_sign {
            return Err(ChainError::Rejected(format!(
                "block {} rejected by mock",
                block.height
            )));
        }
        Ok(())
    }

    async fn insert_and_broadcast_block(&self, block: MockBlock) -> Result<(), ChainError> {
        let mut state = self.state.write();
        if let Some(error) = &state.insert_error {
            return Err(error.clone());
        }
        if state.inserted.iter().any(|b| b.height == block.height) {
            return Err(ChainError::DuplicateBlock);
        }
        if block.height != state.height.saturating_add(1) {
            return Err(ChainError::Rejected(format!(
                "block height {} does not extend {}",
                block.height, state.height
            )));
        }
        state.height = block.height;
        state.last_block_timestamp = SystemTime::now();
        if let Some(index) = self.committee.index_of(&block.producer) {
            state.last_proposer_index = index;
        }
        debug!("MockChain[{}]: inserted block {}", self.chain_key, block.height);
        state.inserted.push(block);
        Ok(())
    }

    fn committee(&self) -> Committee {
        self.committee.clone()
    }

    fn last_proposer_index(&self) -> usize {
        self.state.read().last_proposer_index
    }

    fn last_block_timestamp(&self) -> SystemTime {
        self.state.read().last_block_timestamp
    }

    fn min_block_interval(&self) -> Duration {
        self.min_block_interval
    }

    fn max_block_create_time(&self) -> Duration {
        self.max_block_create_time
    }

    fn unmarshal_block(&self, bytes: &[u8]) -> Result<MockBlock, ChainError> {
        serde_json::from_slice(bytes).map_err(|e| ChainError::Decode(e.to_string()))
    }
}

// ── Network ─────────────────────────────────────────────────────────────────

const LOOPBACK_MAX_MESSAGE_SIZE: usize = 1_048_576;

/// A shared in-process network delivering every envelope to all registered
/// engines except the sender.
#[derive(Debug, Default)]
pub struct LoopbackNetwork {
    routes: RwLock<Vec<(String, InboundHandle)>>,
    sent: Mutex<Vec<(String, ConsensusEnvelope)>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint sending as `identity`.
    pub fn node(self: &Arc<Self>, identity: String) -> LoopbackNode {
        LoopbackNode {
            identity,
            network: Arc::clone(self),
        }
    }

    /// Deliver traffic for `identity` to `handle`.
    pub fn register(&self, identity: String, handle: InboundHandle) {
        self.routes.write().push((identity, handle));
    }

    pub fn sent_of_kind(&self, kind: MessageKind) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|(_, envelope)| envelope.kind == kind)
            .count()
    }

    /// Envelopes sent by `identity`.
    pub fn sent_by(&self, identity: &str) -> Vec<ConsensusEnvelope> {
        self.sent
            .lock()
            .iter()
            .filter(|(sender, _)| sender == identity)
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }
}

/// One engine's view of a [`LoopbackNetwork`].
#[derive(Debug, Clone)]
pub struct LoopbackNode {
    identity: String,
    network: Arc<LoopbackNetwork>,
}

#[async_trait]
impl NodeInterface for LoopbackNode {
    async fn push_message_to_chain(
        &self,
        message: ConsensusEnvelope,
        chain_key: &str,
    ) -> Result<(), NodeError> {
        if message.chain_key != chain_key {
            return Err(NodeError::UnknownChain(chain_key.to_string()));
        }
        let bytes = message
            .to_bytes(LOOPBACK_MAX_MESSAGE_SIZE)
            .map_err(|e| NodeError::Push(e.to_string()))?;
        self.network
            .sent
            .lock()
            .push((self.identity.clone(), message));

        let routes = self.network.routes.read().clone();
        for (peer, handle) in routes {
            if peer == self.identity || handle.chain_key() != chain_key {
                continue;
            }
            if let Err(e) = handle.dispatch_bytes(&bytes) {
                warn!("LoopbackNode: delivery to {peer} failed: {e}");
            }
        }
        Ok(())
    }
}
