//! Multi-node scenarios: several engines wired together over an in-process
//! loopback network, each with its own in-memory chain.

use {
    std::{sync::Arc, time::Duration},
    strata_consensus_blsbft::{
        test_utils::{committee_of, make_signers, CreateBehavior, LoopbackNetwork, LoopbackNode, MockChain},
        validation_data, verify_committed_block, BlsBftConfig, Committee, ConsensusBlock,
        ConsensusEngine, EngineRegistry, KeySigner, BLSBFT_SCHEME,
    },
    strata_consensus_messages::MessageKind,
};

const CHAIN: &str = "beacon";
const START_HEIGHT: u64 = 4;

fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

fn fast_config() -> BlsBftConfig {
    BlsBftConfig {
        tick_interval_ms: 20,
        round_timeout_ms: 60_000,
        ..BlsBftConfig::default()
    }
}

struct TestNetwork {
    signers: Vec<KeySigner>,
    committee: Committee,
    network: Arc<LoopbackNetwork>,
    chains: Vec<Arc<MockChain>>,
    engines: Vec<Box<dyn ConsensusEngine>>,
}

impl TestNetwork {
    /// Build `n` engines through the scheme registry. `customize` adjusts
    /// each node's chain.
    fn new(n: u8, customize: impl Fn(usize, MockChain) -> MockChain) -> Self {
        let signers = make_signers(n);
        let committee = committee_of(&signers);
        let network = Arc::new(LoopbackNetwork::new());
        let registry = EngineRegistry::<MockChain, LoopbackNode>::with_defaults();

        let mut chains = Vec::new();
        let mut engines = Vec::new();
        for (i, signer) in signers.iter().enumerate() {
            let identity = signer.public_key().identity.clone();
            let chain = MockChain::new(CHAIN, identity.clone(), committee.clone(), START_HEIGHT)
                .with_last_block_age(Duration::from_secs(2));
            let chain = Arc::new(customize(i, chain));
            let engine = registry
                .create(
                    BLSBFT_SCHEME,
                    fast_config(),
                    Arc::clone(&chain),
                    Arc::new(network.node(identity.clone())),
                )
                .unwrap();
            engine.load_key_from_seed(&[i as u8 + 1; 32]).unwrap();
            assert_eq!(engine.public_identity().unwrap().identity, identity);
            network.register(identity, engine.inbound_handle());
            chains.push(chain);
            engines.push(engine);
        }
        Self {
            signers,
            committee,
            network,
            chains,
            engines,
        }
    }

    fn start(&self) {
        for engine in &self.engines {
            engine.start().unwrap();
        }
    }

    fn stop(&self) {
        for engine in &self.engines {
            engine.stop().unwrap();
        }
    }

    async fn wait_for_insert(&self, node: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if !self.chains[node].inserted_blocks().is_empty() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_four_nodes_commit_one_block() {
    init_logging();
    let net = TestNetwork::new(4, |_, chain| chain);
    net.start();

    assert!(
        net.wait_for_insert(0, Duration::from_secs(10)).await,
        "proposer never committed"
    );
    // The next height is throttled by the minimum block interval.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(net.engines[0].is_ongoing());

    let inserted = net.chains[0].inserted_blocks();
    assert_eq!(inserted.len(), 1);
    let block = &inserted[0];
    assert_eq!(block.height(), START_HEIGHT + 1);
    assert_eq!(block.round(), 0);
    assert_eq!(block.producer(), net.signers[0].public_key().identity);

    let data = validation_data::decode(block.validation_data()).unwrap();
    assert!(data.contributor_indices.len() >= 3);
    assert!(data.contributor_indices.windows(2).all(|w| w[0] < w[1]));
    assert!(data.contributor_indices.contains(&0));
    assert_eq!(data.aggregate_aux_sigs.len(), data.contributor_indices.len());
    assert!(data.aggregate_aux_sigs.iter().all(Vec::is_empty));
    assert!(verify_committed_block(block, &net.committee).is_ok());

    assert_eq!(net.network.sent_of_kind(MessageKind::Propose), 1);
    assert_eq!(
        net.network
            .sent_by(&net.signers[0].public_key().identity)
            .iter()
            .filter(|e| e.kind == MessageKind::Vote)
            .count(),
        1
    );
    net.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aux_confirmation_carried_into_commit() {
    init_logging();
    let net = TestNetwork::new(4, |_, chain| chain.with_aux_confirmation(true));
    net.start();

    assert!(net.wait_for_insert(0, Duration::from_secs(10)).await);
    let block = net.chains[0].inserted_blocks().remove(0);
    assert!(block.requires_aux_confirmation());
    let data = validation_data::decode(block.validation_data()).unwrap();
    assert!(!data.producer_aux_sig.is_empty());
    assert!(data.aggregate_aux_sigs.iter().all(|sig| sig.len() == 64));
    assert!(verify_committed_block(&block, &net.committee).is_ok());
    net.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_block_creation_timeout_sends_no_proposal() {
    init_logging();
    let net = TestNetwork::new(4, |i, chain| {
        if i == 0 {
            chain
                .with_create_behavior(CreateBehavior::Never)
                .with_max_block_create_time(Duration::from_millis(100))
        } else {
            chain
        }
    });
    net.start();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(net.chains[0].create_calls(), 1);
    assert_eq!(net.network.sent_of_kind(MessageKind::Propose), 0);
    assert_eq!(net.network.sent_of_kind(MessageKind::Vote), 0);
    assert!(net.chains.iter().all(|c| c.inserted_blocks().is_empty()));
    net.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_minority_cannot_commit() {
    init_logging();
    let net = TestNetwork::new(4, |_, chain| chain);
    // Only the proposer and one voter run: 2 of 4 is not a quorum.
    net.engines[0].start().unwrap();
    net.engines[1].start().unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(net.network.sent_of_kind(MessageKind::Propose), 1);
    assert!(net.chains.iter().all(|c| c.inserted_blocks().is_empty()));
    net.engines[0].stop().unwrap();
    net.engines[1].stop().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_joiner_replays_buffered_traffic() {
    init_logging();
    let net = TestNetwork::new(4, |_, chain| chain);
    // Node 3 receives the proposal and two votes before its loop starts.
    for engine in &net.engines[..3] {
        engine.start().unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    net.engines[3].start().unwrap();

    assert!(net.wait_for_insert(3, Duration::from_secs(10)).await);
    let block = net.chains[3].inserted_blocks().remove(0);
    let data = validation_data::decode(block.validation_data()).unwrap();
    assert!(data.contributor_indices.len() >= 3);
    assert!(verify_committed_block(&block, &net.committee).is_ok());
    net.stop();
}

#[tokio::test]
async fn test_stopped_engine_cannot_restart() {
    let net = TestNetwork::new(1, |_, chain| chain);
    let engine = &net.engines[0];
    engine.start().unwrap();
    engine.stop().unwrap();
    assert!(engine.start().is_err());
    assert!(engine.stop().is_err());
}
