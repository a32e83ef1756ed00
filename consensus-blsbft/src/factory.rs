//! Explicit registry of consensus engine constructors.
//!
//! The node assembles a [`EngineRegistry`] at startup and looks schemes up by
//! name when it brings a chain online. There is no process-wide table.

use {
    crate::{
        chain::{ChainInterface, NodeInterface},
        config::BlsBftConfig,
        engine::{BlsBft, ConsensusEngine},
        error::{ConsensusError, Result},
    },
    std::{collections::HashMap, sync::Arc},
};

/// Scheme name under which [`BlsBftFactory`] registers.
pub const BLSBFT_SCHEME: &str = "blsbft";

/// Builds engines of one consensus scheme.
pub trait EngineFactory<C: ChainInterface, N: NodeInterface>: Send + Sync {
    fn scheme(&self) -> &'static str;

    fn create(
        &self,
        config: BlsBftConfig,
        chain: Arc<C>,
        node: Arc<N>,
    ) -> Result<Box<dyn ConsensusEngine>>;
}

/// Factory for [`BlsBft`] engines.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlsBftFactory;

impl<C: ChainInterface, N: NodeInterface> EngineFactory<C, N> for BlsBftFactory {
    fn scheme(&self) -> &'static str {
        BLSBFT_SCHEME
    }

    fn create(
        &self,
        config: BlsBftConfig,
        chain: Arc<C>,
        node: Arc<N>,
    ) -> Result<Box<dyn ConsensusEngine>> {
        Ok(Box::new(BlsBft::new(config, chain, node)?))
    }
}

/// Scheme name → factory.
pub struct EngineRegistry<C: ChainInterface, N: NodeInterface> {
    factories: HashMap<&'static str, Box<dyn EngineFactory<C, N>>>,
}

impl<C: ChainInterface, N: NodeInterface> Default for EngineRegistry<C, N> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<C: ChainInterface, N: NodeInterface> EngineRegistry<C, N> {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in BLS-BFT scheme.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(BlsBftFactory));
        registry
    }

    /// Add `factory`, returning the one it replaced.
    pub fn register(
        &mut self,
        factory: Box<dyn EngineFactory<C, N>>,
    ) -> Option<Box<dyn EngineFactory<C, N>>> {
        self.factories.insert(factory.scheme(), factory)
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.factories.contains_key(scheme)
    }

    /// Registered scheme names, sorted.
    pub fn schemes(&self) -> Vec<&'static str> {
        let mut schemes: Vec<_> = self.factories.keys().copied().collect();
        schemes.sort_unstable();
        schemes
    }

    pub fn create(
        &self,
        scheme: &str,
        config: BlsBftConfig,
        chain: Arc<C>,
        node: Arc<N>,
    ) -> Result<Box<dyn ConsensusEngine>> {
        self.factories
            .get(scheme)
            .ok_or_else(|| ConsensusError::UnknownScheme(scheme.to_string()))?
            .create(config, chain, node)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_utils::{committee_of, make_signers, LoopbackNetwork, LoopbackNode, MockChain},
        assert_matches::assert_matches,
    };

    fn parts() -> (Arc<MockChain>, Arc<LoopbackNode>) {
        let signers = make_signers(2);
        let chain = MockChain::new(
            "beacon",
            signers[0].public_key().identity.clone(),
            committee_of(&signers),
            0,
        );
        let network = Arc::new(LoopbackNetwork::new());
        (Arc::new(chain), Arc::new(network.node("n0".to_string())))
    }

    #[test]
    fn test_default_registry_builds_blsbft() {
        let registry = EngineRegistry::<MockChain, LoopbackNode>::with_defaults();
        assert_eq!(registry.schemes(), vec![BLSBFT_SCHEME]);
        let (chain, node) = parts();
        let engine = registry
            .create(BLSBFT_SCHEME, BlsBftConfig::default(), chain, node)
            .unwrap();
        assert!(!engine.is_ongoing());
        assert!(engine.public_identity().is_none());
        assert_eq!(engine.inbound_handle().chain_key(), "beacon");
    }

    #[test]
    fn test_unknown_scheme() {
        let registry = EngineRegistry::<MockChain, LoopbackNode>::new();
        assert!(!registry.contains(BLSBFT_SCHEME));
        let (chain, node) = parts();
        assert_matches!(
            registry
                .create("pos", BlsBftConfig::default(), chain, node)
                .err(),
            Some(ConsensusError::UnknownScheme(name)) if name == "pos"
        );
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = EngineRegistry::<MockChain, LoopbackNode>::with_defaults();
        assert!(registry.register(Box::new(BlsBftFactory)).is_some());
        assert_eq!(registry.schemes().len(), 1);
    }

    #[test]
    fn test_factory_propagates_config_error() {
        let registry = EngineRegistry::<MockChain, LoopbackNode>::with_defaults();
        let (chain, node) = parts();
        let config = BlsBftConfig {
            vote_queue_capacity: 0,
            ..BlsBftConfig::default()
        };
        assert_matches!(
            registry.create(BLSBFT_SCHEME, config, chain, node).err(),
            Some(ConsensusError::Config(_))
        );
    }
}
