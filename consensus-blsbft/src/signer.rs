//! Validator consensus key material.
//!
//! A [`KeySigner`] holds one key pair per signature scheme:
//!
//! - **main**: BLS12-381 (min-pk). Signatures from different validators
//!   over the same block hash can be aggregated into one.
//! - **aux**: secp256k1 ECDSA. Not aggregatable; carried alongside the
//!   aggregate so that systems which only understand ECDSA can check a
//!   commit independently.
//!
//! Both keys are derived from a single 32-byte seed. The seed itself is
//! derived outside the engine from a wallet private key, see
//! [`derive_seed`].

use {
    crate::{
        committee::{encode_identity, AUX_PUBKEY_LEN, MAIN_PUBKEY_LEN},
        error::{ConsensusError, Result},
    },
    blst::min_pk::SecretKey as MainSecretKey,
    libsecp256k1::{Message, SecretKey as AuxSecretKey},
    solana_sha256_hasher::{hash, hashv},
};

/// Domain separation tag for main-scheme signatures.
pub const MAIN_SIGNATURE_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_STRATA_BFT_";

/// Domain separation for the auxiliary key derivation.
const AUX_KEY_SALT: &[u8] = b"strata-bft-aux-key";

/// Minimum seed length accepted by BLS key generation.
pub const SEED_LEN: usize = 32;

/// Derive a consensus seed from a wallet private key: `sha256(sha256(pk))`.
pub fn derive_seed(private_key: &[u8]) -> [u8; SEED_LEN] {
    let first = hash(private_key);
    hash(first.as_ref()).to_bytes()
}

/// Public half of a validator's consensus keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIdentity {
    pub main_key: [u8; MAIN_PUBKEY_LEN],
    pub aux_key: [u8; AUX_PUBKEY_LEN],
    /// Base58 encoding of `main_key ‖ aux_key`.
    pub identity: String,
}

/// Signs consensus data with the validator's main and auxiliary keys.
pub struct KeySigner {
    main: MainSecretKey,
    aux: AuxSecretKey,
    public: PublicIdentity,
}

impl KeySigner {
    /// Load both key pairs from `seed`.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        if seed.len() < SEED_LEN {
            return Err(ConsensusError::LoadKey(format!(
                "seed must be at least {SEED_LEN} bytes, got {}",
                seed.len()
            )));
        }
        let main = MainSecretKey::key_gen(seed, &[])
            .map_err(|e| ConsensusError::LoadKey(format!("main key generation: {e:?}")))?;
        let aux_bytes = hashv(&[AUX_KEY_SALT, seed]).to_bytes();
        let aux = AuxSecretKey::parse(&aux_bytes)
            .map_err(|e| ConsensusError::LoadKey(format!("aux key derivation: {e:?}")))?;

        let main_key = main.sk_to_pk().to_bytes();
        let aux_key = libsecp256k1::PublicKey::from_secret_key(&aux).serialize_compressed();
        let public = PublicIdentity {
            identity: encode_identity(&main_key, &aux_key),
            main_key,
            aux_key,
        };
        Ok(Self { main, aux, public })
    }

    /// Main-scheme signature over `data`.
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.main.sign(data, MAIN_SIGNATURE_DST, &[]).to_bytes().to_vec()
    }

    /// Auxiliary-scheme signature over `sha256(data)`.
    pub fn sign_aux(&self, data: &[u8]) -> Vec<u8> {
        let message = Message::parse(&hash(data).to_bytes());
        let (signature, _recovery_id) = libsecp256k1::sign(&message, &self.aux);
        signature.serialize().to_vec()
    }

    pub fn public_key(&self) -> &PublicIdentity {
        &self.public
    }
}

impl std::fmt::Debug for KeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySigner")
            .field("identity", &self.public.identity)
            .finish_non_exhaustive()
    }
}
