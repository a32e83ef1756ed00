//! Signature aggregation and verification against a committee.
//!
//! Votes carry one main-scheme share each. Once a quorum exists the shares
//! are combined into a single aggregate signature plus the list of
//! contributing committee indices. The index list is **sorted ascending**
//! before aggregation; verification recomputes the same order, so the two
//! sides always agree no matter how the votes were collected.
//!
//! Every verifier distinguishes between a signature that was checked and
//! is wrong ([`ConsensusError::InvalidSignature`]) and a check that could
//! not be carried out ([`ConsensusError::UnexpectedError`]).

use {
    crate::{
        committee::Committee,
        error::{ConsensusError, Result},
        signer::MAIN_SIGNATURE_DST,
    },
    blst::{
        min_pk::{AggregateSignature, PublicKey as MainPublicKey, Signature as MainSignature},
        BLST_ERROR,
    },
    libsecp256k1::{Message, PublicKey as AuxPublicKey, Signature as AuxSignature},
    solana_hash::Hash,
    solana_sha256_hasher::{hash, hashv},
    std::collections::HashMap,
    strata_consensus_messages::Vote,
};

/// Length of a compact auxiliary-scheme signature.
pub const AUX_SIGNATURE_LEN: usize = 64;

/// Output of [`combine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedSignatures {
    pub aggregate_main: Vec<u8>,
    /// Auxiliary signatures, parallel to `contributors`.
    pub aux_signatures: Vec<Vec<u8>>,
    /// Committee indices of the voters, ascending.
    pub contributors: Vec<usize>,
}

/// Combine the main-scheme shares of `votes` into one aggregate signature.
pub fn combine(votes: &HashMap<String, Vote>, committee: &Committee) -> Result<CombinedSignatures> {
    if votes.is_empty() {
        return Err(ConsensusError::CombineSignature("no votes to combine".to_string()));
    }

    let mut indexed = votes
        .iter()
        .map(|(identity, vote)| {
            committee
                .index_of(identity)
                .map(|idx| (idx, vote))
                .ok_or_else(|| {
                    ConsensusError::CombineSignature(format!("voter {identity} not in committee"))
                })
        })
        .collect::<Result<Vec<_>>>()?;
    indexed.sort_unstable_by_key(|(idx, _)| *idx);

    let shares = indexed
        .iter()
        .map(|(idx, vote)| {
            MainSignature::from_bytes(&vote.main_signature).map_err(|e| {
                ConsensusError::CombineSignature(format!("share from index {idx}: {e:?}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let share_refs: Vec<&MainSignature> = shares.iter().collect();
    let aggregate = AggregateSignature::aggregate(&share_refs, true)
        .map_err(|e| ConsensusError::CombineSignature(format!("aggregation failed: {e:?}")))?;

    Ok(CombinedSignatures {
        aggregate_main: aggregate.to_signature().to_bytes().to_vec(),
        aux_signatures: indexed.iter().map(|(_, vote)| vote.aux_signature.clone()).collect(),
        contributors: indexed.into_iter().map(|(idx, _)| idx).collect(),
    })
}

/// Verify one validator's main-scheme signature over `data`.
pub fn verify_single_main(
    data: &[u8],
    signature: &[u8],
    index: usize,
    committee: &Committee,
) -> Result<()> {
    let member = committee.get(index).ok_or_else(|| {
        ConsensusError::UnexpectedError(format!(
            "index {index} out of range for committee of {}",
            committee.len()
        ))
    })?;
    let signature = decode_main_signature(signature)?;
    check(
        signature.verify(true, data, MAIN_SIGNATURE_DST, &[], member.main_key(), false),
        "single main signature",
    )
}

/// Verify an auxiliary-scheme signature over `sha256(data)`.
pub fn verify_single_aux(data: &[u8], signature: &[u8], key: &AuxPublicKey) -> Result<()> {
    let bytes: [u8; AUX_SIGNATURE_LEN] = signature.try_into().map_err(|_| {
        ConsensusError::InvalidSignature(format!(
            "aux signature must be {AUX_SIGNATURE_LEN} bytes, got {}",
            signature.len()
        ))
    })?;
    let signature = AuxSignature::parse_standard(&bytes)
        .map_err(|e| ConsensusError::InvalidSignature(format!("aux signature: {e:?}")))?;
    let message = Message::parse(&hash(data).to_bytes());
    if libsecp256k1::verify(&message, &signature, key) {
        Ok(())
    } else {
        Err(ConsensusError::InvalidSignature(
            "aux signature does not match".to_string(),
        ))
    }
}

/// Verify an aggregate main-scheme signature produced by the committee
/// members at `indices`.
pub fn verify_aggregate_main(
    data: &[u8],
    aggregate: &[u8],
    indices: &[usize],
    committee: &Committee,
) -> Result<()> {
    if indices.is_empty() {
        return Err(ConsensusError::InvalidSignature(
            "aggregate has no contributors".to_string(),
        ));
    }
    if indices.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ConsensusError::InvalidSignature(format!(
            "contributor indices not strictly ascending: {indices:?}"
        )));
    }
    let keys = indices
        .iter()
        .map(|&idx| {
            committee.get(idx).map(|m| m.main_key()).ok_or_else(|| {
                ConsensusError::UnexpectedError(format!(
                    "index {idx} out of range for committee of {}",
                    committee.len()
                ))
            })
        })
        .collect::<Result<Vec<&MainPublicKey>>>()?;
    let signature = decode_main_signature(aggregate)?;
    check(
        signature.fast_aggregate_verify(true, data, MAIN_SIGNATURE_DST, &keys),
        "aggregate main signature",
    )
}

/// Digest a voter's confirmation signs: `sha256(block_hash ‖ main ‖ aux)`.
pub fn confirmation_digest(block_hash: &Hash, main_signature: &[u8], aux_signature: &[u8]) -> Hash {
    hashv(&[block_hash.as_ref(), main_signature, aux_signature])
}

/// Check every signature carried by a vote from committee member `index`.
///
/// The auxiliary signature is checked when present and required when
/// `require_aux` is set. The confirmation is always required.
pub fn verify_vote(
    block_hash: &Hash,
    vote: &Vote,
    index: usize,
    committee: &Committee,
    require_aux: bool,
) -> Result<()> {
    let member = committee.get(index).ok_or_else(|| {
        ConsensusError::UnexpectedError(format!(
            "index {index} out of range for committee of {}",
            committee.len()
        ))
    })?;
    verify_single_main(block_hash.as_ref(), &vote.main_signature, index, committee)?;
    if vote.aux_signature.is_empty() {
        if require_aux {
            return Err(ConsensusError::InvalidSignature(
                "missing required aux signature".to_string(),
            ));
        }
    } else {
        verify_single_aux(block_hash.as_ref(), &vote.aux_signature, member.aux_key())?;
    }
    let digest = confirmation_digest(block_hash, &vote.main_signature, &vote.aux_signature);
    verify_single_aux(digest.as_ref(), &vote.confirmation, member.aux_key())
}

fn decode_main_signature(bytes: &[u8]) -> Result<MainSignature> {
    MainSignature::from_bytes(bytes)
        .map_err(|e| ConsensusError::InvalidSignature(format!("main signature: {e:?}")))
}

fn check(result: BLST_ERROR, what: &str) -> Result<()> {
    match result {
        BLST_ERROR::BLST_SUCCESS => Ok(()),
        BLST_ERROR::BLST_VERIFY_FAIL
        | BLST_ERROR::BLST_BAD_ENCODING
        | BLST_ERROR::BLST_POINT_NOT_ON_CURVE
        | BLST_ERROR::BLST_POINT_NOT_IN_GROUP => Err(ConsensusError::InvalidSignature(format!(
            "{what}: {result:?}"
        ))),
        other => Err(ConsensusError::UnexpectedError(format!("{what}: {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::signer::KeySigner,
        assert_matches::assert_matches,
    };

    const DATA: &[u8] = b"candidate block hash";

    fn make_signers(n: u8) -> (Vec<KeySigner>, Committee) {
        let signers: Vec<KeySigner> = (0..n)
            .map(|i| KeySigner::from_seed(&[i.wrapping_add(10); 32]).unwrap())
            .collect();
        let ids: Vec<String> = signers.iter().map(|s| s.public_key().identity.clone()).collect();
        (signers, Committee::from_identities(&ids).unwrap())
    }

    fn vote_from(signer: &KeySigner, with_aux: bool) -> Vote {
        Vote {
            main_signature: signer.sign(DATA),
            aux_signature: if with_aux { signer.sign_aux(DATA) } else { vec![] },
            confirmation: vec![],
        }
    }

    #[test]
    fn test_combine_sorts_contributors() {
        let (signers, committee) = make_signers(5);
        let mut votes = HashMap::new();
        for i in [4usize, 0, 2] {
            votes.insert(signers[i].public_key().identity.clone(), vote_from(&signers[i], true));
        }
        let combined = combine(&votes, &committee).unwrap();
        assert_eq!(combined.contributors, vec![0, 2, 4]);
        assert_eq!(combined.aux_signatures.len(), 3);
        assert_eq!(combined.aux_signatures[0], votes[&signers[0].public_key().identity].aux_signature);
        assert!(verify_aggregate_main(DATA, &combined.aggregate_main, &combined.contributors, &committee).is_ok());
    }

    #[test]
    fn test_combine_deterministic_regardless_of_insertion_order() {
        let (signers, committee) = make_signers(7);
        let mut forward = HashMap::new();
        for s in &signers {
            forward.insert(s.public_key().identity.clone(), vote_from(s, false));
        }
        let mut backward = HashMap::new();
        for s in signers.iter().rev() {
            backward.insert(s.public_key().identity.clone(), vote_from(s, false));
        }
        let a = combine(&forward, &committee).unwrap();
        let b = combine(&backward, &committee).unwrap();
        assert_eq!(a.contributors, (0..7).collect::<Vec<_>>());
        assert_eq!(a, b);
    }

    #[test]
    fn test_combine_rejects_bad_share() {
        let (signers, committee) = make_signers(3);
        let mut votes = HashMap::new();
        votes.insert(signers[0].public_key().identity.clone(), vote_from(&signers[0], false));
        votes.insert(
            signers[1].public_key().identity.clone(),
            Vote {
                main_signature: vec![0xab; 96],
                ..Vote::default()
            },
        );
        assert_matches!(combine(&votes, &committee), Err(ConsensusError::CombineSignature(_)));
    }

    #[test]
    fn test_combine_rejects_outsider_and_empty() {
        let (_signers, committee) = make_signers(2);
        let outsider = KeySigner::from_seed(&[99; 32]).unwrap();
        let mut votes = HashMap::new();
        votes.insert(outsider.public_key().identity.clone(), vote_from(&outsider, false));
        assert_matches!(combine(&votes, &committee), Err(ConsensusError::CombineSignature(_)));
        assert_matches!(combine(&HashMap::new(), &committee), Err(ConsensusError::CombineSignature(_)));
    }

    #[test]
    fn test_single_main_wrong_signer_is_invalid() {
        let (signers, committee) = make_signers(2);
        let sig = signers[0].sign(DATA);
        assert!(verify_single_main(DATA, &sig, 0, &committee).is_ok());
        assert_matches!(
            verify_single_main(DATA, &sig, 1, &committee),
            Err(ConsensusError::InvalidSignature(_))
        );
        assert_matches!(
            verify_single_main(b"other data", &sig, 0, &committee),
            Err(ConsensusError::InvalidSignature(_))
        );
    }

    #[test]
    fn test_single_main_out_of_range_is_unexpected() {
        let (signers, committee) = make_signers(2);
        let sig = signers[0].sign(DATA);
        assert_matches!(
            verify_single_main(DATA, &sig, 5, &committee),
            Err(ConsensusError::UnexpectedError(_))
        );
    }

    #[test]
    fn test_single_main_garbage_bytes_is_invalid() {
        let (_signers, committee) = make_signers(1);
        assert_matches!(
            verify_single_main(DATA, &[1, 2, 3], 0, &committee),
            Err(ConsensusError::InvalidSignature(_))
        );
    }

    #[test]
    fn test_single_aux() {
        let (signers, committee) = make_signers(2);
        let sig = signers[1].sign_aux(DATA);
        let key = committee.get(1).unwrap().aux_key();
        assert!(verify_single_aux(DATA, &sig, key).is_ok());
        assert_matches!(
            verify_single_aux(DATA, &sig, committee.get(0).unwrap().aux_key()),
            Err(ConsensusError::InvalidSignature(_))
        );
        assert_matches!(
            verify_single_aux(DATA, &sig[..10], key),
            Err(ConsensusError::InvalidSignature(_))
        );
    }

    fn signed_vote(signer: &KeySigner, block_hash: &Hash, with_aux: bool) -> Vote {
        let main_signature = signer.sign(block_hash.as_ref());
        let aux_signature = if with_aux {
            signer.sign_aux(block_hash.as_ref())
        } else {
            vec![]
        };
        let digest = confirmation_digest(block_hash, &main_signature, &aux_signature);
        Vote {
            confirmation: signer.sign_aux(digest.as_ref()),
            main_signature,
            aux_signature,
        }
    }

    #[test]
    fn test_verify_vote() {
        let (signers, committee) = make_signers(3);
        let block_hash = hash(DATA);
        let plain = signed_vote(&signers[2], &block_hash, false);
        assert!(verify_vote(&block_hash, &plain, 2, &committee, false).is_ok());
        assert_matches!(
            verify_vote(&block_hash, &plain, 2, &committee, true),
            Err(ConsensusError::InvalidSignature(_))
        );
        assert_matches!(
            verify_vote(&block_hash, &plain, 1, &committee, false),
            Err(ConsensusError::InvalidSignature(_))
        );

        let with_aux = signed_vote(&signers[2], &block_hash, true);
        assert!(verify_vote(&block_hash, &with_aux, 2, &committee, true).is_ok());
    }

    #[test]
    fn test_verify_vote_rejects_unbound_confirmation() {
        let (signers, committee) = make_signers(2);
        let block_hash = hash(DATA);
        let mut vote = signed_vote(&signers[0], &block_hash, false);
        // Confirmation from another validator does not bind the vote.
        let digest = confirmation_digest(&block_hash, &vote.main_signature, &vote.aux_signature);
        vote.confirmation = signers[1].sign_aux(digest.as_ref());
        assert_matches!(
            verify_vote(&block_hash, &vote, 0, &committee, false),
            Err(ConsensusError::InvalidSignature(_))
        );
        vote.confirmation.clear();
        assert_matches!(
            verify_vote(&block_hash, &vote, 0, &committee, false),
            Err(ConsensusError::InvalidSignature(_))
        );
    }

    #[test]
    fn test_aggregate_with_wrong_indices_is_invalid() {
        let (signers, committee) = make_signers(4);
        let mut votes = HashMap::new();
        for s in &signers[..3] {
            votes.insert(s.public_key().identity.clone(), vote_from(s, false));
        }
        let combined = combine(&votes, &committee).unwrap();
        assert_matches!(
            verify_aggregate_main(DATA, &combined.aggregate_main, &[0, 1, 3], &committee),
            Err(ConsensusError::InvalidSignature(_))
        );
        assert_matches!(
            verify_aggregate_main(DATA, &combined.aggregate_main, &[1, 0, 2], &committee),
            Err(ConsensusError::InvalidSignature(_))
        );
        assert_matches!(
            verify_aggregate_main(DATA, &combined.aggregate_main, &[], &committee),
            Err(ConsensusError::InvalidSignature(_))
        );
        assert_matches!(
            verify_aggregate_main(DATA, &combined.aggregate_main, &[0, 1, 9], &committee),
            Err(ConsensusError::UnexpectedError(_))
        );
    }
}
