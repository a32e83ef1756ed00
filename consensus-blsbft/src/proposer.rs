//! Leader / proposer selection.
//!
//! Rotates through the committee in order, starting just after the producer
//! of the last accepted block and advancing one position per round. Every
//! validator must agree on the proposer for any round, so the inputs are
//! limited to chain state all of them share.

use crate::committee::Committee;

/// Committee position of the proposer for `round`:
/// `(last_proposer_index + round) mod committee_size`.
///
/// Returns `None` for an empty committee.
pub fn proposer_index(last_proposer_index: usize, round: u32, committee_size: usize) -> Option<usize> {
    let offset = usize::try_from(round).ok()?.checked_rem(committee_size)?;
    last_proposer_index
        .checked_rem(committee_size)?
        .wrapping_add(offset)
        .checked_rem(committee_size)
}

/// Check whether `identity` is the proposer for `round`.
pub fn is_proposer(
    committee: &Committee,
    identity: &str,
    last_proposer_index: usize,
    round: u32,
) -> bool {
    match (
        committee.index_of(identity),
        proposer_index(last_proposer_index, round, committee.len()),
    ) {
        (Some(own), Some(expected)) => own == expected,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::signer::KeySigner, test_case::test_case};

    #[test_case(0, 0, 4 => Some(0) ; "first round")]
    #[test_case(0, 1, 4 => Some(1) ; "next round")]
    #[test_case(3, 0, 4 => Some(3) ; "last proposer again")]
    #[test_case(3, 1, 4 => Some(0) ; "wraps")]
    #[test_case(2, 9, 4 => Some(3) ; "many rounds")]
    #[test_case(0, u32::MAX, 7 => Some(3) ; "huge round")]
    #[test_case(usize::MAX, 1, 4 => Some(0) ; "huge last index")]
    #[test_case(5, 0, 1 => Some(0) ; "single member")]
    #[test_case(0, 0, 0 => None ; "empty committee")]
    fn test_proposer_index(last: usize, round: u32, size: usize) -> Option<usize> {
        proposer_index(last, round, size)
    }

    #[test]
    fn test_every_member_gets_a_turn() {
        let mut seen: Vec<usize> = (0..5u32).filter_map(|r| proposer_index(2, r, 5)).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_is_proposer() {
        let ids: Vec<String> = (1..=3u8)
            .map(|i| KeySigner::from_seed(&[i; 32]).unwrap().public_key().identity.clone())
            .collect();
        let committee = Committee::from_identities(&ids).unwrap();
        assert!(is_proposer(&committee, &ids[1], 0, 1));
        assert!(!is_proposer(&committee, &ids[0], 0, 1));
        assert!(is_proposer(&committee, &ids[0], 2, 1));
        assert!(!is_proposer(&committee, "stranger", 0, 0));
    }
}
