//! Bitcoin merkle proof verification.
//!
//! Double SHA-256 merkle trees, proof nodes supplied leaf to root. The
//! transaction index selects concatenation order at each level.

use super::hash::double_sha256_pair;

/// Compute the merkle root implied by a leaf, its index in the block and
/// the sibling nodes from leaf to root.
pub fn compute_merkle_root(leaf: &[u8; 32], index: u32, siblings: &[[u8; 32]]) -> [u8; 32] {
    let mut current = *leaf;
    let mut idx = index;

    for sibling in siblings {
        current = if idx & 1 == 0 {
            double_sha256_pair(&current, sibling)
        } else {
            double_sha256_pair(sibling, &current)
        };
        idx >>= 1;
    }

    current
}

/// Verify a merkle proof against an expected root.
pub fn verify_merkle_proof(
    leaf: &[u8; 32],
    index: u32,
    siblings: &[[u8; 32]],
    root: &[u8; 32],
) -> bool {
    compute_merkle_root(leaf, index, siblings) == *root
}

/// Build the root over a full list of transaction hashes, duplicating
/// the last element of odd levels (Bitcoin rule). Returns `None` for an
/// empty list.
pub fn compute_merkle_root_from_txs(tx_hashes: &[[u8; 32]]) -> Option<[u8; 32]> {
    if tx_hashes.is_empty() {
        return None;
    }

    let mut level: Vec<[u8; 32]> = tx_hashes.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks_exact(2) {
            next.push(double_sha256_pair(&pair[0], &pair[1]));
        }
        level = next;
    }

    Some(level[0])
}

/// Sibling path for one leaf of a full tree; test and proof-building
/// support for callers that hold all transaction hashes.
pub fn build_merkle_proof(tx_hashes: &[[u8; 32]], index: usize) -> Option<Vec<[u8; 32]>> {
    if index >= tx_hashes.len() {
        return None;
    }

    let mut siblings = Vec::new();
    let mut level: Vec<[u8; 32]> = tx_hashes.to_vec();
    let mut idx = index;

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        let sibling_idx = idx ^ 1;
        siblings.push(level[sibling_idx]);

        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks_exact(2) {
            next.push(double_sha256_pair(&pair[0], &pair[1]));
        }
        level = next;
        idx >>= 1;
    }

    Some(siblings)
}
