//! Simplified Payment Verification.
//!
//! Validates a transaction inclusion proof against a bounded-depth
//! header chain whose difficulty is checked against a relay-tracked
//! epoch difficulty, plus a coinbase-inclusion proof that ties the
//! block header to a real coinbase payout.

pub mod relay;

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::bitcoin::header::{
    difficulty_from_target, hash_meets_target, BlockHeader, HEADER_SIZE,
};
use crate::bitcoin::merkle::verify_merkle_proof;
use crate::bitcoin::tx::TxInfo;

pub use relay::{DifficultyRelay, StaticRelay};

/// SPV validation errors
#[derive(Debug, Error)]
pub enum SpvError {
    /// The verifier has no relay configured. Deployment defect, kept
    /// distinct from proof rejection.
    #[error("difficulty relay not configured")]
    RelayNotConfigured,

    #[error("malformed header chain: {0}")]
    MalformedHeaderChain(String),

    #[error("header does not satisfy its own target")]
    InsufficientWork,

    #[error("header difficulty {observed} matches neither current ({current}) nor previous ({prev}) epoch")]
    NotAtCurrentOrPrevDifficulty {
        observed: u64,
        current: u64,
        prev: u64,
    },

    #[error("accumulated difficulty {observed} below required {required}")]
    InsufficientDifficulty { observed: u64, required: u64 },

    #[error("transaction merkle proof does not match header root")]
    InvalidMerkleProof,

    #[error("coinbase merkle proof does not match header root")]
    InvalidCoinbaseProof,
}

/// Inclusion proof for one transaction.
///
/// Ephemeral, supplied per call and never persisted.
#[derive(Debug, Clone)]
pub struct TransactionProof {
    /// Sibling nodes from the txid to the merkle root.
    pub merkle_proof: Vec<[u8; 32]>,
    /// Index of the transaction in its block.
    pub tx_index: u32,
    /// Concatenated 80-byte headers, earliest (containing block) first.
    pub bitcoin_headers: Vec<u8>,
    /// Proof that the containing block commits to a real coinbase.
    pub coinbase_proof: CoinbaseProof,
}

/// Coinbase-inclusion proof: the block's first transaction plus its
/// merkle path. Prevents proofs built on headers mined without a
/// matching coinbase payout.
#[derive(Debug, Clone)]
pub struct CoinbaseProof {
    pub coinbase_tx: TxInfo,
    pub merkle_proof: Vec<[u8; 32]>,
}

/// SPV proof verifier bound to a difficulty relay.
pub struct SpvVerifier {
    relay: Option<Arc<dyn DifficultyRelay + Send + Sync>>,
    /// Required confirmation depth: the chain's accumulated difficulty
    /// must reach this many multiples of its matched epoch difficulty.
    proof_difficulty_factor: u64,
}

impl SpvVerifier {
    pub fn new(
        relay: Arc<dyn DifficultyRelay + Send + Sync>,
        proof_difficulty_factor: u64,
    ) -> Self {
        Self {
            relay: Some(relay),
            proof_difficulty_factor,
        }
    }

    /// A verifier with no relay. Every validation fails with
    /// [`SpvError::RelayNotConfigured`] until one is attached.
    pub fn unconfigured(proof_difficulty_factor: u64) -> Self {
        Self {
            relay: None,
            proof_difficulty_factor,
        }
    }

    pub fn set_relay(&mut self, relay: Arc<dyn DifficultyRelay + Send + Sync>) {
        self.relay = Some(relay);
    }

    fn relay(&self) -> Result<&(dyn DifficultyRelay + Send + Sync), SpvError> {
        self.relay
            .as_deref()
            .ok_or(SpvError::RelayNotConfigured)
    }

    /// Recompute and verify the proof-of-work across a header chain.
    ///
    /// Each header must be exactly 80 bytes, link to its predecessor via
    /// the previous-hash field, satisfy its own declared target, and
    /// share one target across the whole chain. The shared target's
    /// difficulty must equal the relay's current or previous epoch
    /// difficulty, and the accumulated difficulty must reach
    /// `proof_difficulty_factor` times that matched difficulty.
    pub fn evaluate_proof_difficulty(&self, header_chain: &[u8]) -> Result<(), SpvError> {
        let relay = self.relay()?;

        if header_chain.is_empty() {
            return Err(SpvError::MalformedHeaderChain("no headers".to_string()));
        }
        if header_chain.len() % HEADER_SIZE != 0 {
            return Err(SpvError::MalformedHeaderChain(format!(
                "length {} is not a multiple of {} bytes",
                header_chain.len(),
                HEADER_SIZE
            )));
        }

        let mut prev_hash: Option<[u8; 32]> = None;
        let mut chain_target: Option<[u8; 32]> = None;
        let mut header_count = 0u64;

        for chunk in header_chain.chunks_exact(HEADER_SIZE) {
            let header = BlockHeader::from_raw(chunk)
                .map_err(|e| SpvError::MalformedHeaderChain(e.to_string()))?;

            if let Some(expected) = prev_hash {
                if header.prev_block_hash != expected {
                    return Err(SpvError::MalformedHeaderChain(format!(
                        "header {} does not link to its predecessor",
                        header_count
                    )));
                }
            }

            let target = header.target();
            match chain_target {
                None => chain_target = Some(target),
                Some(t) if t != target => {
                    return Err(SpvError::MalformedHeaderChain(format!(
                        "target changes at header {}",
                        header_count
                    )));
                }
                Some(_) => {}
            }

            let hash = header.block_hash();
            if !hash_meets_target(&hash, &target) {
                return Err(SpvError::InsufficientWork);
            }

            prev_hash = Some(hash);
            header_count += 1;
        }

        let target = chain_target
            .ok_or_else(|| SpvError::MalformedHeaderChain("no headers".to_string()))?;
        let per_header = difficulty_from_target(&target);

        let current = relay.current_epoch_difficulty();
        let prev = relay.prev_epoch_difficulty();
        if per_header != current && per_header != prev {
            return Err(SpvError::NotAtCurrentOrPrevDifficulty {
                observed: per_header,
                current,
                prev,
            });
        }

        // The confirmation floor scales with the epoch the chain
        // actually matched, so a proof built at the previous epoch's
        // difficulty still needs the full confirmation depth.
        let observed = per_header.saturating_mul(header_count);
        let required = per_header.saturating_mul(self.proof_difficulty_factor);
        if observed < required {
            return Err(SpvError::InsufficientDifficulty { observed, required });
        }

        debug!(
            headers = header_count,
            per_header_difficulty = per_header,
            observed,
            required,
            "header chain accepted"
        );
        Ok(())
    }

    /// Validate a full SPV proof for a transaction and return its
    /// canonical hash.
    ///
    /// Verifies, in order: the merkle path from the txid to the first
    /// header's root, the coinbase-inclusion proof against the same
    /// root, and the header chain's proof-of-work via
    /// [`Self::evaluate_proof_difficulty`].
    pub fn validate_spv_proof(
        &self,
        tx: &TxInfo,
        proof: &TransactionProof,
    ) -> Result<[u8; 32], SpvError> {
        // Relay check first so an unconfigured deployment is never
        // mistaken for a rejected proof.
        self.relay()?;

        if proof.bitcoin_headers.len() < HEADER_SIZE {
            return Err(SpvError::MalformedHeaderChain(format!(
                "length {} is not a multiple of {} bytes",
                proof.bitcoin_headers.len(),
                HEADER_SIZE
            )));
        }
        let first_header = BlockHeader::from_raw(&proof.bitcoin_headers[..HEADER_SIZE])
            .map_err(|e| SpvError::MalformedHeaderChain(e.to_string()))?;

        let txid = tx.txid();
        if !verify_merkle_proof(
            &txid,
            proof.tx_index,
            &proof.merkle_proof,
            &first_header.merkle_root,
        ) {
            return Err(SpvError::InvalidMerkleProof);
        }

        // The coinbase is always index 0.
        let coinbase_hash = proof.coinbase_proof.coinbase_tx.txid();
        if !verify_merkle_proof(
            &coinbase_hash,
            0,
            &proof.coinbase_proof.merkle_proof,
            &first_header.merkle_root,
        ) {
            return Err(SpvError::InvalidCoinbaseProof);
        }

        self.evaluate_proof_difficulty(&proof.bitcoin_headers)?;

        debug!(txid = %hex::encode(txid), "SPV proof accepted");
        Ok(txid)
    }
}
