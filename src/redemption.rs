//! Redemption lifecycle: Pending -> Fulfilled | Defaulted.
//!
//! A redemption burns synthetic supply at request time and is settled
//! by an on-chain Bitcoin payment proven via SPV. Terminal states are
//! immutable; double fulfillment surfaces as `AlreadyFulfilled`, never
//! as a silent no-op.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::bitcoin::address::{decode_address, AddressError};
use crate::bitcoin::hash::sha256;
use crate::bitcoin::tx::TxInfo;
use crate::ledger::{BalanceLedger, LedgerError, ReserveLedger};
use crate::payment::verify_redemption_payment;
use crate::spv::{SpvError, SpvVerifier, TransactionProof};
use crate::units::{self, UnitsError};

/// Redemption errors
#[derive(Debug, Error)]
pub enum RedemptionError {
    #[error("duplicate redemption request")]
    DuplicateRequest,

    #[error("unknown redemption id")]
    UnknownRedemption,

    #[error("redemption already fulfilled")]
    AlreadyFulfilled,

    #[error("redemption already defaulted")]
    AlreadyDefaulted,

    #[error("redemption deadline has passed")]
    DeadlinePassed,

    #[error("redemption deadline not yet reached")]
    DeadlineNotReached,

    #[error("payment does not match redemption: expected {expected_sats} sats to {btc_address}")]
    PaymentMismatch {
        btc_address: String,
        expected_sats: u64,
    },

    #[error("amount {0} sats is below the dust threshold")]
    BelowDustThreshold(u64),

    #[error("re-entrant call rejected")]
    ReentrantCall,

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Spv(#[from] SpvError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Units(#[from] UnitsError),
}

/// Lifecycle state of one redemption request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedemptionStatus {
    Pending,
    Fulfilled,
    Defaulted,
}

/// One redemption request. Amounts in satoshis, timestamps in unix
/// seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionRequest {
    /// Collision-resistant id over (qc, redeemer, script, amount, nonce).
    pub id: [u8; 32],
    pub qc: String,
    pub redeemer: String,
    pub btc_address: String,
    /// Gross amount burned from the redeemer.
    pub amount_sats: u64,
    /// Net amount the custodian must pay on-chain (gross minus the
    /// treasury fee), fixed at initiation.
    pub expected_payment_sats: u64,
    pub requested_at: u64,
    pub deadline: u64,
    pub status: RedemptionStatus,
}

/// Capability interface for redemption handling; one concrete policy is
/// selected per deployment at construction.
pub trait RedemptionPolicy {
    fn validate_redemption_request(
        &self,
        qc: &str,
        btc_address: &str,
        amount_sats: u64,
        ledger: &ReserveLedger,
    ) -> Result<(), RedemptionError>;

    #[allow(clippy::too_many_arguments)]
    fn request_redemption(
        &mut self,
        qc: &str,
        redeemer: &str,
        btc_address: &str,
        amount_sats: u64,
        now: u64,
        ledger: &mut ReserveLedger,
        balance: &mut dyn BalanceLedger,
    ) -> Result<[u8; 32], RedemptionError>;

    fn record_fulfillment(
        &mut self,
        id: &[u8; 32],
        tx: &TxInfo,
        proof: &TransactionProof,
        now: u64,
        spv: &SpvVerifier,
    ) -> Result<(), RedemptionError>;

    fn flag_default(
        &mut self,
        id: &[u8; 32],
        reason: &str,
        now: u64,
        ledger: &mut ReserveLedger,
    ) -> Result<(), RedemptionError>;
}

/// Default redemption policy and request store.
#[derive(Debug)]
pub struct RedemptionManager {
    requests: HashMap<[u8; 32], RedemptionRequest>,
    /// Monotone per-redeemer counter feeding the request id.
    nonces: HashMap<String, u64>,
    /// Seconds from initiation to the payment deadline.
    redemption_timeout: u64,
    /// Treasury fee in basis points, deducted from the on-chain payout.
    redemption_fee_bps: u16,
    /// Minimum gross amount accepted.
    dust_threshold_sats: u64,
    entered: bool,
}

impl RedemptionManager {
    pub fn new(redemption_timeout: u64, redemption_fee_bps: u16, dust_threshold_sats: u64) -> Self {
        Self {
            requests: HashMap::new(),
            nonces: HashMap::new(),
            redemption_timeout,
            redemption_fee_bps,
            dust_threshold_sats,
            entered: false,
        }
    }

    pub fn request(&self, id: &[u8; 32]) -> Option<&RedemptionRequest> {
        self.requests.get(id)
    }

    /// Net payout after the treasury fee, rounded down.
    fn net_payment(&self, amount_sats: u64) -> u64 {
        let fee = (amount_sats as u128 * self.redemption_fee_bps as u128 / 10_000) as u64;
        amount_sats - fee
    }

    fn request_id(qc: &str, redeemer: &str, script: &[u8], amount_sats: u64, nonce: u64) -> [u8; 32] {
        let mut data = Vec::new();
        data.extend_from_slice(qc.as_bytes());
        data.push(0);
        data.extend_from_slice(redeemer.as_bytes());
        data.push(0);
        data.extend_from_slice(script);
        data.extend_from_slice(&amount_sats.to_le_bytes());
        data.extend_from_slice(&nonce.to_le_bytes());
        sha256(&data)
    }

    /// Money-moving entry points set this flag for their duration; a
    /// collaborator calling back in trips `ReentrantCall`.
    fn enter(&mut self) -> Result<(), RedemptionError> {
        if self.entered {
            return Err(RedemptionError::ReentrantCall);
        }
        self.entered = true;
        Ok(())
    }

    fn exit(&mut self) {
        self.entered = false;
    }
}

impl RedemptionPolicy for RedemptionManager {
    fn validate_redemption_request(
        &self,
        qc: &str,
        btc_address: &str,
        amount_sats: u64,
        ledger: &ReserveLedger,
    ) -> Result<(), RedemptionError> {
        if amount_sats < self.dust_threshold_sats {
            return Err(RedemptionError::BelowDustThreshold(amount_sats));
        }
        decode_address(btc_address)?;
        let record = ledger
            .custodian(qc)
            .ok_or_else(|| LedgerError::UnknownCustodian(qc.to_string()))?;
        if record.minted < amount_sats {
            return Err(LedgerError::InsufficientMinted {
                available: record.minted,
                requested: amount_sats,
            }
            .into());
        }
        Ok(())
    }

    /// Initiate a redemption: burn the redeemer's tokens, release the
    /// custodian's minted supply and open a Pending request with a
    /// payment deadline.
    fn request_redemption(
        &mut self,
        qc: &str,
        redeemer: &str,
        btc_address: &str,
        amount_sats: u64,
        now: u64,
        ledger: &mut ReserveLedger,
        balance: &mut dyn BalanceLedger,
    ) -> Result<[u8; 32], RedemptionError> {
        self.enter()?;
        let result = (|| {
            self.validate_redemption_request(qc, btc_address, amount_sats, ledger)?;

            let token_units = units::sats_to_token_units(amount_sats)?;
            let decoded = decode_address(btc_address)?;
            let nonce = self.nonces.entry(redeemer.to_string()).or_insert(0);
            let id = Self::request_id(qc, redeemer, &decoded.script_hash, amount_sats, *nonce);
            if self.requests.contains_key(&id) {
                return Err(RedemptionError::DuplicateRequest);
            }
            *nonce += 1;

            // Effects before the external burn call.
            ledger.redeem(qc, amount_sats)?;
            let request = RedemptionRequest {
                id,
                qc: qc.to_string(),
                redeemer: redeemer.to_string(),
                btc_address: btc_address.to_string(),
                amount_sats,
                expected_payment_sats: self.net_payment(amount_sats),
                requested_at: now,
                deadline: now + self.redemption_timeout,
                status: RedemptionStatus::Pending,
            };
            self.requests.insert(id, request);

            if let Err(e) = balance.burn(redeemer, token_units) {
                // Unwind every local effect before surfacing the
                // failure: the request, the nonce and the released
                // minted supply.
                self.requests.remove(&id);
                if let Some(n) = self.nonces.get_mut(redeemer) {
                    *n -= 1;
                }
                ledger.restore_minted(qc, amount_sats)?;
                warn!(qc, redeemer, amount_sats, error = %e, "burn failed, redemption request rolled back");
                return Err(LedgerError::from(e).into());
            }

            info!(
                qc,
                redeemer,
                btc_address,
                amount = %units::format_sats_as_btc(amount_sats),
                id = %hex::encode(id),
                "redemption requested"
            );
            Ok(id)
        })();
        self.exit();
        result
    }

    /// Settle a Pending redemption with an SPV-proven Bitcoin payment.
    ///
    /// The Fulfilled status is written before returning; a repeat call
    /// with any proof fails with `AlreadyFulfilled`.
    fn record_fulfillment(
        &mut self,
        id: &[u8; 32],
        tx: &TxInfo,
        proof: &TransactionProof,
        now: u64,
        spv: &SpvVerifier,
    ) -> Result<(), RedemptionError> {
        self.enter()?;
        let result = (|| {
            let request = self
                .requests
                .get(id)
                .ok_or(RedemptionError::UnknownRedemption)?;
            match request.status {
                RedemptionStatus::Fulfilled => return Err(RedemptionError::AlreadyFulfilled),
                RedemptionStatus::Defaulted => return Err(RedemptionError::AlreadyDefaulted),
                RedemptionStatus::Pending => {}
            }
            if now > request.deadline {
                return Err(RedemptionError::DeadlinePassed);
            }

            let txid = spv.validate_spv_proof(tx, proof)?;
            if !verify_redemption_payment(&request.btc_address, request.expected_payment_sats, tx) {
                return Err(RedemptionError::PaymentMismatch {
                    btc_address: request.btc_address.clone(),
                    expected_sats: request.expected_payment_sats,
                });
            }

            let request = self
                .requests
                .get_mut(id)
                .ok_or(RedemptionError::UnknownRedemption)?;
            request.status = RedemptionStatus::Fulfilled;
            info!(
                id = %hex::encode(id),
                txid = %hex::encode(txid),
                "redemption fulfilled"
            );
            Ok(())
        })();
        self.exit();
        result
    }

    /// Mark a Pending redemption past its deadline as Defaulted and
    /// record the reason against the custodian.
    fn flag_default(
        &mut self,
        id: &[u8; 32],
        reason: &str,
        now: u64,
        ledger: &mut ReserveLedger,
    ) -> Result<(), RedemptionError> {
        let request = self
            .requests
            .get(id)
            .ok_or(RedemptionError::UnknownRedemption)?;
        match request.status {
            RedemptionStatus::Fulfilled => return Err(RedemptionError::AlreadyFulfilled),
            RedemptionStatus::Defaulted => return Err(RedemptionError::AlreadyDefaulted),
            RedemptionStatus::Pending => {}
        }
        if now <= request.deadline {
            return Err(RedemptionError::DeadlineNotReached);
        }

        let qc = request.qc.clone();
        let request = self
            .requests
            .get_mut(id)
            .ok_or(RedemptionError::UnknownRedemption)?;
        request.status = RedemptionStatus::Defaulted;
        ledger.record_violation(&qc, reason)?;
        warn!(id = %hex::encode(id), qc, reason, "redemption defaulted");
        Ok(())
    }
}
