//! Per-custodian reserve accounting.
//!
//! Each qualified custodian (QC) carries a backing amount, a minted
//! amount and a minting cap, all in satoshis. The standing invariant
//! `backing >= minted` is enforced on every mint; attestation updates
//! may report backing below minted (a transient reserve event) and that
//! state is the watchdog's to act on, not the ledger's to reject.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::units::{self, UnitsError};

/// Reserve ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown custodian: {0}")]
    UnknownCustodian(String),

    #[error("custodian already registered: {0}")]
    AlreadyRegistered(String),

    #[error("custodian {qc} is not active (status: {status})")]
    QcNotActive { qc: String, status: CustodianStatus },

    #[error("minting cap exceeded: minted {minted} + {requested} > cap {cap}")]
    MintingCapExceeded {
        minted: u64,
        requested: u64,
        cap: u64,
    },

    #[error("insufficient backing: {backing} < minted {minted} + {requested}")]
    InsufficientBacking {
        backing: u64,
        minted: u64,
        requested: u64,
    },

    #[error("insufficient minted: {available} available, {requested} requested")]
    InsufficientMinted { available: u64, requested: u64 },

    #[error(transparent)]
    Units(#[from] UnitsError),

    #[error(transparent)]
    Balance(#[from] BalanceError),
}

/// Failure reported by the external balance ledger, propagated
/// unmodified.
#[derive(Debug, Error)]
#[error("balance ledger: {0}")]
pub struct BalanceError(pub String);

/// External token-balance collaborator. Amounts are 18-decimal token
/// units; the ledger converts from satoshis before calling out.
pub trait BalanceLedger {
    fn increase_balance(&mut self, account: &str, token_units: u128) -> Result<(), BalanceError>;
    fn burn(&mut self, account: &str, token_units: u128) -> Result<(), BalanceError>;
}

/// Lifecycle status of a custodian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodianStatus {
    Active,
    MintingPaused,
    UnderReview,
    EmergencyPaused,
}

impl std::fmt::Display for CustodianStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CustodianStatus::Active => "active",
            CustodianStatus::MintingPaused => "minting_paused",
            CustodianStatus::UnderReview => "under_review",
            CustodianStatus::EmergencyPaused => "emergency_paused",
        };
        write!(f, "{}", s)
    }
}

/// Accounting record for one custodian. All amounts in satoshis,
/// timestamps in unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodianRecord {
    pub registered: bool,
    pub status: CustodianStatus,
    pub minting_cap: u64,
    pub minted: u64,
    pub backing: u64,
    pub status_changed_at: u64,
    pub last_attested_at: u64,
    pub last_violation: Option<String>,
}

/// In-memory reserve ledger over all custodians.
#[derive(Debug, Default)]
pub struct ReserveLedger {
    custodians: HashMap<String, CustodianRecord>,
    total_minted: u64,
}

impl ReserveLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of minted amounts across all custodians.
    pub fn total_minted(&self) -> u64 {
        self.total_minted
    }

    pub fn custodian(&self, qc: &str) -> Option<&CustodianRecord> {
        self.custodians.get(qc)
    }

    fn custodian_mut(&mut self, qc: &str) -> Result<&mut CustodianRecord, LedgerError> {
        self.custodians
            .get_mut(qc)
            .ok_or_else(|| LedgerError::UnknownCustodian(qc.to_string()))
    }

    pub fn register_custodian(
        &mut self,
        qc: &str,
        minting_cap: u64,
        now: u64,
    ) -> Result<(), LedgerError> {
        if self.custodians.contains_key(qc) {
            return Err(LedgerError::AlreadyRegistered(qc.to_string()));
        }
        self.custodians.insert(
            qc.to_string(),
            CustodianRecord {
                registered: true,
                status: CustodianStatus::Active,
                minting_cap,
                minted: 0,
                backing: 0,
                status_changed_at: now,
                last_attested_at: now,
                last_violation: None,
            },
        );
        info!(qc, minting_cap, "custodian registered");
        Ok(())
    }

    /// Mint against a custodian's backing and credit `recipient` on the
    /// external balance ledger.
    ///
    /// Checks first (status, cap, backing), then local increments, then
    /// the external call. If the balance ledger fails the increments
    /// are rolled back so the call leaves no partial state.
    pub fn mint(
        &mut self,
        qc: &str,
        recipient: &str,
        amount_sats: u64,
        balance: &mut dyn BalanceLedger,
    ) -> Result<u64, LedgerError> {
        let token_units = units::sats_to_token_units(amount_sats)?;

        let record = self.custodian_mut(qc)?;
        if record.status != CustodianStatus::Active {
            return Err(LedgerError::QcNotActive {
                qc: qc.to_string(),
                status: record.status,
            });
        }
        let new_minted = record
            .minted
            .checked_add(amount_sats)
            .ok_or(LedgerError::MintingCapExceeded {
                minted: record.minted,
                requested: amount_sats,
                cap: record.minting_cap,
            })?;
        if new_minted > record.minting_cap {
            return Err(LedgerError::MintingCapExceeded {
                minted: record.minted,
                requested: amount_sats,
                cap: record.minting_cap,
            });
        }
        if record.backing < new_minted {
            return Err(LedgerError::InsufficientBacking {
                backing: record.backing,
                minted: record.minted,
                requested: amount_sats,
            });
        }

        record.minted = new_minted;
        self.total_minted += amount_sats;

        if let Err(e) = balance.increase_balance(recipient, token_units) {
            // Unwind the local increments before surfacing the failure.
            let record = self.custodian_mut(qc)?;
            record.minted -= amount_sats;
            self.total_minted -= amount_sats;
            warn!(qc, recipient, amount_sats, error = %e, "balance credit failed, mint rolled back");
            return Err(e.into());
        }

        info!(
            qc,
            recipient,
            amount = %units::format_sats_as_btc(amount_sats),
            "minted"
        );
        Ok(amount_sats)
    }

    /// Reverse a prior `redeem` whose enclosing call failed downstream.
    /// Skips the mint guards: the amounts were subtracted moments ago.
    pub(crate) fn restore_minted(&mut self, qc: &str, amount_sats: u64) -> Result<(), LedgerError> {
        let record = self.custodian_mut(qc)?;
        record.minted += amount_sats;
        self.total_minted += amount_sats;
        Ok(())
    }

    /// Release minted supply back against the custodian.
    pub fn redeem(&mut self, qc: &str, amount_sats: u64) -> Result<(), LedgerError> {
        let record = self.custodian_mut(qc)?;
        if record.minted < amount_sats {
            return Err(LedgerError::InsufficientMinted {
                available: record.minted,
                requested: amount_sats,
            });
        }
        record.minted -= amount_sats;
        self.total_minted -= amount_sats;
        info!(qc, amount = %units::format_sats_as_btc(amount_sats), "redeemed");
        Ok(())
    }

    /// Attestation path: record newly reported backing. Deliberately
    /// does not re-check `backing >= minted`; the invariant is enforced
    /// at mint time and a below-minted report is the watchdog's signal.
    pub fn update_backing(&mut self, qc: &str, new_backing: u64, now: u64) -> Result<(), LedgerError> {
        let record = self.custodian_mut(qc)?;
        record.backing = new_backing;
        record.last_attested_at = now;
        info!(qc, backing = new_backing, "backing attested");
        Ok(())
    }

    pub fn set_status(
        &mut self,
        qc: &str,
        status: CustodianStatus,
        now: u64,
    ) -> Result<(), LedgerError> {
        let record = self.custodian_mut(qc)?;
        if record.status != status {
            info!(qc, from = %record.status, to = %status, "custodian status changed");
            record.status = status;
            record.status_changed_at = now;
        }
        Ok(())
    }

    pub fn record_violation(&mut self, qc: &str, reason: &str) -> Result<(), LedgerError> {
        let record = self.custodian_mut(qc)?;
        warn!(qc, reason, "violation recorded");
        record.last_violation = Some(reason.to_string());
        Ok(())
    }
}
