//! Proof-verification and custodian-accounting core for a
//! Bitcoin-backed synthetic asset.
//!
//! Qualified custodians (QCs) attest Bitcoin reserves, mint synthetic
//! supply against them and settle redemptions with on-chain Bitcoin
//! payments. The core verifies those payments by SPV proof and enforces
//! custodian health through a permissionless watchdog.
//!
//! ## Modules
//!
//! - [`bitcoin`] - byte-level primitives: hashing, address codec, raw
//!   transactions, headers, merkle proofs
//! - [`spv`] - header-chain and inclusion-proof verification against a
//!   difficulty relay
//! - [`payment`] - matching proven transactions to redemption payouts
//! - [`ledger`] - per-custodian backing/minted accounting
//! - [`redemption`] - redemption lifecycle (Pending, Fulfilled,
//!   Defaulted)
//! - [`watchdog`] - objective-violation detection and escalation
//!
//! External effects (token balances, emergency pause, difficulty
//! tracking) are behind the [`ledger::BalanceLedger`],
//! [`watchdog::PauseAuthority`] and [`spv::DifficultyRelay`] traits;
//! the core itself never does I/O and never reads a clock — every
//! time-dependent entry point takes `now` in unix seconds.

pub mod bitcoin;
pub mod common;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod payment;
pub mod redemption;
pub mod spv;
pub mod units;
pub mod watchdog;

// Re-exports: unified error
pub use common::{QcbtcError, Result};

// Re-exports: configuration and logging
pub use config::{ConfigError, ProtocolParams};
pub use logging::{init_from_config, init_logging, LogLevel, LoggingError};

// Re-exports: address codec
pub use bitcoin::address::{decode_address, derive_address_from_pubkey, DecodedAddress, ScriptType};

// Re-exports: SPV
pub use spv::{
    CoinbaseProof, DifficultyRelay, SpvError, SpvVerifier, StaticRelay, TransactionProof,
};

// Re-exports: accounting and lifecycle
pub use ledger::{BalanceLedger, CustodianRecord, CustodianStatus, LedgerError, ReserveLedger};
pub use redemption::{
    RedemptionError, RedemptionManager, RedemptionPolicy, RedemptionRequest, RedemptionStatus,
};
pub use watchdog::{
    EscalationTimer, PauseAuthority, ViolationReason, WatchdogEnforcer, WatchdogError,
    WatchdogParams,
};
