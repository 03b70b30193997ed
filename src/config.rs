//! Environment-based protocol configuration.
//!
//! All parameters load from `QCBTC_*` environment variables with
//! conservative defaults, so an embedding runtime can run the core
//! without any configuration and tighten individual knobs later.
//!
//! # Environment Variables
//!
//! - `QCBTC_REDEMPTION_TIMEOUT_SECS` - seconds a custodian has to pay a
//!   redemption (default: 86400, one day)
//! - `QCBTC_ESCALATION_DELAY_SECS` - watchdog escalation delay
//!   (default: 2700, 45 minutes)
//! - `QCBTC_ATTESTATION_FRESHNESS_SECS` - maximum attestation age for a
//!   decidable reserve check (default: 21600, 6 hours)
//! - `QCBTC_PROLONGED_STALENESS_SECS` - attestation age that is itself a
//!   violation (default: 172800, 48 hours)
//! - `QCBTC_MANUAL_REVIEW_BOUND_SECS` - maximum time in UnderReview
//!   (default: 604800, 7 days)
//! - `QCBTC_COLLATERAL_RATIO_BPS` - required backing per minted satoshi
//!   in basis points (default: 10000, fully backed)
//! - `QCBTC_REDEMPTION_FEE_BPS` - treasury fee on redemptions
//!   (default: 0)
//! - `QCBTC_PROOF_DIFFICULTY_FACTOR` - SPV confirmation depth at full
//!   difficulty (default: 6)
//! - `QCBTC_DUST_THRESHOLD_SATS` - minimum redemption size
//!   (default: 1000)
//! - `QCBTC_LOG_LEVEL` - logging level (default: "info")
//! - `QCBTC_LOG_JSON` - set to "1" for JSON log output

use std::env;

use thiserror::Error;

use crate::watchdog::WatchdogParams;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Protocol parameters, all durations in seconds.
#[derive(Debug, Clone)]
pub struct ProtocolParams {
    pub redemption_timeout: u64,
    pub escalation_delay: u64,
    pub attestation_freshness: u64,
    pub prolonged_staleness_bound: u64,
    pub manual_review_bound: u64,
    pub collateral_ratio_bps: u32,
    pub redemption_fee_bps: u16,
    pub proof_difficulty_factor: u64,
    pub dust_threshold_sats: u64,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            redemption_timeout: 86_400,
            escalation_delay: 45 * 60,
            attestation_freshness: 6 * 3600,
            prolonged_staleness_bound: 48 * 3600,
            manual_review_bound: 7 * 24 * 3600,
            collateral_ratio_bps: 10_000,
            redemption_fee_bps: 0,
            proof_difficulty_factor: 6,
            dust_threshold_sats: 1000,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ProtocolParams {
    /// Load from environment, falling back to defaults per field.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            redemption_timeout: get_parsed(
                "QCBTC_REDEMPTION_TIMEOUT_SECS",
                defaults.redemption_timeout,
            )?,
            escalation_delay: get_parsed("QCBTC_ESCALATION_DELAY_SECS", defaults.escalation_delay)?,
            attestation_freshness: get_parsed(
                "QCBTC_ATTESTATION_FRESHNESS_SECS",
                defaults.attestation_freshness,
            )?,
            prolonged_staleness_bound: get_parsed(
                "QCBTC_PROLONGED_STALENESS_SECS",
                defaults.prolonged_staleness_bound,
            )?,
            manual_review_bound: get_parsed(
                "QCBTC_MANUAL_REVIEW_BOUND_SECS",
                defaults.manual_review_bound,
            )?,
            collateral_ratio_bps: get_parsed(
                "QCBTC_COLLATERAL_RATIO_BPS",
                defaults.collateral_ratio_bps,
            )?,
            redemption_fee_bps: get_parsed("QCBTC_REDEMPTION_FEE_BPS", defaults.redemption_fee_bps)?,
            proof_difficulty_factor: get_parsed(
                "QCBTC_PROOF_DIFFICULTY_FACTOR",
                defaults.proof_difficulty_factor,
            )?,
            dust_threshold_sats: get_parsed(
                "QCBTC_DUST_THRESHOLD_SATS",
                defaults.dust_threshold_sats,
            )?,
            log_level: env::var("QCBTC_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: env::var("QCBTC_LOG_JSON").map(|v| v == "1").unwrap_or(false),
        })
    }

    /// The slice of parameters the watchdog evaluates against.
    pub fn watchdog_params(&self) -> WatchdogParams {
        WatchdogParams {
            collateral_ratio_bps: self.collateral_ratio_bps,
            attestation_freshness: self.attestation_freshness,
            prolonged_staleness_bound: self.prolonged_staleness_bound,
            manual_review_bound: self.manual_review_bound,
            escalation_delay: self.escalation_delay,
        }
    }
}

/// Parse an env var if set; unset falls back, unparseable is an error.
fn get_parsed<T: std::str::FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var_name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var_name.to_string(), value)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = ProtocolParams::default();
        assert_eq!(params.redemption_timeout, 86_400);
        assert_eq!(params.escalation_delay, 2700);
        assert_eq!(params.collateral_ratio_bps, 10_000);
        assert_eq!(params.proof_difficulty_factor, 6);
    }

    #[test]
    fn test_watchdog_params_projection() {
        let params = ProtocolParams::default();
        let wd = params.watchdog_params();
        assert_eq!(wd.escalation_delay, params.escalation_delay);
        assert_eq!(wd.collateral_ratio_bps, params.collateral_ratio_bps);
    }
}
