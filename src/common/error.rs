//! Unified error type across all modules.

use thiserror::Error;

/// Root error type for the protocol core
#[derive(Debug, Error)]
pub enum QcbtcError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    #[error("address error: {0}")]
    Address(#[from] crate::bitcoin::address::AddressError),

    #[error("transaction error: {0}")]
    Tx(#[from] crate::bitcoin::tx::TxError),

    #[error("header error: {0}")]
    Header(#[from] crate::bitcoin::header::HeaderError),

    #[error("SPV error: {0}")]
    Spv(#[from] crate::spv::SpvError),

    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),

    #[error("redemption error: {0}")]
    Redemption(#[from] crate::redemption::RedemptionError),

    #[error("watchdog error: {0}")]
    Watchdog(#[from] crate::watchdog::WatchdogError),

    #[error("units error: {0}")]
    Units(#[from] crate::units::UnitsError),
}

impl QcbtcError {
    /// Stable error code for off-chain monitors.
    pub fn error_code(&self) -> &'static str {
        match self {
            QcbtcError::Config(_) => "CONFIG_ERROR",
            QcbtcError::Logging(_) => "LOGGING_ERROR",
            QcbtcError::Address(_) => "ADDRESS_ERROR",
            QcbtcError::Tx(_) => "TX_ERROR",
            QcbtcError::Header(_) => "HEADER_ERROR",
            QcbtcError::Spv(_) => "SPV_ERROR",
            QcbtcError::Ledger(_) => "LEDGER_ERROR",
            QcbtcError::Redemption(_) => "REDEMPTION_ERROR",
            QcbtcError::Watchdog(_) => "WATCHDOG_ERROR",
            QcbtcError::Units(_) => "UNITS_ERROR",
        }
    }

    /// Whether the caller may retry the same call later with better
    /// inputs (deeper proof, fresher attestation) and expect success.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QcbtcError::Spv(
                crate::spv::SpvError::InsufficientDifficulty { .. }
                    | crate::spv::SpvError::NotAtCurrentOrPrevDifficulty { .. }
            ) | QcbtcError::Watchdog(
                crate::watchdog::WatchdogError::EscalationDelayNotReached { .. }
            )
        )
    }
}

/// Result type alias using QcbtcError
pub type Result<T> = std::result::Result<T, QcbtcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::address::AddressError;
    use crate::spv::SpvError;

    #[test]
    fn test_error_codes() {
        let err = QcbtcError::from(AddressError::Empty);
        assert_eq!(err.error_code(), "ADDRESS_ERROR");
        let err = QcbtcError::from(SpvError::RelayNotConfigured);
        assert_eq!(err.error_code(), "SPV_ERROR");
    }

    #[test]
    fn test_retryable_classification() {
        let shallow = QcbtcError::from(SpvError::InsufficientDifficulty {
            observed: 2,
            required: 6,
        });
        assert!(shallow.is_retryable());

        let misconfigured = QcbtcError::from(SpvError::RelayNotConfigured);
        assert!(!misconfigured.is_retryable());
    }
}
