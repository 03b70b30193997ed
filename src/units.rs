//! Amount conversions between satoshis and 18-decimal token units.
//!
//! Satoshis are 8-decimal, token units 18-decimal, so the factor is
//! 10^10. Token amounts with a sub-satoshi remainder are rejected
//! rather than silently truncated.

use thiserror::Error;

/// 10^(18-8): token units per satoshi.
pub const SAT_TO_TOKEN_MULTIPLIER: u128 = 10_000_000_000;

/// Amount conversion errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("token amount {0} has a sub-satoshi remainder")]
    SubSatoshiRemainder(u128),

    #[error("amount {0} is outside the representable range")]
    Overflow(u128),
}

/// Convert satoshis to token units.
pub fn sats_to_token_units(sats: u64) -> Result<u128, UnitsError> {
    (sats as u128)
        .checked_mul(SAT_TO_TOKEN_MULTIPLIER)
        .ok_or(UnitsError::Overflow(sats as u128))
}

/// Convert token units back to satoshis, rejecting any amount that is
/// not a whole number of satoshis.
pub fn token_units_to_sats(units: u128) -> Result<u64, UnitsError> {
    if units % SAT_TO_TOKEN_MULTIPLIER != 0 {
        return Err(UnitsError::SubSatoshiRemainder(units));
    }
    let sats = units / SAT_TO_TOKEN_MULTIPLIER;
    u64::try_from(sats).map_err(|_| UnitsError::Overflow(units))
}

/// Human-readable BTC rendering of a satoshi amount, for logs.
pub fn format_sats_as_btc(sats: u64) -> String {
    format!("{}.{:08} BTC", sats / 100_000_000, sats % 100_000_000)
}
