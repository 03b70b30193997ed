//! Permissionless watchdog over custodian health.
//!
//! Anyone may report an objectively checkable violation; the enforcer
//! moves the custodian to UnderReview and, for reserve insufficiency,
//! arms an escalation timer. If the violation is still present once the
//! escalation delay has elapsed, the custodian is emergency-paused via
//! the external pause authority.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::ledger::{CustodianStatus, LedgerError, ReserveLedger};

/// Watchdog errors
#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("no violation present: {0}")]
    NoViolation(String),

    #[error("no active escalation timer for custodian")]
    NoActiveTimer,

    #[error("escalation delay not reached: {remaining} seconds remaining")]
    EscalationDelayNotReached { remaining: u64 },

    #[error("custodian is not active, timer retained")]
    CustodianNotActive,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Objectively checkable violation categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationReason {
    /// Backing below the required collateral on fresh attestation data.
    InsufficientReserves,
    /// Attestation older than the freshness bound.
    StaleAttestation,
    /// Attestation older than the hard staleness bound.
    ProlongedStaleness,
    /// Custodian left in UnderReview beyond the review bound.
    ExtendedManualReview,
}

impl ViolationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationReason::InsufficientReserves => "insufficient_reserves",
            ViolationReason::StaleAttestation => "stale_attestation",
            ViolationReason::ProlongedStaleness => "prolonged_staleness",
            ViolationReason::ExtendedManualReview => "extended_manual_review",
        }
    }
}

impl std::fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Escalation timer armed on reserve insufficiency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EscalationTimer {
    pub reason: ViolationReason,
    pub started_at: u64,
}

/// External pause collaborator, called only from the escalation path.
pub trait PauseAuthority {
    fn emergency_pause_qc(&mut self, qc: &str, reason: ViolationReason);
}

/// Outcome of a pure violation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationCheck {
    pub violated: bool,
    /// Whether the underlying data was fresh enough to decide. A stale
    /// reserve check is indeterminate, not a pass.
    pub decidable: bool,
    pub explanation: String,
}

/// Timing and ratio parameters the watchdog evaluates against.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogParams {
    /// Required backing per minted satoshi, in basis points.
    pub collateral_ratio_bps: u32,
    /// Attestations older than this are stale (seconds).
    pub attestation_freshness: u64,
    /// Attestations older than this are a violation on their own.
    pub prolonged_staleness_bound: u64,
    /// Maximum time a custodian may sit in UnderReview.
    pub manual_review_bound: u64,
    /// Delay between arming the timer and the pause becoming possible.
    pub escalation_delay: u64,
}

/// Watchdog state machine, keyed per custodian.
#[derive(Debug)]
pub struct WatchdogEnforcer {
    params: WatchdogParams,
    timers: HashMap<String, EscalationTimer>,
}

impl WatchdogEnforcer {
    pub fn new(params: WatchdogParams) -> Self {
        Self {
            params,
            timers: HashMap::new(),
        }
    }

    pub fn escalation_timer(&self, qc: &str) -> Option<&EscalationTimer> {
        self.timers.get(qc)
    }

    /// Pure evaluation of one violation category. Mutates nothing.
    pub fn check_violation(
        &self,
        ledger: &ReserveLedger,
        qc: &str,
        reason: ViolationReason,
        now: u64,
    ) -> Result<ViolationCheck, WatchdogError> {
        let record = ledger
            .custodian(qc)
            .ok_or_else(|| LedgerError::UnknownCustodian(qc.to_string()))?;

        let attestation_age = now.saturating_sub(record.last_attested_at);
        let fresh = attestation_age <= self.params.attestation_freshness;

        let check = match reason {
            ViolationReason::InsufficientReserves => {
                let required =
                    record.minted as u128 * self.params.collateral_ratio_bps as u128 / 10_000;
                let violated = (record.backing as u128) < required;
                ViolationCheck {
                    violated: violated && fresh,
                    decidable: fresh,
                    explanation: if !fresh {
                        format!("attestation is {} seconds old, check indeterminate", attestation_age)
                    } else if violated {
                        format!(
                            "backing {} below required {} for minted {}",
                            record.backing, required, record.minted
                        )
                    } else {
                        format!("backing {} covers minted {}", record.backing, record.minted)
                    },
                }
            }
            ViolationReason::StaleAttestation => ViolationCheck {
                violated: !fresh,
                decidable: true,
                explanation: format!("attestation age {} seconds", attestation_age),
            },
            ViolationReason::ProlongedStaleness => ViolationCheck {
                violated: attestation_age > self.params.prolonged_staleness_bound,
                decidable: true,
                explanation: format!("attestation age {} seconds", attestation_age),
            },
            ViolationReason::ExtendedManualReview => {
                let in_review = record.status == CustodianStatus::UnderReview;
                let review_age = now.saturating_sub(record.status_changed_at);
                ViolationCheck {
                    violated: in_review && review_age > self.params.manual_review_bound,
                    decidable: true,
                    explanation: if in_review {
                        format!("under review for {} seconds", review_age)
                    } else {
                        "not under review".to_string()
                    },
                }
            }
        };
        Ok(check)
    }

    /// Report a violation: re-check it, move the custodian to
    /// UnderReview and, for reserve insufficiency only, arm the
    /// escalation timer. Repeat detection never restarts a timer.
    pub fn enforce_objective_violation(
        &mut self,
        ledger: &mut ReserveLedger,
        qc: &str,
        reason: ViolationReason,
        now: u64,
    ) -> Result<(), WatchdogError> {
        let check = self.check_violation(ledger, qc, reason, now)?;
        if !check.violated {
            return Err(WatchdogError::NoViolation(check.explanation));
        }

        // An emergency pause is already the terminal response; repeat
        // detection must not demote it back to review.
        let record = ledger
            .custodian(qc)
            .ok_or_else(|| LedgerError::UnknownCustodian(qc.to_string()))?;
        if record.status == CustodianStatus::EmergencyPaused {
            info!(qc, reason = %reason, "custodian already emergency paused");
            return Ok(());
        }

        ledger.set_status(qc, CustodianStatus::UnderReview, now)?;
        ledger.record_violation(qc, reason.as_str())?;

        if reason == ViolationReason::InsufficientReserves && !self.timers.contains_key(qc) {
            self.timers.insert(
                qc.to_string(),
                EscalationTimer {
                    reason,
                    started_at: now,
                },
            );
            info!(qc, reason = %reason, "escalation timer armed");
        }

        warn!(qc, reason = %reason, explanation = %check.explanation, "violation enforced");
        Ok(())
    }

    /// Attempt escalation of an armed timer.
    ///
    /// After the escalation delay the violation is re-checked: still
    /// present on fresh data pauses the custodian and clears the timer;
    /// resolved on fresh data clears the timer; indeterminate (stale
    /// data) preserves the timer unchanged.
    pub fn check_escalation(
        &mut self,
        ledger: &mut ReserveLedger,
        qc: &str,
        pause: &mut dyn PauseAuthority,
        now: u64,
    ) -> Result<(), WatchdogError> {
        let timer = *self.timers.get(qc).ok_or(WatchdogError::NoActiveTimer)?;

        let elapsed = now.saturating_sub(timer.started_at);
        if elapsed < self.params.escalation_delay {
            return Err(WatchdogError::EscalationDelayNotReached {
                remaining: self.params.escalation_delay - elapsed,
            });
        }

        let check = self.check_violation(ledger, qc, timer.reason, now)?;
        if !check.decidable {
            // Timer preserved; the delay re-anchors once fresh data
            // arrives and the check becomes decidable.
            info!(qc, explanation = %check.explanation, "escalation check indeterminate");
            return Ok(());
        }

        if check.violated {
            ledger.set_status(qc, CustodianStatus::EmergencyPaused, now)?;
            pause.emergency_pause_qc(qc, timer.reason);
            self.timers.remove(qc);
            warn!(qc, reason = %timer.reason, "custodian emergency paused");
        } else {
            self.timers.remove(qc);
            info!(qc, "violation resolved, escalation timer cleared");
        }
        Ok(())
    }

    /// Permissionless timer cleanup after manual recovery. Succeeds
    /// only once the custodian is Active again.
    pub fn clear_escalation_timer(
        &mut self,
        ledger: &ReserveLedger,
        qc: &str,
    ) -> Result<(), WatchdogError> {
        if !self.timers.contains_key(qc) {
            return Err(WatchdogError::NoActiveTimer);
        }
        let record = ledger
            .custodian(qc)
            .ok_or_else(|| LedgerError::UnknownCustodian(qc.to_string()))?;
        if record.status != CustodianStatus::Active {
            return Err(WatchdogError::CustodianNotActive);
        }
        self.timers.remove(qc);
        info!(qc, "escalation timer cleared");
        Ok(())
    }
}
