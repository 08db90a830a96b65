//! Driver error taxonomy.
//!
//! Every variant maps 1:1 onto a custom ABI error of
//! [`IReentrantAttacker`], so a revert raised by the driver can be decoded
//! back into the same variant by an off-chain client.

use alloy_sol_types::SolInterface;
use reentry_core::abi::IReentrantAttacker::{self, IReentrantAttackerErrors};
use reentry_core::revert::Revert;
use reentry_core::{Address, U256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttackError {
    #[error("unauthorized caller {caller}")] Unauthorized { caller: Address },
    #[error("insufficient value: sent {sent}, must exceed {minimum}")] InsufficientValue { sent: U256, minimum: U256 },
    #[error("attack already in progress")] AlreadyInProgress,
    #[error("threshold not met: counter {counter}, required {required}")] ThresholdNotMet { counter: U256, required: U256 },
    #[error("student already registered: {name}")] AlreadyRegistered { name: String },
    #[error("target {target} unavailable")] UpstreamUnavailable { target: Address },
    #[error("target reverted: {reason}")] UpstreamReverted { reason: String },
    #[error("student name is empty")] EmptyName,
    #[error("nothing to withdraw")] NothingToWithdraw,
}

impl AttackError {
    /// Decode a driver revert. Returns `None` for payloads that are not one
    /// of the driver's custom errors.
    pub fn from_revert(revert: &Revert) -> Option<Self> {
        let decoded = IReentrantAttackerErrors::abi_decode(revert.data(), true).ok()?;
        Some(match decoded {
            IReentrantAttackerErrors::Unauthorized(e) => Self::Unauthorized { caller: e.caller },
            IReentrantAttackerErrors::InsufficientValue(e) => Self::InsufficientValue {
                sent: e.sent,
                minimum: e.minimum,
            },
            IReentrantAttackerErrors::AlreadyInProgress(_) => Self::AlreadyInProgress,
            IReentrantAttackerErrors::ThresholdNotMet(e) => Self::ThresholdNotMet {
                counter: e.counter,
                required: e.required,
            },
            IReentrantAttackerErrors::AlreadyRegistered(e) => Self::AlreadyRegistered { name: e.name },
            IReentrantAttackerErrors::UpstreamUnavailable(e) => Self::UpstreamUnavailable { target: e.target },
            IReentrantAttackerErrors::UpstreamReverted(e) => Self::UpstreamReverted { reason: e.reason },
            IReentrantAttackerErrors::EmptyName(_) => Self::EmptyName,
            IReentrantAttackerErrors::NothingToWithdraw(_) => Self::NothingToWithdraw,
        })
    }
}

impl From<AttackError> for Revert {
    fn from(err: AttackError) -> Self {
        match err {
            AttackError::Unauthorized { caller } => Revert::custom(&IReentrantAttacker::Unauthorized { caller }),
            AttackError::InsufficientValue { sent, minimum } => {
                Revert::custom(&IReentrantAttacker::InsufficientValue { sent, minimum })
            }
            AttackError::AlreadyInProgress => Revert::custom(&IReentrantAttacker::AlreadyInProgress {}),
            AttackError::ThresholdNotMet { counter, required } => {
                Revert::custom(&IReentrantAttacker::ThresholdNotMet { counter, required })
            }
            AttackError::AlreadyRegistered { name } => Revert::custom(&IReentrantAttacker::AlreadyRegistered { name }),
            AttackError::UpstreamUnavailable { target } => {
                Revert::custom(&IReentrantAttacker::UpstreamUnavailable { target })
            }
            AttackError::UpstreamReverted { reason } => Revert::custom(&IReentrantAttacker::UpstreamReverted { reason }),
            AttackError::EmptyName => Revert::custom(&IReentrantAttacker::EmptyName {}),
            AttackError::NothingToWithdraw => Revert::custom(&IReentrantAttacker::NothingToWithdraw {}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_survive_revert_encoding() {
        let cases = vec![
            AttackError::Unauthorized {
                caller: Address::repeat_byte(7),
            },
            AttackError::InsufficientValue {
                sent: U256::from(3),
                minimum: U256::from(3),
            },
            AttackError::AlreadyInProgress,
            AttackError::ThresholdNotMet {
                counter: U256::from(1),
                required: U256::from(2),
            },
            AttackError::AlreadyRegistered { name: "Ada".into() },
            AttackError::UpstreamReverted {
                reason: "student already exists".into(),
            },
            AttackError::EmptyName,
            AttackError::NothingToWithdraw,
        ];
        for err in cases {
            let revert = Revert::from(err.clone());
            assert_eq!(AttackError::from_revert(&revert), Some(err));
        }
    }

    #[test]
    fn string_reverts_are_not_driver_errors() {
        assert_eq!(AttackError::from_revert(&Revert::reason("Not yet")), None);
        assert_eq!(AttackError::from_revert(&Revert::empty()), None);
    }

    #[test]
    fn display_threshold_not_met() {
        let err = AttackError::ThresholdNotMet {
            counter: U256::from(1),
            required: U256::from(2),
        };
        assert_eq!(err.to_string(), "threshold not met: counter 1, required 2");
    }
}
