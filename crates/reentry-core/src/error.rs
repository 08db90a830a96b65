//! Error types for the contract runtime.
//!
//! Contract-level failures are not errors in this sense: they are
//! [`Revert`](crate::revert::Revert) payloads carried in a receipt. The
//! variants here reject a transaction before or outside execution.
use alloy_primitives::{Address, U256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unknown contract code: {0}")] UnknownCode(String),
    #[error("insufficient funds: have {have}, need {need}")] InsufficientFunds { have: U256, need: U256 },
    #[error("account already exists: {0}")] AccountExists(Address),
    #[error("constructor reverted: {0}")] ConstructorReverted(String),
    #[error("value overflow")] ValueOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_insufficient_funds() {
        let e = LedgerError::InsufficientFunds {
            have: U256::from(1),
            need: U256::from(4),
        };
        assert_eq!(e.to_string(), "insufficient funds: have 1, need 4");
    }

    #[test]
    fn display_unknown_code() {
        let e = LedgerError::UnknownCode("nope".into());
        assert_eq!(e.to_string(), "unknown contract code: nope");
    }
}
