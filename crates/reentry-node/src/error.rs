//! Error types for the off-chain side.
use reentry_attacker::AttackError;
use reentry_core::error::LedgerError;
use reentry_core::revert::Revert;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("ledger: {0}")] Ledger(#[from] LedgerError),
    #[error("driver: {0}")] Attack(#[from] AttackError),
    #[error("reverted: {0}")] Revert(String),
    #[error("config: {0}")] Config(String),
    #[error("deployment record: {0}")] Record(String),
    #[error("I/O: {0}")] Io(#[from] std::io::Error),
    #[error("JSON: {0}")] Json(#[from] serde_json::Error),
}

impl NodeError {
    /// Typed driver error when the payload is one, the plain reason otherwise.
    pub fn from_revert(revert: &Revert) -> Self {
        match AttackError::from_revert(revert) {
            Some(err) => Self::Attack(err),
            None => Self::Revert(revert.to_string()),
        }
    }
}

impl From<config::ConfigError> for NodeError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_reverts_decode_to_attack_errors() {
        let revert = Revert::from(AttackError::EmptyName);
        assert!(matches!(NodeError::from_revert(&revert), NodeError::Attack(AttackError::EmptyName)));
    }

    #[test]
    fn string_reverts_keep_their_reason() {
        let err = NodeError::from_revert(&Revert::reason("student already exists"));
        assert_eq!(err.to_string(), "reverted: student already exists");
    }
}
