//! Revert payloads.
//!
//! A [`Revert`] is the raw ABI data a failing call returns: either the
//! standard `Error(string)` / `Panic(uint256)` encodings or a contract's own
//! custom error. Contracts build them, the runtime carries them up the call
//! stack untouched, and clients decode them.

use std::fmt;

use alloy_primitives::Bytes;
use alloy_sol_types::{Panic, Revert as SolRevert, SolError};
use serde::{Deserialize, Serialize};

/// Raw revert data returned by a failed call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Revert {
    data: Bytes,
}

impl Revert {
    /// Wrap raw revert data.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// `Error(string)` revert, what Solidity's `require(cond, "msg")` produces.
    pub fn reason(message: impl Into<String>) -> Self {
        let encoded = SolRevert {
            reason: message.into(),
        }
        .abi_encode();
        Self::new(encoded)
    }

    /// Revert carrying a custom ABI error.
    pub fn custom<E: SolError>(error: &E) -> Self {
        Self::new(error.abi_encode())
    }

    /// Empty revert data, what a bare `require(cond)` produces.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The raw revert bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// First four bytes of the payload, if present.
    pub fn selector(&self) -> Option<[u8; 4]> {
        let head = self.data.get(..4)?;
        let mut selector = [0u8; 4];
        selector.copy_from_slice(head);
        Some(selector)
    }

    /// Whether the payload is a custom error with the given type.
    pub fn is<E: SolError>(&self) -> bool {
        self.selector() == Some(E::SELECTOR)
    }

    /// Decode a custom error of type `E`.
    pub fn decode<E: SolError>(&self) -> Option<E> {
        E::abi_decode(&self.data, true).ok()
    }

    /// Human-readable reason for `Error(string)` and `Panic(uint256)` payloads.
    ///
    /// Returns `None` for empty data and custom errors.
    pub fn reason_string(&self) -> Option<String> {
        if let Ok(revert) = SolRevert::abi_decode(&self.data, true) {
            return Some(revert.reason);
        }
        if let Ok(panic) = Panic::abi_decode(&self.data, true) {
            return Some(format!("panic code 0x{:x}", panic.code));
        }
        None
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason_string() {
            Some(reason) => write!(f, "{reason}"),
            None if self.data.is_empty() => write!(f, "reverted without reason"),
            None => write!(f, "0x{}", hex::encode(&self.data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn reason_round_trips_through_abi() {
        let revert = Revert::reason("not enough money");
        assert_eq!(revert.selector(), Some([0x08, 0xc3, 0x79, 0xa0]));
        assert_eq!(revert.reason_string().as_deref(), Some("not enough money"));
        assert_eq!(revert.to_string(), "not enough money");
    }

    #[test]
    fn empty_revert_has_no_reason() {
        let revert = Revert::empty();
        assert!(revert.selector().is_none());
        assert!(revert.reason_string().is_none());
        assert_eq!(revert.to_string(), "reverted without reason");
    }

    #[test]
    fn panic_payload_is_described() {
        let revert = Revert::custom(&Panic {
            code: U256::from(0x11),
        });
        assert_eq!(revert.reason_string().as_deref(), Some("panic code 0x11"));
    }

    #[test]
    fn unknown_payload_displays_as_hex() {
        let revert = Revert::new(vec![0xde, 0xad, 0xbe, 0xef, 0x01]);
        assert_eq!(revert.to_string(), "0xdeadbeef01");
        assert!(!revert.is::<SolRevert>());
    }
}
