//! Trait interfaces between contract code and the runtime.
//!
//! - [`Contract`]: stateless contract logic (reentry-victim and reentry-attacker implement)
//! - [`Host`]: the executing frame's view of the world (the ledger implements)
//!
//! A contract never owns state. Everything it remembers lives in its
//! account's storage and is reached through the [`Host`] it is handed on
//! every call, which is what makes reentrant calls observe each other's
//! writes the way they do on a real chain.

use alloy_primitives::{Address, B256, Bytes, LogData, U256};

use crate::revert::Revert;
use crate::storage::{address_to_word, word_to_address, word_to_u64};

/// Per-frame call information.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    /// Immediate caller (`msg.sender`).
    pub caller: Address,
    /// Address of the executing contract (`address(this)`).
    pub address: Address,
    /// Wei attached to this call (`msg.value`), already credited.
    pub value: U256,
    /// Sender of the enclosing transaction (`tx.origin`).
    pub origin: Address,
    /// Nesting depth; 0 for the top-level call.
    pub depth: usize,
    /// Whether state changes are forbidden in this frame.
    pub is_static: bool,
}

/// Contract logic addressable by a code id.
///
/// Implementations must be deterministic functions of the host state and
/// their inputs.
pub trait Contract: Send + Sync {
    /// Registry key of this code.
    fn code_id(&self) -> &'static str;

    /// Run the constructor with ABI-encoded `args`.
    fn construct(&self, host: &mut dyn Host, ctx: &CallContext, args: &[u8]) -> Result<(), Revert>;

    /// Handle a message call. Empty `input` is a plain value transfer.
    fn call(&self, host: &mut dyn Host, ctx: &CallContext, input: &[u8]) -> Result<Bytes, Revert>;
}

/// Runtime services available to the executing frame.
///
/// Storage and events are implicitly scoped to the frame's own address.
pub trait Host {
    /// Read a storage slot. Unset slots read as zero.
    fn sload(&self, slot: B256) -> U256;

    /// Write a storage slot. Fails in a static frame.
    fn sstore(&mut self, slot: B256, value: U256) -> Result<(), Revert>;

    /// Balance of any account.
    fn balance(&self, account: Address) -> U256;

    /// Whether `account` has contract code.
    fn has_code(&self, account: Address) -> bool;

    /// Message call from the executing contract. The callee's state changes
    /// are rolled back if it reverts.
    fn call(&mut self, to: Address, value: U256, input: Bytes) -> Result<Bytes, Revert>;

    /// Read-only message call.
    fn static_call(&mut self, to: Address, input: Bytes) -> Result<Bytes, Revert>;

    /// Emit an event from the executing contract. Fails in a static frame.
    fn emit(&mut self, log: LogData) -> Result<(), Revert>;

    /// Current block timestamp (Unix seconds).
    fn timestamp(&self) -> u64;

    /// Current block number.
    fn block_number(&self) -> u64;

    /// Read a slot holding a `u64`, saturating.
    fn sload_u64(&self, slot: B256) -> u64 {
        word_to_u64(self.sload(slot))
    }

    /// Read a slot holding an address.
    fn sload_address(&self, slot: B256) -> Address {
        word_to_address(self.sload(slot))
    }

    /// Read a slot holding a bool.
    fn sload_bool(&self, slot: B256) -> bool {
        !self.sload(slot).is_zero()
    }

    /// Write an address into a slot.
    fn sstore_address(&mut self, slot: B256, value: Address) -> Result<(), Revert> {
        self.sstore(slot, address_to_word(value))
    }

    /// Write a bool into a slot.
    fn sstore_bool(&mut self, slot: B256, value: bool) -> Result<(), Revert> {
        self.sstore(slot, U256::from(value as u8))
    }
}
