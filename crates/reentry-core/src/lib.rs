//! # reentry-core
//! Foundation types, runtime and ABI for the reentry workspace.
//!
//! - [`ledger::MemoryLedger`]: account state, journaled undo, nested call dispatch
//! - [`traits::Contract`] / [`traits::Host`]: the seam between contract code and the runtime
//! - [`abi`]: Solidity ABI of the grader and the attacker driver
//! - [`revert::Revert`]: raw revert payloads and reason decoding

pub mod abi;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod revert;
pub mod storage;
pub mod traits;
pub mod types;

pub use alloy_primitives::{Address, B256, Bytes, LogData, U256};
