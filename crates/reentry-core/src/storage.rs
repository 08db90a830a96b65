//! Storage slot layout helpers.
//!
//! Contracts keep their state in 32-byte slots, laid out the way Solidity
//! does it: plain variables occupy sequential slots and mapping entries live
//! at `keccak256(key . slot)`, with value-type keys left-padded to 32 bytes
//! and string keys hashed as their raw bytes.

use alloy_primitives::{Address, B256, U256, keccak256};

/// Slot of a plain state variable declared at position `index`.
///
/// # Examples
///
/// ```
/// use reentry_core::storage::slot;
/// assert_eq!(slot(1).as_slice()[31], 1);
/// assert!(slot(1).as_slice()[..31].iter().all(|b| *b == 0));
/// ```
pub fn slot(index: u64) -> B256 {
    word_to_b256(U256::from(index))
}

/// Slot of `mapping(address => _)[key]` declared at `base`.
pub fn address_mapping_slot(base: B256, key: Address) -> B256 {
    let mut input = [0u8; 64];
    input[12..32].copy_from_slice(key.as_slice());
    input[32..].copy_from_slice(base.as_slice());
    keccak256(input)
}

/// Slot of `mapping(string => _)[key]` declared at `base`.
pub fn string_mapping_slot(base: B256, key: &str) -> B256 {
    let mut input = Vec::with_capacity(key.len() + 32);
    input.extend_from_slice(key.as_bytes());
    input.extend_from_slice(base.as_slice());
    keccak256(input)
}

/// Left-pad an address into a storage word.
pub fn address_to_word(address: Address) -> U256 {
    U256::from_be_bytes(address.into_word().0)
}

/// Take the low 20 bytes of a storage word as an address.
pub fn word_to_address(word: U256) -> Address {
    Address::from_word(word_to_b256(word))
}

/// Big-endian bytes of a storage word.
pub fn word_to_b256(word: U256) -> B256 {
    B256::from(word.to_be_bytes::<32>())
}

/// Saturating narrowing of a storage word to `u64`.
pub fn word_to_u64(word: U256) -> u64 {
    u64::try_from(word).unwrap_or(u64::MAX)
}
