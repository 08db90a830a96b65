//! Transactions, receipts, logs and call traces.
//!
//! All monetary values are in wei.

use alloy_primitives::{Address, B256, Bytes, LogData, U256, keccak256};
use serde::{Deserialize, Serialize};

use crate::revert::Revert;

/// What a transaction does: call an existing account or create a contract.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum TxKind {
    /// Message call to an account (plain transfer when it has no code).
    Call(Address),
    /// Contract creation from registered code with ABI-encoded constructor args.
    Create {
        /// Code id in the ledger's registry.
        code: String,
        /// Constructor arguments.
        args: Bytes,
    },
}

/// A top-level transaction submitted by an externally owned account.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Sender; pays `value`.
    pub from: Address,
    /// Call target or creation payload.
    pub kind: TxKind,
    /// Wei attached to the call.
    pub value: U256,
    /// Calldata (ignored for creation).
    pub input: Bytes,
}

impl Transaction {
    /// Message call with calldata and value.
    pub fn call(from: Address, to: Address, value: U256, input: impl Into<Bytes>) -> Self {
        Self {
            from,
            kind: TxKind::Call(to),
            value,
            input: input.into(),
        }
    }

    /// Plain value transfer (empty calldata).
    pub fn transfer(from: Address, to: Address, value: U256) -> Self {
        Self::call(from, to, value, Bytes::new())
    }

    /// Contract creation.
    pub fn create(from: Address, code: impl Into<String>, args: impl Into<Bytes>, value: U256) -> Self {
        Self {
            from,
            kind: TxKind::Create {
                code: code.into(),
                args: args.into(),
            },
            value,
            input: Bytes::new(),
        }
    }

    /// Call target, if this is a message call.
    pub fn to(&self) -> Option<Address> {
        match &self.kind {
            TxKind::Call(to) => Some(*to),
            TxKind::Create { .. } => None,
        }
    }

    /// Transaction hash: keccak256 over the sender, its nonce and the payload.
    pub fn hash(&self, nonce: u64) -> B256 {
        let mut buf = Vec::with_capacity(128 + self.input.len());
        buf.extend_from_slice(self.from.as_slice());
        buf.extend_from_slice(&nonce.to_be_bytes());
        match &self.kind {
            TxKind::Call(to) => {
                buf.push(0x00);
                buf.extend_from_slice(to.as_slice());
            }
            TxKind::Create { code, args } => {
                buf.push(0x01);
                buf.extend_from_slice(code.as_bytes());
                buf.extend_from_slice(args);
            }
        }
        buf.extend_from_slice(&self.value.to_be_bytes::<32>());
        buf.extend_from_slice(&self.input);
        keccak256(buf)
    }
}

/// An event emitted by a contract.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Log {
    /// Emitting contract.
    pub address: Address,
    /// Topics and data.
    pub data: LogData,
}

/// One entry of a transaction's call trace.
///
/// Frames are recorded in the order calls start; `depth` 0 is the
/// top-level call. Reverted frames stay in the trace.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CallFrame {
    /// Nesting depth of this call.
    pub depth: usize,
    /// Account that made the call.
    pub caller: Address,
    /// Account that was called.
    pub callee: Address,
    /// Wei transferred with the call.
    pub value: U256,
    /// Function selector, if calldata had one.
    pub selector: Option<[u8; 4]>,
    /// Whether the frame was a read-only call.
    pub is_static: bool,
    /// Whether the frame reverted.
    pub reverted: bool,
}

/// Outcome of a transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// Committed; carries the top-level return data.
    Success {
        /// ABI-encoded return data.
        output: Bytes,
    },
    /// Rolled back; carries the revert payload of the top-level call.
    Reverted {
        /// Revert payload.
        revert: Revert,
    },
}

/// Receipt of an executed transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Block that included the transaction.
    pub block_number: u64,
    /// Block timestamp (Unix seconds).
    pub timestamp: u64,
    /// Sender.
    pub from: Address,
    /// Call target, `None` for creations.
    pub to: Option<Address>,
    /// Address of the created contract.
    pub contract_address: Option<Address>,
    /// Success or revert.
    pub status: TxStatus,
    /// Events from committed frames. Empty when reverted.
    pub logs: Vec<Log>,
    /// Every call frame entered, including reverted ones.
    pub trace: Vec<CallFrame>,
}

impl Receipt {
    /// Whether the transaction committed.
    pub fn is_success(&self) -> bool {
        matches!(self.status, TxStatus::Success { .. })
    }

    /// Return data of a committed transaction.
    pub fn output(&self) -> Option<&Bytes> {
        match &self.status {
            TxStatus::Success { output } => Some(output),
            TxStatus::Reverted { .. } => None,
        }
    }

    /// Revert payload of a rolled-back transaction.
    pub fn revert(&self) -> Option<&Revert> {
        match &self.status {
            TxStatus::Success { .. } => None,
            TxStatus::Reverted { revert } => Some(revert),
        }
    }

    /// Number of calls to `callee` with `selector`.
    pub fn count_calls(&self, callee: Address, selector: [u8; 4]) -> usize {
        self.trace
            .iter()
            .filter(|f| f.callee == callee && f.selector == Some(selector))
            .count()
    }

    /// Deepest simultaneous nesting of calls to `callee` with `selector`.
    ///
    /// Walks the trace keeping the chain of active ancestors; a frame at
    /// depth `d` closes every open frame at depth `>= d`.
    pub fn max_nesting(&self, callee: Address, selector: [u8; 4]) -> usize {
        let mut open: Vec<(usize, bool)> = Vec::new();
        let mut max = 0;
        for frame in &self.trace {
            while open.last().is_some_and(|(depth, _)| *depth >= frame.depth) {
                open.pop();
            }
            open.push((frame.depth, frame.callee == callee && frame.selector == Some(selector)));
            let active = open.iter().filter(|(_, hit)| *hit).count();
            max = max.max(active);
        }
        max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(depth: usize, callee: u8, selector: [u8; 4]) -> CallFrame {
        CallFrame {
            depth,
            caller: Address::ZERO,
            callee: Address::repeat_byte(callee),
            value: U256::ZERO,
            selector: Some(selector),
            is_static: false,
            reverted: false,
        }
    }

    fn receipt_with(trace: Vec<CallFrame>) -> Receipt {
        Receipt {
            tx_hash: B256::ZERO,
            block_number: 1,
            timestamp: 1,
            from: Address::ZERO,
            to: None,
            contract_address: None,
            status: TxStatus::Success {
                output: Bytes::new(),
            },
            logs: vec![],
            trace,
        }
    }

    #[test]
    fn hash_depends_on_nonce() {
        let tx = Transaction::transfer(Address::ZERO, Address::repeat_byte(1), U256::from(5));
        assert_ne!(tx.hash(0), tx.hash(1));
        assert_eq!(tx.hash(7), tx.hash(7));
    }

    #[test]
    fn create_has_no_target() {
        let tx = Transaction::create(Address::ZERO, "code", Bytes::new(), U256::ZERO);
        assert!(tx.to().is_none());
    }

    #[test]
    fn nesting_counts_only_ancestor_chain() {
        let sel = [1, 2, 3, 4];
        let other = [9, 9, 9, 9];
        // depth 0 A.sel -> depth 1 B -> depth 2 A.sel -> depth 3 B -> depth 4 A.sel
        // then a sibling A.sel at depth 2 after unwinding.
        let receipt = receipt_with(vec![
            frame(0, 0xA, sel),
            frame(1, 0xB, other),
            frame(2, 0xA, sel),
            frame(3, 0xB, other),
            frame(4, 0xA, sel),
            frame(2, 0xA, sel),
        ]);
        assert_eq!(receipt.max_nesting(Address::repeat_byte(0xA), sel), 3);
        assert_eq!(receipt.count_calls(Address::repeat_byte(0xA), sel), 4);
    }

    #[test]
    fn sequential_calls_do_not_nest() {
        let sel = [1, 2, 3, 4];
        let receipt = receipt_with(vec![frame(0, 0xC, [0; 4]), frame(1, 0xA, sel), frame(1, 0xA, sel)]);
        assert_eq!(receipt.max_nesting(Address::repeat_byte(0xA), sel), 1);
    }
}
