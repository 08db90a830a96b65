//! In-memory account ledger and contract runtime.
//!
//! [`MemoryLedger`] holds the world state (balances, nonces, code ids and
//! storage) and executes transactions against it. Execution is journaled:
//! every mutation records the value it replaced, and a failing call frame
//! unwinds the journal back to the checkpoint taken when the frame started.
//! A failing top-level call therefore leaves no trace in the state except
//! the sender's nonce bump.
//!
//! Every transaction is mined into its own block; the block number and
//! timestamp both advance by one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, LogData, U256, keccak256};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_CALL_DEPTH;
use crate::error::LedgerError;
use crate::revert::Revert;
use crate::traits::{CallContext, Contract, Host};
use crate::types::{CallFrame, Log, Receipt, Transaction, TxKind, TxStatus};

/// A single account.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    /// Balance in wei.
    pub balance: U256,
    /// Number of transactions sent.
    pub nonce: u64,
    /// Code id of the contract deployed here, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Non-zero storage slots.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage: BTreeMap<B256, U256>,
}

/// Serializable world state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorldState {
    /// Chain id reported to clients.
    pub chain_id: u64,
    /// Number of the last mined block.
    pub block_number: u64,
    /// Timestamp of the last mined block (Unix seconds).
    pub timestamp: u64,
    /// All known accounts.
    pub accounts: BTreeMap<Address, Account>,
}

impl WorldState {
    /// Empty state at block 0.
    pub fn new(chain_id: u64, timestamp: u64) -> Self {
        Self {
            chain_id,
            block_number: 0,
            timestamp,
            accounts: BTreeMap::new(),
        }
    }
}

/// Contract code by id.
#[derive(Clone, Default)]
pub struct CodeRegistry {
    codes: HashMap<String, Arc<dyn Contract>>,
}

impl CodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `contract` under its own code id, replacing any previous entry.
    pub fn register(&mut self, contract: Arc<dyn Contract>) {
        self.codes.insert(contract.code_id().to_string(), contract);
    }

    pub fn get(&self, code_id: &str) -> Option<Arc<dyn Contract>> {
        self.codes.get(code_id).cloned()
    }

    pub fn contains(&self, code_id: &str) -> bool {
        self.codes.contains_key(code_id)
    }
}

/// Address of a contract created by `creator` at `nonce`.
pub fn create_address(creator: Address, nonce: u64) -> Address {
    let mut buf = [0u8; 28];
    buf[..20].copy_from_slice(creator.as_slice());
    buf[20..].copy_from_slice(&nonce.to_be_bytes());
    Address::from_slice(&keccak256(buf)[12..])
}

/// Ledger holding world state and the code registry.
pub struct MemoryLedger {
    state: WorldState,
    registry: CodeRegistry,
}

impl MemoryLedger {
    /// Empty ledger.
    pub fn new(chain_id: u64, timestamp: u64) -> Self {
        Self::from_state(WorldState::new(chain_id, timestamp))
    }

    /// Ledger over an existing state (e.g. loaded from disk). Code must be
    /// registered again before the contracts in it can run.
    pub fn from_state(state: WorldState) -> Self {
        Self {
            state,
            registry: CodeRegistry::new(),
        }
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn into_state(self) -> WorldState {
        self.state
    }

    pub fn register(&mut self, contract: Arc<dyn Contract>) {
        self.registry.register(contract);
    }

    pub fn registry(&self) -> &CodeRegistry {
        &self.registry
    }

    /// Credit `amount` to `account` outside of any transaction.
    pub fn fund(&mut self, account: Address, amount: U256) -> Result<(), LedgerError> {
        let entry = self.state.accounts.entry(account).or_default();
        entry.balance = entry.balance.checked_add(amount).ok_or(LedgerError::ValueOverflow)?;
        Ok(())
    }

    /// Deploy `code_id` at a fixed `address` with `deployer` as constructor caller.
    ///
    /// Used to seed genesis state with contracts whose addresses are known
    /// in advance.
    pub fn install(
        &mut self,
        address: Address,
        code_id: &str,
        deployer: Address,
        args: &[u8],
    ) -> Result<(), LedgerError> {
        let contract = self
            .registry
            .get(code_id)
            .ok_or_else(|| LedgerError::UnknownCode(code_id.to_string()))?;
        if self.code_of(address).is_some() {
            return Err(LedgerError::AccountExists(address));
        }
        let mut exec = Executor::new(&mut self.state, &self.registry, deployer);
        exec.execute_create(deployer, address, contract, args, U256::ZERO)
            .map_err(|revert| LedgerError::ConstructorReverted(revert.to_string()))?;
        tracing::debug!(%address, code_id, "installed contract");
        Ok(())
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.state.timestamp = timestamp;
    }

    pub fn timestamp(&self) -> u64 {
        self.state.timestamp
    }

    pub fn block_number(&self) -> u64 {
        self.state.block_number
    }

    pub fn chain_id(&self) -> u64 {
        self.state.chain_id
    }

    pub fn balance(&self, account: Address) -> U256 {
        self.state.accounts.get(&account).map(|a| a.balance).unwrap_or_default()
    }

    pub fn nonce(&self, account: Address) -> u64 {
        self.state.accounts.get(&account).map(|a| a.nonce).unwrap_or_default()
    }

    pub fn code_of(&self, account: Address) -> Option<&str> {
        self.state.accounts.get(&account).and_then(|a| a.code.as_deref())
    }

    pub fn storage_at(&self, account: Address, slot: B256) -> U256 {
        self.state
            .accounts
            .get(&account)
            .and_then(|a| a.storage.get(&slot).copied())
            .unwrap_or_default()
    }

    /// Execute and mine one transaction.
    ///
    /// Returns `Err` only when the transaction cannot be executed at all
    /// (unaffordable value, unknown code). Contract failures are reported
    /// in the receipt status with all state changes rolled back.
    pub fn transact(&mut self, tx: &Transaction) -> Result<Receipt, LedgerError> {
        let have = self.balance(tx.from);
        if have < tx.value {
            return Err(LedgerError::InsufficientFunds { have, need: tx.value });
        }
        let contract = match &tx.kind {
            TxKind::Create { code, .. } => Some(
                self.registry
                    .get(code)
                    .ok_or_else(|| LedgerError::UnknownCode(code.clone()))?,
            ),
            TxKind::Call(_) => None,
        };

        let nonce = self.nonce(tx.from);
        let tx_hash = tx.hash(nonce);
        let sender = self.state.accounts.entry(tx.from).or_default();
        sender.nonce = nonce.saturating_add(1);
        self.state.block_number += 1;
        self.state.timestamp += 1;

        let mut exec = Executor::new(&mut self.state, &self.registry, tx.from);
        let mut contract_address = None;
        let result = match (&tx.kind, contract) {
            (TxKind::Call(to), _) => exec.execute_call(tx.from, *to, tx.value, &tx.input, false),
            (TxKind::Create { args, .. }, Some(contract)) => {
                let address = create_address(tx.from, nonce);
                exec.execute_create(tx.from, address, contract, args, tx.value)
                    .map(|()| {
                        contract_address = Some(address);
                        Bytes::new()
                    })
            }
            (TxKind::Create { code, .. }, None) => Err(Revert::reason(format!("unknown code {code}"))),
        };
        let (logs, trace) = exec.finish();

        let status = match result {
            Ok(output) => TxStatus::Success { output },
            Err(revert) => {
                tracing::debug!(%tx_hash, reason = %revert, "transaction reverted");
                TxStatus::Reverted { revert }
            }
        };
        let receipt = Receipt {
            tx_hash,
            block_number: self.state.block_number,
            timestamp: self.state.timestamp,
            from: tx.from,
            to: tx.to(),
            contract_address,
            status,
            logs,
            trace,
        };
        tracing::debug!(
            %tx_hash,
            block = receipt.block_number,
            success = receipt.is_success(),
            frames = receipt.trace.len(),
            "mined transaction"
        );
        Ok(receipt)
    }

    /// Read-only call against the current state. Nothing is mined.
    pub fn call_view(&mut self, from: Address, to: Address, input: &[u8]) -> Result<Bytes, Revert> {
        let mut exec = Executor::new(&mut self.state, &self.registry, from);
        let result = exec.execute_call(from, to, U256::ZERO, input, true);
        exec.rollback();
        result
    }
}

/// Undo record for one state mutation.
#[derive(Clone, Debug)]
enum JournalEntry {
    AccountCreated(Address),
    Balance { account: Address, previous: U256 },
    Storage { account: Address, slot: B256, previous: U256 },
    Code { account: Address, previous: Option<String> },
}

#[derive(Clone, Copy, Debug)]
struct Checkpoint {
    journal_len: usize,
    logs_len: usize,
}

/// Executing frame's identity.
#[derive(Clone, Copy, Debug, Default)]
struct Frame {
    address: Address,
    is_static: bool,
}

/// Transient execution state of one transaction.
struct Executor<'a> {
    state: &'a mut WorldState,
    registry: &'a CodeRegistry,
    origin: Address,
    journal: Vec<JournalEntry>,
    logs: Vec<Log>,
    trace: Vec<CallFrame>,
    frames: Vec<Frame>,
}

impl<'a> Executor<'a> {
    fn new(state: &'a mut WorldState, registry: &'a CodeRegistry, origin: Address) -> Self {
        Self {
            state,
            registry,
            origin,
            journal: Vec::new(),
            logs: Vec::new(),
            trace: Vec::new(),
            frames: Vec::new(),
        }
    }

    fn finish(self) -> (Vec<Log>, Vec<CallFrame>) {
        (self.logs, self.trace)
    }

    fn rollback(&mut self) {
        self.revert_to(Checkpoint {
            journal_len: 0,
            logs_len: 0,
        });
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            journal_len: self.journal.len(),
            logs_len: self.logs.len(),
        }
    }

    fn revert_to(&mut self, checkpoint: Checkpoint) {
        while self.journal.len() > checkpoint.journal_len {
            let Some(entry) = self.journal.pop() else { break };
            match entry {
                JournalEntry::AccountCreated(account) => {
                    self.state.accounts.remove(&account);
                }
                JournalEntry::Balance { account, previous } => {
                    if let Some(acct) = self.state.accounts.get_mut(&account) {
                        acct.balance = previous;
                    }
                }
                JournalEntry::Storage { account, slot, previous } => {
                    if let Some(acct) = self.state.accounts.get_mut(&account) {
                        write_slot(acct, slot, previous);
                    }
                }
                JournalEntry::Code { account, previous } => {
                    if let Some(acct) = self.state.accounts.get_mut(&account) {
                        acct.code = previous;
                    }
                }
            }
        }
        self.logs.truncate(checkpoint.logs_len);
    }

    fn frame(&self) -> Frame {
        self.frames.last().copied().unwrap_or_default()
    }

    fn touch(&mut self, account: Address) -> &mut Account {
        if !self.state.accounts.contains_key(&account) {
            self.journal.push(JournalEntry::AccountCreated(account));
        }
        self.state.accounts.entry(account).or_default()
    }

    fn balance_of(&self, account: Address) -> U256 {
        self.state.accounts.get(&account).map(|a| a.balance).unwrap_or_default()
    }

    fn set_balance(&mut self, account: Address, balance: U256) {
        let previous = self.touch(account).balance;
        self.journal.push(JournalEntry::Balance { account, previous });
        self.touch(account).balance = balance;
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), Revert> {
        if value.is_zero() || from == to {
            return Ok(());
        }
        let from_balance = self.balance_of(from);
        if from_balance < value {
            return Err(Revert::reason("insufficient balance for transfer"));
        }
        let to_balance = self
            .balance_of(to)
            .checked_add(value)
            .ok_or_else(|| Revert::reason("balance overflow"))?;
        self.set_balance(from, from_balance - value);
        self.set_balance(to, to_balance);
        Ok(())
    }

    fn contract_at(&self, account: Address) -> Result<Option<Arc<dyn Contract>>, Revert> {
        let Some(code) = self.state.accounts.get(&account).and_then(|a| a.code.as_deref()) else {
            return Ok(None);
        };
        self.registry
            .get(code)
            .map(Some)
            .ok_or_else(|| Revert::reason(format!("code {code} is not registered")))
    }

    fn execute_call(
        &mut self,
        caller: Address,
        to: Address,
        value: U256,
        input: &[u8],
        is_static: bool,
    ) -> Result<Bytes, Revert> {
        let depth = self.frames.len();
        let trace_index = self.trace.len();
        self.trace.push(CallFrame {
            depth,
            caller,
            callee: to,
            value,
            selector: selector_of(input),
            is_static,
            reverted: false,
        });
        let checkpoint = self.checkpoint();
        let result = self.run_call(caller, to, value, input, is_static, depth);
        if result.is_err() {
            self.revert_to(checkpoint);
            self.trace[trace_index].reverted = true;
        }
        result
    }

    fn run_call(
        &mut self,
        caller: Address,
        to: Address,
        value: U256,
        input: &[u8],
        is_static: bool,
        depth: usize,
    ) -> Result<Bytes, Revert> {
        if depth >= MAX_CALL_DEPTH {
            return Err(Revert::reason("call depth exceeded"));
        }
        if is_static && !value.is_zero() {
            return Err(Revert::reason("value transfer in static call"));
        }
        self.transfer(caller, to, value)?;
        let Some(contract) = self.contract_at(to)? else {
            return Ok(Bytes::new());
        };
        let ctx = CallContext {
            caller,
            address: to,
            value,
            origin: self.origin,
            depth,
            is_static,
        };
        self.frames.push(Frame { address: to, is_static });
        let result = contract.call(self, &ctx, input);
        self.frames.pop();
        result
    }

    fn execute_create(
        &mut self,
        caller: Address,
        address: Address,
        contract: Arc<dyn Contract>,
        args: &[u8],
        value: U256,
    ) -> Result<(), Revert> {
        let depth = self.frames.len();
        let trace_index = self.trace.len();
        self.trace.push(CallFrame {
            depth,
            caller,
            callee: address,
            value,
            selector: None,
            is_static: false,
            reverted: false,
        });
        let checkpoint = self.checkpoint();
        let result = self.run_create(caller, address, contract, args, value, depth);
        if result.is_err() {
            self.revert_to(checkpoint);
            self.trace[trace_index].reverted = true;
        }
        result
    }

    fn run_create(
        &mut self,
        caller: Address,
        address: Address,
        contract: Arc<dyn Contract>,
        args: &[u8],
        value: U256,
        depth: usize,
    ) -> Result<(), Revert> {
        if self.state.accounts.get(&address).is_some_and(|a| a.code.is_some()) {
            return Err(Revert::reason("contract address collision"));
        }
        self.transfer(caller, address, value)?;
        let previous = self.touch(address).code.clone();
        self.journal.push(JournalEntry::Code { account: address, previous });
        self.touch(address).code = Some(contract.code_id().to_string());

        let ctx = CallContext {
            caller,
            address,
            value,
            origin: self.origin,
            depth,
            is_static: false,
        };
        self.frames.push(Frame { address, is_static: false });
        let result = contract.construct(self, &ctx, args);
        self.frames.pop();
        result
    }
}

impl Host for Executor<'_> {
    fn sload(&self, slot: B256) -> U256 {
        let address = self.frame().address;
        self.state
            .accounts
            .get(&address)
            .and_then(|a| a.storage.get(&slot).copied())
            .unwrap_or_default()
    }

    fn sstore(&mut self, slot: B256, value: U256) -> Result<(), Revert> {
        let frame = self.frame();
        if frame.is_static {
            return Err(Revert::reason("state change in static call"));
        }
        let previous = self.sload(slot);
        if previous == value {
            return Ok(());
        }
        self.journal.push(JournalEntry::Storage {
            account: frame.address,
            slot,
            previous,
        });
        write_slot(self.touch(frame.address), slot, value);
        Ok(())
    }

    fn balance(&self, account: Address) -> U256 {
        self.balance_of(account)
    }

    fn has_code(&self, account: Address) -> bool {
        self.state.accounts.get(&account).is_some_and(|a| a.code.is_some())
    }

    fn call(&mut self, to: Address, value: U256, input: Bytes) -> Result<Bytes, Revert> {
        let frame = self.frame();
        self.execute_call(frame.address, to, value, &input, frame.is_static)
    }

    fn static_call(&mut self, to: Address, input: Bytes) -> Result<Bytes, Revert> {
        let frame = self.frame();
        self.execute_call(frame.address, to, U256::ZERO, &input, true)
    }

    fn emit(&mut self, log: LogData) -> Result<(), Revert> {
        let frame = self.frame();
        if frame.is_static {
            return Err(Revert::reason("log in static call"));
        }
        self.logs.push(Log {
            address: frame.address,
            data: log,
        });
        Ok(())
    }

    fn timestamp(&self) -> u64 {
        self.state.timestamp
    }

    fn block_number(&self) -> u64 {
        self.state.block_number
    }
}

/// Zero values are not stored.
fn write_slot(account: &mut Account, slot: B256, value: U256) {
    if value.is_zero() {
        account.storage.remove(&slot);
    } else {
        account.storage.insert(slot, value);
    }
}

fn selector_of(input: &[u8]) -> Option<[u8; 4]> {
    let head = input.get(..4)?;
    let mut selector = [0u8; 4];
    selector.copy_from_slice(head);
    Some(selector)
}
