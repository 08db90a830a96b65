//! Local chain: a [`MemoryLedger`] persisted as a JSON snapshot.
//!
//! The snapshot holds the world state only. Contract code is resolved by
//! code id, so both known contracts are registered again every time a chain
//! is opened.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy_primitives::address;
use alloy_sol_types::{SolCall, SolValue};
use chrono::Utc;
use reentry_attacker::ReentrantAttacker;
use reentry_core::ledger::{MemoryLedger, WorldState};
use reentry_core::revert::Revert;
use reentry_core::types::{Receipt, Transaction};
use reentry_core::{Address, B256, Bytes, U256};
use reentry_victim::{GraderModel, observed_params};

use crate::config::AppConfig;
use crate::error::NodeError;

/// Owner of the grader installed at genesis.
pub const GRADER_OWNER: Address = address!("00000000000000000000000000000000000a11ce");

pub struct LocalChain {
    ledger: MemoryLedger,
    path: Option<PathBuf>,
}

fn register_codes(ledger: &mut MemoryLedger) {
    ledger.register(Arc::new(GraderModel::new()));
    ledger.register(Arc::new(ReentrantAttacker::new()));
}

fn now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

impl LocalChain {
    /// Fresh chain: the controller is funded and the grader model is
    /// installed at the configured target with its window already open.
    pub fn genesis(config: &AppConfig) -> Result<Self, NodeError> {
        let timestamp = now();
        let mut ledger = MemoryLedger::new(config.chain_id, timestamp);
        register_codes(&mut ledger);
        ledger.fund(config.controller, U256::from(config.genesis_balance_wei))?;
        let params = observed_params(timestamp.saturating_sub(1));
        ledger.install(config.target, reentry_victim::CODE_ID, GRADER_OWNER, &params.abi_encode())?;
        tracing::info!(
            chain_id = config.chain_id,
            controller = %config.controller,
            target = %config.target,
            "created local chain"
        );
        Ok(Self { ledger, path: None })
    }

    /// Open the chain persisted at the configured path, creating it from
    /// genesis if there is none yet.
    pub fn open(config: &AppConfig) -> Result<Self, NodeError> {
        let path = config.chain_path();
        let mut chain = if path.exists() {
            Self::load(&path)?
        } else {
            let chain = Self::genesis(config)?;
            chain.write(&path)?;
            chain
        };
        chain.path = Some(path);
        Ok(chain)
    }

    /// Load a snapshot.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let bytes = std::fs::read(path)?;
        let state: WorldState = serde_json::from_slice(&bytes)?;
        let mut ledger = MemoryLedger::from_state(state);
        register_codes(&mut ledger);
        tracing::debug!(path = %path.display(), block = ledger.block_number(), "loaded local chain");
        Ok(Self {
            ledger,
            path: Some(path.to_path_buf()),
        })
    }

    fn write(&self, path: &Path) -> Result<(), NodeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self.ledger.state())?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Persist the snapshot. In-memory chains have nothing to write.
    pub fn save(&self) -> Result<(), NodeError> {
        match &self.path {
            Some(path) => self.write(path),
            None => Ok(()),
        }
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut MemoryLedger {
        &mut self.ledger
    }

    /// Mine a transaction and persist the result. The block clock never
    /// runs behind the wall clock.
    pub fn submit(&mut self, tx: &Transaction) -> Result<Receipt, NodeError> {
        let wall = now();
        if wall > self.ledger.timestamp() {
            self.ledger.set_timestamp(wall);
        }
        let receipt = self.ledger.transact(tx)?;
        self.save()?;
        if let Some(revert) = receipt.revert() {
            tracing::warn!(tx = %receipt.tx_hash, reason = %revert, "transaction reverted");
        }
        Ok(receipt)
    }

    /// Read-only call.
    pub fn view(&mut self, from: Address, to: Address, input: &[u8]) -> Result<Bytes, Revert> {
        self.ledger.call_view(from, to, input)
    }

    /// Read-only call decoding the single return value of `call`.
    pub fn view_call<C: SolCall>(&mut self, from: Address, to: Address, call: &C) -> Result<C::Return, NodeError> {
        let out = self
            .view(from, to, &call.abi_encode())
            .map_err(|revert| NodeError::from_revert(&revert))?;
        C::abi_decode_returns(&out, true).map_err(|e| NodeError::Revert(format!("malformed return data: {e}")))
    }

    /// Credit an account outside of any transaction (development faucet).
    pub fn faucet(&mut self, account: Address, amount: U256) -> Result<(), NodeError> {
        self.ledger.fund(account, amount)?;
        self.save()
    }

    pub fn balance(&self, account: Address) -> U256 {
        self.ledger.balance(account)
    }

    pub fn has_code(&self, account: Address) -> bool {
        self.ledger.code_of(account).is_some()
    }

    pub fn storage_at(&self, account: Address, slot: B256) -> U256 {
        self.ledger.storage_at(account, slot)
    }

    pub fn chain_id(&self) -> u64 {
        self.ledger.chain_id()
    }

    pub fn block_number(&self) -> u64 {
        self.ledger.block_number()
    }

    pub fn timestamp(&self) -> u64 {
        self.ledger.timestamp()
    }
}
