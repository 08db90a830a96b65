//! Typed client for a deployed driver.
//!
//! [`AttackClient`] encodes driver calls, submits them to a [`LocalChain`]
//! and turns receipts into [`AttackReport`]s: a reverted attack is not an
//! `Err` here but a report in the [`AttackState::Failed`] state, because
//! the chain rolls the driver's own storage back and the failure would
//! otherwise be invisible.

use std::fmt;

use alloy_sol_types::{SolCall, SolEvent, SolValue};
use reentry_attacker::{AttackError, AttackState};
use reentry_core::abi::{IGrader5, IReentrantAttacker};
use reentry_core::constants::format_ether;
use reentry_core::types::{Log, Receipt, Transaction};
use reentry_core::{Address, B256, U256};

use crate::chain::LocalChain;
use crate::config::AppConfig;
use crate::error::NodeError;

/// Decoded `getAttackStatus`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttackStatus {
    pub state: AttackState,
    pub counter: U256,
    pub graded: bool,
    pub balance: U256,
    pub grade: U256,
    pub reentries: U256,
}

/// Driver event decoded from a receipt log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverEvent {
    AttackStarted { controller: Address, value: U256 },
    ReentryTriggered { depth: U256, counter: U256 },
    RegistrationSuccess { name: String, grade: U256 },
    Withdrawal { to: Address, amount: U256 },
    Deposit { from: Address, amount: U256 },
}

impl DriverEvent {
    /// Decode a log emitted by the driver. Unknown logs yield `None`.
    pub fn decode(log: &Log) -> Option<Self> {
        let topic = *log.data.topics().first()?;
        let data = &log.data;
        let event = if topic == IReentrantAttacker::AttackStarted::SIGNATURE_HASH {
            let e = IReentrantAttacker::AttackStarted::decode_log_data(data, true).ok()?;
            Self::AttackStarted {
                controller: e.controller,
                value: e.value,
            }
        } else if topic == IReentrantAttacker::ReentryTriggered::SIGNATURE_HASH {
            let e = IReentrantAttacker::ReentryTriggered::decode_log_data(data, true).ok()?;
            Self::ReentryTriggered {
                depth: e.depth,
                counter: e.counter,
            }
        } else if topic == IReentrantAttacker::RegistrationSuccess::SIGNATURE_HASH {
            let e = IReentrantAttacker::RegistrationSuccess::decode_log_data(data, true).ok()?;
            Self::RegistrationSuccess {
                name: e.name,
                grade: e.grade,
            }
        } else if topic == IReentrantAttacker::Withdrawal::SIGNATURE_HASH {
            let e = IReentrantAttacker::Withdrawal::decode_log_data(data, true).ok()?;
            Self::Withdrawal {
                to: e.to,
                amount: e.amount,
            }
        } else if topic == IReentrantAttacker::Deposit::SIGNATURE_HASH {
            let e = IReentrantAttacker::Deposit::decode_log_data(data, true).ok()?;
            Self::Deposit {
                from: e.from,
                amount: e.amount,
            }
        } else {
            return None;
        };
        Some(event)
    }
}

impl fmt::Display for DriverEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttackStarted { controller, value } => {
                write!(f, "AttackStarted(controller={controller}, value={} ETH)", format_ether(*value))
            }
            Self::ReentryTriggered { depth, counter } => {
                write!(f, "ReentryTriggered(depth={depth}, counter={counter})")
            }
            Self::RegistrationSuccess { name, grade } => write!(f, "RegistrationSuccess(name={name}, grade={grade})"),
            Self::Withdrawal { to, amount } => write!(f, "Withdrawal(to={to}, amount={} ETH)", format_ether(*amount)),
            Self::Deposit { from, amount } => write!(f, "Deposit(from={from}, amount={} ETH)", format_ether(*amount)),
        }
    }
}

/// Outcome of an attack or registration transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttackReport {
    pub tx_hash: B256,
    pub block_number: u64,
    /// `Completed` or `InProgress` on success, `Failed` when the transaction reverted.
    pub state: AttackState,
    /// Grade returned by the driver, when registration happened.
    pub grade: Option<U256>,
    /// Driver error decoded from the revert payload.
    pub error: Option<AttackError>,
    /// Revert reason, for payloads that are not driver errors.
    pub revert_reason: Option<String>,
    pub events: Vec<DriverEvent>,
    /// `retrieve` calls made on the target, reentrant ones included.
    pub retrieve_calls: usize,
    /// Deepest nesting of `retrieve` calls.
    pub max_nesting: usize,
}

impl AttackReport {
    pub fn is_success(&self) -> bool {
        self.state != AttackState::Failed
    }

    /// Human-readable failure, if any.
    pub fn failure(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(ToString::to_string)
            .or_else(|| self.revert_reason.clone())
    }
}

/// Client bound to one deployed driver.
pub struct AttackClient<'c> {
    chain: &'c mut LocalChain,
    driver: Address,
    controller: Address,
    target: Address,
}

impl<'c> AttackClient<'c> {
    pub fn new(chain: &'c mut LocalChain, driver: Address, controller: Address, target: Address) -> Self {
        Self {
            chain,
            driver,
            controller,
            target,
        }
    }

    /// Deploy a driver from the configured controller.
    pub fn deploy(chain: &'c mut LocalChain, config: &AppConfig) -> Result<(Self, Receipt), NodeError> {
        let tx = Transaction::create(
            config.controller,
            reentry_attacker::CODE_ID,
            config.attacker_params().abi_encode(),
            U256::ZERO,
        );
        let receipt = chain.submit(&tx)?;
        let driver = match (receipt.contract_address, receipt.revert()) {
            (Some(driver), _) => driver,
            (None, Some(revert)) => return Err(NodeError::from_revert(revert)),
            (None, None) => return Err(NodeError::Revert("deployment produced no contract".into())),
        };
        tracing::info!(%driver, tx = %receipt.tx_hash, "driver deployed");
        Ok((Self::new(chain, driver, config.controller, config.target), receipt))
    }

    pub fn driver(&self) -> Address {
        self.driver
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    pub fn chain(&mut self) -> &mut LocalChain {
        &mut *self.chain
    }

    fn view<C: SolCall>(&mut self, to: Address, call: C) -> Result<C::Return, NodeError> {
        self.chain.view_call(self.controller, to, &call)
    }

    fn send<C: SolCall>(&mut self, from: Address, call: C, value: U256) -> Result<Receipt, NodeError> {
        let tx = Transaction::call(from, self.driver, value, call.abi_encode());
        self.chain.submit(&tx)
    }

    /// `getAttackStatus`.
    pub fn status(&mut self) -> Result<AttackStatus, NodeError> {
        let s = self.view(self.driver, IReentrantAttacker::getAttackStatusCall {})?;
        Ok(AttackStatus {
            state: AttackState::from_u8(s.state),
            counter: s.counter,
            graded: s.graded,
            balance: s.balance,
            grade: s.grade,
            reentries: s.reentries,
        })
    }

    /// Grade the target records for `name` (0 when unregistered).
    pub fn student_grade(&mut self, name: &str) -> Result<U256, NodeError> {
        let call = IReentrantAttacker::checkStudentGradeCall { name: name.to_string() };
        Ok(self.view(self.driver, call)?._0)
    }

    pub fn counter(&mut self) -> Result<U256, NodeError> {
        Ok(self.view(self.driver, IReentrantAttacker::checkCounterCall {})?._0)
    }

    pub fn is_graded(&mut self) -> Result<bool, NodeError> {
        Ok(self.view(self.driver, IReentrantAttacker::checkIfGradedCall {})?._0)
    }

    /// Whether the target reports `name` registered, read from the target directly.
    pub fn target_has_student(&mut self, name: &str) -> Result<bool, NodeError> {
        let call = IGrader5::studentsCall { name: name.to_string() };
        Ok(!self.view(self.target, call)?._0.is_zero())
    }

    /// `executeAttack{value}` from `from`.
    pub fn execute_attack_from(&mut self, from: Address, value: U256) -> Result<AttackReport, NodeError> {
        let receipt = self.send(from, IReentrantAttacker::executeAttackCall {}, value)?;
        self.report(&receipt, |_| None)
    }

    /// `executeAttack{value}` from the controller.
    pub fn execute_attack(&mut self, value: U256) -> Result<AttackReport, NodeError> {
        self.execute_attack_from(self.controller, value)
    }

    /// `registerStudent(name)` from `from`.
    pub fn register_student_from(&mut self, from: Address, name: &str) -> Result<AttackReport, NodeError> {
        let call = IReentrantAttacker::registerStudentCall { name: name.to_string() };
        let receipt = self.send(from, call, U256::ZERO)?;
        self.report(&receipt, |out| {
            IReentrantAttacker::registerStudentCall::abi_decode_returns(out, true)
                .ok()
                .map(|r| r.grade)
        })
    }

    pub fn register_student(&mut self, name: &str) -> Result<AttackReport, NodeError> {
        self.register_student_from(self.controller, name)
    }

    /// `attackAndRegister{value}(name)` from `from`.
    pub fn attack_and_register_from(
        &mut self,
        from: Address,
        name: &str,
        value: U256,
    ) -> Result<AttackReport, NodeError> {
        let call = IReentrantAttacker::attackAndRegisterCall { name: name.to_string() };
        let receipt = self.send(from, call, value)?;
        self.report(&receipt, |out| {
            IReentrantAttacker::attackAndRegisterCall::abi_decode_returns(out, true)
                .ok()
                .map(|r| r.grade)
        })
    }

    pub fn attack_and_register(&mut self, name: &str, value: U256) -> Result<AttackReport, NodeError> {
        self.attack_and_register_from(self.controller, name, value)
    }

    /// `withdraw()` from `from`. Returns the amount moved to the controller.
    pub fn withdraw_from(&mut self, from: Address) -> Result<U256, NodeError> {
        let receipt = self.send(from, IReentrantAttacker::withdrawCall {}, U256::ZERO)?;
        if let Some(revert) = receipt.revert() {
            return Err(NodeError::from_revert(revert));
        }
        let amount = receipt
            .logs
            .iter()
            .filter_map(DriverEvent::decode)
            .find_map(|event| match event {
                DriverEvent::Withdrawal { amount, .. } => Some(amount),
                _ => None,
            })
            .unwrap_or_default();
        Ok(amount)
    }

    pub fn withdraw(&mut self) -> Result<U256, NodeError> {
        self.withdraw_from(self.controller)
    }

    /// Plain transfer into the driver.
    pub fn deposit(&mut self, from: Address, amount: U256) -> Result<Receipt, NodeError> {
        let receipt = self.chain.submit(&Transaction::transfer(from, self.driver, amount))?;
        if let Some(revert) = receipt.revert() {
            return Err(NodeError::from_revert(revert));
        }
        Ok(receipt)
    }

    fn report(
        &mut self,
        receipt: &Receipt,
        grade_of: impl Fn(&[u8]) -> Option<U256>,
    ) -> Result<AttackReport, NodeError> {
        let retrieve = IGrader5::retrieveCall::SELECTOR;
        let events = receipt
            .logs
            .iter()
            .filter(|log| log.address == self.driver)
            .filter_map(DriverEvent::decode)
            .collect();
        let mut report = AttackReport {
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            state: AttackState::Failed,
            grade: None,
            error: None,
            revert_reason: None,
            events,
            retrieve_calls: receipt.count_calls(self.target, retrieve),
            max_nesting: receipt.max_nesting(self.target, retrieve),
        };
        match (receipt.output(), receipt.revert()) {
            (Some(output), _) => {
                report.grade = grade_of(output);
                report.state = self.status().map(|s| s.state).unwrap_or(AttackState::Failed);
            }
            (None, Some(revert)) => {
                match AttackError::from_revert(revert) {
                    Some(err) => report.error = Some(err),
                    None => report.revert_reason = Some(revert.to_string()),
                }
                tracing::warn!(tx = %receipt.tx_hash, failure = ?report.failure(), "attack transaction failed");
            }
            (None, None) => {}
        }
        Ok(report)
    }
}
