//! The grader contract.
//!
//! Storage layout (one slot each unless noted):
//!
//! | Slot | Variable |
//! |---|---|
//! | 0 | owner |
//! | 1 | divisor |
//! | 2 | startTime |
//! | 3 | deadline |
//! | 4 | minValue |
//! | 5 | refund |
//! | 6 | attemptCap |
//! | 7 | threshold |
//! | 8 | studentCounter |
//! | 9 | `mapping(address => uint256) counter` |
//! | 10 | `mapping(address => bool) isGraded` |
//! | 11 | `mapping(string => uint256) students` |

use alloy_sol_types::{Panic, SolCall, SolInterface, SolValue};
use reentry_core::abi::GraderParams;
use reentry_core::abi::IGrader5::{self, IGrader5Calls};
use reentry_core::constants::{
    GRADER_ATTEMPT_CAP, GRADER_DEADLINE, GRADER_DIVISOR, GRADER_MIN_VALUE, GRADER_REFUND, GRADER_THRESHOLD,
    grade_for,
};
use reentry_core::revert::Revert;
use reentry_core::storage::{address_mapping_slot, slot, string_mapping_slot};
use reentry_core::traits::{CallContext, Contract, Host};
use reentry_core::{Address, B256, Bytes, U256};

/// Registry key of the grader code.
pub const CODE_ID: &str = "grader-model";

const OWNER: u64 = 0;
const DIVISOR: u64 = 1;
const START_TIME: u64 = 2;
const DEADLINE: u64 = 3;
const MIN_VALUE: u64 = 4;
const REFUND: u64 = 5;
const ATTEMPT_CAP: u64 = 6;
const THRESHOLD: u64 = 7;
const STUDENT_COUNTER: u64 = 8;
const COUNTER: u64 = 9;
const IS_GRADED: u64 = 10;
const STUDENTS: u64 = 11;

/// Parameters observed on the deployed grader, with the window opening at
/// `start_time`.
pub fn observed_params(start_time: u64) -> GraderParams {
    GraderParams {
        divisor: U256::from(GRADER_DIVISOR),
        startTime: U256::from(start_time),
        deadline: U256::from(GRADER_DEADLINE),
        minValue: U256::from(GRADER_MIN_VALUE),
        refund: U256::from(GRADER_REFUND),
        attemptCap: U256::from(GRADER_ATTEMPT_CAP),
        threshold: U256::from(GRADER_THRESHOLD),
    }
}

fn counter_slot(account: Address) -> B256 {
    address_mapping_slot(slot(COUNTER), account)
}

fn graded_slot(account: Address) -> B256 {
    address_mapping_slot(slot(IS_GRADED), account)
}

fn student_slot(name: &str) -> B256 {
    string_mapping_slot(slot(STUDENTS), name)
}

/// Stateless grader code; all state lives in the account's storage.
#[derive(Clone, Copy, Debug, Default)]
pub struct GraderModel;

impl GraderModel {
    pub fn new() -> Self {
        Self
    }

    fn only_owner(host: &dyn Host, ctx: &CallContext) -> Result<(), Revert> {
        if host.sload_address(slot(OWNER)) != ctx.caller {
            return Err(Revert::reason("Ownable: caller is not the owner"));
        }
        Ok(())
    }

    fn retrieve(host: &mut dyn Host, ctx: &CallContext) -> Result<Bytes, Revert> {
        if ctx.value <= host.sload(slot(MIN_VALUE)) {
            return Err(Revert::reason("not enough money"));
        }
        let key = counter_slot(ctx.caller);
        let count = host.sload(key).saturating_add(U256::from(1));
        host.sstore(key, count)?;
        if count >= host.sload(slot(ATTEMPT_CAP)) {
            return Err(Revert::reason("too many attempts"));
        }

        let refund = host.sload(slot(REFUND));
        if host.call(ctx.caller, refund, Bytes::new()).is_err() {
            return Err(Revert::reason("Failed to send Ether"));
        }

        // The counter is re-read: the refund may have re-entered.
        if host.sload(key) <= host.sload(slot(THRESHOLD)) {
            host.sstore(key, U256::ZERO)?;
        }
        tracing::trace!(caller = %ctx.caller, depth = ctx.depth, "retrieve");
        Ok(Bytes::new())
    }

    fn grade_me(host: &mut dyn Host, ctx: &CallContext, name: &str) -> Result<Bytes, Revert> {
        let now = U256::from(host.timestamp());
        if !(host.sload(slot(START_TIME)) < now && now < host.sload(slot(DEADLINE))) {
            return Err(Revert::reason("The end"));
        }
        if host.sload(counter_slot(ctx.caller)) <= host.sload(slot(THRESHOLD)) {
            return Err(Revert::reason("Not yet"));
        }

        let divisor = host.sload_u64(slot(DIVISOR));
        if divisor == 0 {
            return Err(Revert::custom(&Panic {
                code: U256::from(0x12),
            }));
        }
        let registered = host.sload_u64(slot(STUDENT_COUNTER));
        let grade = grade_for(registered, divisor);
        host.sstore(slot(STUDENT_COUNTER), U256::from(registered.saturating_add(1)))?;

        let student = student_slot(name);
        if !host.sload(student).is_zero() {
            return Err(Revert::reason("student already exists"));
        }
        if host.sload_bool(graded_slot(ctx.caller)) {
            return Err(Revert::reason("already graded"));
        }
        host.sstore(student, U256::from(grade))?;
        host.sstore_bool(graded_slot(ctx.caller), true)?;
        tracing::debug!(caller = %ctx.caller, name, grade, "student graded");
        Ok(Bytes::new())
    }
}

impl Contract for GraderModel {
    fn code_id(&self) -> &'static str {
        CODE_ID
    }

    fn construct(&self, host: &mut dyn Host, ctx: &CallContext, args: &[u8]) -> Result<(), Revert> {
        let params = GraderParams::abi_decode(args, true).map_err(|_| Revert::empty())?;
        host.sstore_address(slot(OWNER), ctx.caller)?;
        host.sstore(slot(DIVISOR), params.divisor)?;
        host.sstore(slot(START_TIME), params.startTime)?;
        host.sstore(slot(DEADLINE), params.deadline)?;
        host.sstore(slot(MIN_VALUE), params.minValue)?;
        host.sstore(slot(REFUND), params.refund)?;
        host.sstore(slot(ATTEMPT_CAP), params.attemptCap)?;
        host.sstore(slot(THRESHOLD), params.threshold)?;
        Ok(())
    }

    fn call(&self, host: &mut dyn Host, ctx: &CallContext, input: &[u8]) -> Result<Bytes, Revert> {
        // No receive or fallback: plain transfers and unknown selectors revert.
        let call = IGrader5Calls::abi_decode(input, true).map_err(|_| Revert::empty())?;
        if !ctx.value.is_zero() && !matches!(call, IGrader5Calls::retrieve(_)) {
            return Err(Revert::empty());
        }

        let output = match call {
            IGrader5Calls::retrieve(_) => return Self::retrieve(host, ctx),
            IGrader5Calls::gradeMe(call) => return Self::grade_me(host, ctx, &call.name),
            IGrader5Calls::counter(call) => {
                IGrader5::counterCall::abi_encode_returns(&(host.sload(counter_slot(call.account)),))
            }
            IGrader5Calls::isGraded(call) => {
                IGrader5::isGradedCall::abi_encode_returns(&(host.sload_bool(graded_slot(call.account)),))
            }
            IGrader5Calls::students(call) => {
                IGrader5::studentsCall::abi_encode_returns(&(host.sload(student_slot(&call.name)),))
            }
            IGrader5Calls::studentCounter(_) => {
                IGrader5::studentCounterCall::abi_encode_returns(&(host.sload(slot(STUDENT_COUNTER)),))
            }
            IGrader5Calls::divisor(_) => IGrader5::divisorCall::abi_encode_returns(&(host.sload(slot(DIVISOR)),)),
            IGrader5Calls::deadline(_) => {
                IGrader5::deadlineCall::abi_encode_returns(&(host.sload(slot(DEADLINE)),))
            }
            IGrader5Calls::startTime(_) => {
                IGrader5::startTimeCall::abi_encode_returns(&(host.sload(slot(START_TIME)),))
            }
            IGrader5Calls::owner(_) => IGrader5::ownerCall::abi_encode_returns(&(host.sload_address(slot(OWNER)),)),
            IGrader5Calls::setDivisor(call) => {
                Self::only_owner(host, ctx)?;
                host.sstore(slot(DIVISOR), call.newDivisor)?;
                Vec::new()
            }
            IGrader5Calls::setWindow(call) => {
                Self::only_owner(host, ctx)?;
                host.sstore(slot(START_TIME), call.newStart)?;
                host.sstore(slot(DEADLINE), call.newDeadline)?;
                Vec::new()
            }
        };
        Ok(Bytes::from(output))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use proptest::prelude::*;
    use reentry_core::constants::GRADER5_ADDRESS;
    use reentry_core::ledger::MemoryLedger;
    use reentry_core::types::{Receipt, Transaction};

    /// Minimal reentering caller: `[1]` calls `retrieve` forwarding its
    /// value, the first refund re-enters once, `[2, name..]` calls `gradeMe`.
    struct Reenterer;

    const ENTERED: u64 = 0;

    impl Contract for Reenterer {
        fn code_id(&self) -> &'static str {
            "reenterer"
        }

        fn construct(&self, _host: &mut dyn Host, _ctx: &CallContext, _args: &[u8]) -> Result<(), Revert> {
            Ok(())
        }

        fn call(&self, host: &mut dyn Host, ctx: &CallContext, input: &[u8]) -> Result<Bytes, Revert> {
            match input.first().copied() {
                None => {
                    if ctx.caller == GRADER5_ADDRESS && !host.sload_bool(slot(ENTERED)) {
                        host.sstore_bool(slot(ENTERED), true)?;
                        let data = IGrader5::retrieveCall {}.abi_encode();
                        host.call(GRADER5_ADDRESS, U256::from(4), data.into())?;
                    }
                    Ok(Bytes::new())
                }
                Some(1) => host.call(GRADER5_ADDRESS, ctx.value, IGrader5::retrieveCall {}.abi_encode().into()),
                Some(2) => {
                    let name = String::from_utf8_lossy(&input[1..]).into_owned();
                    host.call(GRADER5_ADDRESS, U256::ZERO, IGrader5::gradeMeCall { name }.abi_encode().into())
                }
                Some(_) => Err(Revert::empty()),
            }
        }
    }

    fn owner() -> Address {
        Address::repeat_byte(0x0E)
    }

    fn student() -> Address {
        Address::repeat_byte(0x57)
    }

    fn setup() -> MemoryLedger {
        let mut ledger = MemoryLedger::new(31_337, 1_000);
        ledger.register(Arc::new(GraderModel));
        ledger.register(Arc::new(Reenterer));
        ledger.fund(owner(), U256::from(1_000_000)).unwrap();
        ledger.fund(student(), U256::from(1_000_000)).unwrap();
        ledger
            .install(GRADER5_ADDRESS, CODE_ID, owner(), &observed_params(0).abi_encode())
            .unwrap();
        ledger
    }

    fn deploy_reenterer(ledger: &mut MemoryLedger) -> Address {
        let receipt = ledger
            .transact(&Transaction::create(student(), "reenterer", Bytes::new(), U256::ZERO))
            .unwrap();
        let address = receipt.contract_address.unwrap();
        ledger.fund(address, U256::from(100)).unwrap();
        address
    }

    fn send(ledger: &mut MemoryLedger, from: Address, value: u64, call: impl SolCall) -> Receipt {
        ledger
            .transact(&Transaction::call(from, GRADER5_ADDRESS, U256::from(value), call.abi_encode()))
            .unwrap()
    }

    fn reason(receipt: &Receipt) -> Option<String> {
        receipt.revert().and_then(|r| r.reason_string())
    }

    fn counter_of(ledger: &mut MemoryLedger, account: Address) -> U256 {
        let out = ledger
            .call_view(owner(), GRADER5_ADDRESS, &IGrader5::counterCall { account }.abi_encode())
            .unwrap();
        IGrader5::counterCall::abi_decode_returns(&out, true).unwrap()._0
    }

    fn grade_of(ledger: &mut MemoryLedger, name: &str) -> U256 {
        let input = IGrader5::studentsCall { name: name.into() }.abi_encode();
        let out = ledger.call_view(owner(), GRADER5_ADDRESS, &input).unwrap();
        IGrader5::studentsCall::abi_decode_returns(&out, true).unwrap()._0
    }

    // ------------------------------------------------------------------
    // retrieve
    // ------------------------------------------------------------------

    #[test]
    fn retrieve_requires_more_than_minimum() {
        let mut ledger = setup();
        let receipt = send(&mut ledger, student(), 3, IGrader5::retrieveCall {});
        assert_eq!(reason(&receipt).as_deref(), Some("not enough money"));
    }

    #[test]
    fn sequential_retrieve_never_passes_threshold() {
        let mut ledger = setup();
        for _ in 0..5 {
            let receipt = send(&mut ledger, student(), 4, IGrader5::retrieveCall {});
            assert!(receipt.is_success());
            assert_eq!(counter_of(&mut ledger, student()), U256::ZERO);
        }
        // Each call keeps 3 wei of the 4 sent.
        assert_eq!(ledger.balance(GRADER5_ADDRESS), U256::from(15));
    }

    #[test]
    fn reentrant_retrieve_leaves_counter_above_threshold() {
        let mut ledger = setup();
        let attacker = deploy_reenterer(&mut ledger);
        let receipt = ledger
            .transact(&Transaction::call(student(), attacker, U256::from(4), vec![1]))
            .unwrap();
        assert!(receipt.is_success(), "{:?}", receipt.revert());
        assert_eq!(counter_of(&mut ledger, attacker), U256::from(2));
        assert_eq!(receipt.max_nesting(GRADER5_ADDRESS, IGrader5::retrieveCall::SELECTOR), 2);
    }

    #[test]
    fn non_retrieve_calls_reject_value() {
        let mut ledger = setup();
        let receipt = send(&mut ledger, student(), 1, IGrader5::studentCounterCall {});
        assert!(!receipt.is_success());
        assert!(receipt.revert().unwrap().data().is_empty());
    }

    #[test]
    fn plain_transfer_to_grader_reverts() {
        let mut ledger = setup();
        let receipt = ledger
            .transact(&Transaction::transfer(student(), GRADER5_ADDRESS, U256::from(10)))
            .unwrap();
        assert!(!receipt.is_success());
    }

    // ------------------------------------------------------------------
    // gradeMe
    // ------------------------------------------------------------------

    #[test]
    fn grade_me_requires_counter_above_threshold() {
        let mut ledger = setup();
        let receipt = send(&mut ledger, student(), 0, IGrader5::gradeMeCall { name: "Ada".into() });
        assert_eq!(reason(&receipt).as_deref(), Some("Not yet"));
    }

    #[test]
    fn grade_me_records_first_grade_once() {
        let mut ledger = setup();
        let attacker = deploy_reenterer(&mut ledger);
        ledger
            .transact(&Transaction::call(student(), attacker, U256::from(4), vec![1]))
            .unwrap();

        let mut input = vec![2];
        input.extend_from_slice(b"Ada");
        let receipt = ledger
            .transact(&Transaction::call(student(), attacker, U256::ZERO, input.clone()))
            .unwrap();
        assert!(receipt.is_success(), "{:?}", receipt.revert());
        assert_eq!(grade_of(&mut ledger, "Ada"), U256::from(100));

        let receipt = ledger
            .transact(&Transaction::call(student(), attacker, U256::ZERO, input))
            .unwrap();
        assert_eq!(reason(&receipt).as_deref(), Some("student already exists"));
    }

    #[test]
    fn grade_me_outside_window_is_the_end() {
        let mut ledger = setup();
        let receipt = send(
            &mut ledger,
            owner(),
            0,
            IGrader5::setWindowCall {
                newStart: U256::from(5_000),
                newDeadline: U256::from(6_000),
            },
        );
        assert!(receipt.is_success());
        let receipt = send(&mut ledger, student(), 0, IGrader5::gradeMeCall { name: "Ada".into() });
        assert_eq!(reason(&receipt).as_deref(), Some("The end"));
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    #[test]
    fn admin_is_owner_only() {
        let mut ledger = setup();
        let receipt = send(
            &mut ledger,
            student(),
            0,
            IGrader5::setDivisorCall {
                newDivisor: U256::from(2),
            },
        );
        assert_eq!(reason(&receipt).as_deref(), Some("Ownable: caller is not the owner"));

        let receipt = send(
            &mut ledger,
            owner(),
            0,
            IGrader5::setDivisorCall {
                newDivisor: U256::from(2),
            },
        );
        assert!(receipt.is_success());
        let out = ledger
            .call_view(owner(), GRADER5_ADDRESS, &IGrader5::divisorCall {}.abi_encode())
            .unwrap();
        assert_eq!(IGrader5::divisorCall::abi_decode_returns(&out, true).unwrap()._0, U256::from(2));
    }

    proptest! {
        #[test]
        fn eoa_counter_is_always_reset(calls in 1usize..12) {
            let mut ledger = setup();
            for _ in 0..calls {
                let receipt = send(&mut ledger, student(), 4, IGrader5::retrieveCall {});
                prop_assert!(receipt.is_success());
            }
            prop_assert_eq!(counter_of(&mut ledger, student()), U256::ZERO);
        }
    }
}
