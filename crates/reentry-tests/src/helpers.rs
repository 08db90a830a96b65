//! Shared test helpers for the integration tests.

use std::sync::Arc;

use alloy_sol_types::{SolCall, SolValue};
use reentry_attacker::{AttackError, ReentrantAttacker};
use reentry_core::abi::{AttackerParams, GraderParams, IGrader5, IReentrantAttacker};
use reentry_core::constants::{
    GRADER_ATTEMPT_CAP, GRADER_DEADLINE, GRADER_DIVISOR, GRADER_MIN_VALUE, GRADER_REFUND, GRADER_THRESHOLD,
    GRADER5_ADDRESS, LOCAL_CHAIN_ID,
};
use reentry_core::ledger::MemoryLedger;
use reentry_core::types::{Receipt, Transaction};
use reentry_core::{Address, U256};
use reentry_victim::GraderModel;

/// Balance every well-known account starts with.
pub const STARTING_BALANCE: u64 = 1_000_000;

pub fn controller() -> Address {
    Address::repeat_byte(0xC0)
}

pub fn stranger() -> Address {
    Address::repeat_byte(0x5E)
}

pub fn grader_owner() -> Address {
    Address::repeat_byte(0xA1)
}

/// Grader rules for one scenario.
#[derive(Clone, Copy, Debug)]
pub struct Rules {
    pub min_value: u64,
    pub threshold: u64,
    pub attempt_cap: u64,
}

impl Rules {
    /// The rules observed on the deployed grader.
    pub fn observed() -> Self {
        Self {
            min_value: GRADER_MIN_VALUE,
            threshold: GRADER_THRESHOLD,
            attempt_cap: GRADER_ATTEMPT_CAP,
        }
    }

    pub fn grader_params(&self) -> GraderParams {
        GraderParams {
            divisor: U256::from(GRADER_DIVISOR),
            startTime: U256::ZERO,
            deadline: U256::from(GRADER_DEADLINE),
            minValue: U256::from(self.min_value),
            refund: U256::from(GRADER_REFUND),
            attemptCap: U256::from(self.attempt_cap),
            threshold: U256::from(self.threshold),
        }
    }

    pub fn attacker_params(&self) -> AttackerParams {
        AttackerParams {
            target: GRADER5_ADDRESS,
            minValue: U256::from(self.min_value),
            threshold: U256::from(self.threshold),
            attemptCap: U256::from(self.attempt_cap),
        }
    }
}

/// A ledger with the grader installed and one driver deployed by
/// [`controller`].
pub struct Scenario {
    pub ledger: MemoryLedger,
    pub rules: Rules,
    pub driver: Address,
}

impl Scenario {
    pub fn new(rules: Rules) -> Self {
        let mut ledger = MemoryLedger::new(LOCAL_CHAIN_ID, 1_000);
        ledger.register(Arc::new(GraderModel::new()));
        ledger.register(Arc::new(ReentrantAttacker::new()));
        for account in [controller(), stranger(), grader_owner()] {
            ledger.fund(account, U256::from(STARTING_BALANCE)).unwrap();
        }
        ledger
            .install(
                GRADER5_ADDRESS,
                reentry_victim::CODE_ID,
                grader_owner(),
                &rules.grader_params().abi_encode(),
            )
            .unwrap();
        let mut scenario = Self {
            ledger,
            rules,
            driver: Address::ZERO,
        };
        scenario.driver = scenario.deploy_driver();
        scenario
    }

    pub fn observed() -> Self {
        Self::new(Rules::observed())
    }

    /// Deploy another driver from the controller.
    pub fn deploy_driver(&mut self) -> Address {
        let tx = Transaction::create(
            controller(),
            reentry_attacker::CODE_ID,
            self.rules.attacker_params().abi_encode(),
            U256::ZERO,
        );
        let receipt = self.ledger.transact(&tx).unwrap();
        assert!(receipt.is_success(), "{:?}", receipt.revert());
        receipt.contract_address.unwrap()
    }

    /// Call the current driver.
    pub fn send(&mut self, from: Address, value: u64, call: impl SolCall) -> Receipt {
        self.send_to(self.driver, from, value, call)
    }

    pub fn send_to(&mut self, driver: Address, from: Address, value: u64, call: impl SolCall) -> Receipt {
        self.ledger
            .transact(&Transaction::call(from, driver, U256::from(value), call.abi_encode()))
            .unwrap()
    }

    /// Plain transfer from the controller into the current driver.
    pub fn deposit(&mut self, amount: u64) {
        let receipt = self
            .ledger
            .transact(&Transaction::transfer(controller(), self.driver, U256::from(amount)))
            .unwrap();
        assert!(receipt.is_success(), "{:?}", receipt.revert());
    }

    pub fn attack_and_register(&mut self, name: &str, value: u64) -> Receipt {
        self.send(
            controller(),
            value,
            IReentrantAttacker::attackAndRegisterCall { name: name.into() },
        )
    }

    pub fn status(&mut self) -> IReentrantAttacker::getAttackStatusReturn {
        let out = self
            .ledger
            .call_view(controller(), self.driver, &IReentrantAttacker::getAttackStatusCall {}.abi_encode())
            .unwrap();
        IReentrantAttacker::getAttackStatusCall::abi_decode_returns(&out, true).unwrap()
    }

    /// Target's counter for `account`, read from the target directly.
    pub fn target_counter(&mut self, account: Address) -> U256 {
        let out = self
            .ledger
            .call_view(stranger(), GRADER5_ADDRESS, &IGrader5::counterCall { account }.abi_encode())
            .unwrap();
        IGrader5::counterCall::abi_decode_returns(&out, true).unwrap()._0
    }

    /// Grade the target recorded for `name`.
    pub fn student(&mut self, name: &str) -> U256 {
        let call = IGrader5::studentsCall { name: name.into() };
        let out = self
            .ledger
            .call_view(stranger(), GRADER5_ADDRESS, &call.abi_encode())
            .unwrap();
        IGrader5::studentsCall::abi_decode_returns(&out, true).unwrap()._0
    }

    pub fn balance(&self, account: Address) -> U256 {
        self.ledger.balance(account)
    }

    /// Deepest nesting of `retrieve` frames in a receipt.
    pub fn retrieve_nesting(receipt: &Receipt) -> usize {
        receipt.max_nesting(GRADER5_ADDRESS, IGrader5::retrieveCall::SELECTOR)
    }
}

/// Driver error carried by a reverted receipt.
pub fn driver_error(receipt: &Receipt) -> Option<AttackError> {
    receipt.revert().and_then(AttackError::from_revert)
}
