//! Reentry decision function.
//!
//! The driver consults [`ReentryPolicy::decide`] each time the target's
//! refund lands while an attack call is in flight. The decision depends only
//! on what the driver can observe at that moment (the target's counter for
//! the driver, the current reentry depth, the driver's balance and the
//! per-call stake) and on the two static caps, so it can be tested and
//! benchmarked in isolation from the runtime.

use reentry_core::U256;
use serde::{Deserialize, Serialize};

/// What the driver does when a refund arrives mid-attack.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReentryDecision {
    /// Call `retrieve` again.
    Reenter,
    /// Counter already above the threshold; nothing more to gain.
    ThresholdReached,
    /// Another call would hit the target's attempt cap and revert.
    CapReached,
    /// Reentry depth budget spent.
    BudgetExhausted,
    /// Not enough balance to pay for another call.
    Unfunded,
}

impl ReentryDecision {
    pub fn is_reenter(self) -> bool {
        self == Self::Reenter
    }
}

/// What the driver sees when a refund arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observation {
    /// Target's counter for the driver.
    pub counter: u64,
    /// Reentries already performed in this attack.
    pub depth: u64,
    /// Driver balance, refund included.
    pub balance: U256,
    /// Value attached to each `retrieve`.
    pub stake: U256,
}

/// Static reentry bounds taken from the target's observed rules.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReentryPolicy {
    /// Counter value that must be exceeded before registration.
    pub threshold: u64,
    /// Counter value at which the target rejects `retrieve`.
    pub attempt_cap: u64,
}

impl ReentryPolicy {
    pub fn new(threshold: u64, attempt_cap: u64) -> Self {
        Self { threshold, attempt_cap }
    }

    /// Maximum reentries per attack.
    pub fn depth_budget(&self) -> u64 {
        self.attempt_cap.saturating_sub(1)
    }

    /// Decide the next step. Checks run in a fixed order: threshold, cap,
    /// depth budget, funding.
    pub fn decide(&self, observation: &Observation) -> ReentryDecision {
        if observation.counter > self.threshold {
            ReentryDecision::ThresholdReached
        } else if observation.counter.saturating_add(1) >= self.attempt_cap {
            ReentryDecision::CapReached
        } else if observation.depth >= self.depth_budget() {
            ReentryDecision::BudgetExhausted
        } else if observation.balance < observation.stake {
            ReentryDecision::Unfunded
        } else {
            ReentryDecision::Reenter
        }
    }

    /// Replay the decisions of one attack against a target that increments
    /// the counter once per `retrieve`, starting from `initial_counter` with
    /// unlimited funds. Returns the reentries performed and the decision that
    /// stopped the chain.
    pub fn simulate(&self, initial_counter: u64) -> (u64, ReentryDecision) {
        let mut counter = initial_counter.saturating_add(1);
        let mut depth = 0;
        loop {
            let decision = self.decide(&Observation {
                counter,
                depth,
                balance: U256::MAX,
                stake: U256::ZERO,
            });
            if !decision.is_reenter() {
                return (depth, decision);
            }
            depth += 1;
            counter = counter.saturating_add(1);
        }
    }
}
