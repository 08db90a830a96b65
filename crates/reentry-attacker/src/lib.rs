//! # reentry-attacker: Bounded reentrant attack driver.
//!
//! [`ReentrantAttacker`] is contract code run by the reentry-core ledger.
//! It drives the Grader5 `retrieve` flaw: the first `retrieve` carries the
//! attack value, each refund re-enters while [`ReentryPolicy`] allows it,
//! and once the target's counter is past the threshold the driver calls
//! `gradeMe` and reads the recorded grade back.
//!
//! - [`driver`]: the contract, its storage layout and [`AttackState`]
//! - [`policy`]: the pure reentry decision function
//! - [`error`]: [`AttackError`], mirrored 1:1 by the ABI custom errors

pub mod driver;
pub mod error;
pub mod policy;

pub use driver::{AttackState, CODE_ID, ReentrantAttacker};
pub use error::AttackError;
pub use policy::{Observation, ReentryDecision, ReentryPolicy};
