//! # reentry-victim: Local model of the Grader5 grading contract.
//!
//! [`GraderModel`] reproduces the observable behaviour of the deployed
//! grader: a per-caller attempt counter driven by `retrieve`, a
//! name-to-grade registry filled by `gradeMe`, and owner-only knobs for the
//! grade divisor and the registration window. It exists so local chains and
//! tests have something faithful to attack; the driver never depends on it.
//!
//! The flaw is kept on purpose: `retrieve` refunds the caller before it
//! decides whether to reset the caller's counter.

pub mod grader;

pub use grader::{CODE_ID, GraderModel, observed_params};
