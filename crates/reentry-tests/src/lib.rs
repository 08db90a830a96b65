//! Integration test suite for the reentry workspace.
//!
//! Tests drive the real driver against the grader model on a fresh
//! ledger and check the attack's observable guarantees: authorization,
//! value bounds, atomic rollback and the bound on nested target calls.

pub mod helpers;
