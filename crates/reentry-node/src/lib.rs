//! # reentry-node: Off-chain side of the reentry workspace.
//!
//! Everything the `reentry` binary needs around the contracts:
//!
//! - [`config`]: layered [`AppConfig`] (defaults, TOML file, `REENTRY_*` env)
//! - [`chain`]: [`LocalChain`], a ledger persisted as a JSON snapshot
//! - [`client`]: [`AttackClient`], typed driver calls and [`AttackReport`]s
//! - [`record`]: the `deployment-info.json` [`DeploymentRecord`]
//! - [`workflow`]: deploy, attack, pre-check and analysis

pub mod chain;
pub mod client;
pub mod config;
pub mod error;
pub mod record;
pub mod workflow;

pub use chain::LocalChain;
pub use client::{AttackClient, AttackReport, AttackStatus, DriverEvent};
pub use config::AppConfig;
pub use error::NodeError;
pub use record::DeploymentRecord;
