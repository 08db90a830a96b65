//! Application configuration.
//!
//! [`AppConfig`] is assembled in layers, later layers overriding earlier
//! ones:
//!
//! 1. built-in defaults ([`AppConfig::default`]);
//! 2. a TOML file, `reentry.toml` in the default data directory or the
//!    path passed explicitly (an explicit path must exist);
//! 3. `REENTRY_*` environment variables, e.g. `REENTRY_STUDENT_NAME`.

use std::path::{Path, PathBuf};

use reentry_attacker::ReentryPolicy;
use reentry_core::abi::AttackerParams;
use reentry_core::constants::{
    ETHER, GRADER5_ADDRESS, GRADER_ATTEMPT_CAP, GRADER_MIN_VALUE, GRADER_THRESHOLD, LOCAL_CHAIN_ID,
};
use reentry_core::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Config file looked up in the data directory.
pub const CONFIG_FILE: &str = "reentry.toml";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "REENTRY";

/// Local chain snapshot file in the data directory.
pub const CHAIN_FILE: &str = "chain-state.json";

/// Deployment record file in the data directory.
pub const RECORD_FILE: &str = "deployment-info.json";

/// Default controller: the first well-known development account.
const DEV_CONTROLLER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for the chain snapshot and the deployment record.
    pub data_dir: PathBuf,
    /// Network label written to the deployment record.
    pub network: String,
    /// Chain id of a freshly created local chain.
    pub chain_id: u64,
    /// Address of the grading contract.
    pub target: Address,
    /// Account that deploys and controls the driver.
    pub controller: Address,
    /// Name registered with the grader.
    pub student_name: String,
    /// Value sent with the attack, in wei. Also the per-call stake.
    pub attack_value_wei: u64,
    /// Deposit sent to the driver right after deployment, in wei.
    pub initial_deposit_wei: u64,
    /// Controller balance on a freshly created local chain, in wei. Every
    /// wei field must stay at or below `i64::MAX` to pass the config layers.
    pub genesis_balance_wei: u64,
    /// Target's minimum `retrieve` value (exclusive).
    pub min_value: u64,
    /// Counter value the target requires to be exceeded.
    pub threshold: u64,
    /// Counter value at which the target rejects `retrieve`.
    pub attempt_cap: u64,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reentry");

        Self {
            data_dir,
            network: "local".to_string(),
            chain_id: LOCAL_CHAIN_ID,
            target: GRADER5_ADDRESS,
            controller: DEV_CONTROLLER.parse().unwrap_or_default(),
            student_name: String::new(),
            attack_value_wei: (ETHER / 1_000) as u64,
            initial_deposit_wei: (ETHER / 500) as u64,
            genesis_balance_wei: (5 * ETHER) as u64,
            min_value: GRADER_MIN_VALUE,
            threshold: GRADER_THRESHOLD,
            attempt_cap: GRADER_ATTEMPT_CAP,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load the layered configuration.
    pub fn load(config_file: Option<&Path>) -> Result<Self, NodeError> {
        let defaults = Self::default();
        let (file, required) = match config_file {
            Some(path) => (path.to_path_buf(), true),
            None => (defaults.data_dir.join(CONFIG_FILE), false),
        };
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::from(file).required(required))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let cfg: Self = settings.try_deserialize()?;
        tracing::debug!(data_dir = %cfg.data_dir.display(), target = %cfg.target, "configuration loaded");
        Ok(cfg)
    }

    pub fn chain_path(&self) -> PathBuf {
        self.data_dir.join(CHAIN_FILE)
    }

    pub fn record_path(&self) -> PathBuf {
        self.data_dir.join(RECORD_FILE)
    }

    pub fn attack_value(&self) -> U256 {
        U256::from(self.attack_value_wei)
    }

    pub fn policy(&self) -> ReentryPolicy {
        ReentryPolicy::new(self.threshold, self.attempt_cap)
    }

    /// Constructor arguments for the driver.
    pub fn attacker_params(&self) -> AttackerParams {
        AttackerParams {
            target: self.target,
            minValue: U256::from(self.min_value),
            threshold: U256::from(self.threshold),
            attemptCap: U256::from(self.attempt_cap),
        }
    }

    /// Names of settings that must be filled in before an attack.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.student_name.trim().is_empty() {
            missing.push("student_name");
        }
        if self.target.is_zero() {
            missing.push("target");
        }
        if self.controller.is_zero() {
            missing.push("controller");
        }
        if self.attack_value_wei <= self.min_value {
            missing.push("attack_value_wei");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_grader() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.target, GRADER5_ADDRESS);
        assert_eq!(cfg.chain_id, LOCAL_CHAIN_ID);
        assert!(!cfg.controller.is_zero());
    }

    #[test]
    fn default_data_dir_ends_with_reentry() {
        let cfg = AppConfig::default();
        assert!(cfg.data_dir.ends_with("reentry"), "{:?}", cfg.data_dir);
    }

    #[test]
    fn default_attack_value_is_a_milli_ether() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.attack_value(), reentry_core::constants::milli_ether(1));
    }

    #[test]
    fn paths_live_in_data_dir() {
        let cfg = AppConfig {
            data_dir: PathBuf::from("/tmp/reentry-test"),
            ..AppConfig::default()
        };
        assert_eq!(cfg.chain_path(), PathBuf::from("/tmp/reentry-test/chain-state.json"));
        assert_eq!(cfg.record_path(), PathBuf::from("/tmp/reentry-test/deployment-info.json"));
    }

    #[test]
    fn student_name_is_required() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.missing_fields(), vec!["student_name"]);
        let cfg = AppConfig {
            student_name: "Ada".into(),
            ..cfg
        };
        assert!(cfg.missing_fields().is_empty());
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "student_name = \"Ada Lovelace\"\nattempt_cap = 6\n").unwrap();
        let cfg = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.student_name, "Ada Lovelace");
        assert_eq!(cfg.attempt_cap, 6);
        assert_eq!(cfg.threshold, GRADER_THRESHOLD);
    }

    #[test]
    fn empty_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        std::fs::write(&path, "").unwrap();
        let cfg = AppConfig::load(Some(&path)).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(cfg.genesis_balance_wei, defaults.genesis_balance_wei);
        assert_eq!(cfg.initial_deposit_wei, defaults.initial_deposit_wei);
        assert_eq!(cfg.attack_value_wei, defaults.attack_value_wei);
        assert_eq!(cfg.target, GRADER5_ADDRESS);
    }

    #[test]
    fn default_wei_amounts_fit_config_integers() {
        let cfg = AppConfig::default();
        for wei in [cfg.attack_value_wei, cfg.initial_deposit_wei, cfg.genesis_balance_wei] {
            assert!(wei <= i64::MAX as u64, "{wei}");
        }
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
