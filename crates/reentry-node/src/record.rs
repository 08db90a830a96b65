//! Deployment record (`deployment-info.json`).
//!
//! Written by `deploy`, updated by `attack`. Field names are camelCase,
//! matching the JSON the deployment tooling reads.

use std::path::Path;

use chrono::{DateTime, Utc};
use reentry_attacker::AttackState;
use reentry_core::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract_address: Address,
    pub transaction_hash: B256,
    pub deployer_address: Address,
    pub network: String,
    pub timestamp: DateTime<Utc>,
    pub student_name: String,
    pub target_contract: Address,
    #[serde(default)]
    pub attack_executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_transaction_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_registered: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_grade: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attack_state: Option<AttackState>,
}

impl DeploymentRecord {
    /// Read a record. A missing file means nothing has been deployed yet.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let bytes = std::fs::read(path).map_err(|e| {
            NodeError::Record(format!("cannot read {} ({e}); deploy first", path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| NodeError::Record(format!("{}: {e}", path.display())))
    }

    /// Write the record as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), NodeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "deployment record saved");
        Ok(())
    }

    /// Fold the outcome of an attack transaction into the record.
    pub fn record_attack(
        &mut self,
        tx_hash: B256,
        state: AttackState,
        grade: Option<U256>,
        at: DateTime<Utc>,
    ) {
        self.attack_executed = true;
        self.attack_transaction_hash = Some(tx_hash);
        self.attack_timestamp = Some(at);
        self.last_attack_state = Some(state);
        if state == AttackState::Completed {
            self.student_registered = Some(self.student_name.clone());
            self.final_grade = grade;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeploymentRecord {
        DeploymentRecord {
            contract_address: Address::repeat_byte(0xAA),
            transaction_hash: B256::repeat_byte(0x01),
            deployer_address: Address::repeat_byte(0xC0),
            network: "local".into(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            student_name: "Ada".into(),
            target_contract: Address::repeat_byte(0x57),
            attack_executed: false,
            attack_transaction_hash: None,
            student_registered: None,
            attack_timestamp: None,
            final_grade: None,
            last_attack_state: None,
        }
    }

    #[test]
    fn fresh_record_uses_camel_case_and_omits_attack_fields() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("contractAddress").is_some());
        assert!(json.get("targetContract").is_some());
        assert_eq!(json["attackExecuted"], false);
        assert!(json.get("attackTransactionHash").is_none());
    }

    #[test]
    fn completed_attack_registers_student() {
        let mut record = sample();
        let at = DateTime::from_timestamp(1_700_000_100, 0).unwrap();
        record.record_attack(B256::repeat_byte(2), AttackState::Completed, Some(U256::from(100)), at);
        assert!(record.attack_executed);
        assert_eq!(record.student_registered.as_deref(), Some("Ada"));
        assert_eq!(record.final_grade, Some(U256::from(100)));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["lastAttackState"], "Completed");
    }

    #[test]
    fn failed_attack_keeps_registration_empty() {
        let mut record = sample();
        record.record_attack(B256::repeat_byte(3), AttackState::Failed, None, Utc::now());
        assert_eq!(record.last_attack_state, Some(AttackState::Failed));
        assert!(record.student_registered.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deployment-info.json");
        sample().save(&path).unwrap();
        assert_eq!(DeploymentRecord::load(&path).unwrap(), sample());
    }

    #[test]
    fn missing_record_says_deploy_first() {
        let dir = tempfile::tempdir().unwrap();
        let err = DeploymentRecord::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("deploy first"));
    }
}
