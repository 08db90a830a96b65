//! reentry: Command-line driver for the Grader5 reentrancy exercise.
//!
//! Deploys the bounded reentrant driver on a local chain, runs the attack,
//! and reports on the target. State lives in the data directory
//! (`chain-state.json`, `deployment-info.json`).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use reentry_core::U256;
use reentry_core::constants::format_ether;
use reentry_node::workflow::{self, AttackOutcome, CheckStatus, Step};
use reentry_node::{AppConfig, LocalChain};

/// Bounded reentrant driver for the Grader5 grading contract.
#[derive(Parser)]
#[command(name = "reentry")]
#[command(version, about = "Reentrancy exercise against the Grader5 grader.")]
struct Cli {
    /// Configuration file (default: <data dir>/reentry.toml, optional).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log format: "text" or "json".
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the driver and write the deployment record.
    Deploy,
    /// Run attackAndRegister through the recorded driver.
    Attack(AttackArgs),
    /// Check configuration, chain and target before attacking.
    PreCheck(ReportArgs),
    /// Read the target's state and print the vulnerability report.
    Analysis(ReportArgs),
    /// Show the recorded driver's status.
    Status,
    /// Send wei from the controller to the recorded driver.
    Fund(FundArgs),
    /// Move the driver's balance back to the controller.
    Withdraw,
    /// Pre-check, deploy and attack, stopping at the first failing step.
    All,
}

#[derive(Args)]
struct AttackArgs {
    /// Student name to register (overrides the configured one).
    #[arg(short, long)]
    name: Option<String>,

    /// Attack value in wei (overrides attack_value_wei).
    #[arg(short, long)]
    value_wei: Option<u64>,
}

#[derive(Args)]
struct ReportArgs {
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct FundArgs {
    /// Amount in wei.
    #[arg(short, long)]
    amount_wei: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.log_level, &cli.log_format);

    match run(cli.command, config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatch a subcommand. `Ok(false)` means the command ran but its outcome
/// is a failure (reverted attack, failed pre-check).
fn run(command: Commands, mut config: AppConfig) -> Result<bool> {
    if let Commands::Attack(args) = &command {
        if let Some(name) = &args.name {
            config.student_name = name.clone();
        }
        if let Some(value) = args.value_wei {
            config.attack_value_wei = value;
        }
    }

    tracing::debug!(data_dir = %config.data_dir.display(), "opening local chain");
    let mut chain = LocalChain::open(&config)
        .with_context(|| format!("Failed to open local chain at {}", config.chain_path().display()))?;

    match command {
        Commands::Deploy => deploy(&mut chain, &config),
        Commands::Attack(_) => attack(&mut chain, &config),
        Commands::PreCheck(args) => pre_check(&mut chain, &config, args.json),
        Commands::Analysis(args) => analysis(&mut chain, &config, args.json),
        Commands::Status => status(&mut chain, &config),
        Commands::Fund(args) => fund(&mut chain, &config, U256::from(args.amount_wei)),
        Commands::Withdraw => withdraw(&mut chain, &config),
        Commands::All => all(&mut chain, &config),
    }
}

fn deploy(chain: &mut LocalChain, config: &AppConfig) -> Result<bool> {
    println!("Deploying driver from {} ...", config.controller);
    let outcome = workflow::deploy(chain, config).context("Deployment failed")?;
    let record = &outcome.record;

    println!("\n=== DRIVER DEPLOYED ===");
    println!("Address:     {}", record.contract_address);
    println!("Transaction: {}", record.transaction_hash);
    println!("Target:      {}", record.target_contract);
    println!("Deposit:     {} ETH", format_ether(outcome.deposit));
    println!("Counter:     {}", outcome.counter);
    println!("Graded:      {}", outcome.graded);
    println!("\nRecord saved to: {}", config.record_path().display());
    Ok(true)
}

fn attack(chain: &mut LocalChain, config: &AppConfig) -> Result<bool> {
    println!("Attacking with {} ETH ...", format_ether(config.attack_value()));
    let outcome = workflow::attack(chain, config).context("Attack failed")?;

    match &outcome {
        AttackOutcome::AlreadyGraded { name, grade } => {
            println!("\nAlready graded: \"{name}\" holds grade {grade}. Nothing to do.");
        }
        AttackOutcome::Executed { name, report } => {
            println!("\nTransaction: {} (block {})", report.tx_hash, report.block_number);
            println!("retrieve calls: {} (max nesting {})", report.retrieve_calls, report.max_nesting);
            if !report.events.is_empty() {
                println!("\nEvents:");
                for event in &report.events {
                    println!("  {event}");
                }
            }
            if report.is_success() {
                println!("\n=== ATTACK {} ===", report.state.to_string().to_uppercase());
                if let Some(grade) = report.grade {
                    println!("Student \"{name}\" registered with grade {grade}");
                }
            } else {
                println!("\n=== ATTACK FAILED ===");
                println!("Reason: {}", report.failure().unwrap_or_else(|| "unknown".into()));
            }
        }
    }
    println!("\nRecord updated: {}", config.record_path().display());
    Ok(outcome.is_success())
}

fn pre_check(chain: &mut LocalChain, config: &AppConfig, json: bool) -> Result<bool> {
    let report = workflow::pre_check(chain, config);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.passed());
    }

    println!("=== PRE-CHECK ===");
    for check in &report.checks {
        println!("[{}] {:<20} {}", check.status, check.name, check.detail);
    }
    let warnings = report.checks.iter().filter(|c| c.status == CheckStatus::Warn).count();
    if report.passed() {
        println!("\nReady to attack ({warnings} warning(s)).");
    } else {
        println!("\nNot ready: fix the failed checks first.");
    }
    Ok(report.passed())
}

fn analysis(chain: &mut LocalChain, config: &AppConfig, json: bool) -> Result<bool> {
    let report = workflow::analysis(chain, config).context("Failed to read target state")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(true);
    }

    let t = &report.target;
    println!("=== TARGET {} ===", t.address);
    println!("Owner:            {}", t.owner);
    println!("Balance:          {} ETH", format_ether(t.balance));
    println!("Student counter:  {}", t.student_counter);
    println!("Divisor:          {}", t.divisor);
    println!("Window:           {} .. {} ({})", t.start_time, t.deadline, if t.window_open { "open" } else { "closed" });
    println!("Next grade:       {}", t.next_grade);
    println!(
        "Reentries/attack: {} (stops on {:?})",
        report.predicted_reentries, report.stop
    );

    println!("\n=== FINDINGS ===");
    for (i, finding) in report.findings.iter().enumerate() {
        println!("\n{}. [{}] {} ({})", i + 1, finding.severity, finding.title, finding.location);
        println!("   Issue:      {}", finding.issue);
        println!("   Mitigation: {}", finding.mitigation);
    }
    Ok(true)
}

fn status(chain: &mut LocalChain, config: &AppConfig) -> Result<bool> {
    let (record, status) = workflow::status(chain, config).context("Failed to read driver status")?;
    println!("Driver:    {}", record.contract_address);
    println!("State:     {}", status.state);
    println!("Counter:   {}", status.counter);
    println!("Graded:    {}", status.graded);
    println!("Grade:     {}", status.grade);
    println!("Reentries: {}", status.reentries);
    println!("Balance:   {} ETH", format_ether(status.balance));
    Ok(true)
}

fn fund(chain: &mut LocalChain, config: &AppConfig, amount: U256) -> Result<bool> {
    let tx = workflow::fund(chain, config, amount).context("Funding failed")?;
    println!("Sent {} ETH to the driver ({tx})", format_ether(amount));
    Ok(true)
}

fn withdraw(chain: &mut LocalChain, config: &AppConfig) -> Result<bool> {
    let amount = workflow::withdraw(chain, config).context("Withdraw failed")?;
    println!("Withdrew {} ETH to {}", format_ether(amount), config.controller);
    Ok(true)
}

fn all(chain: &mut LocalChain, config: &AppConfig) -> Result<bool> {
    let total = Step::ALL.len();
    let run = workflow::complete(chain, config, |step| {
        println!("\n=== STEP {}/{total}: {} ===", step.position(), step.to_string().to_uppercase());
    });

    if let Some(report) = &run.pre_check {
        for check in report.checks.iter().filter(|c| c.status != CheckStatus::Pass) {
            println!("[{}] {:<20} {}", check.status, check.name, check.detail);
        }
    }
    if let Some(deployed) = &run.deployed {
        println!("Driver {} deployed ({})", deployed.record.contract_address, deployed.record.transaction_hash);
    }
    match &run.attack {
        Some(AttackOutcome::AlreadyGraded { name, grade }) => {
            println!("Already graded: \"{name}\" holds grade {grade}");
        }
        Some(AttackOutcome::Executed { name, report }) => {
            println!("Transaction: {} (block {})", report.tx_hash, report.block_number);
            if let Some(grade) = report.grade {
                println!("Student \"{name}\" registered with grade {grade}");
            }
        }
        None => {}
    }

    match &run.failure {
        Some((step, reason)) => {
            println!("\n=== STOPPED AT {} ===", step.to_string().to_uppercase());
            println!("Reason: {reason}");
            println!("{}/{total} step(s) completed.", run.completed_steps());
        }
        None => {
            println!("\n=== ALL {total} STEPS COMPLETED ===");
            println!("Record: {}", config.record_path().display());
        }
    }
    Ok(run.is_success())
}

/// Initialize the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
