//! # TierGate CLI
//!
//! Operator tooling over a TierGate ledger.
//!
//! ## Usage
//! ```bash
//! # What would this account pay for 1000 units right now?
//! tiergate preview --account 550e8400-e29b-41d4-a716-446655440000 --amount 1000
//!
//! # Same, as a loyalty member buying 12 units
//! tiergate preview -a <ID> --amount 1000 --quantity 12 --loyalty
//!
//! # Configured tiers and modifiers
//! tiergate tiers
//!
//! # Purchase statistics and recent transfers
//! tiergate count --account <ID>
//! tiergate history --account <ID> --limit 20
//!
//! # Any command against an explicit config file
//! tiergate --config ./tiergate.toml tiers
//!
//! # Write the effective configuration (defaults + env) to the config file
//! tiergate --config ./tiergate.toml init-config
//! ```
//!
//! The ledger backend comes from `[ledger]` in the config file or
//! `TIERGATE_LEDGER` / `TIERGATE_DB_PATH`. Account flags (loyalty, referral)
//! normally live in the external state store; the CLI stands in for it with
//! an in-memory gateway fed from the command line.

use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tiergate_core::{AccountId, Amount, BaseRateSource};
use tiergate_engine::gateway::{loyalty_key, referral_key};
use tiergate_engine::{
    AccountStateGateway, EngineConfig, InMemoryGateway, InMemoryLedger, InMemoryTransferService,
    LedgerBackend, OracleRef, PurchaseLedger, ServiceRef, SqliteLedger, TracingEmitter,
    TransferOrchestrator,
};

/// Stand-in identities for the local gateway and transfer service
const LOCAL_ORACLE: AccountId = AccountId::from_u128(0x0AC1_E000);
const LOCAL_SERVICE: AccountId = AccountId::from_u128(0x5E77_1E00);

const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug)]
enum Command {
    Preview {
        account: AccountId,
        amount: Amount,
        quantity: u64,
        loyalty: bool,
        referral: bool,
    },
    Tiers,
    Count {
        account: AccountId,
    },
    History {
        account: AccountId,
        limit: usize,
    },
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((config_path, command)) = parse_args(&args)? else {
        print_help();
        return Ok(());
    };

    let mut config = EngineConfig::load(config_path.clone()).context("loading configuration")?;
    if let Command::InitConfig = command {
        config.save(config_path).context("saving configuration")?;
        println!("Configuration written");
        return Ok(());
    }
    // Read-only tooling: any owner will do when none is configured
    config.access.owner.get_or_insert_with(AccountId::generate);
    debug!(backend = %config.ledger.backend, "Configuration loaded");

    match config.ledger.backend {
        LedgerBackend::Memory => run(&config, command, InMemoryLedger::new()).await,
        LedgerBackend::Sqlite => {
            let db_config = config.ledger.db_config()?;
            if let Some(parent) = db_config.database_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            info!(path = %db_config.database_path.display(), "Opening SQLite ledger");
            let ledger = SqliteLedger::open(db_config).await?;
            run(&config, command, ledger).await
        }
    }
}

async fn run<L: PurchaseLedger>(
    config: &EngineConfig,
    command: Command,
    ledger: L,
) -> anyhow::Result<()> {
    let owner = config
        .access
        .owner
        .ok_or_else(|| anyhow!("no owner configured"))?;
    let orchestrator =
        TransferOrchestrator::from_config(config, ledger)?.with_emitter(Arc::new(TracingEmitter));

    let gateway = Arc::new(InMemoryGateway::new());
    let service = Arc::new(InMemoryTransferService::new(Arc::clone(&gateway)));
    orchestrator
        .initialize(
            owner,
            OracleRef::new(LOCAL_ORACLE, Arc::clone(&gateway)),
            ServiceRef::new(LOCAL_SERVICE, service),
        )
        .await?;

    match command {
        Command::Preview {
            account,
            amount,
            quantity,
            loyalty,
            referral,
        } => {
            gateway.set(&loyalty_key(account), Value::Bool(loyalty)).await?;
            gateway.set(&referral_key(account), Value::Bool(referral)).await?;

            let breakdown = orchestrator
                .preview(account, amount, quantity, Utc::now())
                .await?;

            println!("Account:  {}", account);
            println!("Original: {}", breakdown.original);
            let source = match breakdown.base_source {
                BaseRateSource::None => "below first tier".to_string(),
                BaseRateSource::Tier { threshold } => format!("tier from {} purchases", threshold),
                BaseRateSource::Custom => "custom override".to_string(),
            };
            println!(
                "Base:     {} ({}) -> {}",
                breakdown.base_rate, source, breakdown.after_base
            );
            for step in &breakdown.steps {
                println!(
                    "  {:<15} {:>7}  {} -> {}",
                    step.kind.to_string(),
                    step.rate.to_string(),
                    step.before,
                    step.after
                );
            }
            if breakdown.capped {
                println!("Capped at the maximum combined discount");
            }
            println!(
                "Charged:  {} (saves {})",
                breakdown.charged,
                breakdown.discount()
            );
        }

        Command::Tiers => {
            let tiers = orchestrator.tiers().await;
            if tiers.is_empty() {
                println!("No tiers configured: every account pays full price");
            } else {
                println!("{:>10}  {:>7}", "Purchases", "Rate");
                for tier in tiers.tiers() {
                    println!("{:>10}  {:>7}", format!(">= {}", tier.threshold), tier.rate.to_string());
                }
            }

            let policy = &config.discount;
            println!();
            println!("Maximum combined discount: {}", policy.max_combined_rate);
            for modifier in policy.ordered_modifiers() {
                println!("Modifier {:<15} {}", modifier.kind().to_string(), modifier.rate());
            }
        }

        Command::Count { account } => {
            let stats = orchestrator.purchase_stats(account).await?;
            println!("Account:        {}", stats.account);
            println!("Purchases:      {}", stats.purchase_count);
            println!("Total spent:    {}", stats.total_spent);
            match stats.last_purchase_at {
                Some(at) => println!("Last purchase:  {}", at.to_rfc3339()),
                None => println!("Last purchase:  never"),
            }
            match orchestrator.tiers().await.next_tier(stats.purchase_count) {
                Some(next) => println!(
                    "Next tier:      {} at {} purchases",
                    next.rate, next.threshold
                ),
                None => println!("Next tier:      top tier reached"),
            }
        }

        Command::History { account, limit } => {
            let records = orchestrator.transfer_history(account, limit).await?;
            if records.is_empty() {
                println!("No transfers recorded for {}", account);
            }
            for record in records {
                println!(
                    "{}  {}  {} -> {}  charged {} of {}  memo: {}",
                    record.committed_at.format("%Y-%m-%d %H:%M:%S"),
                    record.trace_id,
                    record.source,
                    record.destination,
                    record.discounted_amount,
                    record.original_amount,
                    record.memo
                );
            }
        }

        Command::InitConfig => bail!("init-config is handled before a ledger is opened"),
    }

    Ok(())
}

/// Returns `None` when help was requested.
fn parse_args(args: &[String]) -> anyhow::Result<Option<(Option<PathBuf>, Command)>> {
    let mut config_path: Option<PathBuf> = None;
    let mut subcommand: Option<&str> = None;
    let mut account: Option<AccountId> = None;
    let mut amount: Option<Amount> = None;
    let mut quantity: u64 = 1;
    let mut limit = DEFAULT_HISTORY_LIMIT;
    let mut loyalty = false;
    let mut referral = false;

    let mut i = 0;
    while i < args.len() {
        let value = || {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| anyhow!("{} needs a value", args[i]))
        };
        match args[i].as_str() {
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(value()?));
                i += 1;
            }
            "--account" | "-a" => {
                account = Some(value()?.parse().context("parsing --account")?);
                i += 1;
            }
            "--amount" => {
                let units: u64 = value()?.parse().context("parsing --amount")?;
                amount = Some(Amount::from_units(units));
                i += 1;
            }
            "--quantity" | "-q" => {
                quantity = value()?.parse().context("parsing --quantity")?;
                i += 1;
            }
            "--limit" | "-n" => {
                limit = value()?.parse().context("parsing --limit")?;
                i += 1;
            }
            "--loyalty" => loyalty = true,
            "--referral" => referral = true,
            "--help" | "-h" | "help" => return Ok(None),
            other if other.starts_with('-') => bail!("unknown option {}", other),
            other => {
                if subcommand.is_some() {
                    bail!("unexpected argument {}", other);
                }
                subcommand = Some(other);
            }
        }
        i += 1;
    }

    let require_account = || account.ok_or_else(|| anyhow!("--account is required"));
    let command = match subcommand {
        None => return Ok(None),
        Some("preview") => Command::Preview {
            account: require_account()?,
            amount: amount.ok_or_else(|| anyhow!("--amount is required"))?,
            quantity,
            loyalty,
            referral,
        },
        Some("tiers") => Command::Tiers,
        Some("init-config") => Command::InitConfig,
        Some("count") => Command::Count {
            account: require_account()?,
        },
        Some("history") => Command::History {
            account: require_account()?,
            limit,
        },
        Some(other) => bail!("unknown command {}", other),
    };
    Ok(Some((config_path, command)))
}

fn print_help() {
    println!("TierGate operator CLI");
    println!();
    println!("Usage: tiergate [--config <PATH>] <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  preview   Discount breakdown for an account and amount");
    println!("  tiers     Configured tiers, modifiers and cap");
    println!("  count     Purchase statistics of an account");
    println!("  history   Recent transfers of an account");
    println!("  init-config  Write the effective configuration to the config file");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>    Config file (default: platform config dir)");
    println!("  -a, --account <ID>     Account id (UUID)");
    println!("      --amount <N>       Amount in smallest units (preview)");
    println!("  -q, --quantity <N>     Units bought (preview, default: 1)");
    println!("      --loyalty          Treat the account as a loyalty member (preview)");
    println!("      --referral         Treat the account as referred (preview)");
    println!("  -n, --limit <N>        Records to show (history, default: 10)");
    println!("  -h, --help             Show this help message");
}

/// Initializes the tracing subscriber for structured logging.
///
/// Logs go to stderr so command output stays clean. Default filter:
/// `info,tiergate=debug,sqlx=warn`, overridable through `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tiergate=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_preview() {
        let account = AccountId::from_u128(1);
        let parsed = parse_args(&args(&format!(
            "--config /tmp/t.toml preview -a {} --amount 1000 -q 3 --loyalty",
            account
        )))
        .unwrap()
        .unwrap();

        assert_eq!(parsed.0, Some(PathBuf::from("/tmp/t.toml")));
        match parsed.1 {
            Command::Preview {
                account: a,
                amount,
                quantity,
                loyalty,
                referral,
            } => {
                assert_eq!(a, account);
                assert_eq!(amount.units(), 1000);
                assert_eq!(quantity, 3);
                assert!(loyalty);
                assert!(!referral);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args("preview --amount 10")).is_err());
        assert!(parse_args(&args("count --account not-a-uuid")).is_err());
        assert!(parse_args(&args("frobnicate")).is_err());
        assert!(parse_args(&args("history --limit")).is_err());
        assert!(parse_args(&args("")).unwrap().is_none());
        assert!(parse_args(&args("tiers --help")).unwrap().is_none());
    }

    #[test]
    fn test_parse_init_config() {
        let parsed = parse_args(&args("-c ./tiergate.toml init-config")).unwrap().unwrap();
        assert_eq!(parsed.0, Some(PathBuf::from("./tiergate.toml")));
        assert!(matches!(parsed.1, Command::InitConfig));
    }
}
