//! StakeLens - prices and split-staking rewards from the command line
//!
//! Run with: cargo run -- <prices|rewards|watch|claim>

use alloy_primitives::{Address, U256};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stakelens::config::ClaimLog;
use stakelens::pricing::{to_decimal, PriceCache};
use stakelens::staking::{can_distribute, needs_distribution, AccountRewardsView};
use stakelens::{
    Config, ContractGateway, Dashboard, DashboardEvent, ExecutionMode, PriceMap, PriceResolver,
    RpcGateway, StakingRewardsAggregator, TokenRegistry,
};

/// Reward token decimals used for display
const REWARD_DECIMALS: u8 = 18;

#[derive(Parser)]
#[command(name = "stakelens", version, about = "DeFi dashboard: prices and staking rewards")]
struct Cli {
    /// TOML config file (defaults to environment / .env)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Machine-readable output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Price every watched pair once
    Prices,
    /// Show pending and estimated rewards for an account
    Rewards {
        /// Overrides ACCOUNT_ADDRESS
        #[arg(long)]
        account: Option<String>,
    },
    /// Follow new blocks and print updates until Ctrl-C
    Watch,
    /// Distribute (if due) and claim rewards
    Claim,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🔭 STAKELENS - Prices & Split-Staking Rewards").cyan().bold()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn fmt_wei(value: U256) -> String {
    format!("{:.6}", to_decimal(value, REWARD_DECIMALS))
}

fn print_prices(prices: &PriceMap) {
    if prices.is_empty() {
        println!("{}", style("No prices (no watched pair has a supported token)").yellow());
        return;
    }
    let mut rows: Vec<_> = prices.iter().collect();
    rows.sort_by_key(|(token, _)| **token);
    for (token, price) in rows {
        let marker = if *price > 0.0 { style("✓").green() } else { style("✗").red() };
        println!("{} {:?}  {:>18.8}", marker, token, price);
    }
}

fn print_rewards(view: &AccountRewardsView) {
    println!("Account {:?}", view.account);
    println!(
        "  Solo: staked {} / {}  pending {}",
        fmt_wei(view.solo_stake.amount),
        fmt_wei(view.solo_pool.total_staked),
        fmt_wei(view.solo_stake.pending_rewards)
    );
    println!(
        "  LP:   staked {} / {}  pending {}",
        fmt_wei(view.lp_stake.amount),
        fmt_wei(view.lp_pool.total_staked),
        fmt_wei(view.lp_stake.pending_rewards)
    );
    println!("  Waiting for distribution: {}", fmt_wei(view.global.combined_rewards));
    println!(
        "  {} pending {} + estimated {} = {}",
        style("→").cyan(),
        fmt_wei(view.estimate.pending),
        fmt_wei(view.estimate.estimated),
        style(fmt_wei(view.estimate.total())).green().bold()
    );
    println!("  Claimed so far: {}", fmt_wei(view.totals.claimed));
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }
    Ok(config)
}

fn build_registry(config: &Config) -> Result<Arc<TokenRegistry>> {
    let registry = match &config.registry_path {
        Some(path) => TokenRegistry::builtin_with_overrides(path)?,
        None => TokenRegistry::builtin(),
    };
    if registry.network(config.chain_id).is_none() {
        warn!("No supported tokens for chain {}, prices will be empty", config.chain_id);
    }
    Ok(Arc::new(registry))
}

fn build_gateway(config: &Config) -> Result<RpcGateway> {
    let mut gateway = RpcGateway::new(&config.rpc_url, config.staking_contracts()?)?;
    if let Some(key) = &config.signer_key {
        gateway = gateway.with_signer(key, config.chain_id)?;
    }
    Ok(gateway)
}

fn build_dashboard(
    config: &Config,
    gateway: Arc<dyn ContractGateway>,
    account: Option<Address>,
) -> Result<Dashboard> {
    let resolver = PriceResolver::new(
        gateway.clone(),
        build_registry(config)?,
        Arc::new(PriceCache::new(config.price_ttl())),
        config.chain_id,
    )
    .with_options(config.resolve_options());

    Ok(Dashboard::new(
        gateway,
        Arc::new(resolver),
        config.watched_pair_addresses()?,
        account,
    ))
}

async fn cmd_prices(config: &Config, json: bool) -> Result<()> {
    let gateway: Arc<dyn ContractGateway> = Arc::new(build_gateway(config)?);
    let mut dashboard = build_dashboard(config, gateway, None)?;
    let prices = dashboard.prices();

    let start = Instant::now();
    dashboard.handle(DashboardEvent::NewBlock).await.await?;
    let prices = prices.borrow().clone();

    if json {
        println!("{}", serde_json::to_string_pretty(&prices)?);
    } else {
        println!("{}", style(format!("Prices ({:?})", start.elapsed())).blue().bold());
        print_prices(&prices);
    }
    Ok(())
}

async fn cmd_rewards(config: &Config, account: Option<String>, json: bool) -> Result<()> {
    let account = match account {
        Some(a) => Address::from_str(&a)?,
        None => config
            .account_address()?
            .ok_or_else(|| eyre!("No account: pass --account or set ACCOUNT_ADDRESS"))?,
    };

    let gateway = Arc::new(build_gateway(config)?);
    let view = StakingRewardsAggregator::new(gateway)
        .load_account_view(account)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_rewards(&view);
    }
    Ok(())
}

async fn cmd_watch(config: &Config, json: bool) -> Result<()> {
    let gateway: Arc<dyn ContractGateway> = Arc::new(build_gateway(config)?);
    let mut dashboard = build_dashboard(config, gateway, config.account_address()?)?;
    let prices = dashboard.prices();
    let rewards = dashboard.rewards();

    dashboard.start_refresher(config.refresh_debounce()).await?;
    let mut updates = dashboard.global_updates();

    info!("👀 Watching chain {} (Ctrl-C to stop)", config.chain_id);
    dashboard.handle(DashboardEvent::NewBlock).await.await?;

    loop {
        if json {
            let snapshot = serde_json::json!({
                "prices": &*prices.borrow(),
                "rewards": &*rewards.borrow(),
            });
            println!("{}", serde_json::to_string(&snapshot)?);
        } else {
            println!("{}", style(format!("── {} ──", chrono::Utc::now().format("%H:%M:%S"))).dim());
            print_prices(&prices.borrow());
            if let Some(view) = rewards.borrow().as_ref() {
                print_rewards(view);
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("Rewards refresher stopped");
                    break;
                }
                let global = updates.borrow_and_update().clone();
                if let Some(global) = global {
                    dashboard.handle(DashboardEvent::GlobalRefreshed(global)).await.await?;
                }
            }
        }
    }

    dashboard.stop_refresher().await;
    Ok(())
}

async fn cmd_claim(config: &Config, json: bool) -> Result<()> {
    let gateway = build_gateway(config)?;
    let account = match gateway.signer_address() {
        Some(signer) => signer,
        None => config
            .account_address()?
            .ok_or_else(|| eyre!("Claiming needs SIGNER_KEY or ACCOUNT_ADDRESS"))?,
    };
    let aggregator = StakingRewardsAggregator::new(Arc::new(gateway));

    let view = aggregator.load_account_view(account).await?;
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    let allowed = can_distribute(&view.global, config.distribution_cooldown_secs, now);
    let distribute_first = needs_distribution(&view.global, allowed);

    let mut log = ClaimLog {
        timestamp: chrono::Utc::now(),
        chain_id: config.chain_id,
        account: format!("{:?}", account),
        execution_mode: config.execution_mode,
        distribute_tx: None,
        claim_tx: None,
        block_number: None,
        expected_rewards: view.estimate.total().to_string(),
    };

    match config.execution_mode {
        ExecutionMode::Simulation => {
            println!(
                "{} Mode: {} - nothing will be sent",
                style("🔒").green(),
                style("SIMULATION").green().bold()
            );
            if distribute_first {
                println!("  1. distribute() ({} waiting)", fmt_wei(view.global.combined_rewards));
                println!("  2. claim()");
            } else {
                println!("  1. claim()");
            }
            println!("  Expected rewards: {}", fmt_wei(view.estimate.total()));
        }
        ExecutionMode::Production => {
            println!(
                "{} Mode: {} - LIVE TRANSACTIONS",
                style("🚀").red(),
                style("PRODUCTION").red().bold()
            );
            warn!("⚠️  This mode spends gas from {:?}", account);

            let report = aggregator.claim_all(&view.global, allowed).await?;
            log.distribute_tx = report.distribute.map(|d| format!("{:?}", d.hash));
            log.claim_tx = Some(format!("{:?}", report.claim.hash));
            log.block_number = report.claim.block_number;
        }
    }

    if let Err(e) = log.append_to_file(&config.claim_log_path) {
        warn!("Could not write claim log: {}", e);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stakelens=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    if !cli.json {
        print_banner();
        config.print_summary();
        println!();
    }

    match cli.command {
        Command::Prices => cmd_prices(&config, cli.json).await,
        Command::Rewards { account } => cmd_rewards(&config, account, cli.json).await,
        Command::Watch => cmd_watch(&config, cli.json).await,
        Command::Claim => cmd_claim(&config, cli.json).await,
    }
}
