//! Diagnostic tool - check configuration, node and contracts
//!
//! Run with: cargo run --bin diagnose

use alloy_primitives::Address;
use alloy_provider::{Provider, ProviderBuilder};
use std::env;

use stakelens::config::abbreviate;
use stakelens::{Config, ContractGateway, ExecutionMode, RpcGateway, TokenRegistry};

#[tokio::main]
async fn main() {
    println!("🔍 STAKELENS DIAGNOSTIC CHECK\n");

    dotenvy::dotenv().ok();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("EXECUTION_MODE", "simulation", "Send claims or only report them?"),
        ("CHAIN_ID", "1", "Network the contracts live on"),
        ("PRICE_TTL_MS", "10000", "How long a price stays fresh"),
        ("PENDING_BACKOFF_MS", "1000", "Backoff while a price read is pending"),
        ("MAX_ATTEMPTS", "5", "Backoffs before taking over a stuck read"),
        ("REFRESH_DEBOUNCE_MS", "250", "Minimum gap between rewards reads"),
        ("DISTRIBUTION_COOLDOWN_SECS", "86400", "Seconds between distributions"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let marker = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Could not load configuration: {}", e);
            return;
        }
    };

    println!("  RPC_URL: {}", abbreviate(&config.rpc_url, 30, 15));

    let mut issues: Vec<String> = Vec::new();
    if let Err(e) = config.validate() {
        issues.push(e.to_string());
    }

    // ==========================================
    // NODE
    // ==========================================
    println!("\n═══════════════════════════════════════════════════");
    println!("                       NODE                         ");
    println!("═══════════════════════════════════════════════════\n");

    match check_rpc(&config.rpc_url).await {
        Ok((block, chain_id)) => {
            println!("  ✅ Connected, block {} on chain {}", block, chain_id);
            if chain_id != config.chain_id {
                issues.push(format!("CHAIN_ID is {} but node reports {}", config.chain_id, chain_id));
                println!("  ❌ CHAIN_ID mismatch (configured {})", config.chain_id);
            }
        }
        Err(e) => {
            issues.push(format!("RPC connection failed: {}", e));
            println!("  ❌ {}", e);
        }
    }

    // ==========================================
    // CONTRACTS
    // ==========================================
    println!("\n═══════════════════════════════════════════════════");
    println!("                    CONTRACTS                       ");
    println!("═══════════════════════════════════════════════════\n");

    let contracts = match config.staking_contracts() {
        Ok(contracts) => Some(contracts),
        Err(e) => {
            println!("  ❌ {}", e);
            None
        }
    };

    if let Some(contracts) = contracts {
        for (name, address) in [
            ("Solo staking", contracts.solo),
            ("LP staking", contracts.lp),
            ("Split staking", contracts.split),
        ] {
            match check_contract(&config.rpc_url, address).await {
                Ok(true) => println!("  ✅ {}: {:?}", name, address),
                Ok(false) => {
                    issues.push(format!("No code at {} address {:?}", name, address));
                    println!("  ❌ {}: no code at {:?}", name, address);
                }
                Err(e) => println!("  ⚠️  {}: {}", name, e),
            }
        }

        if let Ok(gateway) = RpcGateway::new(&config.rpc_url, contracts) {
            match gateway.get_global_staking_data().await {
                Ok(global) => {
                    println!("\n  Waiting rewards:  {}", global.combined_rewards);
                    println!("  Last distribution: {}", global.last_distribution_at);
                }
                Err(e) => {
                    issues.push(format!("Split staking read failed: {}", e));
                    println!("\n  ❌ Split staking read failed: {}", e);
                }
            }
        }
    }

    // ==========================================
    // TOKEN REGISTRY
    // ==========================================
    println!("\n═══════════════════════════════════════════════════");
    println!("                  TOKEN REGISTRY                    ");
    println!("═══════════════════════════════════════════════════\n");

    let registry = match &config.registry_path {
        Some(path) => TokenRegistry::builtin_with_overrides(path),
        None => Ok(TokenRegistry::builtin()),
    };
    match registry {
        Ok(registry) => {
            registry.print_stats();
            if registry.network(config.chain_id).is_none() {
                println!("\n  ⚠️  No supported tokens for chain {}", config.chain_id);
            }
        }
        Err(e) => {
            issues.push(format!("Token registry: {}", e));
            println!("  ❌ Token registry: {}", e);
        }
    }

    // ==========================================
    // STATUS
    // ==========================================
    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    match config.execution_mode {
        ExecutionMode::Simulation => {
            println!("  📋 SIMULATION MODE");
            println!("     → Claims are planned and logged, never sent");
            println!("     → Your money: SAFE");
        }
        ExecutionMode::Production => {
            println!("  🚀 PRODUCTION MODE");
            println!("     → `claim` WILL send distribute/claim transactions");
            println!("     → Gas is paid by the signer account");
            if config.signer_key.is_none() {
                println!("\n  ⚠️  WARNING: Production mode but SIGNER_KEY is not set!");
            }
        }
    }

    if issues.is_empty() {
        println!("\n✅ Diagnostic complete, no issues found!\n");
    } else {
        println!("\n❌ {} issue(s):", issues.len());
        for issue in &issues {
            println!("   • {}", issue);
        }
        println!();
    }
}

async fn check_rpc(url: &str) -> Result<(u64, u64), String> {
    let provider = ProviderBuilder::new()
        .connect_http(url.parse().map_err(|e| format!("Invalid URL: {}", e))?);

    let block = provider
        .get_block_number()
        .await
        .map_err(|e| format!("Connection failed: {}", e))?;
    let chain_id = provider
        .get_chain_id()
        .await
        .map_err(|e| format!("Connection failed: {}", e))?;
    Ok((block, chain_id))
}

async fn check_contract(url: &str, address: Address) -> Result<bool, String> {
    let provider = ProviderBuilder::new()
        .connect_http(url.parse().map_err(|e| format!("Invalid URL: {}", e))?);

    let code = provider
        .get_code_at(address)
        .await
        .map_err(|e| format!("Failed to get code: {}", e))?;

    Ok(!code.is_empty())
}
