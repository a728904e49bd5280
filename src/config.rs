//! Configuration for StakeLens
//!
//! Loaded from environment variables (and `.env`) or a TOML file. Claims only
//! touch the chain in Production mode; Simulation mode reports what would be
//! sent.

use alloy_primitives::Address;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::gateway::StakingContracts;
use crate::pricing::ResolveOptions;

// ============================================
// EXECUTION MODE
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Reads everything, logs the claim sequence, sends nothing
    #[default]
    Simulation,

    /// Sends `distribute` / `claim` transactions
    /// CAUTION: spends gas from the signer account
    Production,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Simulation => write!(f, "SIMULATION"),
            ExecutionMode::Production => write!(f, "PRODUCTION"),
        }
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Network Settings ==========
    pub rpc_url: String,

    /// Chain ID (1 = Ethereum Mainnet, 56 = BSC)
    pub chain_id: u64,

    // ========== Account ==========
    /// Account whose rewards are shown
    pub account: Option<String>,

    /// Private key used for `distribute` / `claim` (KEEP SECRET!)
    pub signer_key: Option<String>,

    // ========== Contracts ==========
    pub solo_staking_address: String,
    pub lp_staking_address: String,
    pub split_staking_address: String,

    /// Pairs priced by the dashboard
    pub watched_pairs: Vec<String>,

    /// Optional TOML file overriding the built-in token registry
    pub registry_path: Option<String>,

    // ========== Pricing ==========
    pub price_ttl_ms: u64,

    /// Backoff period while another read of the same price is pending
    pub pending_backoff_ms: u64,

    /// Backoff periods to wait before taking over a stuck read
    pub max_attempts: u32,

    // ========== Rewards ==========
    /// Minimum gap between block-driven rewards reads
    pub refresh_debounce_ms: u64,

    /// Seconds between distributions enforced by the distributor
    pub distribution_cooldown_secs: u64,

    // ========== Execution ==========
    pub execution_mode: ExecutionMode,

    /// JSON-lines log of completed claims
    pub claim_log_path: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim()).wrap_err_with(|| format!("Invalid {}: {:?}", field, value))
}

/// Keep the first `head` and last `tail` characters of a long value
pub fn abbreviate(s: &str, head: usize, tail: usize) -> String {
    let len = s.chars().count();
    if len <= head + tail + 2 {
        return s.to_string();
    }
    let start: String = s.chars().take(head).collect();
    let end: String = s.chars().skip(len - tail).collect();
    format!("{}…{}", start, end)
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            rpc_url: env::var("RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: env_or("CHAIN_ID", defaults.chain_id),

            account: env::var("ACCOUNT_ADDRESS").ok(),
            signer_key: env::var("SIGNER_KEY").ok(),

            solo_staking_address: env::var("SOLO_STAKING_ADDRESS")
                .unwrap_or(defaults.solo_staking_address),
            lp_staking_address: env::var("LP_STAKING_ADDRESS")
                .unwrap_or(defaults.lp_staking_address),
            split_staking_address: env::var("SPLIT_STAKING_ADDRESS")
                .unwrap_or(defaults.split_staking_address),
            watched_pairs: env::var("WATCHED_PAIRS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            registry_path: env::var("TOKEN_REGISTRY_PATH").ok(),

            price_ttl_ms: env_or("PRICE_TTL_MS", defaults.price_ttl_ms),
            pending_backoff_ms: env_or("PENDING_BACKOFF_MS", defaults.pending_backoff_ms),
            max_attempts: env_or("MAX_ATTEMPTS", defaults.max_attempts),

            refresh_debounce_ms: env_or("REFRESH_DEBOUNCE_MS", defaults.refresh_debounce_ms),
            distribution_cooldown_secs: env_or(
                "DISTRIBUTION_COOLDOWN_SECS",
                defaults.distribution_cooldown_secs,
            ),

            execution_mode: match env::var("EXECUTION_MODE")
                .unwrap_or_else(|_| "simulation".to_string())
                .to_lowercase()
                .as_str()
            {
                "production" => ExecutionMode::Production,
                _ => ExecutionMode::Simulation,
            },
            claim_log_path: env::var("CLAIM_LOG_PATH").unwrap_or(defaults.claim_log_path),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration before touching the network
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!("Invalid RPC_URL - please set a valid node URL"));
        }

        self.staking_contracts()?;
        self.watched_pair_addresses()?;
        self.account_address()?;

        if self.max_attempts == 0 {
            return Err(eyre::eyre!("MAX_ATTEMPTS must be at least 1"));
        }
        if self.price_ttl_ms == 0 {
            return Err(eyre::eyre!("PRICE_TTL_MS must be positive"));
        }

        if self.execution_mode == ExecutionMode::Production && self.signer_key.is_none() {
            return Err(eyre::eyre!("Production mode requires SIGNER_KEY"));
        }

        Ok(())
    }

    pub fn staking_contracts(&self) -> Result<StakingContracts> {
        Ok(StakingContracts {
            solo: parse_address("SOLO_STAKING_ADDRESS", &self.solo_staking_address)?,
            lp: parse_address("LP_STAKING_ADDRESS", &self.lp_staking_address)?,
            split: parse_address("SPLIT_STAKING_ADDRESS", &self.split_staking_address)?,
        })
    }

    pub fn watched_pair_addresses(&self) -> Result<Vec<Address>> {
        self.watched_pairs
            .iter()
            .map(|p| parse_address("WATCHED_PAIRS entry", p))
            .collect()
    }

    pub fn account_address(&self) -> Result<Option<Address>> {
        self.account
            .as_deref()
            .map(|a| parse_address("ACCOUNT_ADDRESS", a))
            .transpose()
    }

    pub fn price_ttl(&self) -> Duration {
        Duration::from_millis(self.price_ttl_ms)
    }

    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            max_attempts: self.max_attempts,
            pending_backoff: Duration::from_millis(self.pending_backoff_ms),
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let short = |s: &str| abbreviate(s, 10, 8);

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║                 STAKELENS - CONFIGURATION                  ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Execution Mode:    {:^40} ║", self.execution_mode);
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Account:           {:^40} ║",
            self.account.as_deref().map(short).unwrap_or_else(|| "✗ Not Set".to_string())
        );
        println!("║ Signer Key:        {:^40} ║",
            if self.signer_key.is_some() { "✓ Configured" } else { "✗ Not Set" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ CONTRACTS                                                  ║");
        println!("║ • Solo Staking:    {:^40} ║", short(&self.solo_staking_address));
        println!("║ • LP Staking:      {:^40} ║", short(&self.lp_staking_address));
        println!("║ • Split Staking:   {:^40} ║", short(&self.split_staking_address));
        println!("║ • Watched Pairs:   {:^40} ║", self.watched_pairs.len());
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ PRICING                                                    ║");
        println!("║ • Price TTL:       {:>37} ms ║", self.price_ttl_ms);
        println!("║ • Pending Backoff: {:>37} ms ║", self.pending_backoff_ms);
        println!("║ • Max Attempts:    {:^40} ║", self.max_attempts);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ REWARDS                                                    ║");
        println!("║ • Refresh Debounce:{:>37} ms ║", self.refresh_debounce_ms);
        println!("║ • Dist. Cooldown:  {:>38} s ║", self.distribution_cooldown_secs);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://eth.llamarpc.com".to_string(),
            chain_id: 1,
            account: None,
            signer_key: None,
            solo_staking_address: Address::ZERO.to_string(),
            lp_staking_address: Address::ZERO.to_string(),
            split_staking_address: Address::ZERO.to_string(),
            watched_pairs: vec![],
            registry_path: None,
            price_ttl_ms: 10_000,
            pending_backoff_ms: 1_000,
            max_attempts: 5,
            refresh_debounce_ms: 250,
            distribution_cooldown_secs: 86_400,
            execution_mode: ExecutionMode::Simulation,
            claim_log_path: "./logs/claims.log".to_string(),
        }
    }
}

// ============================================
// CLAIM LOGGER
// ============================================

use chrono::{DateTime, Utc};
use std::io::Write;

/// One completed (or simulated) claim sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimLog {
    pub timestamp: DateTime<Utc>,
    pub chain_id: u64,
    pub account: String,
    pub execution_mode: ExecutionMode,
    pub distribute_tx: Option<String>,
    pub claim_tx: Option<String>,
    pub block_number: Option<u64>,
    /// Pending + estimated rewards at claim time, in wei
    pub expected_rewards: String,
}

impl ClaimLog {
    /// Append this log to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================
