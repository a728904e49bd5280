//! Token Registry
//!
//! Per-network list of "supported" liquidity-pair tokens. Each one names the
//! stable pair it is priced against, e.g. WETH → the USDC/WETH pair.
//! Any pair holding a supported token can be priced through that stable pair.

use alloy_primitives::{address, Address};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::gateway::LiquidityPoolSnapshot;

/// A token other tokens are commonly paired against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedPairToken {
    pub symbol: String,
    pub address: Address,
    /// Pair used to price this token in stable units
    pub stable_pair: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTokens {
    pub chain_id: u64,
    pub name: String,
    pub supported_liquidity_pair_tokens: Vec<SupportedPairToken>,
}

impl NetworkTokens {
    pub fn supported_token(&self, token: &Address) -> Option<&SupportedPairToken> {
        self.supported_liquidity_pair_tokens
            .iter()
            .find(|t| t.address == *token)
    }

    pub fn is_supported_token(&self, token: &Address) -> bool {
        self.supported_token(token).is_some()
    }

    pub fn is_supported_pair(&self, pair: &LiquidityPoolSnapshot) -> bool {
        self.token_from_pair(pair).is_some()
    }

    /// The supported side of `pair`; token0 wins when both sides are supported
    pub fn token_from_pair(&self, pair: &LiquidityPoolSnapshot) -> Option<&SupportedPairToken> {
        self.supported_token(&pair.token0)
            .or_else(|| self.supported_token(&pair.token1))
    }

    pub fn stable_pair_address(&self, pair: &LiquidityPoolSnapshot) -> Option<Address> {
        self.token_from_pair(pair).map(|t| t.stable_pair)
    }
}

// ============================================
// BUILT-IN NETWORKS
// ============================================

pub fn ethereum_tokens() -> NetworkTokens {
    NetworkTokens {
        chain_id: 1,
        name: "Ethereum".to_string(),
        supported_liquidity_pair_tokens: vec![
            SupportedPairToken {
                symbol: "WETH".to_string(),
                address: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
                // UniV2 USDC/WETH
                stable_pair: address!("B4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc"),
            },
            SupportedPairToken {
                symbol: "WBTC".to_string(),
                address: address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"),
                // UniV2 WBTC/USDC
                stable_pair: address!("004375Dff511095CC5A197A54140a24eFEF3A416"),
            },
        ],
    }
}

pub fn bsc_tokens() -> NetworkTokens {
    NetworkTokens {
        chain_id: 56,
        name: "BNB Smart Chain".to_string(),
        supported_liquidity_pair_tokens: vec![
            SupportedPairToken {
                symbol: "WBNB".to_string(),
                address: address!("bb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"),
                // PancakeV2 WBNB/BUSD
                stable_pair: address!("58F876857a02D6762E0101bb5C46A8c1ED44Dc16"),
            },
        ],
    }
}

// ============================================
// REGISTRY
// ============================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRegistry {
    networks: Vec<NetworkTokens>,
    #[serde(skip)]
    by_chain: HashMap<u64, usize>,
}

impl TokenRegistry {
    pub fn new(networks: Vec<NetworkTokens>) -> Self {
        let mut registry = Self { networks: Vec::new(), by_chain: HashMap::new() };
        for network in networks {
            registry.insert(network);
        }
        registry
    }

    /// Ethereum + BSC
    pub fn builtin() -> Self {
        Self::new(vec![ethereum_tokens(), bsc_tokens()])
    }

    /// Load networks from a TOML file (`[[networks]]` tables)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let parsed: Self = toml::from_str(&content)?;
        Ok(Self::new(parsed.networks))
    }

    /// Built-ins, overridden per chain by the networks in `path`
    pub fn builtin_with_overrides<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut registry = Self::builtin();
        for network in Self::from_file(path)?.networks {
            registry.insert(network);
        }
        Ok(registry)
    }

    /// Add a network, replacing any existing entry for the same chain
    pub fn insert(&mut self, network: NetworkTokens) {
        match self.by_chain.get(&network.chain_id) {
            Some(&idx) => self.networks[idx] = network,
            None => {
                self.by_chain.insert(network.chain_id, self.networks.len());
                self.networks.push(network);
            }
        }
    }

    pub fn network(&self, chain_id: u64) -> Option<&NetworkTokens> {
        self.by_chain.get(&chain_id).map(|&idx| &self.networks[idx])
    }

    /// Print registry statistics
    pub fn print_stats(&self) {
        println!("📊 Token Registry:");
        for network in &self.networks {
            let symbols = network
                .supported_liquidity_pair_tokens
                .iter()
                .map(|t| t.symbol.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            println!("   {} ({}): {}", network.name, network.chain_id, symbols);
        }
    }
}
