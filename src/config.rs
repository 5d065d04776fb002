use anyhow::Result;
use std::env;
use std::sync::Arc;
use url::Url;
use ethers::providers::{Http, Provider};

/// A predefined EVM-compatible network with label, chain ID, native token, and default RPC.
#[derive(Clone, Debug)]
pub struct EvmNetwork {
    pub label: &'static str,
    pub chain_id: u64,
    pub native_token: &'static str,
    pub default_rpc: &'static str,
}

impl EvmNetwork {
    pub const fn new(
        label: &'static str,
        chain_id: u64,
        native_token: &'static str,
        default_rpc: &'static str,
    ) -> Self {
        Self {
            label,
            chain_id,
            native_token,
            default_rpc,
        }
    }
}

/// Networks the holdings indexer is known to cover.
pub const NETWORKS: &[EvmNetwork] = &[
    EvmNetwork::new("Ethereum", 1, "ETH", "https://ethereum-rpc.publicnode.com"),
    EvmNetwork::new("Sepolia", 11155111, "ETH", "https://ethereum-sepolia-rpc.publicnode.com"),
    EvmNetwork::new("Optimism", 10, "ETH", "https://mainnet.optimism.io"),
    EvmNetwork::new("Base", 8453, "ETH", "https://mainnet.base.org"),
    EvmNetwork::new("Polygon", 137, "POL", "https://polygon-rpc.com"),
    EvmNetwork::new("Gnosis Chain", 100, "xDAI", "https://rpc.gnosischain.com"),
    EvmNetwork::new("BNB Chain", 56, "BNB", "https://bsc-dataseed.binance.org"),
    EvmNetwork::new("Avalanche C-Chain", 43114, "AVAX", "https://avalanche-c-chain-rpc.publicnode.com"),
];

/// Find a network by chain ID
pub fn find_network_by_chain_id(chain_id: u64) -> Option<&'static EvmNetwork> {
    NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

/// Label for a chain ID, for user-facing messages about unknown chains.
pub fn network_label(chain_id: u64) -> String {
    find_network_by_chain_id(chain_id)
        .map(|n| n.label.to_string())
        .unwrap_or_else(|| format!("chain {}", chain_id))
}

/// Get the block explorer URL for a given chain ID
/// Returns the base URL for transaction/address lookups
pub fn get_block_explorer_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://etherscan.io"),
        11155111 => Some("https://sepolia.etherscan.io"),
        10 => Some("https://optimistic.etherscan.io"),
        8453 => Some("https://basescan.org"),
        137 => Some("https://polygonscan.com"),
        100 => Some("https://gnosisscan.io"),
        56 => Some("https://bscscan.com"),
        43114 => Some("https://snowtrace.io"),
        _ => None,
    }
}

/// Get the full URL to view a transaction on the block explorer
pub fn get_tx_explorer_url(chain_id: u64, tx_hash: &str) -> Option<String> {
    get_block_explorer_url(chain_id).map(|base| format!("{}/tx/{}", base, tx_hash))
}

#[derive(Clone)]
pub struct Config {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Base URL of the holdings indexer API.
    pub holdings_api_url: String,
    /// Seconds to keep polling for a submitted transaction's receipt.
    pub confirmation_timeout_secs: u64,
}

impl Config {
    pub fn new(rpc_url: String, chain_id: u64) -> Self {
        let holdings_api_url = env::var("HOLDINGS_API_URL")
            .unwrap_or_else(|_| "https://api.tokensweep.xyz".to_string());

        let confirmation_timeout_secs = env::var("CONFIRMATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90);

        Self {
            rpc_url,
            chain_id,
            holdings_api_url,
            confirmation_timeout_secs,
        }
    }

    pub fn from_network(network: &EvmNetwork) -> Self {
        Self::new(network.default_rpc.to_string(), network.chain_id)
    }

    /// Build config from environment variables, loading `.env` if present.
    /// `RPC_URL` and `CHAIN_ID` override the built-in network defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let chain_id = env::var("CHAIN_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let rpc_url = env::var("RPC_URL").unwrap_or_else(|_| {
            find_network_by_chain_id(chain_id)
                .map(|n| n.default_rpc.to_string())
                .unwrap_or_else(|| "https://ethereum-rpc.publicnode.com".to_string())
        });

        Self::new(rpc_url, chain_id)
    }

    pub async fn get_provider(&self) -> Result<Arc<Provider<Http>>> {
        let url = Url::parse(&self.rpc_url)?;
        let provider = Provider::<Http>::try_from(url.as_str())?;
        Ok(Arc::new(provider))
    }
}

impl Default for Config {
    fn default() -> Self {
        // Default to Ethereum mainnet - the host application selects the chain
        if let Some(mainnet) = find_network_by_chain_id(1) {
            Self::from_network(mainnet)
        } else {
            Self::new("https://ethereum-rpc.publicnode.com".to_string(), 1)
        }
    }
}
