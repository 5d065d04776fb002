//! Session-scoped holdings store and the indexer that feeds it.
//!
//! The store owns the current batch of token holdings. Batches are replaced
//! wholesale on every refetch and cleared on disconnect; nothing is patched
//! in place.

use crate::config;
use crate::types::{HoldingsResponse, TokenHolding};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Fetches the token holdings of one wallet on one chain.
#[async_trait]
pub trait HoldingsSource: Send + Sync {
    async fn fetch(&self, chain_id: u64, wallet: Address) -> Result<Vec<TokenHolding>>;
}

/// Holdings indexer over HTTP. Expects the
/// `{ "data": { "erc20s": [...] } }` response shape.
pub struct HttpHoldingsSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHoldingsSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl HoldingsSource for HttpHoldingsSource {
    async fn fetch(&self, chain_id: u64, wallet: Address) -> Result<Vec<TokenHolding>> {
        let url = format!("{}/api/tokens", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("chainId", chain_id.to_string()),
                ("address", format!("{:?}", wallet)),
            ])
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "{} not supported or an error occurred: {}",
                    config::network_label(chain_id),
                    e
                )
            })?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "{} not supported or an error occurred (HTTP {})",
                config::network_label(chain_id),
                response.status()
            ));
        }

        let body: HoldingsResponse = response.json().await.map_err(|e| {
            anyhow!(
                "{} not supported or an error occurred: malformed response: {}",
                config::network_label(chain_id),
                e
            )
        })?;

        let holdings = body.into_holdings();
        info!(
            "Fetched {} token holdings for {:?} on chain {}",
            holdings.len(),
            wallet,
            chain_id
        );
        Ok(holdings)
    }
}

/// Cloneable handle to the session's current holdings batch.
#[derive(Clone)]
pub struct HoldingsStore {
    holdings: Arc<Mutex<Vec<TokenHolding>>>,
}

impl Default for HoldingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HoldingsStore {
    pub fn new() -> Self {
        Self {
            holdings: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replace the whole batch.
    pub async fn replace(&self, batch: Vec<TokenHolding>) {
        let mut holdings = self.holdings.lock().await;
        debug!(
            "Replacing holdings batch: {} -> {} tokens",
            holdings.len(),
            batch.len()
        );
        *holdings = batch;
    }

    /// Clear to empty, on wallet disconnect.
    pub async fn clear(&self) {
        self.holdings.lock().await.clear();
    }

    /// Copy of the current batch, in indexer order.
    pub async fn all(&self) -> Vec<TokenHolding> {
        self.holdings.lock().await.clone()
    }

    /// Look up one holding by contract address.
    pub async fn find(&self, contract_address: Address) -> Option<TokenHolding> {
        self.holdings
            .lock()
            .await
            .iter()
            .find(|holding| holding.contract_address == contract_address)
            .cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.holdings.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn holding(n: u8, symbol: &str) -> TokenHolding {
        TokenHolding {
            contract_address: Address::from_low_u64_be(n as u64),
            ticker_symbol: symbol.to_string(),
            raw_balance: "1000".to_string(),
            quote_value: Decimal::ONE,
            quote_rate: Decimal::ONE,
        }
    }

    // ==================== HoldingsStore tests ====================

    #[tokio::test]
    async fn test_store_starts_empty() {
        let store = HoldingsStore::new();
        assert!(store.is_empty().await);
        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_is_wholesale() {
        let store = HoldingsStore::new();
        store.replace(vec![holding(1, "AAA"), holding(2, "BBB")]).await;
        assert_eq!(store.all().await.len(), 2);

        // A refetch replaces, never merges
        store.replace(vec![holding(3, "CCC")]).await;
        let all = store.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].ticker_symbol, "CCC");
        assert!(store.find(Address::from_low_u64_be(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_find_by_contract_address() {
        let store = HoldingsStore::new();
        store.replace(vec![holding(1, "AAA"), holding(2, "BBB")]).await;

        let found = store.find(Address::from_low_u64_be(2)).await.unwrap();
        assert_eq!(found.ticker_symbol, "BBB");
        assert!(store.find(Address::from_low_u64_be(9)).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_empties_batch() {
        let store = HoldingsStore::new();
        store.replace(vec![holding(1, "AAA")]).await;
        store.clear().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = HoldingsStore::new();
        let other = store.clone();
        store.replace(vec![holding(1, "AAA")]).await;
        assert_eq!(other.all().await.len(), 1);
    }
}
