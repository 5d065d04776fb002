//! Common types shared across modules.

use ethers::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

/// One ERC-20 balance owned by the connected wallet.
///
/// Holdings arrive as an immutable batch from the indexer and are replaced
/// wholesale on every refetch, never patched in place.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHolding {
    /// Token contract address, unique key within a holdings batch.
    pub contract_address: Address,
    /// Display symbol, not guaranteed unique.
    pub ticker_symbol: String,
    /// Integer balance in the token's smallest unit, string-encoded by the
    /// indexer to avoid precision loss.
    pub raw_balance: String,
    /// Current USD value of the full raw balance.
    pub quote_value: Decimal,
    /// USD value of one whole token unit. Zero with a non-zero quote is an
    /// upstream data error and means "balance unknown", not divide-by-zero.
    pub quote_rate: Decimal,
}

impl TokenHolding {
    /// Full raw balance as a U256, ready for a transfer call.
    pub fn raw_balance_units(&self) -> anyhow::Result<U256> {
        U256::from_dec_str(self.raw_balance.trim())
            .map_err(|e| anyhow::anyhow!("invalid raw balance '{}': {}", self.raw_balance, e))
    }
}

/// Raw per-token record as the indexer returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTokenRecord {
    pub contract_address: String,
    pub contract_ticker_symbol: String,
    pub balance: String,
    pub quote: Decimal,
    pub quote_rate: Decimal,
}

/// Indexer response envelope: `{ "data": { "erc20s": [...] } }`.
#[derive(Debug, Deserialize)]
pub struct HoldingsResponse {
    pub data: HoldingsData,
}

#[derive(Debug, Deserialize)]
pub struct HoldingsData {
    pub erc20s: Vec<RawTokenRecord>,
}

impl HoldingsResponse {
    /// Convert raw records into holdings. Records whose contract address does
    /// not parse are dropped with a warning rather than failing the batch.
    pub fn into_holdings(self) -> Vec<TokenHolding> {
        self.data
            .erc20s
            .into_iter()
            .filter_map(|record| match record.contract_address.parse::<Address>() {
                Ok(contract_address) => Some(TokenHolding {
                    contract_address,
                    ticker_symbol: record.contract_ticker_symbol,
                    raw_balance: record.balance,
                    quote_value: record.quote,
                    quote_rate: record.quote_rate,
                }),
                Err(_) => {
                    warn!(
                        "Skipping token record with unparseable address: {}",
                        record.contract_address
                    );
                    None
                }
            })
            .collect()
    }
}
