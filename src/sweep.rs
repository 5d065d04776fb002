//! Transfer orchestrator: drive every selected token through an independent
//! simulate -> submit lifecycle against one resolved destination.
//!
//! The send loop is strictly sequential. Each transfer is an independent
//! on-chain call with independent failure modes, so a failing token is marked
//! and skipped while its siblings continue; nothing aborts the batch after the
//! preconditions pass. Confirmation tracking is decoupled: each submitted
//! transaction gets its own watcher task that updates only its own ledger
//! entry.

use crate::chain::ChainClient;
use crate::destination::Destination;
use crate::holdings::HoldingsStore;
use crate::ledger::{SelectionLedger, TransferStatus};
use crate::notify::NotificationLog;
use ethers::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Precondition failures: the send refuses to start before any external call.
#[derive(Debug, Error, PartialEq)]
pub enum SweepError {
    #[error("destination is not resolved to a literal address")]
    DestinationUnresolved,
    #[error("no tokens selected")]
    EmptySelection,
}

/// Per-token result of one send pass.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenResult {
    Submitted(TxHash),
    Failed(String),
    /// Selected address missing from the current holdings batch (stale
    /// selection after a refresh); skipped silently.
    SkippedStale,
    /// Entry was no longer `Idle` when the loop reached it.
    SkippedNotIdle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenOutcome {
    pub address: Address,
    /// Ticker symbol from the matching holding. Empty for `SkippedStale`
    /// outcomes: the selection outlived the holding that carried the symbol.
    pub symbol: String,
    pub result: TokenResult,
}

/// Attempt a transfer of the full balance of every selected token, in ledger
/// order, to the resolved destination.
///
/// Returns once every selected token has been attempted. Submitted
/// transactions are not awaited here; hand the outcomes to
/// [`watch_confirmations`] for that.
pub async fn send_selected(
    from: Address,
    ledger: &SelectionLedger,
    holdings: &HoldingsStore,
    destination: &Destination,
    client: &dyn ChainClient,
    notifications: &NotificationLog,
) -> Result<Vec<TokenOutcome>, SweepError> {
    let to = destination
        .resolved()
        .ok_or(SweepError::DestinationUnresolved)?;

    let selected = ledger.selected_addresses().await;
    if selected.is_empty() {
        return Err(SweepError::EmptySelection);
    }

    info!(
        "Starting sweep of {} selected tokens to {:?}",
        selected.len(),
        to
    );

    let mut outcomes = Vec::with_capacity(selected.len());
    for address in selected {
        let holding = match holdings.find(address).await {
            Some(holding) => holding,
            None => {
                debug!("Skipping stale selection {:?}: not in current holdings", address);
                outcomes.push(TokenOutcome {
                    address,
                    symbol: String::new(),
                    result: TokenResult::SkippedStale,
                });
                continue;
            }
        };

        // Only Idle entries are attempted; a Submitted entry is already in
        // flight and a terminal one needs a fresh toggle cycle to re-arm.
        let status = ledger.entry(address).await.map(|entry| entry.status);
        if !matches!(status, Some(TransferStatus::Idle)) {
            warn!(
                "Skipping {} ({:?}): entry not idle ({:?})",
                holding.ticker_symbol, address, status
            );
            outcomes.push(TokenOutcome {
                address,
                symbol: holding.ticker_symbol,
                result: TokenResult::SkippedNotIdle,
            });
            continue;
        }

        let amount = match holding.raw_balance_units() {
            Ok(amount) => amount,
            Err(e) => {
                let reason = e.to_string();
                ledger.mark_failed(address, reason.clone()).await;
                notifications
                    .push(format!("Error with {}: {}", holding.ticker_symbol, reason))
                    .await;
                outcomes.push(TokenOutcome {
                    address,
                    symbol: holding.ticker_symbol,
                    result: TokenResult::Failed(reason),
                });
                continue;
            }
        };

        let call = match client.simulate_transfer(from, address, to, amount).await {
            Ok(call) => call,
            Err(e) => {
                let reason = e.to_string();
                warn!("Simulation failed for {}: {}", holding.ticker_symbol, reason);
                ledger.mark_failed(address, reason.clone()).await;
                notifications
                    .push(format!("Error with {}: {}", holding.ticker_symbol, reason))
                    .await;
                outcomes.push(TokenOutcome {
                    address,
                    symbol: holding.ticker_symbol,
                    result: TokenResult::Failed(reason),
                });
                continue;
            }
        };

        match client.submit(&call).await {
            Ok(tx_hash) => {
                info!(
                    "Submitted transfer of {} ({:?}): {:?}",
                    holding.ticker_symbol, address, tx_hash
                );
                ledger.mark_submitted(address, tx_hash).await;
                outcomes.push(TokenOutcome {
                    address,
                    symbol: holding.ticker_symbol,
                    result: TokenResult::Submitted(tx_hash),
                });
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("Submission failed for {}: {}", holding.ticker_symbol, reason);
                ledger.mark_failed(address, reason.clone()).await;
                notifications
                    .push(format!("Error with {}: {}", holding.ticker_symbol, reason))
                    .await;
                outcomes.push(TokenOutcome {
                    address,
                    symbol: holding.ticker_symbol,
                    result: TokenResult::Failed(reason),
                });
            }
        }
    }

    Ok(outcomes)
}

/// Spawn one confirmation watcher per submitted outcome.
///
/// Watchers run concurrently, may complete in any order, and each updates only
/// its own ledger entry. A watcher whose entry vanished (ledger reset while
/// the transaction was in flight) lands as a logged no-op inside the ledger.
pub fn watch_confirmations(
    ledger: &SelectionLedger,
    client: Arc<dyn ChainClient>,
    outcomes: &[TokenOutcome],
) -> Vec<JoinHandle<()>> {
    outcomes
        .iter()
        .filter_map(|outcome| match outcome.result {
            TokenResult::Submitted(tx_hash) => Some((outcome.address, tx_hash)),
            _ => None,
        })
        .map(|(address, tx_hash)| {
            let ledger = ledger.clone();
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                match client.confirm(tx_hash).await {
                    Ok(confirmation) if confirmation.success => {
                        info!("Transfer {:?} confirmed: {:?}", tx_hash, confirmation.block_number);
                        ledger.mark_confirmed(address).await;
                    }
                    Ok(confirmation) => {
                        warn!(
                            "Transfer {:?} reverted in block {:?}",
                            tx_hash, confirmation.block_number
                        );
                        ledger
                            .mark_failed(address, "transaction reverted on chain")
                            .await;
                    }
                    Err(e) => {
                        warn!("Confirmation of {:?} failed: {}", tx_hash, e);
                        ledger.mark_failed(address, e.to_string()).await;
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{transfer_calldata, Confirmation, TransferCall};
    use crate::destination::NameResolver;
    use crate::types::TokenHolding;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn addr(n: u8) -> Address {
        Address::from_low_u64_be(n as u64)
    }

    fn holding(n: u8, symbol: &str) -> TokenHolding {
        TokenHolding {
            contract_address: addr(n),
            ticker_symbol: symbol.to_string(),
            raw_balance: "1000".to_string(),
            quote_value: Decimal::ONE,
            quote_rate: Decimal::ONE,
        }
    }

    struct NeverResolver;

    #[async_trait]
    impl NameResolver for NeverResolver {
        async fn resolve(&self, _name: &str) -> Result<Option<Address>> {
            panic!("resolver must not be consulted for a literal address");
        }
    }

    async fn resolved_destination(to: Address) -> Destination {
        let mut destination = Destination::new(format!("{:?}", to));
        destination.resolve(&NeverResolver).await.unwrap();
        assert_eq!(destination.resolved(), Some(to));
        destination
    }

    /// Programmable chain client with call counters.
    #[derive(Default)]
    struct MockChainClient {
        fail_simulation: HashSet<Address>,
        fail_submission: HashSet<Address>,
        /// Per-hash confirmation outcome; `true` confirms, `false` reverts.
        confirmations: Mutex<HashMap<TxHash, bool>>,
        /// Extra latency per hash, to force out-of-order completion.
        confirm_delay_ms: Mutex<HashMap<TxHash, u64>>,
        simulate_calls: AtomicUsize,
        submit_calls: AtomicUsize,
    }

    impl MockChainClient {
        fn tx_hash_for(token: Address) -> TxHash {
            TxHash::from_low_u64_be(token.to_low_u64_be() + 1000)
        }
    }

    #[async_trait]
    impl ChainClient for MockChainClient {
        async fn simulate_transfer(
            &self,
            from: Address,
            token: Address,
            to: Address,
            amount: U256,
        ) -> Result<TransferCall> {
            self.simulate_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_simulation.contains(&token) {
                return Err(anyhow!("execution reverted: transfer amount exceeds balance"));
            }
            Ok(TransferCall {
                token,
                from,
                to,
                amount,
                calldata: transfer_calldata(to, amount)?,
            })
        }

        async fn submit(&self, call: &TransferCall) -> Result<TxHash> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_submission.contains(&call.token) {
                return Err(anyhow!("submission rejected by wallet"));
            }
            Ok(Self::tx_hash_for(call.token))
        }

        async fn confirm(&self, tx_hash: TxHash) -> Result<Confirmation> {
            let delay = self
                .confirm_delay_ms
                .lock()
                .unwrap()
                .get(&tx_hash)
                .copied()
                .unwrap_or(0);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            match self.confirmations.lock().unwrap().get(&tx_hash) {
                Some(true) => Ok(Confirmation {
                    block_number: Some(1),
                    success: true,
                }),
                Some(false) => Ok(Confirmation {
                    block_number: Some(1),
                    success: false,
                }),
                None => Err(anyhow!("receipt never arrived")),
            }
        }
    }

    // ==================== precondition tests ====================

    #[tokio::test]
    async fn test_unresolved_destination_makes_zero_calls() {
        let ledger = SelectionLedger::new();
        let holdings = HoldingsStore::new();
        let notifications = NotificationLog::new();
        let client = MockChainClient::default();

        holdings.replace(vec![holding(1, "AAA")]).await;
        ledger.toggle(addr(1), true).await;

        let destination = Destination::new("unresolvable.eth");
        let result = send_selected(
            addr(99),
            &ledger,
            &holdings,
            &destination,
            &client,
            &notifications,
        )
        .await;

        assert_eq!(result.unwrap_err(), SweepError::DestinationUnresolved);
        assert_eq!(client.simulate_calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.submit_calls.load(Ordering::SeqCst), 0);
        // No side effects: entry untouched
        assert_eq!(
            ledger.entry(addr(1)).await.unwrap().status,
            TransferStatus::Idle
        );
    }

    #[tokio::test]
    async fn test_empty_selection_refuses_to_start() {
        let ledger = SelectionLedger::new();
        let holdings = HoldingsStore::new();
        let notifications = NotificationLog::new();
        let client = MockChainClient::default();

        let destination = resolved_destination(addr(50)).await;
        let result = send_selected(
            addr(99),
            &ledger,
            &holdings,
            &destination,
            &client,
            &notifications,
        )
        .await;

        assert_eq!(result.unwrap_err(), SweepError::EmptySelection);
        assert_eq!(client.simulate_calls.load(Ordering::SeqCst), 0);
    }

    // ==================== failure isolation tests ====================

    #[tokio::test]
    async fn test_middle_failure_does_not_block_siblings() {
        let ledger = SelectionLedger::new();
        let holdings = HoldingsStore::new();
        let notifications = NotificationLog::new();
        let mut client = MockChainClient::default();
        client.fail_simulation.insert(addr(2));

        holdings
            .replace(vec![holding(1, "AAA"), holding(2, "BBB"), holding(3, "CCC")])
            .await;
        ledger.toggle(addr(1), true).await;
        ledger.toggle(addr(2), true).await;
        ledger.toggle(addr(3), true).await;

        let destination = resolved_destination(addr(50)).await;
        let outcomes = send_selected(
            addr(99),
            &ledger,
            &holdings,
            &destination,
            &client,
            &notifications,
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0].result, TokenResult::Submitted(_)));
        assert!(matches!(outcomes[1].result, TokenResult::Failed(_)));
        assert!(matches!(outcomes[2].result, TokenResult::Submitted(_)));

        // Ledger mirrors the outcomes
        assert!(ledger.entry(addr(1)).await.unwrap().status.is_pending());
        assert!(matches!(
            ledger.entry(addr(2)).await.unwrap().status,
            TransferStatus::Failed { .. }
        ));
        assert!(ledger.entry(addr(3)).await.unwrap().status.is_pending());

        // All three were simulated, only the healthy two submitted
        assert_eq!(client.simulate_calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.submit_calls.load(Ordering::SeqCst), 2);

        // The failure notification names the token
        let recent = notifications.recent().await;
        assert_eq!(recent.len(), 1);
        assert!(recent[0].message.contains("BBB"));
        assert!(recent[0].message.contains("reverted"));
    }

    #[tokio::test]
    async fn test_submission_failure_is_isolated_too() {
        let ledger = SelectionLedger::new();
        let holdings = HoldingsStore::new();
        let notifications = NotificationLog::new();
        let mut client = MockChainClient::default();
        client.fail_submission.insert(addr(1));

        holdings.replace(vec![holding(1, "AAA"), holding(2, "BBB")]).await;
        ledger.toggle(addr(1), true).await;
        ledger.toggle(addr(2), true).await;

        let destination = resolved_destination(addr(50)).await;
        let outcomes = send_selected(
            addr(99),
            &ledger,
            &holdings,
            &destination,
            &client,
            &notifications,
        )
        .await
        .unwrap();

        assert!(matches!(outcomes[0].result, TokenResult::Failed(_)));
        assert!(matches!(outcomes[1].result, TokenResult::Submitted(_)));
        assert!(notifications.recent().await[0].message.contains("AAA"));
    }

    #[tokio::test]
    async fn test_malformed_raw_balance_is_isolated() {
        let ledger = SelectionLedger::new();
        let holdings = HoldingsStore::new();
        let notifications = NotificationLog::new();
        let client = MockChainClient::default();

        let mut bad = holding(1, "BAD");
        bad.raw_balance = "NaN".to_string();
        holdings.replace(vec![bad, holding(2, "OK")]).await;
        ledger.toggle(addr(1), true).await;
        ledger.toggle(addr(2), true).await;

        let destination = resolved_destination(addr(50)).await;
        let outcomes = send_selected(
            addr(99),
            &ledger,
            &holdings,
            &destination,
            &client,
            &notifications,
        )
        .await
        .unwrap();

        assert!(matches!(outcomes[0].result, TokenResult::Failed(_)));
        assert!(matches!(outcomes[1].result, TokenResult::Submitted(_)));
        // The malformed token never reached simulation
        assert_eq!(client.simulate_calls.load(Ordering::SeqCst), 1);
    }

    // ==================== skip tests ====================

    #[tokio::test]
    async fn test_stale_selection_is_skipped_silently() {
        let ledger = SelectionLedger::new();
        let holdings = HoldingsStore::new();
        let notifications = NotificationLog::new();
        let client = MockChainClient::default();

        // addr(7) was selected against an older batch and is gone now
        holdings.replace(vec![holding(1, "AAA")]).await;
        ledger.toggle(addr(7), true).await;
        ledger.toggle(addr(1), true).await;

        let destination = resolved_destination(addr(50)).await;
        let outcomes = send_selected(
            addr(99),
            &ledger,
            &holdings,
            &destination,
            &client,
            &notifications,
        )
        .await
        .unwrap();

        assert_eq!(outcomes[0].result, TokenResult::SkippedStale);
        // No holding means no symbol to report
        assert!(outcomes[0].symbol.is_empty());
        assert!(matches!(outcomes[1].result, TokenResult::Submitted(_)));
        assert_eq!(outcomes[1].symbol, "AAA");
        // Silent: no notification, no status change for the stale entry
        assert!(notifications.recent().await.is_empty());
        assert_eq!(
            ledger.entry(addr(7)).await.unwrap().status,
            TransferStatus::Idle
        );
        assert_eq!(client.simulate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_in_flight_entry_is_not_resubmitted() {
        let ledger = SelectionLedger::new();
        let holdings = HoldingsStore::new();
        let notifications = NotificationLog::new();
        let client = MockChainClient::default();

        holdings.replace(vec![holding(1, "AAA")]).await;
        ledger.toggle(addr(1), true).await;
        ledger
            .mark_submitted(addr(1), TxHash::from_low_u64_be(42))
            .await;

        let destination = resolved_destination(addr(50)).await;
        let outcomes = send_selected(
            addr(99),
            &ledger,
            &holdings,
            &destination,
            &client,
            &notifications,
        )
        .await
        .unwrap();

        assert_eq!(outcomes[0].result, TokenResult::SkippedNotIdle);
        assert_eq!(client.simulate_calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.submit_calls.load(Ordering::SeqCst), 0);
    }

    // ==================== confirmation watcher tests ====================

    #[tokio::test]
    async fn test_watchers_update_only_their_own_entries_out_of_order() {
        let ledger = SelectionLedger::new();
        let holdings = HoldingsStore::new();
        let notifications = NotificationLog::new();

        let client = MockChainClient::default();
        let hash1 = MockChainClient::tx_hash_for(addr(1));
        let hash2 = MockChainClient::tx_hash_for(addr(2));
        client.confirmations.lock().unwrap().insert(hash1, true);
        client.confirmations.lock().unwrap().insert(hash2, false);
        // First-submitted confirms last
        client.confirm_delay_ms.lock().unwrap().insert(hash1, 50);
        let client = Arc::new(client);

        holdings.replace(vec![holding(1, "AAA"), holding(2, "BBB")]).await;
        ledger.toggle(addr(1), true).await;
        ledger.toggle(addr(2), true).await;

        let destination = resolved_destination(addr(50)).await;
        let outcomes = send_selected(
            addr(99),
            &ledger,
            &holdings,
            &destination,
            client.as_ref(),
            &notifications,
        )
        .await
        .unwrap();

        let handles = watch_confirmations(&ledger, client, &outcomes);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(
            ledger.entry(addr(1)).await.unwrap().status,
            TransferStatus::Confirmed
        );
        assert!(matches!(
            ledger.entry(addr(2)).await.unwrap().status,
            TransferStatus::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_confirmation_after_reset_is_a_noop() {
        let ledger = SelectionLedger::new();
        let holdings = HoldingsStore::new();
        let notifications = NotificationLog::new();

        let client = MockChainClient::default();
        let hash1 = MockChainClient::tx_hash_for(addr(1));
        client.confirmations.lock().unwrap().insert(hash1, true);
        client.confirm_delay_ms.lock().unwrap().insert(hash1, 30);
        let client = Arc::new(client);

        holdings.replace(vec![holding(1, "AAA")]).await;
        ledger.toggle(addr(1), true).await;

        let destination = resolved_destination(addr(50)).await;
        let outcomes = send_selected(
            addr(99),
            &ledger,
            &holdings,
            &destination,
            client.as_ref(),
            &notifications,
        )
        .await
        .unwrap();

        let handles = watch_confirmations(&ledger, client, &outcomes);
        // Wallet change resets the ledger while the confirmation is in flight
        ledger.reset().await;
        for handle in handles {
            handle.await.unwrap();
        }

        // The confirmation landed as a logged no-op; the ledger shows no record
        assert!(ledger.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_watchers_for_failed_outcomes() {
        let ledger = SelectionLedger::new();
        let outcomes = vec![TokenOutcome {
            address: addr(1),
            symbol: "AAA".to_string(),
            result: TokenResult::Failed("nope".to_string()),
        }];
        let client: Arc<dyn ChainClient> = Arc::new(MockChainClient::default());
        let handles = watch_confirmations(&ledger, client, &outcomes);
        assert!(handles.is_empty());
    }
}
