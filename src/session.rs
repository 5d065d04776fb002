//! Session wiring: one connected wallet on one chain, its holdings batch,
//! selection ledger, destination input, and notification feed.
//!
//! The session owns the stores; the orchestrator and resolver only read and
//! write through the stores' public operations during a send.

use crate::chain::ChainClient;
use crate::destination::{Destination, NameResolver};
use crate::holdings::{HoldingsSource, HoldingsStore};
use crate::ledger::SelectionLedger;
use crate::notify::NotificationLog;
use crate::sweep::{self, TokenOutcome};
use anyhow::{anyhow, Result};
use ethers::prelude::*;
use std::sync::Arc;
use tracing::info;

pub struct Session<S: HoldingsSource> {
    source: S,
    pub holdings: HoldingsStore,
    pub ledger: SelectionLedger,
    pub notifications: NotificationLog,
    destination: Destination,
    wallet: Option<Address>,
    chain_id: u64,
}

impl<S: HoldingsSource> Session<S> {
    pub fn new(source: S, chain_id: u64) -> Self {
        Self {
            source,
            holdings: HoldingsStore::new(),
            ledger: SelectionLedger::new(),
            notifications: NotificationLog::new(),
            destination: Destination::default(),
            wallet: None,
            chain_id,
        }
    }

    pub fn wallet(&self) -> Option<Address> {
        self.wallet
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Replace the destination input. Any previous resolution is stale;
    /// no resolution happens here (only on send).
    pub fn set_destination(&mut self, raw: impl Into<String>) {
        self.destination.set_raw(raw);
    }

    /// Connect a wallet and load its holdings.
    pub async fn connect(&mut self, wallet: Address) -> Result<()> {
        info!("Connecting wallet {:?} on chain {}", wallet, self.chain_id);
        self.wallet = Some(wallet);
        self.refresh().await
    }

    /// Switch chains for the connected wallet and reload holdings.
    pub async fn switch_chain(&mut self, chain_id: u64) -> Result<()> {
        self.chain_id = chain_id;
        if self.wallet.is_some() {
            self.refresh().await
        } else {
            Ok(())
        }
    }

    /// Refetch holdings for the connected wallet. Success replaces the batch
    /// wholesale and resets the ledger so no stale pending state survives; a
    /// fetch error leaves the last-known-good batch in place and surfaces one
    /// notification. Retry by repeating the action.
    pub async fn refresh(&mut self) -> Result<()> {
        let wallet = self.wallet.ok_or_else(|| anyhow!("no wallet connected"))?;
        match self.source.fetch(self.chain_id, wallet).await {
            Ok(batch) => {
                self.holdings.replace(batch).await;
                self.ledger.reset().await;
                Ok(())
            }
            Err(e) => {
                self.notifications.push(e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Disconnect the wallet: holdings and ledger are cleared to empty.
    /// In-flight submissions cannot be retracted; their confirmations land as
    /// logged no-ops against the reset ledger.
    pub async fn disconnect(&mut self) {
        info!("Disconnecting wallet {:?}", self.wallet);
        self.wallet = None;
        self.holdings.clear().await;
        self.ledger.reset().await;
    }

    /// Resolve the destination (names go through the resolver, literals
    /// resolve locally) and sweep every selected token to it. Spawns one
    /// confirmation watcher per submitted transfer and returns the per-token
    /// outcomes without awaiting confirmations.
    pub async fn send_selected(
        &mut self,
        resolver: &dyn NameResolver,
        client: Arc<dyn ChainClient>,
    ) -> Result<Vec<TokenOutcome>> {
        let wallet = self.wallet.ok_or_else(|| anyhow!("no wallet connected"))?;

        if self.destination.resolved().is_none() {
            let resolved = self.destination.resolve(resolver).await?;
            if resolved.is_none() {
                self.notifications
                    .push(format!(
                        "Destination '{}' could not be resolved",
                        self.destination.raw()
                    ))
                    .await;
            }
        }

        let outcomes = sweep::send_selected(
            wallet,
            &self.ledger,
            &self.holdings,
            &self.destination,
            client.as_ref(),
            &self.notifications,
        )
        .await?;

        sweep::watch_confirmations(&self.ledger, client, &outcomes);
        Ok(outcomes)
    }
}
