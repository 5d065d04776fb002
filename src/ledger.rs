//! Selection ledger: per-token selection intent and transfer status.
//!
//! Entries are keyed by token contract address, kept in insertion order, and
//! mutated only through the transition operations here so the per-entry state
//! machine (Idle -> Submitted -> Confirmed/Failed) cannot be skipped.

use ethers::prelude::*;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// Transfer status of one selected token for the current send attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferStatus {
    /// No send attempted since the entry was created or re-armed.
    Idle,
    /// Submitted to the chain, awaiting confirmation.
    Submitted { tx_hash: TxHash },
    /// Included in a final block.
    Confirmed,
    /// Simulation or submission failed; terminal for this attempt.
    Failed { reason: String },
}

impl TransferStatus {
    /// Terminal statuses end the current send attempt; a fresh
    /// deselect-then-reselect cycle is required to re-arm the entry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Confirmed | TransferStatus::Failed { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TransferStatus::Submitted { .. })
    }
}

/// Per-token selection state, created lazily on first toggle.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEntry {
    pub is_selected: bool,
    pub status: TransferStatus,
}

/// Change notification emitted on every ledger mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    Toggled { address: Address, is_selected: bool },
    Submitted { address: Address, tx_hash: TxHash },
    Confirmed { address: Address },
    Failed { address: Address, reason: String },
    Reset,
}

struct LedgerInner {
    /// Insertion-ordered, address-unique entries.
    entries: Vec<(Address, SelectionEntry)>,
    subscribers: Vec<mpsc::UnboundedSender<LedgerEvent>>,
}

impl LedgerInner {
    fn notify(&mut self, event: LedgerEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn find_mut(&mut self, address: Address) -> Option<&mut SelectionEntry> {
        self.entries
            .iter_mut()
            .find(|(a, _)| *a == address)
            .map(|(_, entry)| entry)
    }
}

/// Session-scoped selection ledger. Cloning yields another handle to the same
/// ledger; all mutation goes through the methods below.
#[derive(Clone)]
pub struct SelectionLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl Default for SelectionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionLedger {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerInner {
                entries: Vec::new(),
                subscribers: Vec::new(),
            })),
        }
    }

    /// Subscribe to ledger change events. Closed receivers are pruned on the
    /// next notification.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<LedgerEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.lock().await.subscribers.push(sender);
        receiver
    }

    /// Upsert the entry's selection flag.
    ///
    /// Deselecting preserves the transfer status. Reselecting an entry that
    /// finished in a terminal status re-arms it to `Idle`; an in-flight
    /// `Submitted` status is never re-armed.
    pub async fn toggle(&self, address: Address, is_selected: bool) {
        let mut inner = self.inner.lock().await;
        if let Some(index) = inner.entries.iter().position(|(a, _)| *a == address) {
            let entry = &mut inner.entries[index].1;
            if is_selected && !entry.is_selected && entry.status.is_terminal() {
                entry.status = TransferStatus::Idle;
            }
            entry.is_selected = is_selected;
        } else {
            inner.entries.push((
                address,
                SelectionEntry {
                    is_selected,
                    status: TransferStatus::Idle,
                },
            ));
        }
        inner.notify(LedgerEvent::Toggled {
            address,
            is_selected,
        });
    }

    /// Transition an entry to `Submitted`. Absent entries (a race with a
    /// holdings refresh) and illegal transitions are logged no-ops.
    pub async fn mark_submitted(&self, address: Address, tx_hash: TxHash) {
        let mut inner = self.inner.lock().await;
        let transitioned = match inner.find_mut(address) {
            Some(entry) if entry.status == TransferStatus::Idle => {
                entry.status = TransferStatus::Submitted { tx_hash };
                true
            }
            Some(entry) => {
                warn!(
                    "Ignoring mark_submitted for {:?} in status {:?}",
                    address, entry.status
                );
                false
            }
            None => {
                warn!("Ignoring mark_submitted for unknown address {:?}", address);
                false
            }
        };
        if transitioned {
            inner.notify(LedgerEvent::Submitted { address, tx_hash });
        }
    }

    /// Transition a submitted entry to `Confirmed`. An entry that was never
    /// submitted cannot become confirmed.
    pub async fn mark_confirmed(&self, address: Address) {
        let mut inner = self.inner.lock().await;
        let transitioned = match inner.find_mut(address) {
            Some(entry) if entry.status.is_pending() => {
                entry.status = TransferStatus::Confirmed;
                true
            }
            Some(entry) => {
                warn!(
                    "Ignoring mark_confirmed for {:?} in status {:?}",
                    address, entry.status
                );
                false
            }
            None => {
                warn!("Ignoring mark_confirmed for unknown address {:?}", address);
                false
            }
        };
        if transitioned {
            inner.notify(LedgerEvent::Confirmed { address });
        }
    }

    /// Transition an entry to `Failed`, from either `Idle` (simulation
    /// failure) or `Submitted` (failed on chain).
    pub async fn mark_failed(&self, address: Address, reason: impl Into<String>) {
        let reason = reason.into();
        let mut inner = self.inner.lock().await;
        let transitioned = match inner.find_mut(address) {
            Some(entry) if !entry.status.is_terminal() => {
                entry.status = TransferStatus::Failed {
                    reason: reason.clone(),
                };
                true
            }
            Some(entry) => {
                warn!(
                    "Ignoring mark_failed for {:?} already in status {:?}",
                    address, entry.status
                );
                false
            }
            None => {
                warn!("Ignoring mark_failed for unknown address {:?}", address);
                false
            }
        };
        if transitioned {
            inner.notify(LedgerEvent::Failed { address, reason });
        }
    }

    /// Addresses with `is_selected == true`, in entry insertion order.
    /// Deterministic across repeated calls with no intervening mutation.
    pub async fn selected_addresses(&self) -> Vec<Address> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_selected)
            .map(|(address, _)| *address)
            .collect()
    }

    /// Current state of one entry.
    pub async fn entry(&self, address: Address) -> Option<SelectionEntry> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .iter()
            .find(|(a, _)| *a == address)
            .map(|(_, entry)| entry.clone())
    }

    /// Copy of all entries in insertion order, for display.
    pub async fn snapshot(&self) -> Vec<(Address, SelectionEntry)> {
        self.inner.lock().await.entries.clone()
    }

    /// Clear all entries. Called on wallet/account change or holdings refresh
    /// so stale pending state never survives.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.notify(LedgerEvent::Reset);
    }
}
