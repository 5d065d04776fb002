//! Batch ERC-20 sweep engine.
//!
//! Select a subset of the tokens held by one wallet and send every selected
//! balance, in a single action, to one destination address (or ENS-style name).
//! Each token moves through an independent simulate -> submit -> confirm
//! lifecycle tracked in the [`ledger::SelectionLedger`], so one token's failure
//! never blocks or corrupts the rest of the batch.

pub mod balance;
pub mod chain;
pub mod config;
pub mod destination;
pub mod holdings;
pub mod ledger;
pub mod notify;
pub mod session;
pub mod sweep;
pub mod types;

pub use balance::DisplayBalance;
pub use destination::{Destination, NameResolver};
pub use holdings::{HoldingsSource, HoldingsStore};
pub use ledger::{SelectionLedger, TransferStatus};
pub use session::Session;
pub use sweep::{send_selected, SweepError};
pub use types::TokenHolding;
