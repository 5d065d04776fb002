//! Destination handling: classify user input as a literal address or a
//! human-readable name, and resolve names through an external naming service.

use anyhow::Result;
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider, ProviderError};
use std::sync::Arc;
use tracing::info;

/// Forward-resolves a human-readable name to a literal address.
/// "No record" is `Ok(None)`, distinct from a transport failure.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Option<Address>>;
}

/// ENS resolver backed by an ethers JSON-RPC provider.
pub struct EnsResolver {
    provider: Arc<Provider<Http>>,
}

impl EnsResolver {
    pub fn new(provider: Arc<Provider<Http>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl NameResolver for EnsResolver {
    async fn resolve(&self, name: &str) -> Result<Option<Address>> {
        match self.provider.resolve_name(name).await {
            Ok(address) => Ok(Some(address)),
            // A name without a record is an absence, not a failure
            Err(ProviderError::EnsError(_)) | Err(ProviderError::EnsNotOwned(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// What a user-entered destination string syntactically is.
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationKind {
    /// A literal 0x-prefixed 20-byte address.
    Address(Address),
    /// A dotted name, normalized and ready for lookup.
    Name(String),
    /// Neither address grammar nor name grammar.
    Invalid,
}

/// Canonicalize a name before lookup. ENS resolution is
/// canonicalization-sensitive: an un-normalized name resolves to a different
/// or no record.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Classify a raw destination string.
pub fn classify(raw: &str) -> DestinationKind {
    let trimmed = raw.trim();
    if trimmed.starts_with("0x") {
        if let Ok(address) = trimmed.parse::<Address>() {
            return DestinationKind::Address(address);
        }
    }
    if trimmed.contains('.') {
        return DestinationKind::Name(normalize_name(trimmed));
    }
    DestinationKind::Invalid
}

/// Syntactic plausibility check exposed to the UI: a valid literal address or
/// anything containing a name separator passes. Full resolvability is not
/// required since resolution is asynchronous and happens on send.
pub fn looks_valid(raw: &str) -> bool {
    !matches!(classify(raw), DestinationKind::Invalid)
}

/// The user-entered recipient: exact input plus the literal address it
/// resolved to, if resolution has happened and succeeded.
#[derive(Debug, Clone, Default)]
pub struct Destination {
    raw: String,
    resolved: Option<Address>,
}

impl Destination {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            resolved: None,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn resolved(&self) -> Option<Address> {
        self.resolved
    }

    /// Replace the raw input. Any previous resolution is stale and dropped.
    pub fn set_raw(&mut self, raw: impl Into<String>) {
        self.raw = raw.into();
        self.resolved = None;
    }

    pub fn looks_valid(&self) -> bool {
        looks_valid(&self.raw)
    }

    /// Resolve the destination to a literal address. A literal input resolves
    /// locally without touching the resolver; a name is forward-resolved.
    /// Returns `None` (and leaves `resolved` absent) when there is no record
    /// or the input is invalid.
    pub async fn resolve(&mut self, resolver: &dyn NameResolver) -> Result<Option<Address>> {
        match classify(&self.raw) {
            DestinationKind::Address(address) => {
                self.resolved = Some(address);
                Ok(Some(address))
            }
            DestinationKind::Name(name) => {
                let resolved = resolver.resolve(&name).await?;
                match resolved {
                    Some(address) => {
                        info!("Resolved {} to {:?}", name, address);
                        self.resolved = Some(address);
                        Ok(Some(address))
                    }
                    None => {
                        self.resolved = None;
                        Ok(None)
                    }
                }
            }
            DestinationKind::Invalid => {
                self.resolved = None;
                Ok(None)
            }
        }
    }
}
