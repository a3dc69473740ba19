// Data models shared across the marketplace client

use serde::{Deserialize, Serialize};

/// Stable integer identifier joining catalog metadata to ledger-tracked state
pub type ItemId = u32;

/// Current unix timestamp in seconds
pub fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A ledger account address.
///
/// The ledger does not guarantee uniform casing, so every comparison that
/// scopes data to a viewer must go through `matches` or `canonical`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Address(raw.into())
    }

    /// Case-insensitive equality
    pub fn matches(&self, other: &Address) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    /// Canonical lowercase form, used as a map/set key
    pub fn canonical(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One (buyer, timestamp) entry from the ledger's append-only purchase log.
/// Resale removes entitlement but never erases these records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub buyer: Address,
    pub timestamp: u64,
}

/// Cached per-item ledger snapshot.
///
/// Written only by a completed read or by the follow-up refresh after a
/// confirmed transaction; never mutated optimistically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemState {
    pub id: ItemId,
    /// Price in minor units
    pub price: u64,
    /// Remaining stock; authoritative only on the ledger
    pub stock: u64,
    /// All buyer addresses in ledger order, duplicates included
    pub buyers: Vec<Address>,
    /// Purchase count of the viewer this snapshot was refreshed for
    pub viewer_purchase_count: u64,
    /// The viewer the count above is scoped to
    pub viewer: Address,
    /// Unix timestamp of the completed refresh
    pub refreshed_at: u64,
}

/// Outcome of a single submitted mutating call; never reused across calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOutcome {
    /// Submitted, confirmation not yet known
    Pending,
    /// The ledger settled the transaction
    Confirmed,
    /// The ledger rejected the transaction; reason carried verbatim
    Rejected(String),
}

impl TransactionOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionOutcome::Confirmed | TransactionOutcome::Rejected(_)
        )
    }
}
