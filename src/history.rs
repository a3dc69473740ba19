//! History Projector
//!
//! Reconstructs a viewer-scoped chronological purchase history from the
//! ledger's full record set. Addresses are matched case-insensitively
//! since the ledger does not normalize casing.

use chrono::{DateTime, Utc};

use crate::models::{Address, PurchaseRecord};

/// Render a unix timestamp as a human-readable UTC instant
pub fn format_instant(timestamp: u64) -> String {
    match DateTime::<Utc>::from_timestamp(timestamp as i64, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        // Out-of-range timestamp; keep the raw value visible
        None => format!("t+{}", timestamp),
    }
}

/// Viewer-scoped history, ascending by timestamp. No matching records
/// yields an empty sequence, never an error.
pub fn project(records: &[PurchaseRecord], viewer: &Address) -> Vec<String> {
    let mut timestamps: Vec<u64> = records
        .iter()
        .filter(|r| r.buyer.matches(viewer))
        .map(|r| r.timestamp)
        .collect();
    timestamps.sort_unstable();
    timestamps.into_iter().map(format_instant).collect()
}
