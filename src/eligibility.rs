//! Eligibility Engine
//!
//! Pure derivation of the purchase affordance for an (item, viewer) pair.
//! Consulted to render the affordance and re-consulted, mandatorily,
//! against the latest snapshot immediately before any purchase submission.

use serde::{Deserialize, Serialize};

use crate::models::ItemState;

/// Per-account purchase limit applied by default
pub const DEFAULT_PURCHASE_LIMIT: u64 = 3;

/// Purchase affordance for a cached snapshot, viewer-scoped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    Buyable,
    LimitReached,
    SoldOut,
}

impl Eligibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Eligibility::Buyable => "buyable",
            Eligibility::LimitReached => "limit reached",
            Eligibility::SoldOut => "sold out",
        }
    }

    pub fn is_buyable(&self) -> bool {
        matches!(self, Eligibility::Buyable)
    }
}

impl std::fmt::Display for Eligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client-side purchase policy
#[derive(Debug, Clone, Copy)]
pub struct PurchasePolicy {
    /// Maximum confirmed purchases per account per item
    pub purchase_limit: u64,
}

impl Default for PurchasePolicy {
    fn default() -> Self {
        PurchasePolicy {
            purchase_limit: DEFAULT_PURCHASE_LIMIT,
        }
    }
}

/// Derive the affordance. Sold-out wins over the limit when both hold.
pub fn eligibility(state: &ItemState, policy: &PurchasePolicy) -> Eligibility {
    if state.stock == 0 {
        Eligibility::SoldOut
    } else if state.viewer_purchase_count >= policy.purchase_limit {
        Eligibility::LimitReached
    } else {
        Eligibility::Buyable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Address;

    fn state(stock: u64, count: u64) -> ItemState {
        ItemState {
            id: 1,
            price: 1000,
            stock,
            buyers: Vec::new(),
            viewer_purchase_count: count,
            viewer: Address::new("0xviewer"),
            refreshed_at: 0,
        }
    }

    #[test]
    fn sold_out_takes_precedence_over_limit() {
        let policy = PurchasePolicy::default();
        // Zero stock is SoldOut regardless of purchase count
        for count in [0, 2, 3, 100] {
            assert_eq!(eligibility(&state(0, count), &policy), Eligibility::SoldOut);
        }
    }

    #[test]
    fn limit_boundary() {
        let policy = PurchasePolicy::default();
        assert_eq!(eligibility(&state(5, 2), &policy), Eligibility::Buyable);
        assert_eq!(eligibility(&state(5, 3), &policy), Eligibility::LimitReached);
        assert_eq!(eligibility(&state(5, 4), &policy), Eligibility::LimitReached);
    }

    #[test]
    fn limit_is_configurable() {
        let policy = PurchasePolicy { purchase_limit: 1 };
        assert_eq!(eligibility(&state(5, 0), &policy), Eligibility::Buyable);
        assert_eq!(eligibility(&state(5, 1), &policy), Eligibility::LimitReached);
    }
}
