//! Mutating Workflows
//!
//! Purchase, resale and price-update orchestration: guard, submit, await,
//! reconcile. Shared here: the error taxonomy, the phase ladder, the
//! per-(item, viewer) in-flight registry that rejects double submission
//! with Busy, and the unknown-outcome book that locks an item after an
//! ambiguous submit until a fresh read resolves it.

pub mod price_update;
pub mod purchase;
pub mod resell;

pub use price_update::{PriceUpdateReceipt, PriceUpdateWorkflow};
pub use purchase::{PurchaseReceipt, PurchaseWorkflow};
pub use resell::{ResaleReceipt, ResellWorkflow};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::cache::ItemStateCache;
use crate::eligibility::{Eligibility, PurchasePolicy};
use crate::ledger::{LedgerClient, LedgerError, RevertReason};
use crate::models::{Address, ItemId};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug)]
pub enum WorkflowError {
    /// No active account reported by the provider
    NoViewer,
    /// Identifier has no catalog entry
    UnknownItem(ItemId),
    /// Client-side guard short-circuit; no submission occurred
    NotEligible(Eligibility),
    /// Resale guard: the viewer holds no entitlement for the item
    NothingToResell(ItemId),
    /// A workflow for this (item, viewer) is already in flight
    Busy,
    /// New price failed client-side validation
    InvalidPrice,
    /// An earlier submission's outcome is unknown; the item is locked
    /// until a fresh read clears it
    UnresolvedOutcome(ItemId),
    /// The ledger rejected the transaction; reason carried verbatim
    Reverted(RevertReason),
    /// Transport-level failure talking to the ledger
    Ledger(LedgerError),
    /// The transaction settled but the mandatory follow-up refresh failed;
    /// the stale snapshot has been dropped
    ReconcileFailed(LedgerError),
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowError::NoViewer => write!(f, "no active account"),
            WorkflowError::UnknownItem(id) => write!(f, "unknown item {}", id),
            WorkflowError::NotEligible(e) => write!(f, "not eligible: {}", e),
            WorkflowError::NothingToResell(id) => {
                write!(f, "no holding of item {} to resell", id)
            }
            WorkflowError::Busy => write!(f, "a workflow for this item is already in flight"),
            WorkflowError::InvalidPrice => write!(f, "new price must be a positive amount"),
            WorkflowError::UnresolvedOutcome(id) => write!(
                f,
                "item {} has a submission with an unknown outcome; refresh before retrying",
                id
            ),
            WorkflowError::Reverted(reason) => write!(f, "ledger reverted: {}", reason),
            WorkflowError::Ledger(e) => write!(f, "{}", e),
            WorkflowError::ReconcileFailed(e) => {
                write!(f, "transaction confirmed but state refresh failed: {}", e)
            }
        }
    }
}

impl std::error::Error for WorkflowError {}

impl From<LedgerError> for WorkflowError {
    fn from(e: LedgerError) -> Self {
        WorkflowError::Ledger(e)
    }
}

// ============================================================================
// PHASES
// ============================================================================

/// Ladder every mutating workflow climbs; logged at each transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPhase {
    Idle,
    Guarding,
    Submitting,
    AwaitingConfirmation,
    Reconciling,
    Failed,
}

impl WorkflowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Idle => "idle",
            WorkflowPhase::Guarding => "guarding",
            WorkflowPhase::Submitting => "submitting",
            WorkflowPhase::AwaitingConfirmation => "awaiting_confirmation",
            WorkflowPhase::Reconciling => "reconciling",
            WorkflowPhase::Failed => "failed",
        }
    }
}

// ============================================================================
// IN-FLIGHT REGISTRY
// ============================================================================

/// At most one mutating workflow per (item, viewer) at a time. A second
/// attempt while one is in flight gets Busy, never queued, never dropped
/// silently.
#[derive(Default)]
pub struct InFlightRegistry {
    slots: Mutex<HashSet<(ItemId, String)>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the (item, viewer) slot for the duration of a workflow.
    /// The permit releases the slot when dropped, on every exit path.
    pub fn try_begin(
        self: &Arc<Self>,
        id: ItemId,
        viewer: &Address,
    ) -> Result<FlightPermit, WorkflowError> {
        let key = (id, viewer.canonical());
        let mut slots = self.slots.lock().unwrap();
        if !slots.insert(key.clone()) {
            return Err(WorkflowError::Busy);
        }
        Ok(FlightPermit {
            registry: self.clone(),
            key,
        })
    }

    fn release(&self, key: &(ItemId, String)) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(key);
        }
    }
}

pub struct FlightPermit {
    registry: Arc<InFlightRegistry>,
    key: (ItemId, String),
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

// ============================================================================
// UNKNOWN OUTCOMES
// ============================================================================

/// Items whose last submission timed out or stayed pending. Further
/// mutations on such an item are refused until a confirmed re-read clears
/// it; an ambiguous submit is never assumed failed and retried blindly.
#[derive(Default)]
pub struct PendingOutcomes {
    unresolved: Mutex<HashSet<ItemId>>,
}

impl PendingOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unknown(&self, id: ItemId) {
        warn!(
            item = id,
            "submission outcome unknown; item locked until a fresh read"
        );
        self.unresolved.lock().unwrap().insert(id);
    }

    pub fn is_unknown(&self, id: ItemId) -> bool {
        self.unresolved.lock().unwrap().contains(&id)
    }

    /// Called after a successful read re-established the item's state
    pub fn clear(&self, id: ItemId) {
        self.unresolved.lock().unwrap().remove(&id);
    }
}

// ============================================================================
// SHARED DEPENDENCIES
// ============================================================================

/// Collaborators handed to each workflow run
pub struct WorkflowDeps<'a> {
    pub ledger: &'a LedgerClient,
    pub cache: &'a Mutex<ItemStateCache>,
    pub registry: &'a Arc<InFlightRegistry>,
    pub pending: &'a PendingOutcomes,
    pub policy: &'a PurchasePolicy,
}
