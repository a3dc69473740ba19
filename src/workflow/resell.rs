//! Resale workflow.
//!
//! A confirmed resale changes stock, buyers and the viewer's holding all at
//! once, so reconciliation drops the whole cached snapshot and re-reads it.
//! The owned-items view is derived on demand from the cache, so it reflects
//! the resale as soon as the refreshed snapshot lands.

use tracing::{debug, info};
use uuid::Uuid;

use super::{WorkflowDeps, WorkflowError, WorkflowPhase};
use crate::cache::read_item_state;
use crate::ledger::{LedgerError, RevertReason};
use crate::models::{Address, ItemId, ItemState, TransactionOutcome};

#[derive(Debug)]
pub struct ResaleReceipt {
    pub item_id: ItemId,
    pub submission_id: Uuid,
    /// Post-reconcile snapshot
    pub state: ItemState,
}

pub struct ResellWorkflow {
    item_id: ItemId,
    viewer: Address,
    submission_id: Uuid,
    phase: WorkflowPhase,
}

impl ResellWorkflow {
    pub fn new(item_id: ItemId, viewer: Address) -> Self {
        ResellWorkflow {
            item_id,
            viewer,
            submission_id: Uuid::new_v4(),
            phase: WorkflowPhase::Idle,
        }
    }

    fn advance(&mut self, next: WorkflowPhase) {
        debug!(
            item = self.item_id,
            submission = %self.submission_id,
            from = self.phase.as_str(),
            to = next.as_str(),
            "resale transition"
        );
        self.phase = next;
    }

    pub async fn run(mut self, deps: &WorkflowDeps<'_>) -> Result<ResaleReceipt, WorkflowError> {
        if deps.pending.is_unknown(self.item_id) {
            return Err(WorkflowError::UnresolvedOutcome(self.item_id));
        }
        let _permit = deps.registry.try_begin(self.item_id, &self.viewer)?;

        let state = match read_item_state(deps.ledger, self.item_id, &self.viewer).await {
            Ok(state) => state,
            Err(e) => {
                self.advance(WorkflowPhase::Failed);
                return Err(WorkflowError::Ledger(e));
            }
        };
        deps.cache.lock().unwrap().insert(state.clone());

        // Client-side guard only; the ledger's holding check is
        // authoritative and may still revert.
        self.advance(WorkflowPhase::Guarding);
        if state.viewer_purchase_count == 0 {
            self.advance(WorkflowPhase::Failed);
            return Err(WorkflowError::NothingToResell(self.item_id));
        }

        self.advance(WorkflowPhase::Submitting);
        let viewer = self.viewer.clone();
        let submitted = deps.ledger.submit_resale(self.item_id, &viewer);
        self.advance(WorkflowPhase::AwaitingConfirmation);
        let outcome = match submitted.await {
            Ok(outcome) => outcome,
            Err(LedgerError::Timeout) => {
                deps.pending.mark_unknown(self.item_id);
                self.advance(WorkflowPhase::Failed);
                return Err(WorkflowError::Ledger(LedgerError::Timeout));
            }
            Err(e) => {
                self.advance(WorkflowPhase::Failed);
                return Err(WorkflowError::Ledger(e));
            }
        };

        match outcome {
            TransactionOutcome::Confirmed => {}
            TransactionOutcome::Pending => {
                deps.pending.mark_unknown(self.item_id);
                self.advance(WorkflowPhase::Failed);
                return Err(WorkflowError::UnresolvedOutcome(self.item_id));
            }
            TransactionOutcome::Rejected(reason) => {
                self.advance(WorkflowPhase::Failed);
                return Err(WorkflowError::Reverted(RevertReason::from_code(&reason)));
            }
        }

        // Stock, buyers and the holding all changed; the stale snapshot is
        // dropped before anything can read it.
        self.advance(WorkflowPhase::Reconciling);
        deps.cache.lock().unwrap().invalidate(self.item_id);

        let refreshed = match read_item_state(deps.ledger, self.item_id, &self.viewer).await {
            Ok(state) => state,
            Err(e) => return Err(WorkflowError::ReconcileFailed(e)),
        };
        deps.cache.lock().unwrap().insert(refreshed.clone());

        info!(
            item = self.item_id,
            submission = %self.submission_id,
            stock = refreshed.stock,
            count = refreshed.viewer_purchase_count,
            "resale confirmed and reconciled"
        );

        Ok(ResaleReceipt {
            item_id: self.item_id,
            submission_id: self.submission_id,
            state: refreshed,
        })
    }
}
