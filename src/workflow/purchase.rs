//! Purchase workflow: Idle -> Guarding -> Submitting ->
//! AwaitingConfirmation -> {Reconciling, Failed}

use tracing::{debug, info};
use uuid::Uuid;

use super::{WorkflowDeps, WorkflowError, WorkflowPhase};
use crate::cache::read_item_state;
use crate::eligibility::eligibility;
use crate::ledger::{LedgerError, RevertReason};
use crate::models::{Address, ItemId, ItemState, TransactionOutcome};

/// Returned only after the transaction confirmed AND the follow-up cache
/// refresh completed; submission success alone never reaches the caller.
#[derive(Debug)]
pub struct PurchaseReceipt {
    pub item_id: ItemId,
    pub submission_id: Uuid,
    /// Minor units actually transferred; equals the guarded snapshot price
    pub amount_paid: u64,
    /// Post-reconcile snapshot
    pub state: ItemState,
}

pub struct PurchaseWorkflow {
    item_id: ItemId,
    viewer: Address,
    submission_id: Uuid,
    phase: WorkflowPhase,
}

impl PurchaseWorkflow {
    pub fn new(item_id: ItemId, viewer: Address) -> Self {
        PurchaseWorkflow {
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
            "purchase transition"
        );
        self.phase = next;
    }

    pub async fn run(mut self, deps: &WorkflowDeps<'_>) -> Result<PurchaseReceipt, WorkflowError> {
        if deps.pending.is_unknown(self.item_id) {
            return Err(WorkflowError::UnresolvedOutcome(self.item_id));
        }
        let _permit = deps.registry.try_begin(self.item_id, &self.viewer)?;

        // Entry requires a fresh snapshot: guard against what the ledger
        // reports now, not a value captured earlier in the session.
        let state = match read_item_state(deps.ledger, self.item_id, &self.viewer).await {
            Ok(state) => state,
            Err(e) => {
                self.advance(WorkflowPhase::Failed);
                return Err(WorkflowError::Ledger(e));
            }
        };
        deps.cache.lock().unwrap().insert(state.clone());

        self.advance(WorkflowPhase::Guarding);
        let verdict = eligibility(&state, deps.policy);
        if !verdict.is_buyable() {
            self.advance(WorkflowPhase::Failed);
            return Err(WorkflowError::NotEligible(verdict));
        }

        // The transferred amount is the guarded snapshot's price, never a
        // caller-supplied value.
        let amount = state.price;

        self.advance(WorkflowPhase::Submitting);
        let viewer = self.viewer.clone();
        let submitted = deps.ledger.submit_purchase(self.item_id, &viewer, amount);
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
                // Submitted but unconfirmed: same lock as a timeout
                deps.pending.mark_unknown(self.item_id);
                self.advance(WorkflowPhase::Failed);
                return Err(WorkflowError::UnresolvedOutcome(self.item_id));
            }
            TransactionOutcome::Rejected(reason) => {
                self.advance(WorkflowPhase::Failed);
                return Err(WorkflowError::Reverted(RevertReason::from_code(&reason)));
            }
        }

        self.advance(WorkflowPhase::Reconciling);
        let refreshed = match read_item_state(deps.ledger, self.item_id, &self.viewer).await {
            Ok(state) => state,
            Err(e) => {
                // The purchase settled; only the refresh failed. Drop the
                // pre-purchase snapshot so nothing is derived from it.
                deps.cache.lock().unwrap().invalidate(self.item_id);
                return Err(WorkflowError::ReconcileFailed(e));
            }
        };
        deps.cache.lock().unwrap().insert(refreshed.clone());

        info!(
            item = self.item_id,
            submission = %self.submission_id,
            amount,
            stock = refreshed.stock,
            count = refreshed.viewer_purchase_count,
            "purchase confirmed and reconciled"
        );

        Ok(PurchaseReceipt {
            item_id: self.item_id,
            submission_id: self.submission_id,
            amount_paid: amount,
            state: refreshed,
        })
    }
}
