//! Price-update workflow (operator action).
//!
//! Authorization lives on the ledger, not here: a NotOwner revert is an
//! expected, user-visible outcome, surfaced distinctly so the boundary can
//! ask "are you the owner?" instead of showing a generic failure.

use tracing::{debug, info};
use uuid::Uuid;

use super::{WorkflowDeps, WorkflowError, WorkflowPhase};
use crate::ledger::{LedgerError, RevertReason};
use crate::models::{Address, ItemId, TransactionOutcome};

#[derive(Debug)]
pub struct PriceUpdateReceipt {
    pub item_id: ItemId,
    pub submission_id: Uuid,
    pub new_price: u64,
}

pub struct PriceUpdateWorkflow {
    item_id: ItemId,
    new_price: u64,
    account: Address,
    submission_id: Uuid,
    phase: WorkflowPhase,
}

impl PriceUpdateWorkflow {
    pub fn new(item_id: ItemId, new_price: u64, account: Address) -> Self {
        PriceUpdateWorkflow {
            item_id,
            new_price,
            account,
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
            "price update transition"
        );
        self.phase = next;
    }

    pub async fn run(
        mut self,
        deps: &WorkflowDeps<'_>,
    ) -> Result<PriceUpdateReceipt, WorkflowError> {
        self.advance(WorkflowPhase::Guarding);
        if self.new_price == 0 {
            self.advance(WorkflowPhase::Failed);
            return Err(WorkflowError::InvalidPrice);
        }
        if deps.pending.is_unknown(self.item_id) {
            self.advance(WorkflowPhase::Failed);
            return Err(WorkflowError::UnresolvedOutcome(self.item_id));
        }
        let _permit = deps.registry.try_begin(self.item_id, &self.account)?;

        self.advance(WorkflowPhase::Submitting);
        let account = self.account.clone();
        let submitted = deps
            .ledger
            .submit_price_update(self.item_id, self.new_price, &account);
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
                // Cached price stays untouched on any rejection
                self.advance(WorkflowPhase::Failed);
                return Err(WorkflowError::Reverted(RevertReason::from_code(&reason)));
            }
        }

        // Price is single-valued and was just written; overwrite the cached
        // value directly instead of a full refresh.
        self.advance(WorkflowPhase::Reconciling);
        deps.cache
            .lock()
            .unwrap()
            .put_price(self.item_id, self.new_price);

        info!(
            item = self.item_id,
            submission = %self.submission_id,
            new_price = self.new_price,
            "price update confirmed"
        );

        Ok(PriceUpdateReceipt {
            item_id: self.item_id,
            submission_id: self.submission_id,
            new_price: self.new_price,
        })
    }
}
