// End-to-end marketplace flows against the in-process mock ledger:
// eligibility guards, double-submission rejection, price authority,
// resale reconciliation and unknown-outcome locking.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use imagestore_client::{
    AccountProvider, Address, CatalogIndex, Eligibility, FixedAccountProvider, LedgerClient,
    LedgerError, MockLedger, PurchasePolicy, RevertReason, SessionContext, WorkflowError,
};

const ALICE: &str = "0xA11CE";
const ADMIN: &str = "0xAdmin";

fn catalog() -> Arc<CatalogIndex> {
    let raw = r#"[
        {"id": 1, "name": "Harbor at Dawn", "picture": "harbor.png", "description": "boats"},
        {"id": 2, "name": "Glass District", "picture": "glass.png", "description": "arcade"},
        {"id": 5, "name": "Signal House", "picture": "signal.png", "description": "lighthouse"}
    ]"#;
    Arc::new(CatalogIndex::from_json_str(raw).unwrap())
}

fn seeded_mock() -> Arc<MockLedger> {
    let mock = Arc::new(MockLedger::new());
    mock.seed_item(1, 500, 4);
    mock.seed_item(2, 750, 4);
    mock.seed_item(5, 1000, 2);
    mock.set_owner(Address::new(ADMIN));
    mock
}

fn session_for(mock: Arc<MockLedger>, account: &str) -> SessionContext {
    SessionContext::new(
        catalog(),
        Arc::new(LedgerClient::with_mock(mock)),
        Box::new(FixedAccountProvider::new(Address::new(account))),
        PurchasePolicy::default(),
    )
}

/// Provider whose account can be swapped mid-session, like an external
/// wallet switching accounts between operations
struct SwitchableProvider {
    current: Arc<Mutex<Address>>,
}

impl AccountProvider for SwitchableProvider {
    fn active_account(&self) -> Option<Address> {
        Some(self.current.lock().unwrap().clone())
    }
}

#[tokio::test]
async fn purchase_moves_buyable_to_limit_reached() {
    let mock = seeded_mock();
    // Two prior purchases on item 5: price 1000, stock 2, viewer count 2
    mock.seed_purchase(5, &Address::new(ALICE), 100);
    mock.seed_purchase(5, &Address::new(ALICE), 200);
    let session = session_for(mock.clone(), ALICE);

    session.refresh_catalog().await.unwrap();
    let view = session.projection(5).await.unwrap();
    assert_eq!(view.price, Some(1000));
    assert_eq!(view.stock, Some(2));
    assert_eq!(view.viewer_purchase_count, 2);
    assert_eq!(view.eligibility, Some(Eligibility::Buyable));

    let receipt = session.purchase(5).await.unwrap();
    assert_eq!(receipt.amount_paid, 1000);
    assert_eq!(receipt.state.stock, 1);
    assert_eq!(receipt.state.viewer_purchase_count, 3);

    // The mandatory reconcile refresh already updated the cached view
    let view = session.projection(5).await.unwrap();
    assert_eq!(view.stock, Some(1));
    assert_eq!(view.eligibility, Some(Eligibility::LimitReached));

    // The guard now short-circuits without submitting
    let before = mock.purchase_submission_count(5);
    match session.purchase(5).await {
        Err(WorkflowError::NotEligible(Eligibility::LimitReached)) => {}
        other => panic!("expected NotEligible(LimitReached), got {:?}", other.err()),
    }
    assert_eq!(mock.purchase_submission_count(5), before);
}

#[tokio::test]
async fn sold_out_wins_over_limit() {
    let mock = seeded_mock();
    mock.seed_item(1, 500, 0);
    for ts in [10, 20, 30] {
        mock.seed_purchase(1, &Address::new(ALICE), ts);
    }
    let session = session_for(mock, ALICE);

    session.refresh_catalog().await.unwrap();
    let view = session.projection(1).await.unwrap();
    assert_eq!(view.viewer_purchase_count, 3);
    assert_eq!(view.eligibility, Some(Eligibility::SoldOut));
}

#[tokio::test(start_paused = true)]
async fn double_submission_yields_busy_and_one_transaction() {
    let mock = seeded_mock();
    // Keep the first purchase in AwaitingConfirmation long enough for the
    // second attempt to arrive
    mock.set_submit_delay(Duration::from_millis(50));
    let session = session_for(mock.clone(), ALICE);
    session.refresh_catalog().await.unwrap();

    let (first, second) = tokio::join!(session.purchase(5), session.purchase(5));

    let results = [first.is_ok(), second.is_ok()];
    assert_eq!(results.iter().filter(|ok| **ok).count(), 1, "exactly one confirms");
    let busy = match (first, second) {
        (Ok(_), Err(e)) | (Err(e), Ok(_)) => e,
        other => panic!("expected one success and one Busy, got {:?}", other),
    };
    assert!(matches!(busy, WorkflowError::Busy));

    // Exactly one transaction reached the ledger
    assert_eq!(mock.purchase_submission_count(5), 1);
}

#[tokio::test]
async fn non_owner_price_update_surfaces_revert_verbatim() {
    let mock = seeded_mock();
    let session = session_for(mock, ALICE);
    session.refresh_catalog().await.unwrap();

    match session.update_price(2, 9000).await {
        Err(WorkflowError::Reverted(RevertReason::NotOwner)) => {}
        other => panic!("expected Reverted(NotOwner), got {:?}", other.err()),
    }

    // Cached price unchanged
    let view = session.projection(2).await.unwrap();
    assert_eq!(view.price, Some(750));
}

#[tokio::test]
async fn owner_price_update_overwrites_cached_price_directly() {
    let mock = seeded_mock();
    // Owner match is case-insensitive
    let session = session_for(mock.clone(), "0xADMIN");
    session.refresh_catalog().await.unwrap();

    let receipt = session.update_price(2, 9000).await.unwrap();
    assert_eq!(receipt.new_price, 9000);

    let view = session.projection(2).await.unwrap();
    assert_eq!(view.price, Some(9000));
}

#[tokio::test]
async fn zero_price_update_is_rejected_client_side() {
    let mock = seeded_mock();
    let session = session_for(mock, ADMIN);
    session.refresh_catalog().await.unwrap();

    assert!(matches!(
        session.update_price(2, 0).await,
        Err(WorkflowError::InvalidPrice)
    ));
}

#[tokio::test]
async fn resale_restores_stock_and_recomputes_owned_view() {
    let mock = seeded_mock();
    let session = session_for(mock, ALICE);
    session.refresh_catalog().await.unwrap();

    session.purchase(1).await.unwrap();
    session.purchase(1).await.unwrap();

    let owned = session.owned_items().unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].meta.id, 1);
    assert_eq!(owned[0].owned_count, 2);

    let receipt = session.resell(1).await.unwrap();
    assert_eq!(receipt.state.viewer_purchase_count, 1);
    assert_eq!(receipt.state.stock, 4);

    let owned = session.owned_items().unwrap();
    assert_eq!(owned[0].owned_count, 1);

    // History keeps both purchase records; entitlement does not erase it
    let view = session.projection(1).await.unwrap();
    assert_eq!(view.history.len(), 2);
}

#[tokio::test]
async fn resale_without_holding_is_guarded_client_side() {
    let mock = seeded_mock();
    let session = session_for(mock, ALICE);
    session.refresh_catalog().await.unwrap();

    assert!(matches!(
        session.resell(2).await,
        Err(WorkflowError::NothingToResell(2))
    ));
}

#[tokio::test]
async fn timeout_locks_item_until_a_fresh_read() {
    let mock = seeded_mock();
    mock.fail_next_submit(LedgerError::Timeout);
    let session = session_for(mock.clone(), ALICE);
    session.refresh_catalog().await.unwrap();

    match session.purchase(5).await {
        Err(WorkflowError::Ledger(LedgerError::Timeout)) => {}
        other => panic!("expected Timeout, got {:?}", other.err()),
    }
    assert!(session.has_unresolved_outcome(5));

    // Further mutations are refused until a re-read resolves the outcome
    assert!(matches!(
        session.purchase(5).await,
        Err(WorkflowError::UnresolvedOutcome(5))
    ));
    assert!(matches!(
        session.resell(5).await,
        Err(WorkflowError::UnresolvedOutcome(5))
    ));

    session.refresh_item(5).await.unwrap();
    assert!(!session.has_unresolved_outcome(5));
    session.purchase(5).await.unwrap();
}

#[tokio::test]
async fn history_is_viewer_scoped_and_ascending_across_cases() {
    let mock = seeded_mock();
    mock.seed_purchase(1, &Address::new("0xA11CE"), 300);
    mock.seed_purchase(1, &Address::new("0xBob"), 150);
    mock.seed_purchase(1, &Address::new("0xa11ce"), 100);
    let session = session_for(mock, "0xA11Ce");
    session.refresh_catalog().await.unwrap();

    let view = session.projection(1).await.unwrap();
    assert_eq!(view.history.len(), 2);
    // Ascending timestamps regardless of record order
    assert!(view.history[0] < view.history[1]);
    // The buyers roll-up still lists everyone
    assert_eq!(view.buyers.len(), 3);
}

#[tokio::test]
async fn batch_refresh_survives_a_failing_item() {
    let mock = seeded_mock();
    mock.fail_reads_for(2);
    let session = session_for(mock.clone(), ALICE);

    let mut refreshed = session.refresh_catalog().await.unwrap();
    refreshed.sort_unstable();
    assert_eq!(refreshed, vec![1, 5]);

    assert!(session.projection(1).await.unwrap().price.is_some());
    assert!(session.projection(2).await.unwrap().price.is_none());

    // Once the item recovers, the next refresh fills the slot
    mock.restore_reads_for(2);
    session.refresh_catalog().await.unwrap();
    assert_eq!(session.projection(2).await.unwrap().price, Some(750));
}

#[tokio::test]
async fn account_switch_rescopes_the_owned_view() {
    let mock = seeded_mock();
    let current = Arc::new(Mutex::new(Address::new(ALICE)));
    let session = SessionContext::new(
        catalog(),
        Arc::new(LedgerClient::with_mock(mock)),
        Box::new(SwitchableProvider {
            current: current.clone(),
        }),
        PurchasePolicy::default(),
    );

    session.refresh_catalog().await.unwrap();
    session.purchase(1).await.unwrap();
    assert_eq!(session.owned_items().unwrap().len(), 1);

    // The wallet switches accounts; cached snapshots are scoped to the
    // previous viewer and must not leak into the new one's view
    *current.lock().unwrap() = Address::new("0xB0B");
    assert!(session.owned_items().unwrap().is_empty());

    // A refresh under the new viewer rebuilds the scoped view
    session.refresh_catalog().await.unwrap();
    assert!(session.owned_items().unwrap().is_empty());
    let view = session.projection(1).await.unwrap();
    assert_eq!(view.viewer_purchase_count, 0);
}
