//! Item State Cache
//!
//! Per-item cached ledger snapshots, refreshed by concurrent fan-out reads.
//! Responses land in the slot for their own identifier no matter what order
//! they arrive in; a batch issued for [3, 1, 2] that completes as [2, 3, 1]
//! still writes each snapshot under its own id. Overlapping refreshes of
//! the same id resolve last-write-wins by completion time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::warn;

use crate::ledger::{LedgerClient, LedgerError};
use crate::models::{now, Address, ItemId, ItemState};

/// Id-keyed snapshot store. Storage only; the fan-out lives in
/// `refresh_many` so the lock is never held across an await.
#[derive(Default)]
pub struct ItemStateCache {
    slots: HashMap<ItemId, ItemState>,
}

impl ItemStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ItemId) -> Option<&ItemState> {
        self.slots.get(&id)
    }

    /// Merge a completed snapshot into the slot for its own id
    pub fn insert(&mut self, state: ItemState) {
        self.slots.insert(state.id, state);
    }

    /// Narrow price overwrite after a confirmed price update; the rest of
    /// the snapshot is untouched since nothing else changed.
    pub fn put_price(&mut self, id: ItemId, price: u64) {
        if let Some(state) = self.slots.get_mut(&id) {
            state.price = price;
            state.refreshed_at = now();
        }
    }

    /// Drop a snapshot entirely (resale reconciliation)
    pub fn invalidate(&mut self, id: ItemId) {
        self.slots.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Read one item's full snapshot, fanning out the per-item reads
pub async fn read_item_state(
    ledger: &LedgerClient,
    id: ItemId,
    viewer: &Address,
) -> Result<ItemState, LedgerError> {
    let (price, stock, count, buyers) = tokio::join!(
        ledger.read_price(id),
        ledger.read_stock(id),
        ledger.read_purchase_count(id, viewer),
        ledger.read_buyers(id),
    );

    Ok(ItemState {
        id,
        price: price?,
        stock: stock?,
        buyers: buyers?,
        viewer_purchase_count: count?,
        viewer: viewer.clone(),
        refreshed_at: now(),
    })
}

/// Refresh a single id and merge the result
pub async fn refresh_one(
    cache: &Mutex<ItemStateCache>,
    ledger: &LedgerClient,
    id: ItemId,
    viewer: &Address,
) -> Result<(), LedgerError> {
    let state = read_item_state(ledger, id, viewer).await?;
    cache.lock().unwrap().insert(state);
    Ok(())
}

/// Fan-out refresh for a set of ids.
///
/// One task per id; each completed snapshot is merged under its own id as
/// it arrives. A failed read for one id logs a warning and leaves that slot
/// untouched without aborting the rest of the batch. Returns the ids that
/// refreshed successfully.
pub async fn refresh_many(
    cache: &Mutex<ItemStateCache>,
    ledger: &Arc<LedgerClient>,
    ids: &[ItemId],
    viewer: &Address,
) -> Vec<ItemId> {
    let mut join = JoinSet::new();
    for &id in ids {
        let ledger = ledger.clone();
        let viewer = viewer.clone();
        join.spawn(async move { (id, read_item_state(&ledger, id, &viewer).await) });
    }

    let mut refreshed = Vec::with_capacity(ids.len());
    while let Some(joined) = join.join_next().await {
        match joined {
            Ok((id, Ok(state))) => {
                cache.lock().unwrap().insert(state);
                refreshed.push(id);
            }
            Ok((id, Err(e))) => {
                warn!(item = id, error = %e, "item refresh failed; keeping previous snapshot");
            }
            Err(e) => {
                warn!(error = %e, "item refresh task aborted");
            }
        }
    }
    refreshed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MockLedger;
    use std::time::Duration;

    fn seeded_client() -> (Arc<MockLedger>, Arc<LedgerClient>) {
        let mock = Arc::new(MockLedger::new());
        mock.seed_item(1, 100, 11);
        mock.seed_item(2, 200, 22);
        mock.seed_item(3, 300, 33);
        let client = Arc::new(LedgerClient::with_mock(mock.clone()));
        (mock, client)
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_completion_correlates_by_id() {
        let (mock, client) = seeded_client();
        // Issue for [3, 1, 2]; delays force completion order [2, 3, 1]
        mock.set_read_delay(3, Duration::from_millis(20));
        mock.set_read_delay(1, Duration::from_millis(30));
        mock.set_read_delay(2, Duration::from_millis(10));

        let cache = Mutex::new(ItemStateCache::new());
        let viewer = Address::new("0xviewer");
        let refreshed = refresh_many(&cache, &client, &[3, 1, 2], &viewer).await;
        assert_eq!(refreshed.len(), 3);

        let cache = cache.lock().unwrap();
        assert_eq!(cache.get(1).unwrap().stock, 11);
        assert_eq!(cache.get(2).unwrap().stock, 22);
        assert_eq!(cache.get(3).unwrap().stock, 33);
        assert_eq!(cache.get(1).unwrap().price, 100);
        assert_eq!(cache.get(2).unwrap().price, 200);
        assert_eq!(cache.get(3).unwrap().price, 300);
    }

    #[tokio::test]
    async fn one_failing_id_does_not_abort_the_batch() {
        let (mock, client) = seeded_client();
        mock.fail_reads_for(2);

        let cache = Mutex::new(ItemStateCache::new());
        let viewer = Address::new("0xviewer");
        let mut refreshed = refresh_many(&cache, &client, &[1, 2, 3], &viewer).await;
        refreshed.sort_unstable();
        assert_eq!(refreshed, vec![1, 3]);

        let cache = cache.lock().unwrap();
        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_none());
        assert!(cache.get(3).is_some());
    }

    #[tokio::test]
    async fn put_price_is_a_narrow_write() {
        let (_, client) = seeded_client();
        let cache = Mutex::new(ItemStateCache::new());
        let viewer = Address::new("0xviewer");
        refresh_one(&cache, &client, 1, &viewer).await.unwrap();

        let mut locked = cache.lock().unwrap();
        locked.put_price(1, 999);
        let state = locked.get(1).unwrap();
        assert_eq!(state.price, 999);
        assert_eq!(state.stock, 11);
    }

    #[tokio::test]
    async fn invalidate_drops_the_slot() {
        let (_, client) = seeded_client();
        let cache = Mutex::new(ItemStateCache::new());
        let viewer = Address::new("0xviewer");
        refresh_one(&cache, &client, 1, &viewer).await.unwrap();

        let mut locked = cache.lock().unwrap();
        assert!(locked.get(1).is_some());
        locked.invalidate(1);
        assert!(locked.get(1).is_none());
    }
}
