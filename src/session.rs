//! Session Context
//!
//! Explicit per-viewer session object owning the catalog handle, ledger
//! client, state cache, in-flight registry and account provider. Replaces
//! any notion of module-wide mutable session state: the active account is
//! re-resolved from the provider for every operation, since the external
//! wallet may switch accounts between calls.

use std::sync::{Arc, Mutex};
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{self, ItemStateCache};
use crate::catalog::{CatalogIndex, ItemMeta};
use crate::eligibility::{eligibility, Eligibility, PurchasePolicy};
use crate::history;
use crate::ledger::LedgerClient;
use crate::models::{Address, ItemId};
use crate::workflow::{
    InFlightRegistry, PendingOutcomes, PriceUpdateReceipt, PriceUpdateWorkflow, PurchaseReceipt,
    PurchaseWorkflow, ResaleReceipt, ResellWorkflow, WorkflowDeps, WorkflowError,
};

// ============================================================================
// ACCOUNT PROVIDER
// ============================================================================

/// Source of the active account address. Implementations are queried fresh
/// for every operation; results are never cached across operations.
pub trait AccountProvider: Send + Sync {
    /// The currently active account, or None when nothing is connected
    fn active_account(&self) -> Option<Address>;
}

/// Fixed account, for tests and CLI flags
pub struct FixedAccountProvider {
    account: Address,
}

impl FixedAccountProvider {
    pub fn new(account: Address) -> Self {
        FixedAccountProvider { account }
    }
}

impl AccountProvider for FixedAccountProvider {
    fn active_account(&self) -> Option<Address> {
        Some(self.account.clone())
    }
}

/// Reads the account from an environment variable on every call, so an
/// external account switch is picked up by the next operation
pub struct EnvAccountProvider {
    var: String,
}

impl EnvAccountProvider {
    pub fn new() -> Self {
        Self::from_var("MARKET_ACCOUNT")
    }

    pub fn from_var(var: impl Into<String>) -> Self {
        EnvAccountProvider { var: var.into() }
    }
}

impl Default for EnvAccountProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountProvider for EnvAccountProvider {
    fn active_account(&self) -> Option<Address> {
        std::env::var(&self.var)
            .ok()
            .filter(|raw| !raw.is_empty())
            .map(Address::new)
    }
}

// ============================================================================
// RENDERING BOUNDARY
// ============================================================================

/// Read-only per-item view handed to the rendering layer. The core never
/// reaches into rendering state; this is the whole surface.
#[derive(Debug, Clone, Serialize)]
pub struct ItemProjection {
    pub id: ItemId,
    pub name: String,
    pub picture: String,
    pub description: String,
    /// None until the first completed refresh
    pub price: Option<u64>,
    pub stock: Option<u64>,
    /// None without a snapshot scoped to the current viewer
    pub eligibility: Option<Eligibility>,
    pub viewer_purchase_count: u64,
    pub buyers: Vec<Address>,
    pub owned_count: u64,
    pub history: Vec<String>,
}

/// One entry of the owned-items (collection) view
#[derive(Debug, Clone, Serialize)]
pub struct OwnedItem {
    pub meta: ItemMeta,
    pub owned_count: u64,
}

// ============================================================================
// SESSION CONTEXT
// ============================================================================

pub struct SessionContext {
    catalog: Arc<CatalogIndex>,
    ledger: Arc<LedgerClient>,
    cache: Mutex<ItemStateCache>,
    registry: Arc<InFlightRegistry>,
    pending: PendingOutcomes,
    provider: Box<dyn AccountProvider>,
    policy: PurchasePolicy,
}

impl SessionContext {
    pub fn new(
        catalog: Arc<CatalogIndex>,
        ledger: Arc<LedgerClient>,
        provider: Box<dyn AccountProvider>,
        policy: PurchasePolicy,
    ) -> Self {
        info!(
            items = catalog.len(),
            mock = ledger.is_mock_mode(),
            limit = policy.purchase_limit,
            "session initialized"
        );
        SessionContext {
            catalog,
            ledger,
            cache: Mutex::new(ItemStateCache::new()),
            registry: Arc::new(InFlightRegistry::new()),
            pending: PendingOutcomes::new(),
            provider,
            policy,
        }
    }

    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    /// Active account, re-resolved from the provider right now
    pub fn resolve_viewer(&self) -> Result<Address, WorkflowError> {
        self.provider.active_account().ok_or(WorkflowError::NoViewer)
    }

    /// Whether an earlier submission on this item is still unresolved
    pub fn has_unresolved_outcome(&self, id: ItemId) -> bool {
        self.pending.is_unknown(id)
    }

    fn deps(&self) -> WorkflowDeps<'_> {
        WorkflowDeps {
            ledger: &self.ledger,
            cache: &self.cache,
            registry: &self.registry,
            pending: &self.pending,
            policy: &self.policy,
        }
    }

    // ========================================================================
    // REFRESH
    // ========================================================================

    /// Fan-out refresh of every catalog item for the current viewer.
    /// Returns the ids that refreshed; failed ids keep their old snapshot.
    pub async fn refresh_catalog(&self) -> Result<Vec<ItemId>, WorkflowError> {
        let viewer = self.resolve_viewer()?;
        let ids = self.catalog.ids();
        let refreshed = cache::refresh_many(&self.cache, &self.ledger, &ids, &viewer).await;
        for &id in &refreshed {
            self.pending.clear(id);
        }
        info!(
            requested = ids.len(),
            refreshed = refreshed.len(),
            "catalog refresh complete"
        );
        Ok(refreshed)
    }

    /// Refresh a single item; a completed read also clears an unresolved
    /// submission outcome for it.
    pub async fn refresh_item(&self, id: ItemId) -> Result<(), WorkflowError> {
        if !self.catalog.contains(id) {
            return Err(WorkflowError::UnknownItem(id));
        }
        let viewer = self.resolve_viewer()?;
        cache::refresh_one(&self.cache, &self.ledger, id, &viewer).await?;
        self.pending.clear(id);
        Ok(())
    }

    // ========================================================================
    // WORKFLOWS
    // ========================================================================

    pub async fn purchase(&self, id: ItemId) -> Result<PurchaseReceipt, WorkflowError> {
        if !self.catalog.contains(id) {
            return Err(WorkflowError::UnknownItem(id));
        }
        let viewer = self.resolve_viewer()?;
        let receipt = PurchaseWorkflow::new(id, viewer).run(&self.deps()).await?;
        self.pending.clear(id);
        Ok(receipt)
    }

    pub async fn resell(&self, id: ItemId) -> Result<ResaleReceipt, WorkflowError> {
        if !self.catalog.contains(id) {
            return Err(WorkflowError::UnknownItem(id));
        }
        let viewer = self.resolve_viewer()?;
        let receipt = ResellWorkflow::new(id, viewer).run(&self.deps()).await?;
        self.pending.clear(id);
        Ok(receipt)
    }

    pub async fn update_price(
        &self,
        id: ItemId,
        new_price: u64,
    ) -> Result<PriceUpdateReceipt, WorkflowError> {
        if !self.catalog.contains(id) {
            return Err(WorkflowError::UnknownItem(id));
        }
        let account = self.resolve_viewer()?;
        PriceUpdateWorkflow::new(id, new_price, account)
            .run(&self.deps())
            .await
    }

    // ========================================================================
    // PROJECTIONS
    // ========================================================================

    /// Rendering projection for one item. Viewer-scoped fields (count,
    /// eligibility, history) are filled only when a viewer is connected
    /// and the cached snapshot was refreshed for that viewer.
    pub async fn projection(&self, id: ItemId) -> Option<ItemProjection> {
        let meta = self.catalog.get(id)?.clone();
        let viewer = self.provider.active_account();

        let (price, stock, buyers, scoped_count, eligibility_verdict) = {
            let cache = self.cache.lock().unwrap();
            match cache.get(id) {
                Some(state) => {
                    let scoped = viewer.as_ref().filter(|v| state.viewer.matches(v)).is_some();
                    (
                        Some(state.price),
                        Some(state.stock),
                        state.buyers.clone(),
                        scoped.then_some(state.viewer_purchase_count),
                        scoped.then(|| eligibility(state, &self.policy)),
                    )
                }
                None => (None, None, Vec::new(), None, None),
            }
        };

        let history = match &viewer {
            Some(viewer) => match self.ledger.read_purchase_history(id).await {
                Ok(records) => history::project(&records, viewer),
                Err(e) => {
                    warn!(item = id, error = %e, "history read failed; rendering empty history");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let owned_count = scoped_count.unwrap_or(0);
        Some(ItemProjection {
            id,
            name: meta.name,
            picture: meta.picture,
            description: meta.description,
            price,
            stock,
            eligibility: eligibility_verdict,
            viewer_purchase_count: owned_count,
            buyers,
            owned_count,
            history,
        })
    }

    /// Projections for the whole catalog, in catalog order
    pub async fn projections(&self) -> Vec<ItemProjection> {
        let mut views = Vec::with_capacity(self.catalog.len());
        for id in self.catalog.ids() {
            if let Some(view) = self.projection(id).await {
                views.push(view);
            }
        }
        views
    }

    /// The collection view: what does this viewer currently own. Recomputed
    /// across the full catalog on every call, so a confirmed resale is
    /// reflected as soon as its reconciliation refresh lands.
    pub fn owned_items(&self) -> Result<Vec<OwnedItem>, WorkflowError> {
        let viewer = self.resolve_viewer()?;
        let cache = self.cache.lock().unwrap();
        let mut owned = Vec::new();
        for meta in self.catalog.iter() {
            if let Some(state) = cache.get(meta.id) {
                if state.viewer.matches(&viewer) && state.viewer_purchase_count > 0 {
                    owned.push(OwnedItem {
                        meta: meta.clone(),
                        owned_count: state.viewer_purchase_count,
                    });
                }
            }
        }
        Ok(owned)
    }
}
