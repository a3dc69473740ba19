/// ImageStore Marketplace Client
/// Exports all modules for use as a library crate

pub mod cache;
pub mod catalog;
pub mod config;
pub mod eligibility;
pub mod history;
pub mod ledger;
pub mod models;
pub mod session;
pub mod workflow;

// Re-export the core surface
pub use cache::{read_item_state, refresh_many, refresh_one, ItemStateCache};
pub use catalog::{CatalogError, CatalogIndex, ItemMeta};
pub use config::ClientConfig;
pub use eligibility::{eligibility, Eligibility, PurchasePolicy, DEFAULT_PURCHASE_LIMIT};
pub use history::{format_instant, project};
pub use ledger::{LedgerClient, LedgerError, MockLedger, RevertReason};
pub use models::{Address, ItemId, ItemState, PurchaseRecord, TransactionOutcome};
pub use session::{
    AccountProvider, EnvAccountProvider, FixedAccountProvider, ItemProjection, OwnedItem,
    SessionContext,
};
pub use workflow::{
    InFlightRegistry, PendingOutcomes, PriceUpdateReceipt, PriceUpdateWorkflow, PurchaseReceipt,
    PurchaseWorkflow, ResaleReceipt, ResellWorkflow, WorkflowError, WorkflowPhase,
};
