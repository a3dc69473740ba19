/// Ledger Client
///
/// Typed async wrapper around the ledger gateway's read calls and
/// transaction submission. Supports mock mode for local development and
/// tests without a live ledger connection.
///
/// Reads are idempotent and side-effect-free. Submits are not: a submit
/// whose outcome is unknown must never be retried before a fresh read
/// establishes whether it already applied.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{Address, ItemId, PurchaseRecord, TransactionOutcome};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default timeout for gateway calls
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// First timestamp handed out by the mock ledger's deterministic clock
const MOCK_CLOCK_BASE: u64 = 1_700_000_000;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Ledger-level business rule rejection, carried to the caller verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevertReason {
    NotOwner,
    InsufficientFunds,
    SoldOut,
    LimitReached,
    /// Resale attempted without a current entitlement
    NothingToResell,
    Other(String),
}

impl RevertReason {
    /// Parse a gateway reason string; unknown codes are preserved as-is
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_lowercase().replace('_', " ").as_str() {
            "not owner" => RevertReason::NotOwner,
            "insufficient funds" => RevertReason::InsufficientFunds,
            "sold out" => RevertReason::SoldOut,
            "limit reached" => RevertReason::LimitReached,
            "nothing to resell" => RevertReason::NothingToResell,
            _ => RevertReason::Other(code.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RevertReason::NotOwner => "not owner",
            RevertReason::InsufficientFunds => "insufficient funds",
            RevertReason::SoldOut => "sold out",
            RevertReason::LimitReached => "limit reached",
            RevertReason::NothingToResell => "nothing to resell",
            RevertReason::Other(code) => code,
        }
    }
}

impl std::fmt::Display for RevertReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum LedgerError {
    /// No gateway reachable; fatal to all operations until resolved externally
    Unavailable,
    /// HTTP request failed with a non-success status
    RequestFailed(String),
    /// Response body did not match the expected shape
    InvalidResponse(String),
    /// Gave up waiting; the outcome of a submit is ambiguous after this
    Timeout,
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Unavailable => write!(f, "ledger gateway unavailable"),
            LedgerError::RequestFailed(msg) => write!(f, "ledger request failed: {}", msg),
            LedgerError::InvalidResponse(msg) => write!(f, "invalid ledger response: {}", msg),
            LedgerError::Timeout => write!(f, "ledger request timed out"),
        }
    }
}

impl std::error::Error for LedgerError {}

fn map_transport_error(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() {
        LedgerError::Timeout
    } else if e.is_connect() {
        LedgerError::Unavailable
    } else {
        LedgerError::RequestFailed(e.to_string())
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: u64,
}

#[derive(Debug, Deserialize)]
struct StockResponse {
    stock: u64,
}

#[derive(Debug, Deserialize)]
struct StockEntry {
    id: ItemId,
    stock: u64,
}

#[derive(Debug, Deserialize)]
struct AllStocksResponse {
    stocks: Vec<StockEntry>,
}

#[derive(Debug, Deserialize)]
struct PurchaseCountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct BuyersResponse {
    buyers: Vec<Address>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    records: Vec<PurchaseRecord>,
}

#[derive(Debug, Serialize)]
struct PurchaseRequest<'a> {
    submission_id: Uuid,
    item_id: ItemId,
    account: &'a Address,
    /// Amount transferred with the purchase, in minor units
    amount: u64,
}

#[derive(Debug, Serialize)]
struct PriceUpdateRequest<'a> {
    submission_id: Uuid,
    item_id: ItemId,
    new_price: u64,
    account: &'a Address,
}

#[derive(Debug, Serialize)]
struct ResaleRequest<'a> {
    submission_id: Uuid,
    item_id: ItemId,
    account: &'a Address,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    /// "confirmed", "pending" or "rejected"
    status: String,
    reason: Option<String>,
}

impl SubmitResponse {
    fn into_outcome(self) -> Result<TransactionOutcome, LedgerError> {
        match self.status.as_str() {
            "confirmed" => Ok(TransactionOutcome::Confirmed),
            "pending" => Ok(TransactionOutcome::Pending),
            "rejected" => {
                let reason = self
                    .reason
                    .ok_or_else(|| LedgerError::InvalidResponse("rejection without reason".into()))?;
                Ok(TransactionOutcome::Rejected(reason))
            }
            other => Err(LedgerError::InvalidResponse(format!(
                "unknown submit status: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// LEDGER CLIENT
// ============================================================================

/// Client for reading ledger state and submitting transactions
pub struct LedgerClient {
    /// Gateway endpoint URL; None selects mock mode
    endpoint_url: Option<String>,

    /// HTTP client
    http: Client,

    /// In-process ledger used when no endpoint is configured
    mock: Arc<MockLedger>,
}

impl LedgerClient {
    /// Create a client with an explicit endpoint URL (None = mock mode)
    pub fn new(endpoint_url: Option<String>) -> Self {
        Self::with_timeout(endpoint_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(endpoint_url: Option<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        LedgerClient {
            endpoint_url,
            http,
            mock: Arc::new(MockLedger::new()),
        }
    }

    /// Create a mock-mode client sharing a prepared mock ledger
    pub fn with_mock(mock: Arc<MockLedger>) -> Self {
        LedgerClient {
            endpoint_url: None,
            http: Client::new(),
            mock,
        }
    }

    /// Create from the LEDGER_GATEWAY_URL environment variable
    pub fn from_env() -> Self {
        Self::new(std::env::var("LEDGER_GATEWAY_URL").ok())
    }

    pub fn is_mock_mode(&self) -> bool {
        self.endpoint_url.is_none()
    }

    pub fn endpoint_url(&self) -> Option<&str> {
        self.endpoint_url.as_deref()
    }

    /// Handle to the in-process mock ledger (mock mode only, for seeding)
    pub fn mock_handle(&self) -> Arc<MockLedger> {
        self.mock.clone()
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub async fn read_price(&self, id: ItemId) -> Result<u64, LedgerError> {
        if self.is_mock_mode() {
            self.mock.read_price(id).await
        } else {
            let resp: PriceResponse = self.get(&format!("ledger/items/{}/price", id)).await?;
            Ok(resp.price)
        }
    }

    pub async fn read_stock(&self, id: ItemId) -> Result<u64, LedgerError> {
        if self.is_mock_mode() {
            self.mock.read_stock(id).await
        } else {
            let resp: StockResponse = self.get(&format!("ledger/items/{}/stock", id)).await?;
            Ok(resp.stock)
        }
    }

    /// Batch stock read; entries are id-keyed, never positional
    pub async fn read_all_stocks(&self) -> Result<Vec<(ItemId, u64)>, LedgerError> {
        if self.is_mock_mode() {
            self.mock.read_all_stocks().await
        } else {
            let resp: AllStocksResponse = self.get("ledger/stocks").await?;
            Ok(resp.stocks.into_iter().map(|e| (e.id, e.stock)).collect())
        }
    }

    pub async fn read_purchase_count(
        &self,
        id: ItemId,
        account: &Address,
    ) -> Result<u64, LedgerError> {
        if self.is_mock_mode() {
            self.mock.read_purchase_count(id, account).await
        } else {
            let path = format!("ledger/items/{}/purchases/{}", id, account);
            let resp: PurchaseCountResponse = self.get(&path).await?;
            Ok(resp.count)
        }
    }

    pub async fn read_buyers(&self, id: ItemId) -> Result<Vec<Address>, LedgerError> {
        if self.is_mock_mode() {
            self.mock.read_buyers(id).await
        } else {
            let resp: BuyersResponse = self.get(&format!("ledger/items/{}/buyers", id)).await?;
            Ok(resp.buyers)
        }
    }

    pub async fn read_purchase_history(
        &self,
        id: ItemId,
    ) -> Result<Vec<PurchaseRecord>, LedgerError> {
        if self.is_mock_mode() {
            self.mock.read_purchase_history(id).await
        } else {
            let resp: HistoryResponse = self.get(&format!("ledger/items/{}/history", id)).await?;
            Ok(resp.records)
        }
    }

    // ========================================================================
    // SUBMITS
    // ========================================================================

    /// Submit a purchase, transferring `amount` minor units.
    /// The caller is responsible for capturing `amount` from a guarded
    /// snapshot; it is passed through unchanged.
    pub async fn submit_purchase(
        &self,
        id: ItemId,
        account: &Address,
        amount: u64,
    ) -> Result<TransactionOutcome, LedgerError> {
        if self.is_mock_mode() {
            self.mock.submit_purchase(id, account, amount).await
        } else {
            let request = PurchaseRequest {
                submission_id: Uuid::new_v4(),
                item_id: id,
                account,
                amount,
            };
            self.post("ledger/purchase", &request).await
        }
    }

    pub async fn submit_price_update(
        &self,
        id: ItemId,
        new_price: u64,
        account: &Address,
    ) -> Result<TransactionOutcome, LedgerError> {
        if self.is_mock_mode() {
            self.mock.submit_price_update(id, new_price, account).await
        } else {
            let request = PriceUpdateRequest {
                submission_id: Uuid::new_v4(),
                item_id: id,
                new_price,
                account,
            };
            self.post("ledger/price", &request).await
        }
    }

    pub async fn submit_resale(
        &self,
        id: ItemId,
        account: &Address,
    ) -> Result<TransactionOutcome, LedgerError> {
        if self.is_mock_mode() {
            self.mock.submit_resale(id, account).await
        } else {
            let request = ResaleRequest {
                submission_id: Uuid::new_v4(),
                item_id: id,
                account,
            };
            self.post("ledger/resale", &request).await
        }
    }

    // ========================================================================
    // HTTP PLUMBING
    // ========================================================================

    fn url(&self, path: &str) -> String {
        // endpoint_url is always Some outside mock mode
        format!("{}/{}", self.endpoint_url.as_deref().unwrap_or(""), path)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, LedgerError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(LedgerError::RequestFailed(format!(
                "gateway returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<TransactionOutcome, LedgerError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(LedgerError::RequestFailed(format!(
                "gateway returned status {}",
                response.status()
            )));
        }

        let result: SubmitResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;

        result.into_outcome()
    }
}

impl Default for LedgerClient {
    fn default() -> Self {
        Self::from_env()
    }
}

// ============================================================================
// MOCK LEDGER
// ============================================================================

struct MockItem {
    price: u64,
    stock: u64,
    /// Append-only purchase log; never shrinks, not even on resale
    history: Vec<PurchaseRecord>,
    /// Current entitlement per canonical buyer address
    entitlements: HashMap<String, u64>,
}

struct MockInner {
    items: HashMap<ItemId, MockItem>,
    owner: Address,
    purchase_limit: u64,
    clock: u64,
    /// Artificial read latency per item, for exercising out-of-order arrival
    read_delays: HashMap<ItemId, Duration>,
    /// Items whose reads fail until cleared
    failing_reads: std::collections::HashSet<ItemId>,
    /// One-shot forced error for the next submit of any kind
    fail_next_submit: Option<LedgerError>,
    /// Artificial latency applied to every submit
    submit_delay: Option<Duration>,
    /// Purchase submissions seen per item (attempts, not confirmations)
    purchase_submissions: HashMap<ItemId, u64>,
}

/// In-process ledger with the full business rules: stock decrement,
/// per-account purchase limit, owner-gated price updates, resale refund.
/// Stands in for the gateway in mock mode and drives the test suites.
pub struct MockLedger {
    inner: Mutex<MockInner>,
}

impl MockLedger {
    pub fn new() -> Self {
        MockLedger {
            inner: Mutex::new(MockInner {
                items: HashMap::new(),
                owner: Address::new("0xowner"),
                purchase_limit: 3,
                clock: MOCK_CLOCK_BASE,
                read_delays: HashMap::new(),
                failing_reads: std::collections::HashSet::new(),
                fail_next_submit: None,
                submit_delay: None,
                purchase_submissions: HashMap::new(),
            }),
        }
    }

    // ========================================================================
    // SEEDING & TEST KNOBS
    // ========================================================================

    pub fn seed_item(&self, id: ItemId, price: u64, stock: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.insert(
            id,
            MockItem {
                price,
                stock,
                history: Vec::new(),
                entitlements: HashMap::new(),
            },
        );
    }

    /// Fabricate a prior purchase: appends a history record and grants an
    /// entitlement without touching stock.
    pub fn seed_purchase(&self, id: ItemId, buyer: &Address, timestamp: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(item) = inner.items.get_mut(&id) {
            item.history.push(PurchaseRecord {
                buyer: buyer.clone(),
                timestamp,
            });
            *item.entitlements.entry(buyer.canonical()).or_insert(0) += 1;
        }
    }

    pub fn set_owner(&self, owner: Address) {
        self.inner.lock().unwrap().owner = owner;
    }

    pub fn set_purchase_limit(&self, limit: u64) {
        self.inner.lock().unwrap().purchase_limit = limit;
    }

    pub fn set_read_delay(&self, id: ItemId, delay: Duration) {
        self.inner.lock().unwrap().read_delays.insert(id, delay);
    }

    pub fn fail_reads_for(&self, id: ItemId) {
        self.inner.lock().unwrap().failing_reads.insert(id);
    }

    pub fn restore_reads_for(&self, id: ItemId) {
        self.inner.lock().unwrap().failing_reads.remove(&id);
    }

    pub fn fail_next_submit(&self, error: LedgerError) {
        self.inner.lock().unwrap().fail_next_submit = Some(error);
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().submit_delay = Some(delay);
    }

    /// How many purchase submissions reached the ledger for this item
    pub fn purchase_submission_count(&self, id: ItemId) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .purchase_submissions
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    // ========================================================================
    // READS
    // ========================================================================

    async fn read_gate(&self, id: ItemId) -> Result<(), LedgerError> {
        let delay = self.inner.lock().unwrap().read_delays.get(&id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.inner.lock().unwrap().failing_reads.contains(&id) {
            return Err(LedgerError::Unavailable);
        }
        Ok(())
    }

    async fn read_price(&self, id: ItemId) -> Result<u64, LedgerError> {
        self.read_gate(id).await?;
        let inner = self.inner.lock().unwrap();
        inner
            .items
            .get(&id)
            .map(|i| i.price)
            .ok_or_else(|| LedgerError::RequestFailed(format!("unknown item {}", id)))
    }

    async fn read_stock(&self, id: ItemId) -> Result<u64, LedgerError> {
        self.read_gate(id).await?;
        let inner = self.inner.lock().unwrap();
        inner
            .items
            .get(&id)
            .map(|i| i.stock)
            .ok_or_else(|| LedgerError::RequestFailed(format!("unknown item {}", id)))
    }

    async fn read_all_stocks(&self) -> Result<Vec<(ItemId, u64)>, LedgerError> {
        let inner = self.inner.lock().unwrap();
        let mut stocks: Vec<(ItemId, u64)> =
            inner.items.iter().map(|(id, i)| (*id, i.stock)).collect();
        stocks.sort_unstable_by_key(|(id, _)| *id);
        Ok(stocks)
    }

    async fn read_purchase_count(
        &self,
        id: ItemId,
        account: &Address,
    ) -> Result<u64, LedgerError> {
        self.read_gate(id).await?;
        let inner = self.inner.lock().unwrap();
        let item = inner
            .items
            .get(&id)
            .ok_or_else(|| LedgerError::RequestFailed(format!("unknown item {}", id)))?;
        Ok(item
            .entitlements
            .get(&account.canonical())
            .copied()
            .unwrap_or(0))
    }

    async fn read_buyers(&self, id: ItemId) -> Result<Vec<Address>, LedgerError> {
        self.read_gate(id).await?;
        let inner = self.inner.lock().unwrap();
        let item = inner
            .items
            .get(&id)
            .ok_or_else(|| LedgerError::RequestFailed(format!("unknown item {}", id)))?;
        Ok(item.history.iter().map(|r| r.buyer.clone()).collect())
    }

    async fn read_purchase_history(
        &self,
        id: ItemId,
    ) -> Result<Vec<PurchaseRecord>, LedgerError> {
        self.read_gate(id).await?;
        let inner = self.inner.lock().unwrap();
        let item = inner
            .items
            .get(&id)
            .ok_or_else(|| LedgerError::RequestFailed(format!("unknown item {}", id)))?;
        Ok(item.history.clone())
    }

    // ========================================================================
    // SUBMITS
    // ========================================================================

    async fn submit_gate(&self) -> Result<(), LedgerError> {
        let (delay, forced) = {
            let mut inner = self.inner.lock().unwrap();
            (inner.submit_delay, inner.fail_next_submit.take())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = forced {
            return Err(error);
        }
        Ok(())
    }

    async fn submit_purchase(
        &self,
        id: ItemId,
        account: &Address,
        amount: u64,
    ) -> Result<TransactionOutcome, LedgerError> {
        {
            let mut inner = self.inner.lock().unwrap();
            *inner.purchase_submissions.entry(id).or_insert(0) += 1;
        }
        self.submit_gate().await?;

        let mut inner = self.inner.lock().unwrap();
        let limit = inner.purchase_limit;
        let ts = {
            inner.clock += 1;
            inner.clock
        };
        let item = match inner.items.get_mut(&id) {
            Some(item) => item,
            None => return Ok(TransactionOutcome::Rejected("unknown item".into())),
        };

        if item.stock == 0 {
            return Ok(TransactionOutcome::Rejected(
                RevertReason::SoldOut.as_str().into(),
            ));
        }
        let held = item
            .entitlements
            .get(&account.canonical())
            .copied()
            .unwrap_or(0);
        if held >= limit {
            return Ok(TransactionOutcome::Rejected(
                RevertReason::LimitReached.as_str().into(),
            ));
        }
        if amount < item.price {
            return Ok(TransactionOutcome::Rejected(
                RevertReason::InsufficientFunds.as_str().into(),
            ));
        }

        item.stock -= 1;
        item.history.push(PurchaseRecord {
            buyer: account.clone(),
            timestamp: ts,
        });
        *item.entitlements.entry(account.canonical()).or_insert(0) += 1;

        Ok(TransactionOutcome::Confirmed)
    }

    async fn submit_price_update(
        &self,
        id: ItemId,
        new_price: u64,
        account: &Address,
    ) -> Result<TransactionOutcome, LedgerError> {
        self.submit_gate().await?;

        let mut inner = self.inner.lock().unwrap();
        if !inner.owner.matches(account) {
            return Ok(TransactionOutcome::Rejected(
                RevertReason::NotOwner.as_str().into(),
            ));
        }
        match inner.items.get_mut(&id) {
            Some(item) => {
                item.price = new_price;
                Ok(TransactionOutcome::Confirmed)
            }
            None => Ok(TransactionOutcome::Rejected("unknown item".into())),
        }
    }

    async fn submit_resale(
        &self,
        id: ItemId,
        account: &Address,
    ) -> Result<TransactionOutcome, LedgerError> {
        self.submit_gate().await?;

        let mut inner = self.inner.lock().unwrap();
        let item = match inner.items.get_mut(&id) {
            Some(item) => item,
            None => return Ok(TransactionOutcome::Rejected("unknown item".into())),
        };

        let key = account.canonical();
        let held = item.entitlements.get(&key).copied().unwrap_or(0);
        if held == 0 {
            return Ok(TransactionOutcome::Rejected(
                RevertReason::NothingToResell.as_str().into(),
            ));
        }

        // Entitlement goes down, stock goes back up; the history log keeps
        // every original purchase record.
        item.entitlements.insert(key, held - 1);
        item.stock += 1;

        Ok(TransactionOutcome::Confirmed)
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
