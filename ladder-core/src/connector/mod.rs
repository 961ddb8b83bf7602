//! Typed boundary to the exchange connector.
//!
//! The engine never talks to a venue directly; it sees this trait plus two
//! inbound event streams (market data, execution reports). Implementations
//! live outside the core — the only one shipped here is the simulated
//! connector under `testing`.

pub mod normalizer;

use crate::core::{Side, SymbolFilters};
use rust_decimal::Decimal;
use thiserror::Error;

pub use normalizer::{normalize_execution_report, to_raw, NormalizeError};

/// Outbound order type. Post-only quoting uses `LimitMaker` wherever the
/// venue supports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    LimitMaker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Gtc,
}

/// New-order request.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub symbol: String,
    pub client_order_id: String,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub price: Decimal,
    pub qty: Decimal,
    pub post_only: bool,
}

/// Cancel by venue id or by client id; at least one must be set.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelRequest {
    pub symbol: String,
    pub order_id: Option<u64>,
    pub client_order_id: Option<String>,
}

/// Atomic cancel-replace. `STOP_ON_FAILURE` semantics: the new order is
/// only placed if the cancel succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelReplaceRequest {
    pub symbol: String,
    pub cancel_order_id: u64,
    pub new: SubmitRequest,
}

/// Venue acknowledgement of a submit or replace.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitAck {
    pub order_id: u64,
    pub client_order_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelAck {
    pub order_id: u64,
}

/// Authoritative balances as reported by the venue, used by the ledger
/// reconciler as truth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VenueBalances {
    pub base_free: Decimal,
    pub base_locked: Decimal,
    pub quote_free: Decimal,
    pub quote_locked: Decimal,
}

impl VenueBalances {
    #[inline]
    pub fn base_total(&self) -> Decimal {
        self.base_free + self.base_locked
    }

    #[inline]
    pub fn quote_total(&self) -> Decimal {
        self.quote_free + self.quote_locked
    }
}

/// Connector failure taxonomy. Retry policy is decided by the caller:
/// transient errors back off, rate limits cool down, filter rejects feed
/// back to the planner, would-match rejects retry once with a wider guard.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectorError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("transient venue error ({status}): {message}")]
    Transient { status: u16, message: String },
    #[error("venue rate limit hit, retry after {retry_after_s} s")]
    RateLimited { retry_after_s: u64 },
    #[error("order filter violation: {reason}")]
    FilterReject { reason: String },
    #[error("post-only order would immediately match")]
    WouldMatch,
    #[error("venue rejected request (code {code}): {message}")]
    Venue { code: i64, message: String },
}

impl ConnectorError {
    /// Errors worth retrying with backoff at the call site.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectorError::Timeout(_) | ConnectorError::Transient { .. })
    }
}

/// Depth update from the primary market-data stream.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDepthUpdate {
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
    pub ts_exch_ms: u64,
    pub last_update_id: u64,
}

/// Aggregate trade from the secondary stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggTrade {
    pub price: Decimal,
    pub qty: Decimal,
    pub ts_exch_ms: u64,
}

/// Inbound market event as delivered to the decision worker.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Depth(MarketDepthUpdate),
    Trade(AggTrade),
}

/// The exchange connector seam. Implementations must be cheap to clone
/// behind an `Arc` and safe to call from multiple tasks.
pub trait Connector: Send + Sync + 'static {
    fn submit(
        &self,
        req: SubmitRequest,
    ) -> impl std::future::Future<Output = Result<SubmitAck, ConnectorError>> + Send;

    fn cancel(
        &self,
        req: CancelRequest,
    ) -> impl std::future::Future<Output = Result<CancelAck, ConnectorError>> + Send;

    fn cancel_replace(
        &self,
        req: CancelReplaceRequest,
    ) -> impl std::future::Future<Output = Result<SubmitAck, ConnectorError>> + Send;

    fn symbol_filters(
        &self,
        symbol: &str,
    ) -> impl std::future::Future<Output = Result<SymbolFilters, ConnectorError>> + Send;

    fn balances(
        &self,
    ) -> impl std::future::Future<Output = Result<VenueBalances, ConnectorError>> + Send;
}
