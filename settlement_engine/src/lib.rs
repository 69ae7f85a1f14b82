//! # Settlement engine
//!
//! The domain core of the settlement gateway. It keeps an external storefront order's capture/cancel state
//! consistent with a locally managed invoice, deduplicates invoice creation at checkout, and settles refunds back
//! to the buyer as claimable payouts.
//!
//! The engine talks to the outside world exclusively through traits:
//! * [`traits::CommercePlatform`]: the storefront's order API (fetch, capture, cancel, metafields).
//! * [`traits::InvoiceLedger`]: the gateway's own invoice store.
//! * [`traits::ExchangeRates`]: bid/ask quotes for the settlement currency.
//! * [`traits::Payouts`]: payout creation and the refund-record linkage.
//!
//! All order-mutating paths are serialized per order id by [`OrderLocks`]; every critical section starts with a
//! fresh order fetch, because the storefront's record is the source of truth.

pub mod db_types;
pub mod events;
pub mod keyed_lock;
pub mod rates;
pub mod settlement;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use keyed_lock::{LockError, OrderLockGuard, OrderLocks};
pub use settlement::{
    decide,
    CheckoutError,
    CheckoutOutcome,
    ReconcileAction,
    RefundError,
    RefundMode,
    SettlementApi,
    SettlementConfig,
    SettlementError,
    SkipReason,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
