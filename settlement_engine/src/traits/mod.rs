//! Backend traits for the settlement engine.
//!
//! Each trait covers one external collaborator and carries its own error enum. Production wiring uses
//! [`crate::sqlite::SqliteDatabase`] for the ledger-side traits and `shopify_tools::ShopifyApi` for the commerce
//! platform; tests substitute mocks.

mod commerce_platform;
mod exchange_rates;
mod invoice_ledger;
mod payouts;

pub use commerce_platform::{CommercePlatform, PlatformError};
pub use exchange_rates::{ExchangeRateError, ExchangeRates};
pub use invoice_ledger::{InvoiceLedger, LedgerError};
pub use payouts::{PayoutError, Payouts};
