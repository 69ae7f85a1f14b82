mod api;
mod config;
mod error;
mod order;
mod refund;
mod transaction;

pub mod helpers;

pub use api::ShopifyApi;
pub use config::ShopifyConfig;
pub use error::ShopifyApiError;
pub use order::{Customer, MoneyBag, MoneySet, OrderMetafield, ShopifyOrder};
pub use refund::{OrderAdjustment, RefundLineItem, RefundNotification};
pub use transaction::{CancelOrderRequest, CancelReason, ShopifyTransaction, TransactionKind, TransactionStatus};
