use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ssg_common::Sats;

/// Prefix for the search tag that links an invoice to a storefront order.
pub const ORDER_ID_TAG_PREFIX: &str = "shopify-";

/// The deterministic search tag for a given order id. Checkout deduplication and refund correlation both key off
/// this tag, so it must be a pure function of the order id.
pub fn order_tag(order_id: i64) -> String {
    format!("{ORDER_ID_TAG_PREFIX}{order_id}")
}

//--------------------------------------      Invoice         ---------------------------------------------------------

/// An invoice in the gateway's ledger. Fiat amounts are integer cents of `currency`; the settlement side is
/// denominated in [`Sats`]. `settlement_rate` is the Sats-per-cent rate recorded when the invoice was paid, which
/// the refund engine uses in rate-at-payment-time mode.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: String,
    pub currency: String,
    pub price_cents: i64,
    pub paid_cents: i64,
    pub paid_sats: Sats,
    pub settlement_rate: Sats,
    pub status: InvoiceStatus,
    pub exception: ExceptionStatus,
    pub order_id: Option<i64>,
    pub order_name: Option<String>,
    pub gateway: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// How the invoice's lifecycle maps onto the order: `Some(true)` means the order should be settled (captured),
    /// `Some(false)` means it should be annulled, `None` means there is nothing to do yet.
    ///
    /// An expired invoice that was partially paid still settles: the captured amount is the paid portion.
    pub fn settlement_outcome(&self) -> Option<bool> {
        match (self.status, self.exception) {
            (InvoiceStatus::Settled | InvoiceStatus::Processing, _) => Some(true),
            (InvoiceStatus::Expired, ExceptionStatus::PaidPartial) => Some(true),
            (InvoiceStatus::Invalid | InvoiceStatus::Expired, _) => Some(false),
            _ => None,
        }
    }

    /// Whether the invoice's current state can accept a refund at all. Only invoices that actually collected money
    /// qualify.
    pub fn can_accept_refund(&self) -> bool {
        matches!(
            (self.status, self.exception),
            (InvoiceStatus::Settled, _) | (InvoiceStatus::Expired, ExceptionStatus::PaidPartial)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum InvoiceStatus {
    New,
    Processing,
    Settled,
    Invalid,
    Expired,
}

impl Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvoiceStatus::New => "new",
            InvoiceStatus::Processing => "processing",
            InvoiceStatus::Settled => "settled",
            InvoiceStatus::Invalid => "invalid",
            InvoiceStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Qualifier on top of [`InvoiceStatus`] for states that need more nuance than the main lifecycle provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ExceptionStatus {
    None,
    PaidPartial,
    PaidLate,
    Marked,
}

impl Display for ExceptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExceptionStatus::None => "none",
            ExceptionStatus::PaidPartial => "paid_partial",
            ExceptionStatus::PaidLate => "paid_late",
            ExceptionStatus::Marked => "marked",
        };
        f.write_str(s)
    }
}

/// The data needed to open a new invoice at checkout. The ledger assigns the id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub currency: String,
    pub price_cents: i64,
    pub order_id: Option<i64>,
    pub order_name: Option<String>,
    pub gateway: Option<String>,
    pub tags: Vec<String>,
}

//--------------------------------------     Invoice logs     ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// A structured entry in an invoice's audit trail. Reconciliation writes its decisions and their outcomes here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn info<S: Into<String>>(message: S) -> Self {
        Self { level: LogLevel::Info, message: message.into() }
    }

    pub fn warning<S: Into<String>>(message: S) -> Self {
        Self { level: LogLevel::Warning, message: message.into() }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self { level: LogLevel::Error, message: message.into() }
    }
}

impl Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

//--------------------------------------   Refunds & payouts  ---------------------------------------------------------

/// The link between an invoice and the payout that refunds it. At most one of these may ever exist per invoice;
/// the ledger enforces it with a primary-key constraint and the refund engine checks it inside the order lock.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefundRecord {
    pub invoice_id: String,
    pub payout_id: String,
    pub created_at: DateTime<Utc>,
}

/// A request to disburse funds to a claimant. Transient; it becomes a [`Payout`] row once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayout {
    pub currency: String,
    pub amount: Sats,
    pub payout_methods: Vec<String>,
    pub auto_approve_claims: bool,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: String,
    pub currency: String,
    pub amount: Sats,
    pub payout_methods: Vec<String>,
    pub auto_approve_claims: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
