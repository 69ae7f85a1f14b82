use thiserror::Error;

use crate::db_types::{Invoice, LogEntry, NewInvoice};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invoice {0} does not exist")]
    InvoiceNotFound(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

/// The gateway's invoice store.
#[allow(async_fn_in_trait)]
pub trait InvoiceLedger {
    /// Create a new invoice with its search tags in one transaction.
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, LedgerError>;
    async fn fetch_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, LedgerError>;
    /// All invoices carrying the given search tag.
    async fn search_invoices_by_tag(&self, tag: &str) -> Result<Vec<Invoice>, LedgerError>;
    /// Append a structured entry to the invoice's audit trail.
    async fn append_invoice_log(&self, invoice_id: &str, entry: LogEntry) -> Result<(), LedgerError>;
    async fn fetch_invoice_logs(&self, invoice_id: &str) -> Result<Vec<LogEntry>, LedgerError>;
}
