use thiserror::Error;

use crate::db_types::{NewPayout, Payout, RefundRecord};

#[derive(Debug, Clone, Error)]
pub enum PayoutError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invoice {0} already has a refund record")]
    RefundAlreadyExists(String),
}

impl From<sqlx::Error> for PayoutError {
    fn from(e: sqlx::Error) -> Self {
        PayoutError::DatabaseError(e.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait Payouts {
    /// Create the payout and the refund record linking it to the invoice as a single transactional write. Fails
    /// with [`PayoutError::RefundAlreadyExists`] if the invoice is already linked to a payout, leaving no partial
    /// state behind.
    async fn create_payout_with_refund(
        &self,
        invoice_id: &str,
        payout: NewPayout,
    ) -> Result<RefundRecord, PayoutError>;
    async fn fetch_refund_for_invoice(&self, invoice_id: &str) -> Result<Option<RefundRecord>, PayoutError>;
    async fn fetch_payout(&self, payout_id: &str) -> Result<Option<Payout>, PayoutError>;
}
