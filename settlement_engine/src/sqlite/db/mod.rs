pub mod invoices;
pub mod rates;
pub mod refunds;
