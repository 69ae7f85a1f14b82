use std::str::FromStr;

use chrono::Utc;
use log::*;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use ssg_common::Sats;

use crate::{
    db_types::{ExceptionStatus, Invoice, InvoiceStatus, LogEntry, NewInvoice, NewPayout, Payout, RefundRecord},
    rates::RateQuote,
    sqlite::db,
    traits::{ExchangeRateError, ExchangeRates, InvoiceLedger, LedgerError, PayoutError, Payouts},
};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS invoices (
        id TEXT PRIMARY KEY,
        currency TEXT NOT NULL,
        price_cents INTEGER NOT NULL,
        paid_cents INTEGER NOT NULL DEFAULT 0,
        paid_sats INTEGER NOT NULL DEFAULT 0,
        settlement_rate INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'new',
        exception TEXT NOT NULL DEFAULT 'none',
        order_id INTEGER,
        order_name TEXT,
        gateway TEXT,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS invoice_tags (
        invoice_id TEXT NOT NULL REFERENCES invoices (id),
        tag TEXT NOT NULL,
        UNIQUE (invoice_id, tag)
    )"#,
    "CREATE INDEX IF NOT EXISTS invoice_tags_tag ON invoice_tags (tag)",
    r#"CREATE TABLE IF NOT EXISTS invoice_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id TEXT NOT NULL REFERENCES invoices (id),
        level TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS payouts (
        id TEXT PRIMARY KEY,
        currency TEXT NOT NULL,
        amount INTEGER NOT NULL,
        payout_methods TEXT NOT NULL,
        auto_approve_claims INTEGER NOT NULL,
        description TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS refunds (
        invoice_id TEXT PRIMARY KEY REFERENCES invoices (id),
        payout_id TEXT NOT NULL REFERENCES payouts (id),
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS exchange_rates (
        base_currency TEXT NOT NULL,
        bid INTEGER NOT NULL,
        ask INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
];

/// The sqlite implementation of the gateway's ledger-side backends.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("🗃️ Database schema is in place");
        Ok(())
    }

    /// Record a payment against an invoice. This is the invoice-side host's entry point when funds land; the
    /// reconciliation engine itself never moves an invoice through its lifecycle.
    pub async fn update_invoice_state(
        &self,
        invoice_id: &str,
        status: InvoiceStatus,
        exception: ExceptionStatus,
        paid_cents: i64,
        paid_sats: Sats,
        settlement_rate: Sats,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE invoices SET status = ?, exception = ?, paid_cents = ?, paid_sats = ?, settlement_rate = ? \
             WHERE id = ?",
        )
        .bind(status)
        .bind(exception)
        .bind(paid_cents)
        .bind(paid_sats)
        .bind(settlement_rate)
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(LedgerError::from)?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::InvoiceNotFound(invoice_id.to_string()));
        }
        Ok(())
    }
}

fn new_invoice_id() -> String {
    format!("inv-{:016x}", rand::random::<u64>())
}

fn new_payout_id() -> String {
    format!("po-{:016x}", rand::random::<u64>())
}

impl InvoiceLedger for SqliteDatabase {
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, LedgerError> {
        let id = new_invoice_id();
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        db::invoices::insert_invoice(&invoice, &id, created_at, &mut tx).await?;
        for tag in &invoice.tags {
            db::invoices::insert_tag(&id, tag, &mut tx).await?;
        }
        tx.commit().await?;
        let mut conn = self.pool.acquire().await?;
        db::invoices::fetch_invoice(&id, &mut conn).await?.ok_or(LedgerError::InvoiceNotFound(id))
    }

    async fn fetch_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::invoices::fetch_invoice(invoice_id, &mut conn).await
    }

    async fn search_invoices_by_tag(&self, tag: &str) -> Result<Vec<Invoice>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::invoices::search_by_tag(tag, &mut conn).await
    }

    async fn append_invoice_log(&self, invoice_id: &str, entry: LogEntry) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::invoices::insert_log(invoice_id, &entry, &mut conn).await
    }

    async fn fetch_invoice_logs(&self, invoice_id: &str) -> Result<Vec<LogEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::invoices::fetch_logs(invoice_id, &mut conn).await
    }
}

impl ExchangeRates for SqliteDatabase {
    async fn fetch_rate(&self, currency: &str) -> Result<RateQuote, ExchangeRateError> {
        let mut conn = self.pool.acquire().await.map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
        db::rates::fetch_latest_rate(currency, &mut conn).await
    }

    async fn set_rate(&self, rate: &RateQuote) -> Result<(), ExchangeRateError> {
        let mut conn = self.pool.acquire().await.map_err(|e| ExchangeRateError::DatabaseError(e.to_string()))?;
        db::rates::insert_rate(rate, &mut conn).await
    }
}

impl Payouts for SqliteDatabase {
    async fn create_payout_with_refund(
        &self,
        invoice_id: &str,
        payout: NewPayout,
    ) -> Result<RefundRecord, PayoutError> {
        let payout_id = new_payout_id();
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        db::refunds::insert_payout(&payout, &payout_id, created_at, &mut tx).await?;
        db::refunds::insert_refund_record(invoice_id, &payout_id, created_at, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Payout {payout_id} created and linked to invoice {invoice_id}");
        Ok(RefundRecord { invoice_id: invoice_id.to_string(), payout_id, created_at })
    }

    async fn fetch_refund_for_invoice(&self, invoice_id: &str) -> Result<Option<RefundRecord>, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        db::refunds::fetch_refund_for_invoice(invoice_id, &mut conn).await
    }

    async fn fetch_payout(&self, payout_id: &str) -> Result<Option<Payout>, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        db::refunds::fetch_payout(payout_id, &mut conn).await
    }
}
