use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Invoice, LogEntry, NewInvoice},
    traits::LedgerError,
};

const INVOICE_COLUMNS: &str = "id, currency, price_cents, paid_cents, paid_sats, settlement_rate, status, \
                               exception, order_id, order_name, gateway, created_at";

pub async fn insert_invoice(
    invoice: &NewInvoice,
    id: &str,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"INSERT INTO invoices
           (id, currency, price_cents, paid_cents, paid_sats, settlement_rate, status, exception,
            order_id, order_name, gateway, created_at)
           VALUES (?, ?, ?, 0, 0, 0, 'new', 'none', ?, ?, ?, ?)"#,
    )
    .bind(id)
    .bind(&invoice.currency)
    .bind(invoice.price_cents)
    .bind(invoice.order_id)
    .bind(&invoice.order_name)
    .bind(&invoice.gateway)
    .bind(created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_tag(invoice_id: &str, tag: &str, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query("INSERT OR IGNORE INTO invoice_tags (invoice_id, tag) VALUES (?, ?)")
        .bind(invoice_id)
        .bind(tag)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_invoice(id: &str, conn: &mut SqliteConnection) -> Result<Option<Invoice>, LedgerError> {
    let invoice = sqlx::query_as::<_, Invoice>(&format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(invoice)
}

pub async fn search_by_tag(tag: &str, conn: &mut SqliteConnection) -> Result<Vec<Invoice>, LedgerError> {
    let invoices = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices JOIN invoice_tags ON invoice_tags.invoice_id = invoices.id \
         WHERE invoice_tags.tag = ? ORDER BY invoices.created_at"
    ))
    .bind(tag)
    .fetch_all(conn)
    .await?;
    Ok(invoices)
}

pub async fn insert_log(invoice_id: &str, entry: &LogEntry, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query("INSERT INTO invoice_logs (invoice_id, level, message, created_at) VALUES (?, ?, ?, ?)")
        .bind(invoice_id)
        .bind(entry.level)
        .bind(&entry.message)
        .bind(Utc::now())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_logs(invoice_id: &str, conn: &mut SqliteConnection) -> Result<Vec<LogEntry>, LedgerError> {
    let logs =
        sqlx::query_as::<_, LogEntry>("SELECT level, message FROM invoice_logs WHERE invoice_id = ? ORDER BY id")
            .bind(invoice_id)
            .fetch_all(conn)
            .await?;
    Ok(logs)
}
