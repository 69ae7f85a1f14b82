use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use ssg_common::Sats;

use crate::{
    db_types::{NewPayout, Payout, RefundRecord},
    traits::PayoutError,
};

pub async fn insert_payout(
    payout: &NewPayout,
    id: &str,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), PayoutError> {
    sqlx::query(
        r#"INSERT INTO payouts (id, currency, amount, payout_methods, auto_approve_claims, description, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(id)
    .bind(&payout.currency)
    .bind(payout.amount)
    .bind(payout.payout_methods.join(","))
    .bind(payout.auto_approve_claims)
    .bind(&payout.description)
    .bind(created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Inserting the refund record is where invariant "one refund per invoice" bites: the primary key on
/// `invoice_id` turns a duplicate into [`PayoutError::RefundAlreadyExists`].
pub async fn insert_refund_record(
    invoice_id: &str,
    payout_id: &str,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), PayoutError> {
    sqlx::query("INSERT INTO refunds (invoice_id, payout_id, created_at) VALUES (?, ?, ?)")
        .bind(invoice_id)
        .bind(payout_id)
        .bind(created_at)
        .execute(conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PayoutError::RefundAlreadyExists(invoice_id.to_string())
            },
            _ => PayoutError::DatabaseError(e.to_string()),
        })?;
    Ok(())
}

pub async fn fetch_refund_for_invoice(
    invoice_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<RefundRecord>, PayoutError> {
    let record = sqlx::query_as::<_, RefundRecord>(
        "SELECT invoice_id, payout_id, created_at FROM refunds WHERE invoice_id = ?",
    )
    .bind(invoice_id)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

#[derive(FromRow)]
struct PayoutRow {
    id: String,
    currency: String,
    amount: Sats,
    payout_methods: String,
    auto_approve_claims: bool,
    description: String,
    created_at: DateTime<Utc>,
}

impl From<PayoutRow> for Payout {
    fn from(row: PayoutRow) -> Self {
        let payout_methods =
            row.payout_methods.split(',').filter(|s| !s.is_empty()).map(String::from).collect::<Vec<_>>();
        Payout {
            id: row.id,
            currency: row.currency,
            amount: row.amount,
            payout_methods,
            auto_approve_claims: row.auto_approve_claims,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

pub async fn fetch_payout(payout_id: &str, conn: &mut SqliteConnection) -> Result<Option<Payout>, PayoutError> {
    let row = sqlx::query_as::<_, PayoutRow>(
        "SELECT id, currency, amount, payout_methods, auto_approve_claims, description, created_at FROM payouts \
         WHERE id = ?",
    )
    .bind(payout_id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(Payout::from))
}
