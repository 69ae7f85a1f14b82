use sqlx::SqliteConnection;

use crate::{rates::RateQuote, traits::ExchangeRateError};

pub async fn fetch_latest_rate(currency: &str, conn: &mut SqliteConnection) -> Result<RateQuote, ExchangeRateError> {
    let quote = sqlx::query_as::<_, RateQuote>(
        "SELECT base_currency, bid, ask, updated_at FROM exchange_rates WHERE base_currency = ? \
         ORDER BY updated_at DESC LIMIT 1",
    )
    .bind(currency)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| ExchangeRateError::RateDoesNotExist(currency.to_string()))?;
    Ok(quote)
}

pub async fn insert_rate(rate: &RateQuote, conn: &mut SqliteConnection) -> Result<(), ExchangeRateError> {
    sqlx::query("INSERT INTO exchange_rates (base_currency, bid, ask, updated_at) VALUES (?, ?, ?, ?)")
        .bind(&rate.base_currency)
        .bind(rate.bid)
        .bind(rate.ask)
        .bind(rate.updated_at)
        .execute(conn)
        .await?;
    Ok(())
}
