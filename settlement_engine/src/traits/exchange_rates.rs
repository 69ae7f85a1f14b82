use thiserror::Error;

use crate::rates::RateQuote;

#[derive(Debug, Clone, Error)]
pub enum ExchangeRateError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No exchange rate is available for {0}")]
    RateDoesNotExist(String),
}

impl From<sqlx::Error> for ExchangeRateError {
    fn from(e: sqlx::Error) -> Self {
        ExchangeRateError::DatabaseError(e.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait ExchangeRates {
    /// Fetch the most recent quote for the given fiat currency. Returns
    /// [`ExchangeRateError::RateDoesNotExist`] when no quote has ever been stored.
    async fn fetch_rate(&self, currency: &str) -> Result<RateQuote, ExchangeRateError>;
    /// Store a new quote for the quote's base currency.
    async fn set_rate(&self, rate: &RateQuote) -> Result<(), ExchangeRateError>;
}
