use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ssg_common::Sats;

/// A bid/ask quote for the settlement currency against a fiat base currency.
///
/// Rates are held as Sats per *cent* of the base currency, so converting a fiat amount is a single integer
/// multiplication and the result is already rounded to the payout currency's divisibility.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateQuote {
    pub base_currency: String,
    pub bid: Sats,
    pub ask: Sats,
    pub updated_at: DateTime<Utc>,
}

impl RateQuote {
    pub fn new(base_currency: String, bid: Sats, ask: Sats, updated_at: Option<DateTime<Utc>>) -> Self {
        let updated_at = updated_at.unwrap_or_else(Utc::now);
        Self { base_currency, bid, ask, updated_at }
    }

    /// Convert an amount in base-currency cents into the settlement currency at the bid.
    pub fn convert_cents_at_bid(&self, cents: i64) -> Sats {
        self.bid * cents
    }
}

impl Display for RateQuote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0.01 {} => {} (bid) / {} (ask)", self.base_currency, self.bid, self.ask)
    }
}

/// Reduce a payout amount by a spread given in basis points. Integer floor division, so the merchant never pays
/// out more than the spread allows.
pub fn apply_spread(amount: Sats, spread_bps: i64) -> Sats {
    Sats::from(amount.value() * (10_000 - spread_bps) / 10_000)
}
