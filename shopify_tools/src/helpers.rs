use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::ShopifyApiError;

/// Shopify expresses money as decimal numbers in strings. Parse one into integer cents.
///
/// Negative amounts (refund adjustments) are supported. Fractions beyond two digits are truncated, which is what
/// the platform itself does when it renders amounts.
pub fn parse_shopify_price(price: &str) -> Result<i64, ShopifyApiError> {
    let trimmed = price.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let mut parts = unsigned.split('.');
    let whole_units = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ShopifyApiError::InvalidCurrencyAmount(price.to_string()))?
        .parse::<i64>()
        .map_err(|e| ShopifyApiError::InvalidCurrencyAmount(format!("Invalid price value: {price}. {e}.")))?;
    let cents = match parts.next() {
        None => 0,
        Some(frac) => {
            let mut padded = format!("{frac:0<2}");
            padded.truncate(2);
            padded
                .parse::<i64>()
                .map_err(|e| ShopifyApiError::InvalidCurrencyAmount(format!("Invalid price value: {price}. {e}.")))?
        },
    };
    let total = 100 * whole_units + cents;
    Ok(if negative { -total } else { total })
}

/// Render integer cents back into the decimal string format the platform expects.
pub fn price_string_from_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

/// Deserialize a Shopify money field into cents, accepting both the string form (`"10.50"`) and the bare number
/// form (`10.5`); webhook payloads use both.
pub fn cents_from_price<'de, D>(deserializer: D) -> Result<i64, D::Error>
where D: Deserializer<'de> {
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => parse_shopify_price(&s).map_err(serde::de::Error::custom),
        Value::Number(n) => {
            let f = n.as_f64().ok_or_else(|| serde::de::Error::custom(format!("Invalid price number: {n}")))?;
            Ok((f * 100.0).round() as i64)
        },
        other => Err(serde::de::Error::custom(format!("Expected a price string or number, got {other}"))),
    }
}
