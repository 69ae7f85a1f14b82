mod helpers;
mod sats;
mod secret;

pub use helpers::parse_boolean_flag;
pub use sats::{Sats, SatsConversionError, BTC_CURRENCY_CODE, SATS_PER_BTC};
pub use secret::Secret;
