use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

pub const BTC_CURRENCY_CODE: &str = "BTC";
pub const SATS_PER_BTC: i64 = 100_000_000;

//--------------------------------------        Sats          ---------------------------------------------------------
/// An amount of the settlement currency, denominated in satoshis.
///
/// Payouts are integral satoshi amounts, so "rounding to the payout currency's divisibility" is a plain integer
/// division wherever an amount is derived from a rate.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Sats(i64);

impl Add for Sats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Sats {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Sats {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Sats {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl std::ops::Mul<i64> for Sats {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Sats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in satoshis: {0}")]
pub struct SatsConversionError(String);

impl From<i64> for Sats {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Sats {
    type Error = SatsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(SatsConversionError(format!("Value {value} is too large to convert to Sats")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Sats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.abs() < 100_000 {
            write!(f, "{} sat", self.0)
        } else {
            let btc = self.0 as f64 / SATS_PER_BTC as f64;
            write!(f, "{btc:0.8} BTC")
        }
    }
}

impl Sats {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_btc(btc: i64) -> Self {
        Self(btc * SATS_PER_BTC)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Sats::from(1_500);
        let b = Sats::from(500);
        assert_eq!(a + b, Sats::from(2_000));
        assert_eq!(a - b, Sats::from(1_000));
        assert_eq!(-b, Sats::from(-500));
        assert_eq!(b * 4, Sats::from(2_000));
        let total: Sats = [a, b, b].into_iter().sum();
        assert_eq!(total, Sats::from(2_500));
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Sats::from(2_500)), "2500 sat");
        assert_eq!(format!("{}", Sats::from_btc(1)), "1.00000000 BTC");
        assert_eq!(format!("{}", Sats::from(150_000_000)), "1.50000000 BTC");
    }

    #[test]
    fn conversion() {
        assert!(Sats::try_from(u64::MAX).is_err());
        assert_eq!(Sats::try_from(42u64).unwrap(), Sats::from(42));
    }
}
