use bigdecimal::{num_bigint::BigInt, BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use thiserror::Error;

/// Decimal places used for averages and for every value shown to clients.
pub const DISPLAY_SCALE: i64 = 2;

/// Largest number of significant digits accepted for a single amount.
pub const MAX_AMOUNT_DIGITS: u64 = 1_000;

/// Largest decimal exponent magnitude accepted for a single amount.
pub const MAX_AMOUNT_SCALE: i64 = 1_000;

/// Round half-up (away from zero on ties) to `dp` decimal places.
#[inline]
pub fn round_half_up(value: &BigDecimal, dp: i64) -> BigDecimal {
    value.with_scale_round(dp, RoundingMode::HalfUp)
}

/// Round to the display scale; the result always carries exactly two
/// fractional digits (`100` -> `100.00`).
pub fn to_display(value: &BigDecimal) -> BigDecimal {
    round_half_up(value, DISPLAY_SCALE)
}

/// `sum / count` rounded half-up to `dp` places, computed exactly.
pub fn mean_half_up(sum: &BigDecimal, count: u64, dp: i64) -> BigDecimal {
    // sum = digits * 10^-scale, so mean * 10^dp = digits * 10^(dp - scale) / count
    let (digits, scale) = sum.as_bigint_and_exponent();
    let shift = dp - scale;
    let ten = BigInt::from(10u8);

    let (numerator, denominator) = if shift >= 0 {
        (digits * ten.pow(shift as u32), BigInt::from(count))
    } else {
        (digits, BigInt::from(count) * ten.pow((-shift) as u32))
    };

    let negative = numerator < BigInt::from(0u8);
    let magnitude = if negative { -numerator } else { numerator };
    let two = BigInt::from(2u8);
    let rounded = (&two * magnitude + &denominator) / (&two * &denominator);

    BigDecimal::new(if negative { -rounded } else { rounded }, dp)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is not a decimal number")]
    Invalid,
    #[error("amount exceeds {} digits or exponent {}", MAX_AMOUNT_DIGITS, MAX_AMOUNT_SCALE)]
    OutOfRange,
}

/// Parse a monetary amount. Plain and scientific notation are accepted;
/// the value is kept exactly as written.
pub fn parse_amount(raw: &str) -> Result<BigDecimal, AmountError> {
    let amount = BigDecimal::from_str(raw).map_err(|_| AmountError::Invalid)?;
    let (_, scale) = amount.as_bigint_and_exponent();
    if amount.digits() > MAX_AMOUNT_DIGITS || scale.abs() > MAX_AMOUNT_SCALE {
        return Err(AmountError::OutOfRange);
    }
    Ok(amount)
}

/// A single monetary transaction. Immutable once admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub amount: BigDecimal,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(amount: BigDecimal, timestamp: DateTime<Utc>) -> Self {
        Self { amount, timestamp }
    }
}

/// Immutable statistics snapshot.
///
/// Snapshots are never mutated in place: every change produces a new value
/// that is swapped in wholesale, so the five fields are always observed together.
/// `count == 0` implies every other field is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    pub sum: BigDecimal,
    pub avg: BigDecimal,
    pub max: BigDecimal,
    pub min: BigDecimal,
    pub count: u64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::empty()
    }
}

impl Statistics {
    /// The empty-window sentinel: all zeros.
    pub fn empty() -> Self {
        Self {
            sum: BigDecimal::from(0),
            avg: BigDecimal::from(0),
            max: BigDecimal::from(0),
            min: BigDecimal::from(0),
            count: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Fold one amount into this snapshot, returning the successor. Exact.
    pub fn folded(&self, amount: &BigDecimal) -> Self {
        let sum = &self.sum + amount;
        let count = self.count + 1;
        let avg = mean_half_up(&sum, count, DISPLAY_SCALE);

        let (max, min) = if self.is_empty() {
            (amount.clone(), amount.clone())
        } else {
            (
                if *amount > self.max { amount.clone() } else { self.max.clone() },
                if *amount < self.min { amount.clone() } else { self.min.clone() },
            )
        };

        Self {
            sum,
            avg,
            max,
            min,
            count,
        }
    }

    /// Build a snapshot from scratch over `amounts`.
    pub fn from_amounts<I>(amounts: I) -> Self
    where
        I: IntoIterator<Item = BigDecimal>,
    {
        let mut iter = amounts.into_iter();
        let Some(first) = iter.next() else {
            return Self::empty();
        };

        let (mut sum, mut max, mut min, mut count) = (first.clone(), first.clone(), first, 1u64);
        for amount in iter {
            if amount > max {
                max = amount.clone();
            } else if amount < min {
                min = amount.clone();
            }
            sum += amount;
            count += 1;
        }

        Self {
            avg: mean_half_up(&sum, count, DISPLAY_SCALE),
            sum,
            max,
            min,
            count,
        }
    }
}
