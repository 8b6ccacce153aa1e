use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// An amount of money in minor units (cents). Prices are always stored
/// internally in minor units; conversion to and from decimal wire formats
/// happens at the API boundary.
///
/// Signed because intermediate arithmetic (subtotal minus discount) may dip
/// below zero before the final total is floored.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Whole currency units, e.g. `Money::from_major(150)` is 150.00.
    pub fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    /// Parse a decimal string like `"123.45"`, `"123.4"` or `"123"`.
    /// Fractional digits beyond two are rejected rather than rounded.
    pub fn from_decimal_str(s: &str) -> Option<Self> {
        let s = s.trim();
        let (sign, s) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        if frac.len() > 2 {
            return None;
        }
        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let frac_minor: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().ok()? * 10,
            _ => frac.parse().ok()?,
        };
        Some(Money(sign * (whole * 100 + frac_minor)))
    }

    /// Convert a JSON float (major units) into minor units, rejecting
    /// non-finite values.
    pub fn from_major_f64(v: f64) -> Option<Self> {
        if !v.is_finite() {
            return None;
        }
        Some(Money((v * 100.0).round() as i64))
    }

    pub fn minor(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Floors at zero. Used for the final checkout total.
    pub fn clamp_non_negative(self) -> Self {
        Money(self.0.max(0))
    }

    /// Line total for a quantity of items at this unit price.
    pub fn times(self, quantity: u32) -> Self {
        Money(self.0 * i64::from(quantity))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Supported settlement currencies. The backend treats the currency code as
/// an opaque parameter on payment initiation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    Kes,
    Usd,
}

impl Currency {
    pub fn code(self) -> &'static str {
        match self {
            Currency::Kes => "KES",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Format an amount for display in the given currency.
pub fn format_amount(amount: Money, currency: Currency) -> String {
    format!("{currency} {amount}")
}
