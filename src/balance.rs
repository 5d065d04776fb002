//! Balance normalization: turn a token's USD quote and per-unit rate into a
//! display-ready human balance with magnitude-tiered rounding.

use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;

/// A normalized human-readable balance.
///
/// `Unknown` marks a holding whose upstream rate was zero (a data error when the
/// quote is non-zero). It renders distinctly from a true zero balance.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayBalance {
    Amount(Decimal),
    Unknown,
}

impl fmt::Display for DisplayBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayBalance::Amount(amount) => write!(f, "{}", amount),
            DisplayBalance::Unknown => write!(f, "unknown"),
        }
    }
}

impl DisplayBalance {
    pub fn is_unknown(&self) -> bool {
        matches!(self, DisplayBalance::Unknown)
    }
}

/// Decimal places for a given unrounded balance magnitude.
///
/// A single fixed precision either hides dust balances as zero or produces
/// unreadable tails for large holdings, so precision tiers on magnitude:
/// dust keeps 10 places, large holdings keep 2, everything else 5.
fn tier_decimal_places(unrounded: Decimal) -> u32 {
    if unrounded < Decimal::new(1, 3) {
        10
    } else if unrounded > Decimal::from(1000) {
        2
    } else {
        5
    }
}

/// Compute the human balance `quote_value / quote_rate`, rounded to the tier
/// picked from the unrounded quotient.
///
/// A zero rate never divides; it yields `Unknown` regardless of the quote.
pub fn normalize(quote_value: Decimal, quote_rate: Decimal) -> DisplayBalance {
    if quote_rate.is_zero() {
        return DisplayBalance::Unknown;
    }

    let unrounded = quote_value / quote_rate;
    let places = tier_decimal_places(unrounded);
    DisplayBalance::Amount(
        unrounded.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero),
    )
}
