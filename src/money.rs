//! Rupee amounts.
//!
//! Balances and charges are stored as `i64` paise (1/100 rupee) so ledger
//! arithmetic never touches floating point. The API speaks decimal rupees,
//! rounded to two places.

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

/// Largest accepted difference between a requested and a deposited amount: 2.00 rupees.
pub const AMOUNT_TOLERANCE_PAISE: i64 = 200;

/// Convert a decimal rupee amount to paise, rounding to 2 places.
///
/// Returns `None` when the value does not fit in an `i64`.
pub fn to_paise(amount: Decimal) -> Option<i64> {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    (rounded * Decimal::ONE_HUNDRED).to_i64()
}

/// Convert paise back to a decimal rupee amount with scale 2.
pub fn from_paise(paise: i64) -> Decimal {
    Decimal::new(paise, 2)
}

/// `true` when the two amounts differ by no more than [`AMOUNT_TOLERANCE_PAISE`].
pub fn within_tolerance(requested_paise: i64, deposited_paise: i64) -> bool {
    (requested_paise - deposited_paise).abs() <= AMOUNT_TOLERANCE_PAISE
}
