//! Retail pricing of provider services.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::money::to_paise;

/// Conversion and margin applied to a provider's USD rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingConfig {
    pub usd_to_inr: Decimal,
    pub markup: Decimal,
    /// Percentage taken off the marked-up price, in `[0, 100)`.
    pub discount_percent: Decimal,
}

/// Price of `quantity` units of a service whose provider rate is quoted in
/// USD per 1000 units. Returns paise, or `None` on overflow.
pub fn quote(rate_per_1000_usd: Decimal, quantity: i64, pricing: &PricingConfig) -> Option<i64> {
    let discount = Decimal::ONE - pricing.discount_percent / Decimal::ONE_HUNDRED;
    let per_unit = rate_per_1000_usd
        .checked_mul(pricing.usd_to_inr)?
        .checked_mul(pricing.markup)?
        .checked_mul(discount)?
        / Decimal::ONE_THOUSAND;
    let total = per_unit
        .checked_mul(Decimal::from(quantity))?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    to_paise(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn pricing(discount: &str) -> PricingConfig {
        PricingConfig {
            usd_to_inr: dec("90"),
            markup: dec("1.5"),
            discount_percent: dec(discount),
        }
    }

    #[test]
    fn applies_conversion_and_markup() {
        // 0.50 USD/1000 * 90 * 1.5 = 67.50 INR per 1000
        assert_eq!(quote(dec("0.50"), 1000, &pricing("0")), Some(6_750));
        assert_eq!(quote(dec("0.50"), 100, &pricing("0")), Some(675));
    }

    #[test]
    fn applies_discount_and_rounds() {
        // 67.50 * 0.9 = 60.75 per 1000; 333 units = 20.22975
        assert_eq!(quote(dec("0.50"), 333, &pricing("10")), Some(2_023));
    }

    #[test]
    fn zero_rate_is_free() {
        assert_eq!(quote(Decimal::ZERO, 5_000, &pricing("0")), Some(0));
    }
}
