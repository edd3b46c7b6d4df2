//! Proration of a priced window onto a fraction of the monthly unit price.
//!
//! Factors are exact decimals; nothing in here rounds. Rounding to currency
//! precision is left to whoever renders an amount.

use crate::domain::calendar;
use crate::domain::types::BillingUnit;
use crate::error::Result;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;

const FIRST_HALF_LAST_DAY: u32 = 15;
const SECOND_HALF_FIRST_DAY: u32 = 16;

/// Pricing inputs of one line item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingWindow {
    pub unit: BillingUnit,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub quantity: u32,
}

impl PricingWindow {
    /// Billable multiple of the unit price.
    ///
    /// With `current` set, per-day items are measured up to `now` (capped at
    /// `end`) instead of their closed window. Other units ignore `now`.
    pub fn factor(&self, now: DateTime<Utc>, current: bool) -> Result<Decimal> {
        // A window never bills past the month it starts in.
        let end = self.end.min(calendar::month_end(self.start));

        match self.unit {
            BillingUnit::Quantity => Ok(Decimal::from(self.quantity)),
            BillingUnit::PerDay if current => {
                if now < self.start {
                    return Ok(Decimal::ZERO);
                }
                Ok(Decimal::from(calendar::full_days(self.start, now.min(end))?))
            }
            BillingUnit::PerDay => Ok(Decimal::from(calendar::full_days(self.start, end)?)),
            BillingUnit::PerHalfMonth => {
                let month_days = calendar::days_in_month(self.start.year(), self.start.month());
                Ok(half_month_factor(self.start.day(), end.day(), month_days))
            }
            BillingUnit::PerMonth => {
                calendar::full_days(self.start, end)?;
                let month_days = calendar::days_in_month(self.start.year(), self.start.month());
                if self.start.day() == 1 && end.day() == month_days {
                    return Ok(Decimal::ONE);
                }
                let used_days = (end - self.start).num_days() + 1;
                Ok(Decimal::from(used_days) / Decimal::from(month_days))
            }
        }
    }

    pub fn amount(&self, unit_price: Decimal, now: DateTime<Utc>, current: bool) -> Result<Decimal> {
        Ok(unit_price * self.factor(now, current)?)
    }
}

/// Half-month factor for a window inside one month, rules applied in order.
pub fn half_month_factor(start_day: u32, end_day: u32, month_days: u32) -> Decimal {
    let half = Decimal::from(month_days) / Decimal::TWO;

    if (start_day == 1 && end_day == FIRST_HALF_LAST_DAY)
        || (start_day == SECOND_HALF_FIRST_DAY && end_day == month_days)
    {
        Decimal::ONE
    } else if start_day == 1 && end_day == month_days {
        Decimal::TWO
    } else if start_day == 1 && end_day > FIRST_HALF_LAST_DAY {
        Decimal::ONE + Decimal::from(end_day - FIRST_HALF_LAST_DAY) / half
    } else if start_day < SECOND_HALF_FIRST_DAY && end_day == month_days {
        Decimal::ONE + Decimal::from(SECOND_HALF_FIRST_DAY - start_day) / half
    } else {
        let used_days = i64::from(end_day) - i64::from(start_day) + 1;
        Decimal::from(used_days.max(0)) / half
    }
}

pub fn tax(price: Decimal, tax_percent: Decimal) -> Decimal {
    price * tax_percent / Decimal::ONE_HUNDRED
}

pub fn total(price: Decimal, tax_percent: Decimal) -> Decimal {
    price + tax(price, tax_percent)
}

/// Left-to-right sum, so repeated runs over the same ordering are reproducible.
pub fn sum<I>(amounts: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    amounts
        .into_iter()
        .fold(Decimal::ZERO, |acc, amount| acc + amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BillingError;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn window(unit: BillingUnit, start: DateTime<Utc>, end: DateTime<Utc>) -> PricingWindow {
        PricingWindow {
            unit,
            start,
            end,
            quantity: 0,
        }
    }

    #[test]
    fn test_quantity_factor_ignores_time() {
        let mut w = window(BillingUnit::Quantity, day(2017, 1, 10), day(2017, 1, 12));
        w.quantity = 7;
        assert_eq!(w.factor(day(2017, 3, 1), false).unwrap(), dec!(7));
        assert_eq!(w.factor(day(2017, 3, 1), true).unwrap(), dec!(7));
    }

    #[test]
    fn test_per_day_factor_counts_inclusive_days() {
        let w = window(
            BillingUnit::PerDay,
            day(2017, 1, 15),
            calendar::month_end(day(2017, 1, 15)),
        );
        assert_eq!(w.factor(day(2017, 1, 20), false).unwrap(), dec!(17));
    }

    #[test]
    fn test_per_day_current_factor_tracks_now() {
        let w = window(
            BillingUnit::PerDay,
            day(2017, 1, 15),
            calendar::month_end(day(2017, 1, 15)),
        );
        assert_eq!(w.factor(day(2017, 1, 20), true).unwrap(), dec!(6));
        assert_eq!(w.factor(day(2017, 1, 10), true).unwrap(), Decimal::ZERO);
        assert_eq!(w.factor(day(2017, 2, 10), true).unwrap(), dec!(17));
    }

    #[test]
    fn test_per_month_full_month_is_one() {
        let w = window(BillingUnit::PerMonth, day(2017, 2, 1), calendar::month_end(day(2017, 2, 1)));
        assert_eq!(w.factor(day(2017, 2, 1), false).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_per_month_partial_month() {
        let start = day(2017, 7, 20);
        let w = window(BillingUnit::PerMonth, start, calendar::month_end(start));
        assert_eq!(w.factor(start, false).unwrap(), dec!(12) / dec!(31));
    }

    #[test]
    fn test_half_month_exact_halves() {
        assert_eq!(half_month_factor(1, 15, 31), Decimal::ONE);
        assert_eq!(half_month_factor(16, 31, 31), Decimal::ONE);
        assert_eq!(half_month_factor(16, 28, 28), Decimal::ONE);
        assert_eq!(half_month_factor(1, 30, 30), Decimal::TWO);
    }

    #[test]
    fn test_half_month_start_on_first_day_end_in_second_half() {
        assert_eq!(half_month_factor(1, 20, 31), Decimal::ONE + dec!(5) / dec!(15.5));
    }

    #[test]
    fn test_half_month_start_in_first_half_until_month_end() {
        assert_eq!(half_month_factor(14, 31, 31), Decimal::ONE + dec!(2) / dec!(15.5));
    }

    #[test]
    fn test_half_month_fallback_counts_days() {
        assert_eq!(half_month_factor(10, 14, 31), dec!(5) / dec!(15.5));
        assert_eq!(half_month_factor(10, 20, 31), dec!(11) / dec!(15.5));
    }

    #[test]
    fn test_tax_and_total() {
        assert_eq!(tax(dec!(200), dec!(20)), dec!(40));
        assert_eq!(total(dec!(200), dec!(20)), dec!(240));
        assert_eq!(total(dec!(200), Decimal::ZERO), dec!(200));
    }

    #[test]
    fn test_reversed_window_is_a_precondition_error() {
        let w = window(BillingUnit::PerDay, day(2017, 1, 15), day(2017, 1, 14));
        assert!(matches!(
            w.factor(day(2017, 1, 20), false),
            Err(BillingError::Precondition { .. })
        ));
    }
}
