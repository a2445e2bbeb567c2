use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::{CustomerCharge, CustomerChargeType};
use crate::error::{BillingError, Result};
use crate::grid::TimeGrid;

use super::{coverage_factor, month_coverage};

/// Customer charges ignore applicability masks.
///
/// Monthly: the month's pro-rated amount (`amount * covered_days /
/// calendar_days_in_billing_month`) spreads equally over its covered
/// intervals, so a fully covered month totals exactly `amount`.
///
/// Daily: every covered interval of local day `d` receives `amount /
/// intervals_in_full_day(d)`, making a boundary-partial day contribute in
/// proportion to its covered fraction. Full-day interval counts are
/// DST-aware, so a 23-hour day still totals `amount`.
pub fn allocate(grid: &TimeGrid, charge: &CustomerCharge) -> Result<Vec<Decimal>> {
    let mut costs = vec![Decimal::ZERO; grid.len()];

    match charge.charge_type {
        CustomerChargeType::Monthly => {
            for (key, range) in grid.month_ranges() {
                let (covered, total) = month_coverage(grid, key);
                let month_total = charge
                    .amount_usd
                    .checked_mul(coverage_factor(covered, total))
                    .ok_or_else(|| {
                        BillingError::Overflow(format!(
                            "pro-rating customer charge '{}'",
                            charge.name
                        ))
                    })?;
                let share = month_total / Decimal::from(range.len() as u64);
                for cost in &mut costs[range] {
                    *cost = share;
                }
            }
        }
        CustomerChargeType::Daily => {
            let mut full_day_counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
            for (date, range) in grid.day_ranges() {
                let full = match full_day_counts.get(&date) {
                    Some(n) => *n,
                    None => {
                        let n = grid.intervals_in_full_local_day(date)?;
                        full_day_counts.insert(date, n);
                        n
                    }
                };
                let share = charge.amount_usd / Decimal::from(full);
                for cost in &mut costs[range] {
                    *cost = share;
                }
            }
        }
    }

    Ok(costs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::RoundingStrategy;
    use std::collections::BTreeSet;
    use std::str::FromStr;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn grid(start: NaiveDate, end: NaiveDate, billing_day: u8) -> TimeGrid {
        TimeGrid::build(start, end, chrono_tz::UTC, 60, billing_day, &BTreeSet::new()).unwrap()
    }

    fn rounded_sum(costs: &[Decimal]) -> Decimal {
        costs
            .iter()
            .copied()
            .sum::<Decimal>()
            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
    }

    #[test]
    fn monthly_charge_totals_exactly_the_amount_over_a_full_month() {
        let g = grid(d(2024, 1, 1), d(2024, 1, 31), 31);
        let charge = CustomerCharge::new(
            "Customer Charge",
            Decimal::from(10),
            CustomerChargeType::Monthly,
        )
        .unwrap();
        let costs = allocate(&g, &charge).unwrap();
        assert_eq!(rounded_sum(&costs), Decimal::from_str("10.00").unwrap());
    }

    #[test]
    fn monthly_charge_pro_rates_a_partial_month() {
        // One day out of January's 31.
        let g = grid(d(2024, 1, 15), d(2024, 1, 15), 31);
        let charge =
            CustomerCharge::new("Customer Charge", Decimal::from(31), CustomerChargeType::Monthly)
                .unwrap();
        let costs = allocate(&g, &charge).unwrap();
        assert_eq!(rounded_sum(&costs), Decimal::from_str("1.00").unwrap());
    }

    #[test]
    fn daily_charge_pays_per_covered_day() {
        let g = grid(d(2024, 1, 1), d(2024, 1, 3), 31);
        let charge =
            CustomerCharge::new("Meter Fee", Decimal::from(2), CustomerChargeType::Daily).unwrap();
        let costs = allocate(&g, &charge).unwrap();
        assert_eq!(rounded_sum(&costs), Decimal::from_str("6.00").unwrap());
        // Each full day contributes the whole amount.
        assert_eq!(rounded_sum(&costs[0..24]), Decimal::from_str("2.00").unwrap());
    }

    #[test]
    fn daily_charge_on_dst_short_day_still_totals_the_amount() {
        let g = TimeGrid::build(
            d(2024, 3, 10),
            d(2024, 3, 10),
            chrono_tz::America::Los_Angeles,
            60,
            31,
            &BTreeSet::new(),
        )
        .unwrap();
        assert_eq!(g.len(), 23);
        let charge =
            CustomerCharge::new("Meter Fee", Decimal::from(2), CustomerChargeType::Daily).unwrap();
        let costs = allocate(&g, &charge).unwrap();
        assert_eq!(rounded_sum(&costs), Decimal::from_str("2.00").unwrap());
    }
}
