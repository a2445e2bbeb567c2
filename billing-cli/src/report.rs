use std::fmt::Write as _;

use rust_decimal::prelude::RoundingStrategy;
use rust_decimal::Decimal;

use billing_core::{BillComputation, Tariff};

fn usd(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Render the per-month breakdown as plain text.
pub fn render(bill: &BillComputation, tariff: &Tariff) -> String {
    let mut out = String::new();

    for month in &bill.months {
        let _ = writeln!(
            out,
            "Billing month {} ({} -- {}){}:",
            month.month,
            month.period_start_local_date,
            month.period_end_local_date,
            if month.estimated { " [estimated]" } else { "" }
        );

        let mut items: Vec<(&str, Decimal)> = month
            .line_items
            .iter()
            .map(|(id, amount)| {
                (tariff.charge_name(*id).unwrap_or("unknown charge"), *amount)
            })
            .collect();
        items.sort_by_key(|(name, _)| *name);

        for (name, amount) in items {
            let _ = writeln!(out, "  {name:<40} ${:>12.2}", usd(amount));
        }
        if month.gaps.missing_intervals > 0 {
            let _ = writeln!(
                out,
                "  ({} missing interval(s) filled; longest gap {} min)",
                month.gaps.missing_intervals,
                month.gaps.longest_gap.num_minutes()
            );
        }
        let _ = writeln!(out, "  {:<40} ${:>12.2}", "Total", month.total_usd);
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "{:<42} ${:>12.2}", "Grand total", bill.grand_total_usd);
    out
}

/// Dump non-zero cost matrix entries for audit, one line per
/// (interval, charge).
pub fn render_cost_matrix(bill: &BillComputation, tariff: &Tariff) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\ninterval_start_utc,charge,cost_usd");
    for &start in bill.cost_matrix.interval_starts() {
        for charge_id in bill.cost_matrix.charge_ids() {
            if let Some(cost) = bill.cost_matrix.get(start, charge_id) {
                if cost != Decimal::ZERO {
                    let name = tariff.charge_name(charge_id).unwrap_or("unknown charge");
                    let _ = writeln!(out, "{},{name},{cost}", start.to_rfc3339());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::{
        compute_bill, CustomerCharge, CustomerChargeType, CustomerProfile, EnergyCharge,
        GapFillStrategy, Tariff, UsageRecord,
    };
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use std::collections::BTreeSet;
    use std::str::FromStr;

    #[test]
    fn report_lists_line_items_and_totals() {
        let profile = CustomerProfile::new("UTC", 60, 31).unwrap();
        let energy = EnergyCharge::new("Energy", Decimal::from_str("0.10").unwrap(), Vec::new())
            .unwrap();
        let customer = CustomerCharge::new(
            "Customer Charge",
            Decimal::from(10),
            CustomerChargeType::Monthly,
        )
        .unwrap();
        let tariff =
            Tariff::new("Acme Power", "Flat", vec![energy], Vec::new(), vec![customer]).unwrap();

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let usage: Vec<UsageRecord> = (0..24)
            .map(|i| {
                let s = start + Duration::hours(i);
                UsageRecord::new(s, s + Duration::hours(1), Decimal::ONE, Decimal::from(4))
                    .unwrap()
            })
            .collect();

        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bill = compute_bill(
            &profile,
            &tariff,
            &BTreeSet::new(),
            usage,
            (day, day),
            GapFillStrategy::ExtrapolateLast,
            None,
        )
        .unwrap();

        let text = render(&bill, &tariff);
        assert!(text.contains("Billing month 2024-01"));
        assert!(text.contains("Energy"));
        assert!(text.contains("Customer Charge"));
        assert!(text.contains("Grand total"));

        let matrix = render_cost_matrix(&bill, &tariff);
        assert!(matrix.contains("2024-01-01T00:00:00+00:00,Energy,0.10"));
    }
}
