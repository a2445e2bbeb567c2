use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::applicability::Bitmask;
use crate::domain::{DemandCharge, PeakType};
use crate::error::{BillingError, Result};
use crate::gapfill::FilledUsage;
use crate::grid::TimeGrid;

use super::{check_cancelled, coverage_factor, month_coverage};

/// Allocate a demand charge onto its peak intervals.
///
/// Within each scope (local day or billing month) the charge is
/// `peak * rate * f`, where `f` pro-rates scopes partially covered by the
/// request, and the amount is split equally across the intervals tied at
/// the peak. Tie comparison is exact on the stored decimal; intervals the
/// mask excludes can neither set nor share the peak.
pub fn allocate(
    grid: &TimeGrid,
    usage: &FilledUsage,
    mask: &Bitmask,
    charge: &DemandCharge,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<Decimal>> {
    let mut costs = vec![Decimal::ZERO; grid.len()];

    let scopes: Vec<(Decimal, std::ops::Range<usize>)> = match charge.peak_type {
        PeakType::Monthly => grid
            .month_ranges()
            .into_iter()
            .map(|(key, range)| {
                let (covered, total) = month_coverage(grid, key);
                (coverage_factor(covered, total), range)
            })
            .collect(),
        PeakType::Daily => {
            let mut out = Vec::new();
            for (date, range) in grid.day_ranges() {
                let full = grid.intervals_in_full_local_day(date)?;
                out.push((coverage_factor(range.len() as i64, full as i64), range));
            }
            out
        }
    };

    for (factor, range) in scopes {
        check_cancelled(cancel)?;

        let mut peak: Option<Decimal> = None;
        for i in range.clone() {
            if !mask.get(i) {
                continue;
            }
            let kw = usage.peak_demand_kw[i];
            if peak.map_or(true, |p| kw > p) {
                peak = Some(kw);
            }
        }
        // No qualifying interval: the charge contributes nothing to this scope.
        let Some(peak) = peak else { continue };

        let tied: Vec<usize> = range
            .clone()
            .filter(|&i| mask.get(i) && usage.peak_demand_kw[i] == peak)
            .collect();

        let contribution = peak
            .checked_mul(charge.rate_usd_per_kw)
            .and_then(|c| c.checked_mul(factor))
            .ok_or_else(|| {
                BillingError::Overflow(format!("pricing demand for charge '{}'", charge.name))
            })?;
        let share = contribution / Decimal::from(tied.len() as u64);
        for i in tied {
            costs[i] = share;
        }
    }

    Ok(costs)
}
