//! Bill assembly and the public entry point.
//!
//! A billing computation is a pure single pass: build the grid, repair the
//! usage, allocate every charge, then fold the cost columns into one
//! result per billing month. Nothing here blocks or mutates shared state;
//! callers may run computations for different customers on separate
//! workers against the same immutable tariff snapshot.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::RoundingStrategy;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::calendar::{self, BillingMonthKey};
use crate::charges::{self, CostColumn};
use crate::domain::{ChargeId, CustomerProfile, Tariff, UsageRecord};
use crate::error::{BillingError, Result};
use crate::gapfill::{self, GapFillStrategy, GapReport, MonthGaps};
use crate::grid::TimeGrid;

/// One billing month of the computation.
#[derive(Debug, Clone)]
pub struct BillResult {
    pub month: BillingMonthKey,
    /// Billed span, clipped to the requested period.
    pub period_start_local_date: NaiveDate,
    pub period_end_local_date: NaiveDate,
    /// Unrounded per-charge subtotals; every tariff charge has an entry.
    pub line_items: BTreeMap<ChargeId, Decimal>,
    /// Sum of line items, rounded half-even to cents.
    pub total_usd: Decimal,
    pub gaps: MonthGaps,
    /// True when any interval of the month was gap-filled.
    pub estimated: bool,
}

/// Interval-resolution monetary attribution, kept for audit and
/// visualisation. One shared interval index, one contiguous column per
/// charge.
#[derive(Debug, Clone)]
pub struct CostMatrix {
    starts_utc: Vec<DateTime<Utc>>,
    columns: Vec<CostColumn>,
}

impl CostMatrix {
    pub fn get(&self, interval_start_utc: DateTime<Utc>, charge_id: ChargeId) -> Option<Decimal> {
        let idx = self.starts_utc.binary_search(&interval_start_utc).ok()?;
        self.columns
            .iter()
            .find(|c| c.charge_id == charge_id)
            .map(|c| c.costs[idx])
    }

    pub fn interval_starts(&self) -> &[DateTime<Utc>] {
        &self.starts_utc
    }

    pub fn charge_ids(&self) -> impl Iterator<Item = ChargeId> + '_ {
        self.columns.iter().map(|c| c.charge_id)
    }
}

#[derive(Debug, Clone)]
pub struct BillComputation {
    /// One result per covered billing month, ascending.
    pub months: Vec<BillResult>,
    /// Sum of the months' rounded totals.
    pub grand_total_usd: Decimal,
    pub gap_report: GapReport,
    pub cost_matrix: CostMatrix,
}

fn round_usd(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Price a customer's usage under a tariff for an inclusive local date
/// range.
///
/// The usage stream may arrive in any order; results depend only on its
/// contents. On cancellation the distinguished `Cancelled` error is
/// returned and no partial result escapes.
pub fn compute_bill(
    profile: &CustomerProfile,
    tariff: &Tariff,
    holidays: &BTreeSet<NaiveDate>,
    usage: impl IntoIterator<Item = UsageRecord>,
    request_period: (NaiveDate, NaiveDate),
    gap_strategy: GapFillStrategy,
    cancel: Option<&CancellationToken>,
) -> Result<BillComputation> {
    let tz = profile.tz()?;
    charges::check_cancelled(cancel)?;

    let grid = TimeGrid::build(
        request_period.0,
        request_period.1,
        tz,
        profile.billing_interval_minutes,
        profile.billing_day,
        holidays,
    )?;

    let records: Vec<UsageRecord> = usage.into_iter().collect();
    let (filled, gap_report) = gapfill::align_and_fill(&grid, &records, gap_strategy)?;

    let columns = charges::allocate_all(&grid, &filled, tariff, cancel)?;

    let mut months = Vec::new();
    for (key, range) in grid.month_ranges() {
        let mut line_items = BTreeMap::new();
        let mut total = Decimal::ZERO;
        for column in &columns {
            let mut subtotal = Decimal::ZERO;
            for i in range.clone() {
                subtotal = subtotal.checked_add(column.costs[i]).ok_or_else(|| {
                    BillingError::Overflow(format!("summing line item for month {key}"))
                })?;
            }
            total = total.checked_add(subtotal).ok_or_else(|| {
                BillingError::Overflow(format!("summing total for month {key}"))
            })?;
            line_items.insert(column.charge_id, subtotal);
        }

        let (span_start, span_end) = calendar::month_span(key, profile.billing_day);
        let estimated = filled.filled[range.clone()].iter().any(|f| *f);
        months.push(BillResult {
            month: key,
            period_start_local_date: span_start.max(grid.request_start()),
            period_end_local_date: span_end.min(grid.request_end()),
            line_items,
            total_usd: round_usd(total),
            gaps: gap_report.month(key),
            estimated,
        });
    }

    let grand_total_usd = months
        .iter()
        .try_fold(Decimal::ZERO, |acc, m| acc.checked_add(m.total_usd))
        .ok_or_else(|| BillingError::Overflow("summing grand total".to_string()))?;

    tracing::info!(
        customer_tz = %profile.timezone,
        tariff = %tariff.name,
        months = months.len(),
        intervals = grid.len(),
        charges = tariff.charge_count(),
        %grand_total_usd,
        "bill computed"
    );

    Ok(BillComputation {
        months,
        grand_total_usd,
        gap_report,
        cost_matrix: CostMatrix {
            starts_utc: grid.starts_utc().to_vec(),
            columns,
        },
    })
}
