//! Detection and repair of missing usage intervals.
//!
//! Usage records are aligned onto the grid first (rejecting duplicates,
//! off-grid starts, and wrong interval widths), then every empty slot is
//! repaired by the requested strategy. The filled series always has
//! exactly one row per grid slot, each flagged as observed or filled.

use std::collections::BTreeMap;

use chrono::Duration;
use rust_decimal::Decimal;

use crate::calendar::BillingMonthKey;
use crate::domain::UsageRecord;
use crate::error::{BillingError, Result};
use crate::grid::TimeGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapFillStrategy {
    /// Repeat the last preceding observation; leading gaps take the next
    /// following one.
    ExtrapolateLast,
    /// Interpolate linearly between the nearest observations; single-sided
    /// gaps repeat the known end.
    LinearInterpolate,
}

/// Fully-populated usage series aligned to the grid.
#[derive(Debug, Clone)]
pub struct FilledUsage {
    pub energy_kwh: Vec<Decimal>,
    pub peak_demand_kw: Vec<Decimal>,
    /// True where the value was repaired rather than observed.
    pub filled: Vec<bool>,
}

impl Default for GapFillStrategy {
    fn default() -> Self {
        GapFillStrategy::ExtrapolateLast
    }
}

/// Absent-interval summary for one billing month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthGaps {
    pub missing_intervals: usize,
    pub longest_gap: Duration,
}

impl Default for MonthGaps {
    fn default() -> Self {
        Self {
            missing_intervals: 0,
            longest_gap: Duration::zero(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GapReport {
    pub total_missing: usize,
    pub longest_gap: Duration,
    pub by_month: BTreeMap<BillingMonthKey, MonthGaps>,
}

impl Default for GapReport {
    fn default() -> Self {
        Self {
            total_missing: 0,
            longest_gap: Duration::zero(),
            by_month: BTreeMap::new(),
        }
    }
}

impl GapReport {
    pub fn month(&self, key: BillingMonthKey) -> MonthGaps {
        self.by_month.get(&key).copied().unwrap_or_default()
    }
}

/// Align `records` onto `grid` and repair every missing slot.
pub fn align_and_fill(
    grid: &TimeGrid,
    records: &[UsageRecord],
    strategy: GapFillStrategy,
) -> Result<(FilledUsage, GapReport)> {
    let n = grid.len();
    let step = grid.step();
    let mut slots: Vec<Option<(Decimal, Decimal)>> = vec![None; n];

    for rec in records {
        if rec.energy_kwh < Decimal::ZERO || rec.peak_demand_kw < Decimal::ZERO {
            return Err(BillingError::InputValidation(format!(
                "usage at {} carries a negative quantity",
                rec.interval_start_utc
            )));
        }
        if rec.width() != step {
            return Err(BillingError::Inconsistency(format!(
                "usage interval at {} is {} minutes wide, expected {}",
                rec.interval_start_utc,
                rec.width().num_minutes(),
                step.num_minutes()
            )));
        }
        let Some(idx) = grid.index_of(rec.interval_start_utc) else {
            if grid.covers(rec.interval_start_utc) {
                return Err(BillingError::Inconsistency(format!(
                    "usage interval at {} is not aligned to the {}-minute grid",
                    rec.interval_start_utc,
                    step.num_minutes()
                )));
            }
            // Outside the requested period: not this computation's concern.
            continue;
        };
        if slots[idx].is_some() {
            return Err(BillingError::Inconsistency(format!(
                "duplicate usage interval at {}",
                rec.interval_start_utc
            )));
        }
        slots[idx] = Some((rec.energy_kwh, rec.peak_demand_kw));
    }

    if slots.iter().all(Option::is_none) {
        return Err(BillingError::MissingData(format!(
            "no usage observations between {} and {}",
            grid.request_start(),
            grid.request_end()
        )));
    }

    let report = analyze_gaps(grid, &slots);
    if report.total_missing > 0 {
        tracing::warn!(
            missing = report.total_missing,
            longest_gap_minutes = report.longest_gap.num_minutes(),
            "usage has gaps; filling before billing"
        );
    }

    let filled: Vec<bool> = slots.iter().map(Option::is_none).collect();
    let (energy_kwh, peak_demand_kw) = match strategy {
        GapFillStrategy::ExtrapolateLast => fill_extrapolate_last(&slots),
        GapFillStrategy::LinearInterpolate => fill_linear(&slots),
    };

    Ok((
        FilledUsage {
            energy_kwh,
            peak_demand_kw,
            filled,
        },
        report,
    ))
}

fn analyze_gaps(grid: &TimeGrid, slots: &[Option<(Decimal, Decimal)>]) -> GapReport {
    let step = grid.step();
    let mut report = GapReport::default();

    let mut i = 0;
    while i < slots.len() {
        if slots[i].is_some() {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < slots.len() && slots[i].is_none() {
            i += 1;
        }
        let run_len = i - run_start;
        report.total_missing += run_len;
        report.longest_gap = report.longest_gap.max(step * run_len as i32);

        // Attribute the run to each billing month it touches; month ranges
        // are contiguous so each intersection is one piece.
        let mut j = run_start;
        while j < i {
            let key = grid.month_key(j);
            let mut k = j + 1;
            while k < i && grid.month_key(k) == key {
                k += 1;
            }
            let piece = k - j;
            let entry = report.by_month.entry(key).or_default();
            entry.missing_intervals += piece;
            entry.longest_gap = entry.longest_gap.max(step * piece as i32);
            j = k;
        }
    }

    report
}

fn fill_extrapolate_last(slots: &[Option<(Decimal, Decimal)>]) -> (Vec<Decimal>, Vec<Decimal>) {
    let n = slots.len();
    let mut energy = vec![Decimal::ZERO; n];
    let mut demand = vec![Decimal::ZERO; n];

    let mut last: Option<(Decimal, Decimal)> = None;
    for (i, slot) in slots.iter().enumerate() {
        if slot.is_some() {
            last = *slot;
        }
        if let Some((e, d)) = last {
            energy[i] = e;
            demand[i] = d;
        }
    }
    // Leading slots before the first observation take the next following one.
    if let Some(first_present) = slots.iter().position(Option::is_some) {
        if let Some((e, d)) = slots[first_present] {
            for i in 0..first_present {
                energy[i] = e;
                demand[i] = d;
            }
        }
    }
    (energy, demand)
}

fn fill_linear(slots: &[Option<(Decimal, Decimal)>]) -> (Vec<Decimal>, Vec<Decimal>) {
    let n = slots.len();
    let mut energy = vec![Decimal::ZERO; n];
    let mut demand = vec![Decimal::ZERO; n];

    let present: Vec<usize> = (0..n).filter(|&i| slots[i].is_some()).collect();

    for &i in &present {
        if let Some((e, d)) = slots[i] {
            energy[i] = e;
            demand[i] = d;
        }
    }
    if present.is_empty() {
        return (energy, demand);
    }

    // Leading and trailing gaps repeat the known end.
    let (first, last) = (present[0], present[present.len() - 1]);
    for i in 0..first {
        energy[i] = energy[first];
        demand[i] = demand[first];
    }
    for i in (last + 1)..n {
        energy[i] = energy[last];
        demand[i] = demand[last];
    }

    // Interior gaps interpolate between their neighbours.
    for pair in present.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if hi - lo <= 1 {
            continue;
        }
        let width = Decimal::from((hi - lo) as u64);
        for i in (lo + 1)..hi {
            let frac = Decimal::from((i - lo) as u64) / width;
            energy[i] = energy[lo] + (energy[hi] - energy[lo]) * frac;
            demand[i] = demand[lo] + (demand[hi] - demand[lo]) * frac;
        }
    }

    (energy, demand)
}
