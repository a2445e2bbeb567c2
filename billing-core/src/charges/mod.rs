//! Charge allocation onto the interval grid.
//!
//! The three charge families share only "emit a cost column given grid and
//! usage"; each has its own allocation function and the tariff drives a
//! plain dispatch over them. Columns keep the grid's ascending-UTC order.

pub mod customer;
pub mod demand;
pub mod energy;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::applicability::charge_mask;
use crate::calendar::{self, BillingMonthKey};
use crate::domain::{ChargeId, Tariff};
use crate::error::{BillingError, Result};
use crate::gapfill::FilledUsage;
use crate::grid::TimeGrid;

/// Per-interval cost series for one charge.
#[derive(Debug, Clone)]
pub struct CostColumn {
    pub charge_id: ChargeId,
    pub costs: Vec<Decimal>,
}

/// Allocate every charge of the tariff, checking for cancellation between
/// charges.
pub fn allocate_all(
    grid: &TimeGrid,
    usage: &FilledUsage,
    tariff: &Tariff,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<CostColumn>> {
    let mut columns = Vec::with_capacity(tariff.charge_count());

    for charge in &tariff.energy_charges {
        check_cancelled(cancel)?;
        let mask = charge_mask(grid, &charge.rules);
        columns.push(CostColumn {
            charge_id: charge.id,
            costs: energy::allocate(grid, usage, &mask, charge)?,
        });
    }
    for charge in &tariff.demand_charges {
        check_cancelled(cancel)?;
        let mask = charge_mask(grid, &charge.rules);
        columns.push(CostColumn {
            charge_id: charge.id,
            costs: demand::allocate(grid, usage, &mask, charge, cancel)?,
        });
    }
    for charge in &tariff.customer_charges {
        check_cancelled(cancel)?;
        columns.push(CostColumn {
            charge_id: charge.id,
            costs: customer::allocate(grid, charge)?,
        });
    }

    Ok(columns)
}

pub(crate) fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(BillingError::Cancelled),
        _ => Ok(()),
    }
}

/// Days of the billing month covered by the request, and the month's full
/// calendar length. Partial-period bills scale by this ratio.
pub(crate) fn month_coverage(grid: &TimeGrid, key: BillingMonthKey) -> (i64, i64) {
    let (start, end) = calendar::month_span(key, grid.billing_day());
    let covered_start = start.max(grid.request_start());
    let covered_end = end.min(grid.request_end());
    let covered = calendar::span_days(covered_start, covered_end).max(0);
    (covered, calendar::span_days(start, end))
}

pub(crate) fn coverage_factor(covered: i64, total: i64) -> Decimal {
    if covered >= total {
        Decimal::ONE
    } else {
        Decimal::from(covered) / Decimal::from(total)
    }
}
