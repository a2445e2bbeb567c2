use rust_decimal::Decimal;

use crate::applicability::Bitmask;
use crate::domain::EnergyCharge;
use crate::error::{BillingError, Result};
use crate::gapfill::FilledUsage;
use crate::grid::TimeGrid;

/// `cost[i] = mask[i] * energy[i] * rate`; no cross-interval coupling.
pub fn allocate(
    grid: &TimeGrid,
    usage: &FilledUsage,
    mask: &Bitmask,
    charge: &EnergyCharge,
) -> Result<Vec<Decimal>> {
    let mut costs = vec![Decimal::ZERO; grid.len()];
    for (i, cost) in costs.iter_mut().enumerate() {
        if mask.get(i) {
            *cost = usage.energy_kwh[i]
                .checked_mul(charge.rate_usd_per_kwh)
                .ok_or_else(|| {
                    BillingError::Overflow(format!("pricing energy for charge '{}'", charge.name))
                })?;
        }
    }
    Ok(costs)
}
