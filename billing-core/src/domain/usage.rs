use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{BillingError, Result};

/// One metered interval in canonical units: kWh of energy over the
/// interval, kW instantaneous maximum demand within it.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub interval_start_utc: DateTime<Utc>,
    pub interval_end_utc: DateTime<Utc>,
    pub energy_kwh: Decimal,
    pub peak_demand_kw: Decimal,
}

impl UsageRecord {
    pub fn new(
        interval_start_utc: DateTime<Utc>,
        interval_end_utc: DateTime<Utc>,
        energy_kwh: Decimal,
        peak_demand_kw: Decimal,
    ) -> Result<Self> {
        if interval_end_utc <= interval_start_utc {
            return Err(BillingError::InputValidation(format!(
                "interval_end_utc must be after interval_start_utc (got {interval_start_utc} -- {interval_end_utc})"
            )));
        }
        if energy_kwh < Decimal::ZERO {
            return Err(BillingError::InputValidation(format!(
                "energy_kwh must be non-negative (got {energy_kwh} at {interval_start_utc})"
            )));
        }
        if peak_demand_kw < Decimal::ZERO {
            return Err(BillingError::InputValidation(format!(
                "peak_demand_kw must be non-negative (got {peak_demand_kw} at {interval_start_utc})"
            )));
        }
        Ok(Self {
            interval_start_utc,
            interval_end_utc,
            energy_kwh,
            peak_demand_kw,
        })
    }

    pub fn width(&self) -> chrono::Duration {
        self.interval_end_utc - self.interval_start_utc
    }
}
