//! Deterministic electricity billing engine.
//!
//! Converts a customer's interval usage and a declarative tariff into
//! per-month, per-charge, per-interval monetary breakdowns. The
//! computation is a pure function of its inputs: build the interval grid,
//! repair gaps, evaluate applicability masks, allocate each charge family,
//! and fold the cost columns into monthly results.

pub mod applicability;
pub mod bill;
pub mod calendar;
pub mod charges;
pub mod domain;
pub mod error;
pub mod gapfill;
pub mod grid;

pub use bill::{compute_bill, BillComputation, BillResult, CostMatrix};
pub use calendar::BillingMonthKey;
pub use domain::{
    ApplicabilityRule, ChargeId, CustomerCharge, CustomerChargeType, CustomerProfile,
    DemandCharge, EnergyCharge, MonthDay, PeakType, SeasonWindow, Tariff, UsageRecord,
};
pub use error::{BillingError, Result};
pub use gapfill::{GapFillStrategy, GapReport, MonthGaps};
pub use grid::{DayClass, TimeGrid};
